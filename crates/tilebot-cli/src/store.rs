//! Puzzle library backends
//!
//! - Local: JSON file under the user data directory
//! - Memory: in-process store for tests

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tilebot_core::{GenerationResult, Program, Puzzle, SimulationConfig};

/// A saved puzzle with everything needed to verify or replay it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleRecord {
    /// Assigned by the store on save
    #[serde(default)]
    pub id: u64,
    pub label: String,
    pub seed: u64,
    pub attempts: usize,
    /// Unix timestamp when the puzzle was saved
    pub created_at: u64,
    pub config: SimulationConfig,
    pub puzzle: Puzzle,
    pub solution: Program,
}

impl PuzzleRecord {
    /// Build a record from a successful result
    pub fn from_result(label: &str, config: &SimulationConfig, result: &GenerationResult) -> Option<Self> {
        Some(Self {
            id: 0,
            label: label.to_string(),
            seed: result.seed,
            attempts: result.attempts,
            created_at: now_secs(),
            config: config.clone(),
            puzzle: result.puzzle.clone()?,
            solution: result.solution.clone()?,
        })
    }

    pub fn stars(&self) -> usize {
        self.puzzle.grid.star_count()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Trait for puzzle library backends
pub trait PuzzleStore {
    /// Save a record and return its id
    fn save(&self, record: PuzzleRecord) -> Result<u64>;

    fn load(&self, id: u64) -> Result<Option<PuzzleRecord>>;

    /// All records, oldest first
    fn list(&self) -> Result<Vec<PuzzleRecord>>;

    fn remove(&self, id: u64) -> Result<bool>;

    /// Backend name for display
    fn backend_name(&self) -> &'static str;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Library {
    next_id: u64,
    records: Vec<PuzzleRecord>,
}

impl Library {
    fn insert(&mut self, mut record: PuzzleRecord) -> u64 {
        self.next_id = self.next_id.max(1);
        record.id = self.next_id;
        self.next_id += 1;
        self.records.push(record);
        self.next_id - 1
    }

    fn remove(&mut self, id: u64) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        self.records.len() != before
    }
}

// ==================== Local File Backend ====================

/// File-backed library
pub struct LocalPuzzleStore {
    path: PathBuf,
}

impl LocalPuzzleStore {
    /// Library in the user data directory
    pub fn new() -> Self {
        let path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tilebot")
            .join("puzzles.json");
        Self::at(path)
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Library> {
        match std::fs::read_to_string(&self.path) {
            Ok(json) => serde_json::from_str(&json)
                .with_context(|| format!("corrupt puzzle library {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Library::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", self.path.display())),
        }
    }

    fn write(&self, library: &Library) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(library)?;
        std::fs::write(&self.path, json).with_context(|| format!("writing {}", self.path.display()))
    }
}

impl Default for LocalPuzzleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PuzzleStore for LocalPuzzleStore {
    fn save(&self, record: PuzzleRecord) -> Result<u64> {
        let mut library = self.read()?;
        let id = library.insert(record);
        self.write(&library)?;
        Ok(id)
    }

    fn load(&self, id: u64) -> Result<Option<PuzzleRecord>> {
        Ok(self.read()?.records.into_iter().find(|r| r.id == id))
    }

    fn list(&self) -> Result<Vec<PuzzleRecord>> {
        Ok(self.read()?.records)
    }

    fn remove(&self, id: u64) -> Result<bool> {
        let mut library = self.read()?;
        let removed = library.remove(id);
        if removed {
            self.write(&library)?;
        }
        Ok(removed)
    }

    fn backend_name(&self) -> &'static str {
        "Local"
    }
}

// ==================== Memory Backend for Testing ====================

/// In-memory library
#[cfg(test)]
#[derive(Default)]
pub struct MemoryPuzzleStore {
    library: std::sync::Mutex<Library>,
}

#[cfg(test)]
impl MemoryPuzzleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn library(&self) -> std::sync::MutexGuard<'_, Library> {
        self.library.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
impl PuzzleStore for MemoryPuzzleStore {
    fn save(&self, record: PuzzleRecord) -> Result<u64> {
        Ok(self.library().insert(record))
    }

    fn load(&self, id: u64) -> Result<Option<PuzzleRecord>> {
        Ok(self.library().records.iter().find(|r| r.id == id).cloned())
    }

    fn list(&self) -> Result<Vec<PuzzleRecord>> {
        Ok(self.library().records.clone())
    }

    fn remove(&self, id: u64) -> Result<bool> {
        Ok(self.library().remove(id))
    }

    fn backend_name(&self) -> &'static str {
        "Memory"
    }
}
