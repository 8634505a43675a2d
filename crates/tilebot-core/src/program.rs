//! Programs: five fixed functions of fixed-length instruction slots.

use crate::config::SlotsPerFunction;
use crate::Color;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One of the five program functions. `F1` is the entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionName {
    F1,
    F2,
    F3,
    F4,
    F5,
}

impl FunctionName {
    pub const ALL: [FunctionName; 5] = [
        FunctionName::F1,
        FunctionName::F2,
        FunctionName::F3,
        FunctionName::F4,
        FunctionName::F5,
    ];

    pub fn index(self) -> usize {
        match self {
            FunctionName::F1 => 0,
            FunctionName::F2 => 1,
            FunctionName::F3 => 2,
            FunctionName::F4 => 3,
            FunctionName::F5 => 4,
        }
    }
}

impl std::fmt::Display for FunctionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "f{}", self.index() + 1)
    }
}

/// What an instruction does when it executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InstructionKind {
    Forward,
    TurnLeft,
    TurnRight,
    Call { function: FunctionName },
    Paint { color: Color },
    Noop,
}

impl InstructionKind {
    pub fn is_turn(self) -> bool {
        matches!(self, InstructionKind::TurnLeft | InstructionKind::TurnRight)
    }

    /// The turn in the opposite sense, for turn kinds
    pub fn opposite_turn(self) -> Option<InstructionKind> {
        match self {
            InstructionKind::TurnLeft => Some(InstructionKind::TurnRight),
            InstructionKind::TurnRight => Some(InstructionKind::TurnLeft),
            _ => None,
        }
    }

    fn code(self) -> String {
        match self {
            InstructionKind::Forward => "F".to_string(),
            InstructionKind::TurnLeft => "L".to_string(),
            InstructionKind::TurnRight => "R".to_string(),
            InstructionKind::Call { function } => format!("C{}", function.index() + 1),
            InstructionKind::Paint { color } => format!("P{}", color.code()),
            InstructionKind::Noop => "N".to_string(),
        }
    }
}

/// A filled slot: an action plus an optional colour guard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instruction {
    #[serde(flatten)]
    pub kind: InstructionKind,
    /// Only execute while standing on a tile of this colour
    #[serde(default)]
    pub condition: Option<Color>,
}

impl Instruction {
    pub const fn new(kind: InstructionKind) -> Self {
        Self {
            kind,
            condition: None,
        }
    }

    pub const fn when(kind: InstructionKind, color: Color) -> Self {
        Self {
            kind,
            condition: Some(color),
        }
    }

    pub const fn forward() -> Self {
        Self::new(InstructionKind::Forward)
    }

    pub const fn turn_left() -> Self {
        Self::new(InstructionKind::TurnLeft)
    }

    pub const fn turn_right() -> Self {
        Self::new(InstructionKind::TurnRight)
    }

    pub const fn call(function: FunctionName) -> Self {
        Self::new(InstructionKind::Call { function })
    }

    pub const fn paint(color: Color) -> Self {
        Self::new(InstructionKind::Paint { color })
    }

    pub fn is_conditional(&self) -> bool {
        self.condition.is_some()
    }

    fn code(&self) -> String {
        match self.condition {
            Some(c) => format!("{}{}", c.code(), self.kind.code()),
            None => self.kind.code(),
        }
    }
}

/// Address of one slot in a program
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotId {
    pub function: FunctionName,
    pub index: usize,
}

impl SlotId {
    pub const fn new(function: FunctionName, index: usize) -> Self {
        Self { function, index }
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.function, self.index)
    }
}

type SlotMap = BTreeMap<FunctionName, Vec<Option<Instruction>>>;

/// Per-function slot lists. Slot counts are fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "SlotMap", into = "SlotMap")]
pub struct Program {
    functions: [Vec<Option<Instruction>>; 5],
}

impl Program {
    /// A program with every slot empty
    pub fn empty(lengths: &SlotsPerFunction) -> Self {
        Self {
            functions: FunctionName::ALL.map(|f| vec![None; lengths.get(f)]),
        }
    }

    /// Build a program from explicit slot lists; missing functions have no slots
    pub fn from_functions(
        functions: impl IntoIterator<Item = (FunctionName, Vec<Option<Instruction>>)>,
    ) -> Self {
        let mut program = Self {
            functions: Default::default(),
        };
        for (name, slots) in functions {
            program.functions[name.index()] = slots;
        }
        program
    }

    pub fn len(&self, function: FunctionName) -> usize {
        self.functions[function.index()].len()
    }

    pub fn slots(&self, function: FunctionName) -> &[Option<Instruction>] {
        &self.functions[function.index()]
    }

    pub fn get(&self, slot: SlotId) -> Option<&Instruction> {
        self.functions[slot.function.index()]
            .get(slot.index)
            .and_then(Option::as_ref)
    }

    /// Overwrite one slot. Returns `false` (and changes nothing) when the
    /// slot does not exist; slot lists never grow.
    pub fn set(&mut self, slot: SlotId, instruction: Option<Instruction>) -> bool {
        match self.functions[slot.function.index()].get_mut(slot.index) {
            Some(cell) => {
                *cell = instruction;
                true
            }
            None => false,
        }
    }

    /// Every slot id, function by function
    pub fn slot_ids(&self) -> impl Iterator<Item = SlotId> + '_ {
        FunctionName::ALL
            .into_iter()
            .flat_map(move |f| (0..self.len(f)).map(move |i| SlotId::new(f, i)))
    }

    /// Filled slots with their instructions
    pub fn instructions(&self) -> impl Iterator<Item = (SlotId, &Instruction)> + '_ {
        self.slot_ids()
            .filter_map(move |id| self.get(id).map(|ins| (id, ins)))
    }

    pub fn total_slots(&self) -> usize {
        self.functions.iter().map(Vec::len).sum()
    }

    /// Functions that have at least one slot
    pub fn active_functions(&self) -> Vec<FunctionName> {
        FunctionName::ALL
            .into_iter()
            .filter(|f| self.len(*f) > 0)
            .collect()
    }

    pub fn lengths(&self) -> SlotsPerFunction {
        SlotsPerFunction::from_fn(|f| self.len(f))
    }

    /// Compact string identifying the program structure, used for dedupe.
    /// Differs whenever any slot's kind, target, colour or condition differs.
    pub fn signature(&self) -> String {
        let mut out = String::new();
        for function in FunctionName::ALL {
            let slots = self.slots(function);
            if slots.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('|');
            }
            out.push_str(&function.to_string());
            out.push(':');
            let codes: Vec<String> = slots
                .iter()
                .map(|s| s.as_ref().map_or_else(|| "_".to_string(), Instruction::code))
                .collect();
            out.push_str(&codes.join(","));
        }
        out
    }

    /// Copy with every slot outside `keep` emptied
    pub fn pruned(&self, keep: &BTreeSet<SlotId>) -> Program {
        let mut pruned = self.clone();
        let ids: Vec<SlotId> = self.slot_ids().collect();
        for id in ids {
            if !keep.contains(&id) {
                pruned.set(id, None);
            }
        }
        pruned
    }
}

impl From<SlotMap> for Program {
    fn from(map: SlotMap) -> Self {
        Program::from_functions(map)
    }
}

impl From<Program> for SlotMap {
    fn from(program: Program) -> Self {
        FunctionName::ALL
            .into_iter()
            .zip(program.functions)
            .collect()
    }
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for function in self.active_functions() {
            write!(f, "{}:", function)?;
            for slot in self.slots(function) {
                match slot {
                    Some(ins) => write!(f, " {}", ins.code())?,
                    None => write!(f, " _")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
