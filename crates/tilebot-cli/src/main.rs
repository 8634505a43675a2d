//! tilebot - generate, verify and replay robot-programming puzzles

mod render;
mod store;
mod theme;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::BTreeSet;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use store::{LocalPuzzleStore, PuzzleRecord, PuzzleStore};
use theme::Theme;
use tilebot_core::generator::{SearchOptions, TracingProgress};
use tilebot_core::{
    verify_solution, GenerationResult, Generator, PlayStatus, Playback, Program, Puzzle, SimulationConfig,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tilebot")]
#[command(about = "Generate and replay tile-walking robot puzzles", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Puzzle library file (defaults to the user data directory)
    #[arg(long, env = "TILEBOT_LIBRARY", global = true)]
    library: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for a new puzzle
    Generate(GenerateArgs),

    /// Check a solution against a puzzle
    Verify {
        #[command(flatten)]
        source: Source,

        /// Player program JSON; defaults to the stored solution
        #[arg(long)]
        solution: Option<PathBuf>,

        #[command(flatten)]
        difficulty: Difficulty,
    },

    /// Step through a program on a puzzle
    Replay {
        #[command(flatten)]
        source: Source,

        /// Player program JSON; defaults to the stored solution
        #[arg(long)]
        solution: Option<PathBuf>,

        /// Step budget
        #[arg(long, default_value_t = 1000)]
        max_steps: usize,

        /// Delay between frames; 0 prints only the final board
        #[arg(long, default_value_t = 150)]
        delay_ms: u64,

        /// Colour theme (dark, light)
        #[arg(long, default_value = "dark")]
        theme: String,
    },

    /// Show saved puzzles
    List,

    /// Delete a saved puzzle
    Remove { id: u64 },
}

#[derive(Args)]
struct GenerateArgs {
    #[command(flatten)]
    difficulty: Difficulty,

    /// RNG seed for a reproducible search
    #[arg(long)]
    seed: Option<u64>,

    /// Wall-clock budget; 0 disables it
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,

    /// Attempt budget
    #[arg(long)]
    max_attempts: Option<usize>,

    /// Log progress every N attempts
    #[arg(long, default_value_t = 1000)]
    progress_every: usize,

    /// Write the full result as JSON to this file
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Print the result as JSON instead of a board
    #[arg(long)]
    json: bool,

    /// Save a found puzzle to the library under this label
    #[arg(long)]
    save: Option<String>,
}

#[derive(Args)]
struct Difficulty {
    /// Difficulty preset
    #[arg(long, value_enum, default_value_t = Preset::Medium)]
    preset: Preset,

    /// SimulationConfig JSON file; overrides --preset
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Source {
    /// Result JSON written by `generate --out`
    #[arg(long)]
    file: Option<PathBuf>,

    /// Library id
    #[arg(long)]
    id: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    Easy,
    Medium,
    Hard,
}

impl Preset {
    fn config(self) -> SimulationConfig {
        match self {
            Preset::Easy => SimulationConfig::easy(),
            Preset::Medium => SimulationConfig::medium(),
            Preset::Hard => SimulationConfig::hard(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr).without_time())
        .init();

    let store = match &cli.library {
        Some(path) => LocalPuzzleStore::at(path),
        None => LocalPuzzleStore::new(),
    };

    match cli.command {
        Commands::Generate(args) => generate(args, &store),
        Commands::Verify {
            source,
            solution,
            difficulty,
        } => {
            let loaded = load_source(&source, &store)?;
            let config = match (&difficulty.config, loaded.config) {
                (None, Some(stored)) => stored,
                _ => load_config(&difficulty)?,
            };
            let program = pick_solution(solution.as_deref(), loaded.solution)?;
            match verify_solution(&loaded.puzzle, &program, &config) {
                Ok((run, metrics)) => {
                    println!("✓ solution passes");
                    println!("  steps: {}  tiles: {}  turns: {}", metrics.steps, metrics.tiles, metrics.turns);
                    println!("  executed slots: {}", run.trace.executed_slots().len());
                    Ok(())
                }
                Err(e) => bail!("solution fails: {e}"),
            }
        }
        Commands::Replay {
            source,
            solution,
            max_steps,
            delay_ms,
            theme,
        } => {
            let loaded = load_source(&source, &store)?;
            let program = pick_solution(solution.as_deref(), loaded.solution)?;
            let theme = Theme::by_name(&theme).ok_or_else(|| anyhow!("unknown theme {theme:?}"))?;
            replay(&loaded.puzzle, &program, max_steps, delay_ms, &theme)
        }
        Commands::List => {
            let records = store.list()?;
            if records.is_empty() {
                println!("No saved puzzles in {}", store.path().display());
            }
            for r in records {
                println!(
                    "{:>4}  {:<16} stars {:>2}  seed {:<20}  {} attempts",
                    r.id,
                    r.label,
                    r.stars(),
                    r.seed,
                    r.attempts
                );
            }
            Ok(())
        }
        Commands::Remove { id } => {
            if store.remove(id)? {
                println!("Removed puzzle {id}");
                Ok(())
            } else {
                bail!("no puzzle with id {id}")
            }
        }
    }
}

fn load_config(difficulty: &Difficulty) -> Result<SimulationConfig> {
    let config = match &difficulty.config {
        Some(path) => read_json(path)?,
        None => difficulty.preset.config(),
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn generate(args: GenerateArgs, store: &dyn PuzzleStore) -> Result<()> {
    let config = load_config(&args.difficulty)?;
    let mut options = SearchOptions::default()
        .with_timeout((args.timeout_ms > 0).then(|| Duration::from_millis(args.timeout_ms)))
        .with_max_attempts(args.max_attempts);
    options.seed = args.seed;
    if options.timeout.is_none() && options.max_attempts.is_none() {
        bail!("refusing to search without a time or attempt budget");
    }

    let mut generator =
        Generator::with_options(config.clone(), options)?.with_progress(TracingProgress::every(args.progress_every));
    let result = generator.generate();

    if let Some(path) = &args.out {
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    if !result.success {
        bail!("no puzzle found ({}) after {} attempts", result.outcome, result.attempts);
    }
    if let Some(label) = &args.save {
        let record = PuzzleRecord::from_result(label, &config, &result)
            .ok_or_else(|| anyhow!("result has no puzzle to save"))?;
        let id = store.save(record)?;
        println!("Saved as #{id} ({})", store.backend_name());
    }
    Ok(())
}

fn print_result(result: &GenerationResult) {
    let (Some(puzzle), Some(solution)) = (&result.puzzle, &result.solution) else {
        println!("✗ {} after {} attempts (seed {})", result.outcome, result.attempts, result.seed);
        for (kind, count) in &result.error_counts {
            println!("  {:<18} {}", kind, count);
        }
        return;
    };

    let stars: BTreeSet<_> = puzzle.grid.stars().into_iter().collect();
    let frame = render::frame(&puzzle.grid, &stars, Some(puzzle.robot_start));
    println!("{}", render::plain(&frame));
    println!("Solution:");
    print!("{solution}");
    println!(
        "\nFound after {} attempts in {} ms (seed {})",
        result.attempts, result.elapsed_ms, result.seed
    );
}

/// Puzzle plus whatever came stored with it
struct Loaded {
    puzzle: Puzzle,
    solution: Option<Program>,
    config: Option<SimulationConfig>,
}

fn load_source(source: &Source, store: &dyn PuzzleStore) -> Result<Loaded> {
    if let Some(id) = source.id {
        let record = store.load(id)?.ok_or_else(|| anyhow!("no puzzle with id {id}"))?;
        return Ok(Loaded {
            puzzle: record.puzzle,
            solution: Some(record.solution),
            config: Some(record.config),
        });
    }
    let path = source.file.as_deref().ok_or_else(|| anyhow!("give --file or --id"))?;
    let result: GenerationResult = read_json(path)?;
    let puzzle = result
        .puzzle
        .ok_or_else(|| anyhow!("{} holds a failed search ({})", path.display(), result.outcome))?;
    Ok(Loaded {
        puzzle,
        solution: result.solution,
        config: None,
    })
}

fn pick_solution(path: Option<&Path>, stored: Option<Program>) -> Result<Program> {
    match path {
        Some(path) => read_json(path),
        None => stored.ok_or_else(|| anyhow!("no stored solution; pass --solution")),
    }
}

fn replay(puzzle: &Puzzle, program: &Program, max_steps: usize, delay_ms: u64, theme: &Theme) -> Result<()> {
    let mut playback = Playback::new(puzzle, program, max_steps)?;
    let mut stdout = io::stdout();
    let animate = delay_ms > 0 && stdout.is_terminal();

    let show = |out: &mut io::Stdout, playback: &Playback<'_>| -> Result<()> {
        let frame = render::frame(playback.grid(), playback.stars_remaining(), Some(playback.pose()));
        if animate {
            render::clear(out)?;
            render::draw(out, &frame, theme)?;
        } else {
            write!(out, "{}", render::plain(&frame))?;
        }
        writeln!(
            out,
            "step {:>4}  stars left {}  next {}",
            playback.steps(),
            playback.stars_remaining().len(),
            playback.next_slot().map_or_else(|| "-".to_string(), |s| s.to_string())
        )?;
        out.flush()?;
        Ok(())
    };

    while !playback.step().is_over() {
        if animate {
            show(&mut stdout, &playback)?;
            std::thread::sleep(Duration::from_millis(delay_ms));
        }
    }
    show(&mut stdout, &playback)?;

    match playback.status() {
        PlayStatus::Won => {
            println!("✓ all stars collected in {} steps", playback.steps());
            Ok(())
        }
        PlayStatus::Fell(pos) => bail!("robot fell off the tiles at {pos}"),
        PlayStatus::OutOfBounds => bail!("robot walked off the board"),
        PlayStatus::Looped => bail!("robot is going in circles"),
        PlayStatus::OutOfSteps | PlayStatus::Running => {
            bail!("{} stars left after {} steps", playback.stars_remaining().len(), playback.steps())
        }
    }
}
