//! The search driver: draw or repair a candidate program, run it on a fresh
//! world, and keep going until one passes every check or the budget runs out.

pub mod fresh;
pub mod repair;

use crate::config::SimulationConfig;
use crate::error::{ConfigError, ErrorKind};
use crate::evaluator::{assess, Metrics, Violation};
use crate::interpreter::{execute, RandomTiles, Run, RunOptions, DEFAULT_RECENT_FORWARD_WINDOW};
use crate::puzzle::{package, GenerationResult, Outcome};
use crate::{Direction, Grid, Pose, Position, Program, Tile};
use rand::prelude::*;
use repair::{Failure, RepairTable};
use std::cell::Cell;
use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Default wall-clock budget for one generation run
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of mutation tries per attempt before starting fresh
pub const DEFAULT_MUTATION_RETRIES: usize = 20;

/// Knobs for the search itself, separate from the difficulty contract
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Fixed seed; drawn from the OS when absent
    pub seed: Option<u64>,
    pub timeout: Option<Duration>,
    pub max_attempts: Option<usize>,
    pub max_mutation_retries: usize,
    pub recent_forward_window: usize,
    pub repair_table: RepairTable,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            seed: None,
            timeout: Some(DEFAULT_TIMEOUT),
            max_attempts: None,
            max_mutation_retries: DEFAULT_MUTATION_RETRIES,
            recent_forward_window: DEFAULT_RECENT_FORWARD_WINDOW,
            repair_table: RepairTable::default(),
        }
    }
}

impl SearchOptions {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<usize>) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// Source of elapsed time
pub trait Clock {
    /// Time since some fixed origin
    fn now(&self) -> Duration;
}

/// Wall-clock time since construction
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to, or by `tick` on every read
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Duration>,
    tick: Duration,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticking(tick: Duration) -> Self {
        Self {
            now: Cell::new(Duration::ZERO),
            tick,
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        let now = self.now.get();
        self.now.set(now + self.tick);
        now
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Duration {
        (**self).now()
    }
}

/// Snapshot handed to a [`ProgressSink`] after each rejected attempt
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    pub attempts: usize,
    pub kind: ErrorKind,
    pub elapsed: Duration,
    pub error_counts: &'a BTreeMap<ErrorKind, usize>,
}

/// Receives search progress; every method defaults to doing nothing
pub trait ProgressSink {
    fn attempt(&mut self, _progress: &Progress<'_>) {}

    fn restart(&mut self, _attempts: usize) {}

    fn finished(&mut self, _result: &GenerationResult) {}
}

impl ProgressSink for () {}

/// Logs a summary line every `every` attempts
#[derive(Debug, Clone, Copy)]
pub struct TracingProgress {
    every: usize,
}

impl TracingProgress {
    pub fn every(every: usize) -> Self {
        Self { every: every.max(1) }
    }
}

impl Default for TracingProgress {
    fn default() -> Self {
        Self::every(1000)
    }
}

impl ProgressSink for TracingProgress {
    fn attempt(&mut self, progress: &Progress<'_>) {
        if progress.attempts % self.every == 0 {
            let top = progress
                .error_counts
                .iter()
                .max_by_key(|(_, count)| **count)
                .map(|(kind, count)| format!("{kind}={count}"))
                .unwrap_or_default();
            info!(
                attempts = progress.attempts,
                elapsed_ms = progress.elapsed.as_millis() as u64,
                top_rejection = %top,
                "still searching"
            );
        }
    }

    fn restart(&mut self, attempts: usize) {
        debug!(attempts, "search restarted");
    }

    fn finished(&mut self, result: &GenerationResult) {
        info!(outcome = %result.outcome, attempts = result.attempts, "search finished");
    }
}

/// Per-run bookkeeping, cleared by [`Generator::reset`]
#[derive(Debug, Default)]
struct SearchState {
    attempts: usize,
    memo: HashSet<String>,
    error_counts: BTreeMap<ErrorKind, usize>,
    lineage: Option<Failure>,
    last_kind: Option<ErrorKind>,
    started: Duration,
}

/// Puzzle search over random and repaired programs
pub struct Generator<R = StdRng, C = SystemClock, P = ()> {
    config: SimulationConfig,
    options: SearchOptions,
    rng: R,
    clock: C,
    progress: P,
    seed: u64,
    state: SearchState,
}

impl Generator {
    /// Create a generator seeded from the OS
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        Self::with_options(config, SearchOptions::default())
    }

    /// Create a generator with a specific seed for reproducibility
    pub fn with_seed(config: SimulationConfig, seed: u64) -> Result<Self, ConfigError> {
        Self::with_options(config, SearchOptions::default().with_seed(seed))
    }

    pub fn with_options(config: SimulationConfig, options: SearchOptions) -> Result<Self, ConfigError> {
        let seed = options.seed.unwrap_or_else(random_seed);
        let rng = StdRng::seed_from_u64(seed);
        Generator::with_parts(config, options, rng, SystemClock::default(), (), seed)
    }
}

impl<R: Rng, C: Clock, P: ProgressSink> Generator<R, C, P> {
    /// Assemble a generator from explicit collaborators.
    ///
    /// `seed` is only reported back in results; `rng` must already be
    /// seeded with it for runs to be reproducible.
    pub fn with_parts(
        config: SimulationConfig,
        options: SearchOptions,
        rng: R,
        clock: C,
        progress: P,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let started = clock.now();
        Ok(Self {
            config,
            options,
            rng,
            clock,
            progress,
            seed,
            state: SearchState {
                started,
                ..SearchState::default()
            },
        })
    }

    /// Swap the progress sink
    pub fn with_progress<Q: ProgressSink>(self, progress: Q) -> Generator<R, C, Q> {
        Generator {
            config: self.config,
            options: self.options,
            rng: self.rng,
            clock: self.clock,
            progress,
            seed: self.seed,
            state: self.state,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn attempts(&self) -> usize {
        self.state.attempts
    }

    pub fn error_counts(&self) -> &BTreeMap<ErrorKind, usize> {
        &self.state.error_counts
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_sub(self.state.started)
    }

    /// Search until success or the budget runs out
    pub fn generate(&mut self) -> GenerationResult {
        self.reset();
        info!(
            seed = self.seed,
            grid_size = self.config.grid_size,
            total_slots = self.config.total_slots(),
            "starting puzzle search"
        );
        loop {
            if let Some(result) = self.step() {
                return result;
            }
        }
    }

    /// Forget all search state and restart the clock
    pub fn reset(&mut self) {
        self.state = SearchState {
            started: self.clock.now(),
            ..SearchState::default()
        };
    }

    /// Check the budget, then make one attempt.
    ///
    /// Returns the final result once the search is over. The budget is not
    /// checked before the first attempt.
    pub fn step(&mut self) -> Option<GenerationResult> {
        if self.state.attempts > 0 {
            if let Some(outcome) = self.budget_spent() {
                return Some(self.finish(outcome));
            }
        }
        self.iterate()
    }

    fn budget_spent(&self) -> Option<Outcome> {
        if self.options.max_attempts.is_some_and(|max| self.state.attempts >= max) {
            return Some(Outcome::Exhausted);
        }
        if self.options.timeout.is_some_and(|limit| self.elapsed() >= limit) {
            return Some(Outcome::Timeout);
        }
        None
    }

    /// End the search without a puzzle
    pub fn finish(&mut self, outcome: Outcome) -> GenerationResult {
        let result = GenerationResult::failure(
            outcome,
            self.state.attempts,
            self.state.last_kind,
            self.state.error_counts.clone(),
            self.seed,
            self.elapsed().as_millis() as u64,
        );
        info!(
            outcome = %outcome,
            attempts = result.attempts,
            last_error = ?result.error_type,
            "puzzle search gave up"
        );
        self.progress.finished(&result);
        result
    }

    fn iterate(&mut self) -> Option<GenerationResult> {
        self.state.attempts += 1;
        let attempts = self.state.attempts;
        let restart_every = self.config.auto_restart_after;
        if restart_every > 0 && attempts % restart_every == 0 {
            self.state.memo.clear();
            self.state.lineage = None;
            debug!(attempts, "auto-restart cleared signature memo");
            self.progress.restart(attempts);
        }

        let program = self.next_candidate();
        let (grid, start) = fresh_world(&self.config, &mut self.rng);
        let options =
            RunOptions::from_config(&self.config).with_recent_forward_window(self.options.recent_forward_window);
        let executed = {
            let mut tiles = RandomTiles::new(&mut self.rng, &self.config.color_ratios);
            execute(&program, grid, start, options, &mut tiles)
        };

        let failure = match executed {
            Ok(run) => match assess(&run, &program, &self.config) {
                Ok(metrics) => return Some(self.succeed(program, run, metrics)),
                Err(violation) => Failure {
                    program,
                    run: Some(run),
                    violation,
                },
            },
            Err(err) => {
                debug!(attempts, %err, "interpreter fault");
                Failure {
                    program,
                    run: None,
                    violation: Violation::other(),
                }
            }
        };
        self.reject(failure);
        None
    }

    fn reject(&mut self, failure: Failure) {
        let kind = failure.kind();
        trace!(attempt = self.state.attempts, %kind, violation = %failure.violation, "candidate rejected");
        *self.state.error_counts.entry(kind).or_default() += 1;
        self.state.last_kind = Some(kind);
        self.state.lineage = Some(failure);

        let elapsed = self.elapsed();
        self.progress.attempt(&Progress {
            attempts: self.state.attempts,
            kind,
            elapsed,
            error_counts: &self.state.error_counts,
        });
    }

    fn succeed(&mut self, program: Program, run: Run, metrics: Metrics) -> GenerationResult {
        let (puzzle, solution) = package(&program, &run);
        let result = GenerationResult::solved(
            puzzle,
            solution,
            metrics,
            self.state.attempts,
            self.state.error_counts.clone(),
            self.seed,
            self.elapsed().as_millis() as u64,
        );
        info!(
            attempts = result.attempts,
            elapsed_ms = result.elapsed_ms,
            stars = result.puzzle.as_ref().map_or(0, |p| p.grid.star_count()),
            "puzzle found"
        );
        self.progress.finished(&result);
        result
    }

    /// Mutate the last failure into an unseen program, falling back to a
    /// fresh one when the retries are spent
    fn next_candidate(&mut self) -> Program {
        if let Some(failure) = self.state.lineage.take() {
            for _ in 0..self.options.max_mutation_retries {
                let Some(program) =
                    repair::mutate(&failure, &self.config, &self.options.repair_table, &mut self.rng)
                else {
                    break;
                };
                if self.state.memo.insert(program.signature()) {
                    return program;
                }
            }
            debug!(attempts = self.state.attempts, "no new mutation; dropping lineage");
        }

        let mut program = fresh::generate(&self.config, &mut self.rng);
        let mut retries = 0;
        while !self.state.memo.insert(program.signature()) && retries < self.options.max_mutation_retries {
            program = fresh::generate(&self.config, &mut self.rng);
            retries += 1;
        }
        program
    }
}

/// An empty board with a single coloured start tile in the centre
pub fn fresh_world<R: Rng + ?Sized>(config: &SimulationConfig, rng: &mut R) -> (Grid, Pose) {
    let mut grid = Grid::square(config.grid_size);
    let centre = config.grid_size / 2;
    let direction = Direction::ALL[rng.gen_range(0..Direction::ALL.len())];
    let start = Pose::new(Position::new(centre, centre), direction);
    let color = RandomTiles::new(rng, &config.color_ratios).color();
    grid.set(start.position, Tile::colored(color));
    (grid, start)
}

/// Seed from the OS, falling back to a process-wide counter
fn random_seed() -> u64 {
    let mut seed_bytes = [0u8; 8];
    getrandom::getrandom(&mut seed_bytes).unwrap_or_else(|_| {
        static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);
        let counter = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        seed_bytes = counter.to_le_bytes();
    });
    u64::from_le_bytes(seed_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SlotsPerFunction;
    use crate::puzzle::verify_solution;

    fn lenient() -> SimulationConfig {
        SimulationConfig {
            slots_per_function: SlotsPerFunction {
                f1: 5,
                f2: 3,
                ..SlotsPerFunction::default()
            },
            grid_size: 16,
            max_steps: 50,
            min_coverage_percent: 0.0,
            min_tiles: 0,
            min_bounding_box: 0,
            min_turns: 0,
            max_dense_tiles: usize::MAX,
            max_avg_executions_per_slot: f64::MAX,
            min_stack_depth: 0,
            min_self_calls: 0,
            min_path_trace_ratio: 0.0,
            disable_loop_check: true,
            min_path_length: 0,
            min_conditionals: 0,
            min_paint_revisits: 0,
            max_unnecessary_paints: -1,
            ..SimulationConfig::medium()
        }
    }

    fn impossible() -> SimulationConfig {
        SimulationConfig {
            grid_size: 4,
            min_tiles: 10_000,
            ..lenient()
        }
    }

    fn bounded(attempts: usize) -> SearchOptions {
        SearchOptions::default()
            .with_timeout(None)
            .with_max_attempts(Some(attempts))
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = SimulationConfig {
            slots_per_function: SlotsPerFunction::default(),
            ..lenient()
        };
        assert!(matches!(Generator::with_seed(config, 1), Err(ConfigError::NoEntrySlots)));
    }

    #[test]
    fn test_fresh_world_starts_in_centre() {
        let mut rng = StdRng::seed_from_u64(9);
        let (grid, start) = fresh_world(&lenient(), &mut rng);
        assert_eq!(start.position, Position::new(8, 8));
        assert_eq!(grid.tile_count(), 1);
        assert!(grid.get(start.position).and_then(|t| t.color).is_some());
    }

    #[test]
    fn test_lenient_search_succeeds_and_verifies() {
        let config = lenient();
        let mut generator = Generator::with_options(config.clone(), bounded(2_000).with_seed(3)).unwrap();
        let result = generator.generate();

        assert!(result.success, "search failed: {:?}", result.error_counts);
        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.seed, 3);
        assert_eq!(result.rejections() + 1, result.attempts);

        let puzzle = result.puzzle.as_ref().unwrap();
        let solution = result.solution.as_ref().unwrap();
        assert!(puzzle.grid.star_count() >= 1);
        assert!(puzzle.grid.can_start(puzzle.robot_start));
        assert_eq!(puzzle.function_lengths, config.slots_per_function);
        assert!(verify_solution(puzzle, solution, &config).is_ok());
    }

    #[test]
    fn test_same_seed_same_search() {
        let run = || {
            let mut generator = Generator::with_options(impossible(), bounded(40).with_seed(11)).unwrap();
            generator.generate()
        };
        let (a, b) = (run(), run());
        assert_eq!(a.attempts, b.attempts);
        assert_eq!(a.error_counts, b.error_counts);
        assert_eq!(a.error_type, b.error_type);
    }

    #[test]
    fn test_exhausted_counts_every_rejection() {
        let mut generator = Generator::with_options(impossible(), bounded(30).with_seed(5)).unwrap();
        let result = generator.generate();

        assert!(!result.success);
        assert_eq!(result.outcome, Outcome::Exhausted);
        assert_eq!(result.attempts, 30);
        assert_eq!(result.rejections(), 30);
        assert!(result.error_type.is_some());
        assert!(result.puzzle.is_none());
    }

    #[test]
    fn test_timeout_on_manual_clock() {
        let options = SearchOptions::default()
            .with_seed(2)
            .with_timeout(Some(Duration::from_secs(1)));
        let clock = ManualClock::ticking(Duration::from_millis(100));
        let rng = StdRng::seed_from_u64(2);
        let mut generator = Generator::with_parts(impossible(), options, rng, &clock, (), 2).unwrap();
        let result = generator.generate();

        assert_eq!(result.outcome, Outcome::Timeout);
        assert!(result.attempts >= 1);
        assert!(result.attempts < 20);
        assert!(result.elapsed_ms >= 1000);
    }

    #[derive(Default)]
    struct Recorder {
        attempts: Vec<usize>,
        restarts: Vec<usize>,
        finished: Option<Outcome>,
    }

    impl ProgressSink for &mut Recorder {
        fn attempt(&mut self, progress: &Progress<'_>) {
            self.attempts.push(progress.attempts);
        }

        fn restart(&mut self, attempts: usize) {
            self.restarts.push(attempts);
        }

        fn finished(&mut self, result: &GenerationResult) {
            self.finished = Some(result.outcome);
        }
    }

    #[test]
    fn test_progress_sees_attempts_and_restarts() {
        let config = SimulationConfig {
            auto_restart_after: 4,
            ..impossible()
        };
        let mut recorder = Recorder::default();
        {
            let mut generator = Generator::with_options(config, bounded(10).with_seed(8))
                .unwrap()
                .with_progress(&mut recorder);
            generator.generate();
        }
        assert_eq!(recorder.attempts, (1..=10).collect::<Vec<_>>());
        assert_eq!(recorder.restarts, vec![4, 8]);
        assert_eq!(recorder.finished, Some(Outcome::Exhausted));
    }

    #[test]
    fn test_step_drives_search_incrementally() {
        let mut generator = Generator::with_options(impossible(), bounded(3).with_seed(4)).unwrap();
        generator.reset();
        assert!(generator.step().is_none());
        assert!(generator.step().is_none());
        assert!(generator.step().is_none());
        assert_eq!(generator.attempts(), 3);
        let result = generator.step().unwrap();
        assert_eq!(result.outcome, Outcome::Exhausted);
    }
}
