//! Stack-based program interpreter over a lazily grown grid.
//!
//! [`Machine::step`] is the only place instruction semantics live. Batch
//! execution ([`execute`]), puzzle verification and interactive playback all
//! drive the same step function.

use crate::config::{ColorRatios, SimulationConfig};
use crate::error::ExecError;
use crate::{Color, Direction, FunctionName, Grid, Instruction, InstructionKind, Pose, Position, Program, SlotId, Tile};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// Hard cap on loop iterations (skips included) as a multiple of `max_steps`
pub const ITERATION_CAP_FACTOR: usize = 100;

/// Default size of the recent-forward window reported on boundary hits
pub const DEFAULT_RECENT_FORWARD_WINDOW: usize = 5;

/// Decides what appears when the robot first enters a void cell
pub trait TileSource {
    /// Tile to place at `pos`, or `None` to refuse the move
    fn place(&mut self, pos: Position) -> Option<Tile>;
}

/// Places tiles with a colour drawn from the configured ratios
pub struct RandomTiles<'r, R: ?Sized> {
    rng: &'r mut R,
    weights: Option<WeightedIndex<f64>>,
}

impl<'r, R: Rng + ?Sized> RandomTiles<'r, R> {
    pub fn new(rng: &'r mut R, ratios: &ColorRatios) -> Self {
        let weights = WeightedIndex::new(Color::ALL.map(|c| ratios.get(c))).ok();
        Self { rng, weights }
    }

    pub fn color(&mut self) -> Color {
        match &self.weights {
            Some(weights) => Color::ALL[weights.sample(&mut *self.rng)],
            None => Color::ALL[self.rng.gen_range(0..Color::ALL.len())],
        }
    }
}

impl<R: Rng + ?Sized> TileSource for RandomTiles<'_, R> {
    fn place(&mut self, _pos: Position) -> Option<Tile> {
        Some(Tile::colored(self.color()))
    }
}

/// Places uncoloured tiles; deterministic
pub struct BlankTiles;

impl TileSource for BlankTiles {
    fn place(&mut self, _pos: Position) -> Option<Tile> {
        Some(Tile::default())
    }
}

/// Refuses every placement; for grids that are already complete
pub struct NoTiles;

impl TileSource for NoTiles {
    fn place(&mut self, _pos: Position) -> Option<Tile> {
        None
    }
}

/// Early-exit thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarlyExit {
    pub min_coverage_percent: f64,
    pub min_average_executions: f64,
}

/// Per-run interpreter settings
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub max_steps: usize,
    pub loop_check: bool,
    pub early_exit: Option<EarlyExit>,
    /// Paint slots that execute without changing the tile
    pub suppressed_paints: BTreeSet<SlotId>,
    pub recent_forward_window: usize,
}

impl RunOptions {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            loop_check: !config.disable_loop_check,
            early_exit: Some(EarlyExit {
                min_coverage_percent: config.min_coverage_percent,
                min_average_executions: config.max_avg_executions_per_slot,
            }),
            suppressed_paints: BTreeSet::new(),
            recent_forward_window: DEFAULT_RECENT_FORWARD_WINDOW,
        }
    }

    pub fn with_recent_forward_window(mut self, window: usize) -> Self {
        self.recent_forward_window = window;
        self
    }

    pub fn suppressing(mut self, slot: SlotId) -> Self {
        self.suppressed_paints.insert(slot);
        self
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Coverage and execution-average thresholds were reached
    Success,
    /// Step budget or iteration cap used up
    BudgetExhausted,
    /// A forward would have left the grid
    Boundary {
        slot: SlotId,
        /// Forward slots executed just before the offending one, oldest first
        recent_forwards: Vec<SlotId>,
    },
    /// The robot came back to its exact start pose
    Loop { slot: SlotId },
}

impl Termination {
    /// Whether the run may go on to constraint evaluation
    pub fn is_evaluable(&self) -> bool {
        matches!(self, Termination::Success | Termination::BudgetExhausted)
    }
}

/// Result of a single [`Machine::step`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Nothing executed: empty slot, unmet condition or a frame returned
    Skipped,
    Executed { slot: SlotId, instruction: Instruction },
    Halted(Termination),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFrame {
    pub function: FunctionName,
    pub ip: usize,
}

impl CallFrame {
    fn new(function: FunctionName) -> Self {
        Self { function, ip: 0 }
    }
}

/// A tile colour change made by a paint instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaintEvent {
    pub slot: SlotId,
    pub position: Position,
    pub color: Color,
}

/// Everything observed during a run
#[derive(Debug, Clone)]
pub struct Trace {
    /// Start position followed by the position after every forward
    pub path: Vec<Position>,
    /// Tiles where the robot left at a right angle to how it arrived
    pub turn_positions: Vec<Position>,
    /// Execution count per executed slot
    pub executions: BTreeMap<SlotId, usize>,
    pub conditional_slots: BTreeSet<SlotId>,
    pub self_call_slots: BTreeSet<SlotId>,
    pub paint_slots: BTreeSet<SlotId>,
    pub paints: Vec<PaintEvent>,
    pub paint_revisits: usize,
    pub max_stack_depth: usize,
    pub steps: usize,
    pub recent_forwards: VecDeque<SlotId>,
    pub final_pose: Pose,
}

impl Trace {
    fn new(start: Pose) -> Self {
        Self {
            path: vec![start.position],
            turn_positions: Vec::new(),
            executions: BTreeMap::new(),
            conditional_slots: BTreeSet::new(),
            self_call_slots: BTreeSet::new(),
            paint_slots: BTreeSet::new(),
            paints: Vec::new(),
            paint_revisits: 0,
            max_stack_depth: 1,
            steps: 0,
            recent_forwards: VecDeque::new(),
            final_pose: start,
        }
    }

    pub fn executed_slots(&self) -> BTreeSet<SlotId> {
        self.executions.keys().copied().collect()
    }

    pub fn was_executed(&self, slot: SlotId) -> bool {
        self.executions.contains_key(&slot)
    }

    /// Share of all slots that ran at least once, 0..=100
    pub fn coverage_percent(&self, total_slots: usize) -> f64 {
        if total_slots == 0 {
            return 0.0;
        }
        self.executions.len() as f64 * 100.0 / total_slots as f64
    }

    pub fn path_length(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    /// Distinct positions the robot stood on
    pub fn visited(&self) -> BTreeSet<Position> {
        self.path.iter().copied().collect()
    }
}

/// A finished run
#[derive(Debug, Clone)]
pub struct Run {
    pub termination: Termination,
    pub trace: Trace,
    /// Grid after the run, paints applied
    pub grid: Grid,
    /// Grid after the run with every tile in its placed colour
    pub original: Grid,
    pub start: Pose,
    pub total_slots: usize,
}

/// Interpreter state for one program on one world
pub struct Machine<'p> {
    program: &'p Program,
    grid: Grid,
    original: Grid,
    start: Pose,
    pose: Pose,
    stack: Vec<CallFrame>,
    options: RunOptions,
    trace: Trace,
    iterations: usize,
    total_slots: usize,
    entered_with: Option<Direction>,
    painted: HashMap<Position, Color>,
    left_painted: HashSet<Position>,
    halted: Option<Termination>,
}

impl<'p> Machine<'p> {
    pub fn new(program: &'p Program, grid: Grid, start: Pose, options: RunOptions) -> Result<Self, ExecError> {
        if !grid.can_start(start) {
            return Err(ExecError::StartOnVoid(start.position));
        }
        if program.len(FunctionName::F1) == 0 {
            return Err(ExecError::EmptyEntry(FunctionName::F1));
        }
        Ok(Self {
            program,
            original: grid.clone(),
            grid,
            start,
            pose: start,
            stack: vec![CallFrame::new(FunctionName::F1)],
            options,
            trace: Trace::new(start),
            iterations: 0,
            total_slots: program.total_slots(),
            entered_with: None,
            painted: HashMap::new(),
            left_painted: HashSet::new(),
            halted: None,
        })
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn start(&self) -> Pose {
        self.start
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn stack(&self) -> &[CallFrame] {
        &self.stack
    }

    pub fn termination(&self) -> Option<&Termination> {
        self.halted.as_ref()
    }

    /// Slot the next step will fetch, if the current frame has one left
    pub fn next_slot(&self) -> Option<SlotId> {
        self.stack
            .iter()
            .rev()
            .find(|f| f.ip < self.program.len(f.function))
            .map(|f| SlotId::new(f.function, f.ip))
    }

    pub fn into_run(self) -> Run {
        Run {
            termination: self.halted.unwrap_or(Termination::BudgetExhausted),
            trace: self.trace,
            grid: self.grid,
            original: self.original,
            start: self.start,
            total_slots: self.total_slots,
        }
    }

    fn halt(&mut self, termination: Termination) -> Step {
        self.trace.final_pose = self.pose;
        self.halted = Some(termination.clone());
        Step::Halted(termination)
    }

    /// Fetch and run one slot
    pub fn step<S: TileSource + ?Sized>(&mut self, tiles: &mut S) -> Result<Step, ExecError> {
        if let Some(termination) = &self.halted {
            return Ok(Step::Halted(termination.clone()));
        }

        self.iterations += 1;
        if self.iterations > self.options.max_steps.saturating_mul(ITERATION_CAP_FACTOR) {
            return Ok(self.halt(Termination::BudgetExhausted));
        }

        // The root function loops forever
        if self.stack.is_empty() {
            self.stack.push(CallFrame::new(FunctionName::F1));
        }
        while let Some(frame) = self.stack.last() {
            if frame.ip >= self.program.len(frame.function) {
                self.stack.pop();
            } else {
                break;
            }
        }
        let Some(frame) = self.stack.last_mut() else {
            return Ok(Step::Skipped);
        };

        let slot = SlotId::new(frame.function, frame.ip);
        frame.ip += 1;

        let Some(instruction) = self.program.get(slot).copied() else {
            return Ok(Step::Skipped);
        };
        let here = self.pose.position;
        if let Some(condition) = instruction.condition {
            if self.grid.get(here).and_then(|t| t.color) != Some(condition) {
                return Ok(Step::Skipped);
            }
        }

        *self.trace.executions.entry(slot).or_default() += 1;
        self.trace.steps += 1;
        if let Some(condition) = instruction.condition {
            self.trace.conditional_slots.insert(slot);
            if self.left_painted.contains(&here) && self.painted.get(&here) == Some(&condition) {
                self.trace.paint_revisits += 1;
            }
        }

        let terminal = match instruction.kind {
            InstructionKind::Forward => self.forward(slot, tiles)?,
            InstructionKind::TurnLeft => {
                self.pose.direction = self.pose.direction.turn_left();
                self.check_loop(slot)
            }
            InstructionKind::TurnRight => {
                self.pose.direction = self.pose.direction.turn_right();
                self.check_loop(slot)
            }
            InstructionKind::Call { function } => {
                self.stack.push(CallFrame::new(function));
                self.trace.max_stack_depth = self.trace.max_stack_depth.max(self.stack.len());
                if function == slot.function {
                    self.trace.self_call_slots.insert(slot);
                }
                None
            }
            InstructionKind::Paint { color } => {
                self.paint(slot, color);
                None
            }
            InstructionKind::Noop => None,
        };
        self.trace.final_pose = self.pose;

        if let Some(termination) = terminal {
            return Ok(self.halt(termination));
        }
        if self.early_exit_reached() {
            return Ok(self.halt(Termination::Success));
        }
        if self.trace.steps >= self.options.max_steps {
            return Ok(self.halt(Termination::BudgetExhausted));
        }
        Ok(Step::Executed { slot, instruction })
    }

    fn forward<S: TileSource + ?Sized>(&mut self, slot: SlotId, tiles: &mut S) -> Result<Option<Termination>, ExecError> {
        let here = self.pose.position;
        let Some(next) = here.step(self.pose.direction, self.grid.width(), self.grid.height()) else {
            return Ok(Some(Termination::Boundary {
                slot,
                recent_forwards: self.trace.recent_forwards.iter().copied().collect(),
            }));
        };

        self.trace.recent_forwards.push_back(slot);
        while self.trace.recent_forwards.len() > self.options.recent_forward_window {
            self.trace.recent_forwards.pop_front();
        }

        if self.grid.is_void(next) {
            let tile = tiles.place(next).ok_or(ExecError::Fell(next))?;
            self.grid.set(next, tile);
            self.original.set(next, tile);
        }

        if let Some(entered) = self.entered_with {
            if entered.turn_distance(self.pose.direction) == 1 {
                self.trace.turn_positions.push(here);
            }
        }
        if self.painted.contains_key(&here) {
            self.left_painted.insert(here);
        }

        self.pose.position = next;
        self.entered_with = Some(self.pose.direction);
        self.trace.path.push(next);
        Ok(self.check_loop(slot))
    }

    fn paint(&mut self, slot: SlotId, color: Color) {
        self.trace.paint_slots.insert(slot);
        if self.options.suppressed_paints.contains(&slot) {
            return;
        }
        let here = self.pose.position;
        if let Some(tile) = self.grid.get_mut(here) {
            if tile.color != Some(color) {
                tile.color = Some(color);
                self.trace.paints.push(PaintEvent {
                    slot,
                    position: here,
                    color,
                });
                self.painted.insert(here, color);
                self.left_painted.remove(&here);
            }
        }
    }

    fn check_loop(&self, slot: SlotId) -> Option<Termination> {
        (self.options.loop_check && self.trace.steps > 1 && self.pose == self.start)
            .then_some(Termination::Loop { slot })
    }

    fn early_exit_reached(&self) -> bool {
        let Some(exit) = self.options.early_exit else {
            return false;
        };
        if self.total_slots == 0 {
            return false;
        }
        let average = self.trace.steps as f64 / self.total_slots as f64;
        self.trace.coverage_percent(self.total_slots) >= exit.min_coverage_percent
            && average >= exit.min_average_executions
    }
}

/// Run `program` from `start` until it terminates
pub fn execute<S: TileSource + ?Sized>(
    program: &Program,
    grid: Grid,
    start: Pose,
    options: RunOptions,
    tiles: &mut S,
) -> Result<Run, ExecError> {
    let mut machine = Machine::new(program, grid, start, options)?;
    while !matches!(machine.step(tiles)?, Step::Halted(_)) {}
    Ok(machine.into_run())
}
