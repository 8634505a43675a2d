//! Post-run property checks.
//!
//! Checks run in a fixed order and the first failure wins; the failing
//! [`ErrorKind`] picks the repair strategy in the generator.

use crate::config::SimulationConfig;
use crate::error::ErrorKind;
use crate::interpreter::{execute, BlankTiles, Run, RunOptions, Termination};
use crate::{Position, Program, SlotId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Measured properties of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub coverage_percent: f64,
    pub tiles: usize,
    pub bounding_width: usize,
    pub bounding_height: usize,
    pub turns: usize,
    pub dense_tiles: usize,
    pub max_stack_depth: usize,
    pub self_calls: usize,
    pub path_length: usize,
    pub path_trace_instructions: usize,
    pub conditionals: usize,
    pub paint_revisits: usize,
    pub paints: usize,
    /// Filled in only when the necessity check ran
    pub unnecessary_paints: Option<usize>,
    pub steps: usize,
}

impl Metrics {
    pub fn bounding_box(&self) -> usize {
        self.bounding_width.max(self.bounding_height)
    }
}

/// A failed check
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub kind: ErrorKind,
    pub actual: f64,
    pub required: f64,
    /// Slots the failure points at (boundary culprit, unnecessary paints)
    pub slots: Vec<SlotId>,
}

impl Violation {
    pub fn new(kind: ErrorKind, actual: impl Into<f64>, required: impl Into<f64>) -> Self {
        Self {
            kind,
            actual: actual.into(),
            required: required.into(),
            slots: Vec::new(),
        }
    }

    pub fn with_slots(mut self, slots: Vec<SlotId>) -> Self {
        self.slots = slots;
        self
    }

    /// Failure of a fault that never produced a trace
    pub fn other() -> Self {
        Self::new(ErrorKind::Other, 0.0, 0.0)
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (got {}, need {})", self.kind, self.actual, self.required)
    }
}

fn count(n: usize) -> f64 {
    n as f64
}

/// Smallest rectangle holding every position, as (width, height)
pub fn bounding_box(positions: &BTreeSet<Position>) -> (usize, usize) {
    let mut iter = positions.iter();
    let Some(first) = iter.next() else {
        return (0, 0);
    };
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
    for p in iter {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    (max_x - min_x + 1, max_y - min_y + 1)
}

/// Tiles with at least three of their four orthogonal neighbours present
pub fn dense_tiles(positions: &BTreeSet<Position>) -> usize {
    positions
        .iter()
        .filter(|p| {
            p.neighbors(usize::MAX, usize::MAX)
                .filter(|n| positions.contains(n))
                .count()
                >= 3
        })
        .count()
}

/// Naive instruction count to retrace the path: turns to face each edge
/// plus the forward itself
pub fn path_trace_instructions(run: &Run) -> usize {
    let mut facing = run.start.direction;
    let mut total = 0;
    for edge in run.trace.path.windows(2) {
        if let Some(direction) = edge[0].direction_to(edge[1]) {
            total += facing.turn_distance(direction) + 1;
            facing = direction;
        }
    }
    total
}

/// Measure everything except paint necessity
pub fn measure(run: &Run) -> Metrics {
    let trace = &run.trace;
    let visited = trace.visited();
    let (bounding_width, bounding_height) = bounding_box(&visited);
    Metrics {
        coverage_percent: trace.coverage_percent(run.total_slots),
        tiles: visited.len(),
        bounding_width,
        bounding_height,
        turns: trace.turn_positions.len(),
        dense_tiles: dense_tiles(&visited),
        max_stack_depth: trace.max_stack_depth,
        self_calls: trace.self_call_slots.len(),
        path_length: trace.path_length(),
        path_trace_instructions: path_trace_instructions(run),
        conditionals: trace.conditional_slots.len(),
        paint_revisits: trace.paint_revisits,
        paints: trace.paint_slots.len(),
        unnecessary_paints: None,
        steps: trace.steps,
    }
}

/// Classify a run's termination, then check its properties
pub fn assess(run: &Run, program: &Program, config: &SimulationConfig) -> Result<Metrics, Violation> {
    check_termination(&run.termination)?;
    evaluate(run, program, config, true)
}

fn check_termination(termination: &Termination) -> Result<(), Violation> {
    match termination {
        Termination::Boundary {
            slot,
            recent_forwards,
        } => {
            let mut slots = vec![*slot];
            slots.extend(recent_forwards.iter().rev());
            Err(Violation::new(ErrorKind::Boundary, 1.0, 0.0).with_slots(slots))
        }
        Termination::Loop { slot } => {
            Err(Violation::new(ErrorKind::Loop, 1.0, 0.0).with_slots(vec![*slot]))
        }
        Termination::Success | Termination::BudgetExhausted => Ok(()),
    }
}

/// Run every check against an evaluable run.
///
/// `check_necessity` gates the counterfactual paint re-runs; the re-runs
/// themselves are evaluated with it off, so re-entry is one level deep.
pub fn evaluate(
    run: &Run,
    program: &Program,
    config: &SimulationConfig,
    check_necessity: bool,
) -> Result<Metrics, Violation> {
    let mut metrics = measure(run);
    check_thresholds(&metrics, run.total_slots, config)?;

    if check_necessity && config.max_unnecessary_paints >= 0 && !run.trace.paint_slots.is_empty() {
        let unnecessary = unnecessary_paints(run, program, config);
        metrics.unnecessary_paints = Some(unnecessary.len());
        let limit = config.max_unnecessary_paints as usize;
        if unnecessary.len() > limit {
            return Err(
                Violation::new(ErrorKind::UnnecessaryPaint, count(unnecessary.len()), count(limit))
                    .with_slots(unnecessary),
            );
        }
    }
    Ok(metrics)
}

fn check_thresholds(m: &Metrics, total_slots: usize, config: &SimulationConfig) -> Result<(), Violation> {
    if m.coverage_percent < config.min_coverage_percent {
        return Err(Violation::new(ErrorKind::Coverage, m.coverage_percent, config.min_coverage_percent));
    }
    if m.tiles < config.min_tiles {
        return Err(Violation::new(ErrorKind::MinTiles, count(m.tiles), count(config.min_tiles)));
    }
    if m.bounding_box() < config.min_bounding_box {
        return Err(Violation::new(
            ErrorKind::MinBoundingBox,
            count(m.bounding_box()),
            count(config.min_bounding_box),
        ));
    }
    if m.turns < config.min_turns {
        return Err(Violation::new(ErrorKind::MinTurns, count(m.turns), count(config.min_turns)));
    }
    if m.dense_tiles > config.max_dense_tiles {
        return Err(Violation::new(ErrorKind::Density, count(m.dense_tiles), count(config.max_dense_tiles)));
    }
    if m.max_stack_depth < config.min_stack_depth {
        return Err(Violation::new(
            ErrorKind::MinStackDepth,
            count(m.max_stack_depth),
            count(config.min_stack_depth),
        ));
    }
    if m.self_calls < config.min_self_calls {
        return Err(Violation::new(ErrorKind::MinSelfCalls, count(m.self_calls), count(config.min_self_calls)));
    }
    if m.path_length < config.min_path_length {
        return Err(Violation::new(
            ErrorKind::MinPathLength,
            count(m.path_length),
            count(config.min_path_length),
        ));
    }
    let required_trace = config.min_path_trace_ratio * total_slots as f64;
    if (m.path_trace_instructions as f64) < required_trace {
        return Err(Violation::new(
            ErrorKind::PathTraceRatio,
            count(m.path_trace_instructions),
            required_trace,
        ));
    }
    if m.conditionals < config.min_conditionals {
        return Err(Violation::new(
            ErrorKind::MinConditionals,
            count(m.conditionals),
            count(config.min_conditionals),
        ));
    }
    if config.min_paint_revisits > 0 && m.paint_revisits < config.min_paint_revisits {
        return Err(Violation::new(
            ErrorKind::MinPaintRevisits,
            count(m.paint_revisits),
            count(config.min_paint_revisits),
        ));
    }
    Ok(())
}

/// Executed paint slots whose removal still leaves a passing run.
///
/// The re-runs use the program pruned to the slots this run executed, the
/// same program a packaged solution carries.
pub fn unnecessary_paints(run: &Run, program: &Program, config: &SimulationConfig) -> Vec<SlotId> {
    let pruned = program.pruned(&run.trace.executed_slots());
    run.trace
        .paint_slots
        .iter()
        .copied()
        .filter(|slot| {
            let options = RunOptions::from_config(config).suppressing(*slot);
            let Ok(rerun) = execute(&pruned, run.original.clone(), run.start, options, &mut BlankTiles) else {
                return false;
            };
            rerun.termination.is_evaluable() && evaluate(&rerun, &pruned, config, false).is_ok()
        })
        .collect()
}
