//! Turning a winning run into a puzzle, and checking solutions against it.

use crate::config::{SimulationConfig, SlotsPerFunction};
use crate::error::{ErrorKind, ExecError};
use crate::evaluator::{assess, Metrics, Violation};
use crate::interpreter::{execute, NoTiles, Run, RunOptions};
use crate::{Color, FunctionName, Grid, InstructionKind, Pose, Program};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A playable puzzle: the board, where the robot starts, and what the
/// player may write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Puzzle {
    pub grid: Grid,
    pub robot_start: Pose,
    pub function_lengths: SlotsPerFunction,
    pub allowed_instructions: Vec<InstructionKind>,
}

/// Movement and paint instructions plus a call for every function with slots
pub fn allowed_instructions(lengths: &SlotsPerFunction) -> Vec<InstructionKind> {
    let mut allowed = vec![
        InstructionKind::Forward,
        InstructionKind::TurnLeft,
        InstructionKind::TurnRight,
    ];
    allowed.extend(Color::ALL.map(|color| InstructionKind::Paint { color }));
    allowed.extend(
        FunctionName::ALL
            .into_iter()
            .filter(|f| lengths.get(*f) > 0)
            .map(|function| InstructionKind::Call { function }),
    );
    allowed
}

/// Build the puzzle and pruned solution from an accepted run.
///
/// Stars go on every turn position and the final position, on the grid as
/// it was before any paint.
pub fn package(program: &Program, run: &Run) -> (Puzzle, Program) {
    let solution = program.pruned(&run.trace.executed_slots());

    let mut grid = run.original.clone();
    let final_position = run.trace.final_pose.position;
    for position in run.trace.turn_positions.iter().chain(std::iter::once(&final_position)) {
        if let Some(tile) = grid.get_mut(*position) {
            tile.has_star = true;
        }
    }

    let lengths = program.lengths();
    let puzzle = Puzzle {
        grid,
        robot_start: run.start,
        function_lengths: lengths,
        allowed_instructions: allowed_instructions(&lengths),
    };
    (puzzle, solution)
}

/// How a generation run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    Success,
    /// Wall-clock budget ran out
    Timeout,
    /// Attempt budget ran out
    Exhausted,
    /// Cancelled by the caller
    Stopped,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Timeout => write!(f, "timeout"),
            Outcome::Exhausted => write!(f, "exhausted"),
            Outcome::Stopped => write!(f, "stopped"),
        }
    }
}

/// Everything a generation run reports back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub success: bool,
    pub outcome: Outcome,
    pub puzzle: Option<Puzzle>,
    pub solution: Option<Program>,
    pub attempts: usize,
    /// Kind of the most recent rejection
    pub error_type: Option<ErrorKind>,
    pub error_counts: BTreeMap<ErrorKind, usize>,
    /// Seed that reproduces this run
    pub seed: u64,
    pub elapsed_ms: u64,
    pub diagnostics: Option<Metrics>,
}

impl GenerationResult {
    pub fn solved(
        puzzle: Puzzle,
        solution: Program,
        diagnostics: Metrics,
        attempts: usize,
        error_counts: BTreeMap<ErrorKind, usize>,
        seed: u64,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            success: true,
            outcome: Outcome::Success,
            puzzle: Some(puzzle),
            solution: Some(solution),
            attempts,
            error_type: None,
            error_counts,
            seed,
            elapsed_ms,
            diagnostics: Some(diagnostics),
        }
    }

    pub fn failure(
        outcome: Outcome,
        attempts: usize,
        error_type: Option<ErrorKind>,
        error_counts: BTreeMap<ErrorKind, usize>,
        seed: u64,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            success: false,
            outcome,
            puzzle: None,
            solution: None,
            attempts,
            error_type,
            error_counts,
            seed,
            elapsed_ms,
            diagnostics: None,
        }
    }

    /// Total rejections across all kinds
    pub fn rejections(&self) -> usize {
        self.error_counts.values().sum()
    }
}

/// Why a solution failed verification
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("solution rejected: {0}")]
    Rejected(Violation),

    #[error("solution does not fit the puzzle's function lengths")]
    ShapeMismatch,
}

/// Re-run `solution` on the finished puzzle (no new tiles may appear) and
/// check it against `config`
pub fn verify_solution(puzzle: &Puzzle, solution: &Program, config: &SimulationConfig) -> Result<(Run, Metrics), VerifyError> {
    if solution.lengths() != puzzle.function_lengths {
        return Err(VerifyError::ShapeMismatch);
    }
    let grid = puzzle.grid.without_stars();
    let run = execute(solution, grid, puzzle.robot_start, RunOptions::from_config(config), &mut NoTiles)?;
    let metrics = assess(&run, solution, config).map_err(VerifyError::Rejected)?;
    Ok((run, metrics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::BlankTiles;
    use crate::{Direction, Instruction, Position, SlotId, Tile};

    fn config() -> SimulationConfig {
        SimulationConfig {
            slots_per_function: SlotsPerFunction {
                f1: 4,
                f2: 2,
                ..SlotsPerFunction::default()
            },
            grid_size: 8,
            max_steps: 8,
            min_coverage_percent: 0.0,
            min_tiles: 0,
            min_bounding_box: 0,
            min_turns: 0,
            max_dense_tiles: 100,
            max_avg_executions_per_slot: 100.0,
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

    fn sample() -> (Program, Run) {
        let config = config();
        let mut program = Program::empty(&config.slots_per_function);
        program.set(SlotId::new(FunctionName::F1, 0), Some(Instruction::forward()));
        program.set(SlotId::new(FunctionName::F1, 1), Some(Instruction::turn_right()));
        program.set(SlotId::new(FunctionName::F1, 2), Some(Instruction::when(InstructionKind::Forward, Color::Blue)));
        program.set(SlotId::new(FunctionName::F2, 0), Some(Instruction::forward()));

        let start = Pose::new(Position::new(3, 3), Direction::Up);
        let mut grid = Grid::square(config.grid_size);
        grid.set(start.position, Tile::colored(Color::Red));
        let run = execute(&program, grid, start, RunOptions::from_config(&config), &mut BlankTiles).unwrap();
        (program, run)
    }

    #[test]
    fn test_allowed_instructions() {
        let lengths = SlotsPerFunction {
            f1: 3,
            f3: 1,
            ..SlotsPerFunction::default()
        };
        let allowed = allowed_instructions(&lengths);
        assert_eq!(allowed.len(), 8);
        assert!(allowed.contains(&InstructionKind::Call { function: FunctionName::F3 }));
        assert!(!allowed.contains(&InstructionKind::Call { function: FunctionName::F2 }));
        assert!(!allowed.contains(&InstructionKind::Noop));
    }

    #[test]
    fn test_package_prunes_and_places_stars() {
        let (program, run) = sample();
        let (puzzle, solution) = package(&program, &run);

        // The blue-guarded forward and all of f2 never ran
        assert_eq!(solution.instructions().count(), 2);
        assert_eq!(solution.lengths(), program.lengths());
        assert!(solution.get(SlotId::new(FunctionName::F1, 2)).is_none());

        assert_eq!(puzzle.robot_start, run.start);
        assert!(puzzle.grid.star_count() >= 1);
        let final_tile = puzzle.grid.get(run.trace.final_pose.position).unwrap();
        assert!(final_tile.has_star);
        for turn in &run.trace.turn_positions {
            assert!(puzzle.grid.get(*turn).unwrap().has_star);
        }
    }

    #[test]
    fn test_pruned_solution_verifies_identically() {
        let (program, run) = sample();
        let (puzzle, solution) = package(&program, &run);
        let (rerun, _) = verify_solution(&puzzle, &solution, &config()).unwrap();
        assert_eq!(rerun.trace.executed_slots(), run.trace.executed_slots());
        assert_eq!(rerun.trace.path, run.trace.path);
    }

    fn paint_then_guarded_forward(guard: Color, start: Pose, start_color: Color, config: &SimulationConfig) -> (Program, Run) {
        let mut program = Program::empty(&config.slots_per_function);
        program.set(SlotId::new(FunctionName::F1, 0), Some(Instruction::paint(Color::Red)));
        program.set(SlotId::new(FunctionName::F1, 1), Some(Instruction::when(InstructionKind::Forward, guard)));
        let mut grid = Grid::square(config.grid_size);
        grid.set(start.position, Tile::colored(start_color));
        let run = execute(&program, grid, start, RunOptions::from_config(config), &mut BlankTiles).unwrap();
        (program, run)
    }

    #[test]
    fn test_paint_necessity_judged_on_pruned_program() {
        // Without the paint the green-guarded forward would walk off the top
        // edge, but that slot never runs and is pruned from the solution
        let config = SimulationConfig {
            max_unnecessary_paints: 0,
            ..config()
        };
        let start = Pose::new(Position::new(1, 0), Direction::Up);
        let (program, run) = paint_then_guarded_forward(Color::Green, start, Color::Green, &config);
        assert_eq!(run.trace.executed_slots().len(), 1);

        let violation = assess(&run, &program, &config).unwrap_err();
        assert_eq!(violation.kind, ErrorKind::UnnecessaryPaint);
        assert_eq!(violation.slots, vec![SlotId::new(FunctionName::F1, 0)]);

        let (puzzle, solution) = package(&program, &run);
        let err = verify_solution(&puzzle, &solution, &config).unwrap_err();
        assert!(matches!(err, VerifyError::Rejected(v) if v.kind == ErrorKind::UnnecessaryPaint));
    }

    #[test]
    fn test_needed_paint_survives_packaging() {
        let config = SimulationConfig {
            grid_size: 16,
            min_path_length: 1,
            max_unnecessary_paints: 0,
            ..config()
        };
        let start = Pose::new(Position::new(8, 8), Direction::Up);
        let (program, run) = paint_then_guarded_forward(Color::Red, start, Color::Green, &config);
        let metrics = assess(&run, &program, &config).unwrap();
        assert_eq!(metrics.unnecessary_paints, Some(0));

        let (puzzle, solution) = package(&program, &run);
        let (rerun, rerun_metrics) = verify_solution(&puzzle, &solution, &config).unwrap();
        assert_eq!(rerun.trace.executed_slots(), run.trace.executed_slots());
        assert_eq!(rerun.trace.path, run.trace.path);
        assert_eq!(rerun_metrics.unnecessary_paints, Some(0));
    }

    #[test]
    fn test_verify_rejects_wrong_shape_and_falls() {
        let (program, run) = sample();
        let (puzzle, _) = package(&program, &run);

        let wrong = Program::from_functions([(FunctionName::F1, vec![Some(Instruction::forward())])]);
        assert!(matches!(verify_solution(&puzzle, &wrong, &config()), Err(VerifyError::ShapeMismatch)));

        let mut walker = Program::empty(&puzzle.function_lengths);
        walker.set(SlotId::new(FunctionName::F1, 0), Some(Instruction::turn_left()));
        walker.set(SlotId::new(FunctionName::F1, 1), Some(Instruction::forward()));
        let err = verify_solution(&puzzle, &walker, &config()).unwrap_err();
        assert!(matches!(err, VerifyError::Exec(ExecError::Fell(_))));
    }

    #[test]
    fn test_result_json_shape() {
        let result = GenerationResult::failure(
            Outcome::Timeout,
            12,
            Some(ErrorKind::MinTurns),
            [(ErrorKind::MinTurns, 7), (ErrorKind::Boundary, 5)].into_iter().collect(),
            99,
            1500,
        );
        assert_eq!(result.rejections(), 12);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["outcome"], "timeout");
        assert_eq!(json["errorType"], "minTurns");
        assert_eq!(json["errorCounts"]["boundary"], 5);
        assert!(json["puzzle"].is_null());
    }
}
