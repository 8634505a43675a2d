//! Targeted mutations that turn a rejected program into a new candidate.
//!
//! Each rejection kind maps to a short weighted list of strategies. A
//! strategy looks at the failed run (which slots executed, which forward
//! hit the edge, what got painted) and edits one or two slots.

use super::fresh;
use crate::config::SimulationConfig;
use crate::error::ErrorKind;
use crate::evaluator::Violation;
use crate::interpreter::Run;
use crate::{FunctionName, Instruction, InstructionKind, Program, SlotId};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A rejected candidate and what went wrong with it
#[derive(Debug, Clone)]
pub struct Failure {
    pub program: Program,
    /// Absent when the interpreter faulted before producing a trace
    pub run: Option<Run>,
    pub violation: Violation,
}

impl Failure {
    pub fn kind(&self) -> ErrorKind {
        self.violation.kind
    }

    fn executed(&self, slot: SlotId) -> bool {
        self.run.as_ref().is_some_and(|r| r.trace.was_executed(slot))
    }

    /// Slots that ran, or every slot when there is no trace
    fn executed_slots(&self) -> Vec<SlotId> {
        match &self.run {
            Some(run) => run.trace.executions.keys().copied().collect(),
            None => self.program.slot_ids().collect(),
        }
    }

    fn unexecuted_slots(&self) -> Vec<SlotId> {
        self.program.slot_ids().filter(|s| !self.executed(*s)).collect()
    }

    /// Executed slots holding an instruction that matches `pred`
    fn executed_where(&self, pred: impl Fn(&Instruction) -> bool) -> Vec<SlotId> {
        self.executed_slots()
            .into_iter()
            .filter(|s| self.program.get(*s).is_some_and(&pred))
            .collect()
    }

    /// Any slot (executed or not) holding an instruction that matches `pred`
    fn slots_where(&self, pred: impl Fn(&Instruction) -> bool) -> Vec<SlotId> {
        self.program
            .instructions()
            .filter(|(_, ins)| pred(ins))
            .map(|(s, _)| s)
            .collect()
    }

    /// Functions with slots none of which ran
    fn unentered_functions(&self) -> Vec<FunctionName> {
        self.program
            .active_functions()
            .into_iter()
            .filter(|f| (0..self.program.len(*f)).all(|i| !self.executed(SlotId::new(*f, i))))
            .collect()
    }
}

/// One way of editing a failed program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RepairStrategy {
    /// Redraw a slot that never ran
    RandomizeUnexecuted,
    /// Redraw a slot that ran
    RandomizeExecuted,
    /// Replace the forward that left the grid with a turn
    BoundaryToTurn,
    /// Guard the forward that left the grid with a colour it was not standing on
    GuardBoundary,
    /// Replace one of the forwards leading up to the edge with a turn
    RecentForwardToTurn,
    /// Replace an executed unconditional forward with a turn
    ForwardToTurn,
    /// Drop the condition of a guarded turn
    UnguardTurn,
    /// Replace an executed turn/paint/noop with a forward, maybe followed by a turn
    ToForward,
    /// Unblock or add a call into a function that never ran
    LoosenCallGuard,
    /// Put a call to another function into an executed slot
    DeepenCalls,
    /// Make an executed slot call its own function
    AddSelfCall,
    /// Put a colour guard on an executed unconditional slot
    AddCondition,
    /// Replace an executed slot with a paint
    AddPaint,
    /// Retarget a guard to a colour that was painted during the run
    MatchPaintedColor,
    /// Replace a paint that turned out unnecessary
    RemovePaint,
    /// Swap the sense of an executed turn
    FlipTurn,
    /// Throw the program away
    Regenerate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedStrategy {
    pub strategy: RepairStrategy,
    pub weight: f64,
}

/// Strategy choices for every rejection kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairTable {
    entries: BTreeMap<ErrorKind, Vec<WeightedStrategy>>,
}

impl Default for RepairTable {
    fn default() -> Self {
        use RepairStrategy::*;
        let table: [(ErrorKind, &[(RepairStrategy, f64)]); 15] = [
            (
                ErrorKind::Boundary,
                &[(BoundaryToTurn, 4.0), (GuardBoundary, 2.0), (RecentForwardToTurn, 2.0), (RandomizeExecuted, 1.0)],
            ),
            (
                ErrorKind::Coverage,
                &[(LoosenCallGuard, 4.0), (RandomizeUnexecuted, 3.0), (UnguardTurn, 1.0), (RandomizeExecuted, 1.0)],
            ),
            (
                ErrorKind::Loop,
                &[(ToForward, 3.0), (FlipTurn, 2.0), (AddCondition, 1.0), (RandomizeExecuted, 2.0)],
            ),
            (
                ErrorKind::MinTiles,
                &[(ToForward, 4.0), (RandomizeUnexecuted, 2.0), (RandomizeExecuted, 1.0), (Regenerate, 0.5)],
            ),
            (
                ErrorKind::MinBoundingBox,
                &[(ToForward, 3.0), (RandomizeExecuted, 2.0), (RandomizeUnexecuted, 1.0)],
            ),
            (
                ErrorKind::MinTurns,
                &[(ForwardToTurn, 4.0), (UnguardTurn, 3.0), (RandomizeUnexecuted, 1.0), (RandomizeExecuted, 1.0)],
            ),
            (
                ErrorKind::Density,
                &[(FlipTurn, 3.0), (ToForward, 2.0), (RandomizeExecuted, 2.0)],
            ),
            (
                ErrorKind::MinStackDepth,
                &[(DeepenCalls, 4.0), (LoosenCallGuard, 2.0), (RandomizeUnexecuted, 1.0)],
            ),
            (
                ErrorKind::MinSelfCalls,
                &[(AddSelfCall, 4.0), (LoosenCallGuard, 1.0), (RandomizeUnexecuted, 1.0)],
            ),
            (
                ErrorKind::PathTraceRatio,
                &[(ToForward, 2.0), (ForwardToTurn, 2.0), (RandomizeExecuted, 2.0), (RandomizeUnexecuted, 1.0)],
            ),
            (
                ErrorKind::MinPathLength,
                &[(ToForward, 4.0), (RandomizeUnexecuted, 2.0), (RandomizeExecuted, 1.0)],
            ),
            (
                ErrorKind::MinConditionals,
                &[(AddCondition, 4.0), (RandomizeUnexecuted, 1.0), (RandomizeExecuted, 1.0)],
            ),
            (
                ErrorKind::MinPaintRevisits,
                &[(AddPaint, 3.0), (MatchPaintedColor, 3.0), (AddCondition, 1.0), (RandomizeUnexecuted, 1.0)],
            ),
            (
                ErrorKind::UnnecessaryPaint,
                &[(RemovePaint, 4.0), (MatchPaintedColor, 2.0), (RandomizeExecuted, 1.0)],
            ),
            (
                ErrorKind::Other,
                &[(Regenerate, 3.0), (RandomizeExecuted, 1.0), (RandomizeUnexecuted, 1.0)],
            ),
        ];
        let entries = table
            .into_iter()
            .map(|(kind, choices)| {
                let choices = choices
                    .iter()
                    .map(|&(strategy, weight)| WeightedStrategy { strategy, weight })
                    .collect();
                (kind, choices)
            })
            .collect();
        Self { entries }
    }
}

impl RepairTable {
    pub fn strategies(&self, kind: ErrorKind) -> &[WeightedStrategy] {
        self.entries.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replace the choices for one kind
    pub fn set(&mut self, kind: ErrorKind, choices: Vec<WeightedStrategy>) {
        self.entries.insert(kind, choices);
    }
}

/// Produce a mutated copy of the failed program.
///
/// Strategies are drawn by weight without replacement until one applies.
/// Returns `None` when none of the kind's strategies fit the program.
pub fn mutate<R: Rng + ?Sized>(
    failure: &Failure,
    config: &SimulationConfig,
    table: &RepairTable,
    rng: &mut R,
) -> Option<Program> {
    let mut pool: Vec<WeightedStrategy> = table.strategies(failure.kind()).to_vec();
    if pool.is_empty() {
        pool = table.strategies(ErrorKind::Other).to_vec();
    }
    while !pool.is_empty() {
        let index = match WeightedIndex::new(pool.iter().map(|w| w.weight)) {
            Ok(dist) => dist.sample(rng),
            Err(_) => 0,
        };
        let choice = pool.swap_remove(index);
        if let Some(mut program) = apply(choice.strategy, failure, config, rng) {
            fresh::guard_entry_tail(&mut program, rng);
            return Some(program);
        }
    }
    None
}

/// Run a single strategy; `None` when it has nothing to work on
pub fn apply<R: Rng + ?Sized>(
    strategy: RepairStrategy,
    failure: &Failure,
    config: &SimulationConfig,
    rng: &mut R,
) -> Option<Program> {
    let mut program = failure.program.clone();
    let targets = program.active_functions();
    match strategy {
        RepairStrategy::RandomizeUnexecuted => {
            let slot = *failure.unexecuted_slots().choose(rng)?;
            let previous = previous_instruction(&program, slot);
            let fresh = fresh::random_instruction(config, &targets, previous.as_ref(), rng);
            program.set(slot, Some(fresh));
        }
        RepairStrategy::RandomizeExecuted => {
            let slot = *failure.executed_slots().choose(rng)?;
            let current = program.get(slot).copied();
            let previous = previous_instruction(&program, slot);
            let mut fresh = fresh::random_instruction(config, &targets, previous.as_ref(), rng);
            for _ in 0..4 {
                if Some(fresh) != current {
                    break;
                }
                fresh = fresh::random_instruction(config, &targets, previous.as_ref(), rng);
            }
            program.set(slot, Some(fresh));
        }
        RepairStrategy::BoundaryToTurn => {
            let slot = boundary_culprit(failure)?;
            program.set(slot, Some(Instruction::new(fresh::random_turn(rng))));
        }
        RepairStrategy::GuardBoundary => {
            let slot = boundary_culprit(failure)?;
            let standing_on = failure
                .run
                .as_ref()
                .and_then(|r| r.grid.get(r.trace.final_pose.position))
                .and_then(|t| t.color);
            let guard = match standing_on {
                Some(color) => fresh::other_color(color, rng)?,
                None => fresh::random_color(rng),
            };
            program.set(slot, Some(Instruction::when(InstructionKind::Forward, guard)));
        }
        RepairStrategy::RecentForwardToTurn => {
            if failure.kind() != ErrorKind::Boundary {
                return None;
            }
            let slot = *failure.violation.slots.get(1..)?.choose(rng)?;
            let condition = program.get(slot).and_then(|i| i.condition);
            program.set(
                slot,
                Some(Instruction {
                    kind: fresh::random_turn(rng),
                    condition,
                }),
            );
        }
        RepairStrategy::ForwardToTurn => {
            let slot = *failure
                .executed_where(|i| i.kind == InstructionKind::Forward && i.condition.is_none())
                .choose(rng)?;
            program.set(slot, Some(Instruction::new(fresh::random_turn(rng))));
        }
        RepairStrategy::UnguardTurn => {
            let slot = *failure
                .slots_where(|i| i.kind.is_turn() && i.condition.is_some())
                .choose(rng)?;
            let kind = program.get(slot)?.kind;
            program.set(slot, Some(Instruction::new(kind)));
        }
        RepairStrategy::ToForward => {
            let slot = *failure
                .executed_where(|i| {
                    matches!(
                        i.kind,
                        InstructionKind::TurnLeft
                            | InstructionKind::TurnRight
                            | InstructionKind::Paint { .. }
                            | InstructionKind::Noop
                    )
                })
                .choose(rng)?;
            let condition = program.get(slot).and_then(|i| i.condition);
            program.set(
                slot,
                Some(Instruction {
                    kind: InstructionKind::Forward,
                    condition,
                }),
            );
            // Sometimes follow the new forward with a turn
            let next = SlotId::new(slot.function, slot.index + 1);
            if next.index < program.len(slot.function) && rng.gen_bool(0.5) {
                program.set(next, Some(Instruction::new(fresh::random_turn(rng))));
            }
        }
        RepairStrategy::LoosenCallGuard => {
            let unentered = failure.unentered_functions();
            let guarded_calls = failure.slots_where(|i| {
                i.condition.is_some()
                    && matches!(i.kind, InstructionKind::Call { function } if unentered.contains(&function))
            });
            if let Some(&slot) = guarded_calls.choose(rng) {
                let kind = program.get(slot)?.kind;
                program.set(slot, Some(Instruction::new(kind)));
            } else {
                let target = *unentered.iter().filter(|f| **f != FunctionName::F1).collect::<Vec<_>>().choose(rng)?;
                let slot = *failure
                    .executed_slots()
                    .into_iter()
                    .filter(|s| s.function != *target)
                    .collect::<Vec<_>>()
                    .choose(rng)?;
                program.set(slot, Some(Instruction::call(*target)));
            }
        }
        RepairStrategy::DeepenCalls => {
            let slot = *failure
                .executed_where(|i| !matches!(i.kind, InstructionKind::Call { .. }))
                .choose(rng)?;
            let callee = *targets
                .iter()
                .filter(|f| **f != slot.function && **f != FunctionName::F1)
                .collect::<Vec<_>>()
                .choose(rng)?;
            program.set(slot, Some(Instruction::call(*callee)));
        }
        RepairStrategy::AddSelfCall => {
            let slot = *failure
                .executed_where(|i| i.kind != (InstructionKind::Call { function: FunctionName::F1 }))
                .choose(rng)?;
            let kind = InstructionKind::Call {
                function: slot.function,
            };
            let instruction = if rng.gen_bool(0.5) {
                Instruction::when(kind, fresh::random_color(rng))
            } else {
                Instruction::new(kind)
            };
            program.set(slot, Some(instruction));
        }
        RepairStrategy::AddCondition => {
            let slot = *failure.executed_where(|i| i.condition.is_none()).choose(rng)?;
            let kind = program.get(slot)?.kind;
            program.set(slot, Some(Instruction::when(kind, fresh::random_color(rng))));
        }
        RepairStrategy::AddPaint => {
            let slot = *failure
                .executed_where(|i| !matches!(i.kind, InstructionKind::Call { .. } | InstructionKind::Paint { .. }))
                .choose(rng)?;
            let condition = program.get(slot).and_then(|i| i.condition);
            let color = match condition {
                Some(c) => fresh::other_color(c, rng)?,
                None => fresh::random_color(rng),
            };
            program.set(
                slot,
                Some(Instruction {
                    kind: InstructionKind::Paint { color },
                    condition,
                }),
            );
        }
        RepairStrategy::MatchPaintedColor => {
            let run = failure.run.as_ref()?;
            let color = run.trace.paints.choose(rng)?.color;
            let guarded = failure.slots_where(|i| i.condition.is_some() && i.condition != Some(color));
            let slot = match guarded.choose(rng) {
                Some(&slot) => slot,
                None => *failure
                    .executed_where(|i| i.condition.is_none() && !matches!(i.kind, InstructionKind::Paint { .. }))
                    .choose(rng)?,
            };
            let kind = program.get(slot)?.kind;
            program.set(slot, Some(Instruction::when(kind, color)));
        }
        RepairStrategy::RemovePaint => {
            let named: Vec<SlotId> = failure.violation.slots.clone();
            let candidates = if named.is_empty() {
                failure.executed_where(|i| matches!(i.kind, InstructionKind::Paint { .. }))
            } else {
                named
            };
            let slot = *candidates.choose(rng)?;
            let condition = program.get(slot).and_then(|i| i.condition);
            let kind = if rng.gen_bool(0.5) {
                InstructionKind::Forward
            } else {
                fresh::random_turn(rng)
            };
            program.set(slot, Some(Instruction { kind, condition }));
        }
        RepairStrategy::FlipTurn => {
            let slot = *failure.executed_where(|i| i.kind.is_turn()).choose(rng)?;
            let current = *program.get(slot)?;
            let kind = current.kind.opposite_turn()?;
            program.set(slot, Some(Instruction { kind, ..current }));
        }
        RepairStrategy::Regenerate => {
            program = fresh::generate(config, rng);
        }
    }
    Some(program)
}

/// The forward that left the grid, for boundary failures
fn boundary_culprit(failure: &Failure) -> Option<SlotId> {
    if failure.kind() != ErrorKind::Boundary {
        return None;
    }
    failure.violation.slots.first().copied()
}

fn previous_instruction(program: &Program, slot: SlotId) -> Option<Instruction> {
    let index = slot.index.checked_sub(1)?;
    program.get(SlotId::new(slot.function, index)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SlotsPerFunction;
    use crate::evaluator::assess;
    use crate::interpreter::{execute, BlankTiles, RunOptions};
    use crate::{Color, Direction, Grid, Pose, Position, Tile};

    fn config() -> SimulationConfig {
        SimulationConfig {
            slots_per_function: SlotsPerFunction {
                f1: 3,
                f2: 2,
                ..SlotsPerFunction::default()
            },
            grid_size: 5,
            max_steps: 30,
            disable_loop_check: true,
            ..SimulationConfig::medium()
        }
    }

    fn fail(program: Program, config: &SimulationConfig) -> Failure {
        let start = Pose::new(Position::new(2, 2), Direction::Up);
        let mut grid = Grid::square(config.grid_size);
        grid.set(start.position, Tile::colored(Color::Red));
        let run = execute(&program, grid, start, RunOptions::from_config(config), &mut BlankTiles).unwrap();
        let violation = assess(&run, &program, config).unwrap_err();
        Failure {
            program,
            run: Some(run),
            violation,
        }
    }

    fn slot(function: FunctionName, index: usize) -> SlotId {
        SlotId::new(function, index)
    }

    fn straight_line() -> Program {
        Program::from_functions([
            (
                FunctionName::F1,
                vec![
                    Some(Instruction::forward()),
                    Some(Instruction::forward()),
                    Some(Instruction::when(InstructionKind::Call { function: FunctionName::F2 }, Color::Blue)),
                ],
            ),
            (FunctionName::F2, vec![Some(Instruction::turn_left()), None]),
        ])
    }

    #[test]
    fn test_default_table_covers_every_kind() {
        let table = RepairTable::default();
        for kind in ErrorKind::ALL {
            let n = table.strategies(kind).len();
            assert!((3..=6).contains(&n), "{} has {} strategies", kind, n);
        }
    }

    #[test]
    fn test_boundary_repair_rewrites_the_culprit() {
        let config = config();
        let failure = fail(straight_line(), &config);
        assert_eq!(failure.kind(), ErrorKind::Boundary);
        let culprit = failure.violation.slots[0];

        let mut rng = StdRng::seed_from_u64(9);
        let repaired = apply(RepairStrategy::BoundaryToTurn, &failure, &config, &mut rng).unwrap();
        assert!(repaired.get(culprit).unwrap().kind.is_turn());

        let guarded = apply(RepairStrategy::GuardBoundary, &failure, &config, &mut rng).unwrap();
        let ins = guarded.get(culprit).unwrap();
        assert_eq!(ins.kind, InstructionKind::Forward);
        assert!(ins.condition.is_some());
    }

    #[test]
    fn test_loosen_call_guard_unblocks_uncalled_function() {
        let config = SimulationConfig {
            min_coverage_percent: 100.0,
            ..config()
        };
        // f1 spins in place, so f2 is never entered through the blue guard
        let program = Program::from_functions([
            (
                FunctionName::F1,
                vec![
                    Some(Instruction::turn_left()),
                    Some(Instruction::turn_left()),
                    Some(Instruction::when(InstructionKind::Call { function: FunctionName::F2 }, Color::Blue)),
                ],
            ),
            (FunctionName::F2, vec![Some(Instruction::turn_left()), Some(Instruction::forward())]),
        ]);
        let failure = fail(program, &config);
        assert_eq!(failure.kind(), ErrorKind::Coverage);

        let mut rng = StdRng::seed_from_u64(1);
        let repaired = apply(RepairStrategy::LoosenCallGuard, &failure, &config, &mut rng).unwrap();
        assert_eq!(
            repaired.get(slot(FunctionName::F1, 2)),
            Some(&Instruction::call(FunctionName::F2))
        );
    }

    #[test]
    fn test_strategies_without_targets_decline() {
        let config = config();
        let failure = fail(straight_line(), &config);
        let mut rng = StdRng::seed_from_u64(2);
        // No paints happened in this run
        assert!(apply(RepairStrategy::MatchPaintedColor, &failure, &config, &mut rng).is_none());
        // A boundary-only strategy on a non-boundary failure
        let mut other = failure.clone();
        other.violation = Violation::new(ErrorKind::MinTurns, 0.0, 1.0);
        assert!(apply(RepairStrategy::BoundaryToTurn, &other, &config, &mut rng).is_none());
    }

    #[test]
    fn test_mutate_changes_program() {
        let config = config();
        let failure = fail(straight_line(), &config);
        let table = RepairTable::default();
        let mut rng = StdRng::seed_from_u64(3);
        let mut changed = 0;
        for _ in 0..20 {
            let candidate = mutate(&failure, &config, &table, &mut rng).unwrap();
            assert_eq!(candidate.lengths(), failure.program.lengths());
            if candidate.signature() != failure.program.signature() {
                changed += 1;
            }
        }
        assert!(changed > 10);
    }

    #[test]
    fn test_remove_paint_targets_named_slots() {
        let config = config();
        let program = straight_line();
        let mut failure = fail(program, &config);
        let target = slot(FunctionName::F1, 1);
        failure.violation = Violation::new(ErrorKind::UnnecessaryPaint, 1.0, 0.0).with_slots(vec![target]);
        let mut rng = StdRng::seed_from_u64(4);
        let repaired = apply(RepairStrategy::RemovePaint, &failure, &config, &mut rng).unwrap();
        let kind = repaired.get(target).unwrap().kind;
        assert!(!matches!(kind, InstructionKind::Paint { .. }));
    }
}
