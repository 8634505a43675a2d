//! Random program generation from scratch.

use crate::config::SimulationConfig;
use crate::{Color, FunctionName, Instruction, InstructionKind, Program, SlotId};
use rand::distributions::WeightedIndex;
use rand::prelude::*;

/// Instruction families drawn by weight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Forward,
    Turn,
    Call,
    Paint,
}

const FAMILIES: [Family; 4] = [Family::Forward, Family::Turn, Family::Call, Family::Paint];

/// Fill every configured slot with a random instruction
pub fn generate<R: Rng + ?Sized>(config: &SimulationConfig, rng: &mut R) -> Program {
    let mut program = Program::empty(&config.slots_per_function);
    let targets = program.active_functions();
    for &function in &targets {
        let mut previous: Option<Instruction> = None;
        for index in 0..program.len(function) {
            let instruction = random_instruction(config, &targets, previous.as_ref(), rng);
            program.set(SlotId::new(function, index), Some(instruction));
            previous = Some(instruction);
        }
    }
    guard_entry_tail(&mut program, rng);
    program
}

/// Draw one instruction.
///
/// `previous` is the instruction in the slot before, used to avoid an
/// immediate turn reversal and a repeated condition colour.
pub fn random_instruction<R: Rng + ?Sized>(
    config: &SimulationConfig,
    targets: &[FunctionName],
    previous: Option<&Instruction>,
    rng: &mut R,
) -> Instruction {
    let condition = random_condition(config, previous, rng);

    let kind = match random_family(config, !targets.is_empty(), rng) {
        Family::Forward => InstructionKind::Forward,
        Family::Turn => {
            let reversing = previous.filter(|p| condition.is_none() && p.condition.is_none() && p.kind.is_turn());
            match reversing {
                Some(prev) => prev.kind,
                None => random_turn(rng),
            }
        }
        Family::Call => match targets.choose(rng) {
            Some(&function) => InstructionKind::Call { function },
            None => InstructionKind::Forward,
        },
        Family::Paint => InstructionKind::Paint {
            color: random_color(rng),
        },
    };
    Instruction { kind, condition }
}

fn random_condition<R: Rng + ?Sized>(
    config: &SimulationConfig,
    previous: Option<&Instruction>,
    rng: &mut R,
) -> Option<Color> {
    let chance = (config.conditional_percent / 100.0).clamp(0.0, 1.0);
    if !rng.gen_bool(chance) {
        return None;
    }
    match previous.and_then(|p| p.condition) {
        Some(taken) => other_color(taken, rng),
        None => Some(random_color(rng)),
    }
}

fn random_family<R: Rng + ?Sized>(config: &SimulationConfig, calls_possible: bool, rng: &mut R) -> Family {
    let w = config.instruction_weights;
    let call = if calls_possible { w.function_call } else { 0.0 };
    match WeightedIndex::new([w.forward, w.turn, call, w.paint]) {
        Ok(dist) => FAMILIES[dist.sample(rng)],
        Err(_) => Family::Forward,
    }
}

pub fn random_color<R: Rng + ?Sized>(rng: &mut R) -> Color {
    Color::ALL[rng.gen_range(0..Color::ALL.len())]
}

/// A colour different from `taken`
pub fn other_color<R: Rng + ?Sized>(taken: Color, rng: &mut R) -> Option<Color> {
    let others: Vec<Color> = Color::ALL.into_iter().filter(|c| *c != taken).collect();
    others.choose(rng).copied()
}

pub fn random_turn<R: Rng + ?Sized>(rng: &mut R) -> InstructionKind {
    if rng.gen_bool(0.5) {
        InstructionKind::TurnLeft
    } else {
        InstructionKind::TurnRight
    }
}

/// An unconditional `call f1` in f1's last slot recurses without ever
/// returning; give it a condition.
pub fn guard_entry_tail<R: Rng + ?Sized>(program: &mut Program, rng: &mut R) {
    let len = program.len(FunctionName::F1);
    if len == 0 {
        return;
    }
    let tail = SlotId::new(FunctionName::F1, len - 1);
    if let Some(&instruction) = program.get(tail) {
        if instruction.kind == (InstructionKind::Call { function: FunctionName::F1 }) && instruction.condition.is_none() {
            program.set(tail, Some(Instruction::when(instruction.kind, random_color(rng))));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InstructionWeights, SlotsPerFunction};

    fn config() -> SimulationConfig {
        SimulationConfig {
            slots_per_function: SlotsPerFunction {
                f1: 6,
                f2: 4,
                ..SlotsPerFunction::default()
            },
            ..SimulationConfig::medium()
        }
    }

    #[test]
    fn test_fills_every_configured_slot() {
        let mut rng = StdRng::seed_from_u64(1);
        let config = config();
        let program = generate(&config, &mut rng);
        assert_eq!(program.lengths(), config.slots_per_function);
        assert_eq!(program.instructions().count(), 10);
    }

    #[test]
    fn test_calls_only_target_functions_with_slots() {
        let mut rng = StdRng::seed_from_u64(2);
        let config = SimulationConfig {
            instruction_weights: InstructionWeights {
                forward: 0.0,
                turn: 0.0,
                function_call: 1.0,
                paint: 0.0,
            },
            ..config()
        };
        for _ in 0..50 {
            let program = generate(&config, &mut rng);
            for (_, ins) in program.instructions() {
                match ins.kind {
                    InstructionKind::Call { function } => assert!(program.len(function) > 0),
                    other => panic!("unexpected {:?}", other),
                }
            }
        }
    }

    #[test]
    fn test_entry_tail_never_recurses_unconditionally() {
        let mut rng = StdRng::seed_from_u64(3);
        let config = SimulationConfig {
            slots_per_function: SlotsPerFunction {
                f1: 2,
                ..SlotsPerFunction::default()
            },
            conditional_percent: 0.0,
            instruction_weights: InstructionWeights {
                forward: 0.0,
                turn: 0.0,
                function_call: 1.0,
                paint: 0.0,
            },
            ..SimulationConfig::medium()
        };
        let program = generate(&config, &mut rng);
        let tail = program.get(SlotId::new(FunctionName::F1, 1)).unwrap();
        assert_eq!(tail.kind, InstructionKind::Call { function: FunctionName::F1 });
        assert!(tail.condition.is_some());
    }

    #[test]
    fn test_no_unconditional_turn_reversal() {
        let mut rng = StdRng::seed_from_u64(4);
        let config = SimulationConfig {
            conditional_percent: 0.0,
            instruction_weights: InstructionWeights {
                forward: 0.0,
                turn: 1.0,
                function_call: 0.0,
                paint: 0.0,
            },
            ..config()
        };
        for _ in 0..30 {
            let program = generate(&config, &mut rng);
            let slots = program.slots(FunctionName::F1);
            for pair in slots.windows(2) {
                assert_eq!(pair[0].unwrap().kind, pair[1].unwrap().kind);
            }
        }
    }

    #[test]
    fn test_adjacent_conditions_differ() {
        let mut rng = StdRng::seed_from_u64(5);
        let config = SimulationConfig {
            conditional_percent: 100.0,
            ..config()
        };
        for _ in 0..30 {
            let program = generate(&config, &mut rng);
            for function in program.active_functions() {
                for pair in program.slots(function).windows(2) {
                    assert_ne!(pair[0].unwrap().condition, pair[1].unwrap().condition);
                }
            }
        }
    }
}
