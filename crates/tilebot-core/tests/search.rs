use proptest::prelude::*;
use std::time::Duration;
use tilebot_core::config::SlotsPerFunction;
use tilebot_core::generator::SearchOptions;
use tilebot_core::{
    verify_solution, Color, FunctionName, Generator, Instruction, InstructionKind, PlayStatus, Playback, Program,
    SimulationConfig, SlotId,
};

fn single_function() -> SimulationConfig {
    SimulationConfig {
        slots_per_function: SlotsPerFunction {
            f1: 5,
            ..SlotsPerFunction::default()
        },
        grid_size: 16,
        max_steps: 500,
        min_coverage_percent: 50.0,
        min_tiles: 3,
        min_bounding_box: 2,
        min_turns: 1,
        max_dense_tiles: 16,
        max_avg_executions_per_slot: 20.0,
        min_stack_depth: 0,
        min_self_calls: 0,
        min_path_trace_ratio: 0.0,
        min_path_length: 3,
        min_conditionals: 0,
        min_paint_revisits: 0,
        max_unnecessary_paints: -1,
        ..SimulationConfig::easy()
    }
}

#[test]
fn test_single_function_search_terminates_in_time() {
    let options = SearchOptions::default()
        .with_seed(2024)
        .with_timeout(Some(Duration::from_secs(5)));
    let mut generator = Generator::with_options(single_function(), options).unwrap();
    let result = generator.generate();

    assert!(result.attempts > 0);
    if result.success {
        let diagnostics = result.diagnostics.as_ref().unwrap();
        assert!(diagnostics.path_length >= 1);
    } else {
        assert!(result.error_type.is_some());
    }
}

#[test]
fn test_found_puzzle_is_replayable() {
    let config = single_function();
    let options = SearchOptions::default()
        .with_seed(7)
        .with_timeout(Some(Duration::from_secs(30)));
    let result = Generator::with_options(config.clone(), options).unwrap().generate();
    assert!(result.success, "no puzzle found: {:?}", result.error_counts);
    let puzzle = result.puzzle.unwrap();
    let solution = result.solution.unwrap();

    assert!(puzzle.grid.star_count() >= 1);
    assert_eq!(puzzle.function_lengths, config.slots_per_function);
    assert!(puzzle.allowed_instructions.contains(&InstructionKind::Call { function: FunctionName::F1 }));
    assert!(!puzzle.allowed_instructions.contains(&InstructionKind::Call { function: FunctionName::F2 }));

    let (run, _) = verify_solution(&puzzle, &solution, &config).unwrap();
    let executed = run.trace.executed_slots();
    let kept: Vec<SlotId> = solution.instructions().map(|(slot, _)| slot).collect();
    assert_eq!(executed.into_iter().collect::<Vec<_>>(), kept);

    let mut playback = Playback::new(&puzzle, &solution, config.max_steps).unwrap();
    assert_eq!(playback.run(), PlayStatus::Won);
}

#[test]
fn test_hard_puzzles_verify_with_their_paints() {
    let config = SimulationConfig::hard();
    assert_eq!(config.max_unnecessary_paints, 0);

    for seed in [3, 22, 27] {
        let options = SearchOptions::default()
            .with_seed(seed)
            .with_timeout(Some(Duration::from_secs(30)));
        let result = Generator::with_options(config.clone(), options).unwrap().generate();
        assert!(result.success, "seed {seed}: {:?}", result.error_counts);
        let puzzle = result.puzzle.unwrap();
        let solution = result.solution.unwrap();

        let (run, metrics) = verify_solution(&puzzle, &solution, &config)
            .unwrap_or_else(|e| panic!("seed {seed}: {e}"));
        assert!(metrics.paints >= 1);
        assert_eq!(metrics.unnecessary_paints, Some(0));
        let kept: Vec<SlotId> = solution.instructions().map(|(slot, _)| slot).collect();
        assert_eq!(run.trace.executed_slots().into_iter().collect::<Vec<_>>(), kept);

        let mut playback = Playback::new(&puzzle, &solution, config.max_steps).unwrap();
        assert_eq!(playback.run(), PlayStatus::Won);
    }
}

#[test]
fn test_result_round_trips_through_json() {
    let options = SearchOptions::default()
        .with_seed(5)
        .with_timeout(None)
        .with_max_attempts(Some(25));
    let result = Generator::with_options(single_function(), options).unwrap().generate();
    let json = serde_json::to_string(&result).unwrap();
    let back: tilebot_core::GenerationResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back.attempts, result.attempts);
    assert_eq!(back.error_counts, result.error_counts);
    assert_eq!(back.solution, result.solution);
}

fn instruction() -> impl Strategy<Value = Instruction> {
    let color = prop_oneof![Just(Color::Red), Just(Color::Green), Just(Color::Blue)];
    let function = prop_oneof![Just(FunctionName::F1), Just(FunctionName::F2)];
    let kind = prop_oneof![
        Just(InstructionKind::Forward),
        Just(InstructionKind::TurnLeft),
        Just(InstructionKind::TurnRight),
        function.prop_map(|function| InstructionKind::Call { function }),
        color.clone().prop_map(|color| InstructionKind::Paint { color }),
    ];
    (kind, proptest::option::of(color)).prop_map(|(kind, condition)| Instruction { kind, condition })
}

fn program() -> impl Strategy<Value = Program> {
    let slots = || proptest::collection::vec(proptest::option::of(instruction()), 1..6);
    (slots(), slots()).prop_map(|(f1, f2)| Program::from_functions([(FunctionName::F1, f1), (FunctionName::F2, f2)]))
}

proptest! {
    #[test]
    fn signature_matches_for_identical_programs(program in program()) {
        prop_assert_eq!(program.signature(), program.clone().signature());
    }

    #[test]
    fn signature_differs_after_one_slot_change(
        program in program(),
        replacement in proptest::option::of(instruction()),
        pick in any::<prop::sample::Index>(),
    ) {
        let slots: Vec<SlotId> = program.slot_ids().collect();
        let slot = slots[pick.index(slots.len())];
        prop_assume!(program.get(slot).copied() != replacement);

        let mut changed = program.clone();
        changed.set(slot, replacement);
        prop_assert_ne!(program.signature(), changed.signature());
    }
}
