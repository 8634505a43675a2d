//! Difficulty configuration for puzzle synthesis.

use crate::error::{ConfigError, ConfigResult};
use crate::{Color, FunctionName};
use serde::{Deserialize, Serialize};

/// Largest slot count a single function may have
pub const MAX_SLOTS_PER_FUNCTION: usize = 32;

/// Slot count of each function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlotsPerFunction {
    pub f1: usize,
    pub f2: usize,
    pub f3: usize,
    pub f4: usize,
    pub f5: usize,
}

impl SlotsPerFunction {
    pub fn from_fn(mut f: impl FnMut(FunctionName) -> usize) -> Self {
        Self {
            f1: f(FunctionName::F1),
            f2: f(FunctionName::F2),
            f3: f(FunctionName::F3),
            f4: f(FunctionName::F4),
            f5: f(FunctionName::F5),
        }
    }

    pub fn get(&self, function: FunctionName) -> usize {
        match function {
            FunctionName::F1 => self.f1,
            FunctionName::F2 => self.f2,
            FunctionName::F3 => self.f3,
            FunctionName::F4 => self.f4,
            FunctionName::F5 => self.f5,
        }
    }

    pub fn total(&self) -> usize {
        FunctionName::ALL.iter().map(|f| self.get(*f)).sum()
    }
}

/// Relative frequency of each colour for newly placed tiles
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorRatios {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

impl ColorRatios {
    pub fn get(&self, color: Color) -> f64 {
        match color {
            Color::Red => self.red,
            Color::Green => self.green,
            Color::Blue => self.blue,
        }
    }
}

impl Default for ColorRatios {
    fn default() -> Self {
        Self {
            red: 1.0,
            green: 1.0,
            blue: 1.0,
        }
    }
}

/// Relative frequency of each instruction family in fresh programs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionWeights {
    pub forward: f64,
    pub turn: f64,
    pub function_call: f64,
    pub paint: f64,
}

impl Default for InstructionWeights {
    fn default() -> Self {
        Self {
            forward: 4.0,
            turn: 2.0,
            function_call: 1.0,
            paint: 0.5,
        }
    }
}

/// Every tunable threshold of a generation run. Immutable for the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    pub slots_per_function: SlotsPerFunction,
    /// Executed-instruction budget of one interpreter run
    pub max_steps: usize,
    /// Width and height of the square grid
    pub grid_size: usize,
    pub color_ratios: ColorRatios,
    pub min_coverage_percent: f64,
    /// Chance (0..=100) that a freshly generated slot gets a colour condition
    pub conditional_percent: f64,
    pub instruction_weights: InstructionWeights,
    pub min_tiles: usize,
    pub min_bounding_box: usize,
    pub min_turns: usize,
    pub max_dense_tiles: usize,
    /// Early-exit threshold on executed steps per slot
    pub max_avg_executions_per_slot: f64,
    pub min_stack_depth: usize,
    pub min_self_calls: usize,
    /// Clear the dedupe memo every this many attempts (0 never clears)
    pub auto_restart_after: usize,
    pub min_path_trace_ratio: f64,
    pub disable_loop_check: bool,
    pub min_path_length: usize,
    pub min_conditionals: usize,
    pub min_paint_revisits: usize,
    /// -1 disables the paint necessity check
    pub max_unnecessary_paints: i32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::medium()
    }
}

impl SimulationConfig {
    pub fn easy() -> Self {
        Self {
            slots_per_function: SlotsPerFunction {
                f1: 5,
                f2: 3,
                ..SlotsPerFunction::default()
            },
            max_steps: 150,
            grid_size: 10,
            color_ratios: ColorRatios::default(),
            min_coverage_percent: 80.0,
            conditional_percent: 15.0,
            instruction_weights: InstructionWeights::default(),
            min_tiles: 6,
            min_bounding_box: 3,
            min_turns: 2,
            max_dense_tiles: 6,
            max_avg_executions_per_slot: 8.0,
            min_stack_depth: 1,
            min_self_calls: 0,
            auto_restart_after: 1500,
            min_path_trace_ratio: 0.0,
            disable_loop_check: false,
            min_path_length: 6,
            min_conditionals: 0,
            min_paint_revisits: 0,
            max_unnecessary_paints: -1,
        }
    }

    pub fn medium() -> Self {
        Self {
            slots_per_function: SlotsPerFunction {
                f1: 6,
                f2: 4,
                ..SlotsPerFunction::default()
            },
            max_steps: 250,
            grid_size: 12,
            conditional_percent: 25.0,
            min_tiles: 10,
            min_bounding_box: 4,
            min_turns: 3,
            max_dense_tiles: 4,
            max_avg_executions_per_slot: 6.0,
            min_stack_depth: 2,
            auto_restart_after: 2000,
            min_path_trace_ratio: 0.5,
            min_path_length: 10,
            min_conditionals: 1,
            ..Self::easy()
        }
    }

    pub fn hard() -> Self {
        Self {
            slots_per_function: SlotsPerFunction {
                f1: 6,
                f2: 5,
                f3: 4,
                ..SlotsPerFunction::default()
            },
            max_steps: 400,
            grid_size: 14,
            min_coverage_percent: 90.0,
            conditional_percent: 35.0,
            instruction_weights: InstructionWeights {
                paint: 1.0,
                ..InstructionWeights::default()
            },
            min_tiles: 16,
            min_bounding_box: 6,
            min_turns: 5,
            max_dense_tiles: 3,
            min_stack_depth: 3,
            min_self_calls: 1,
            auto_restart_after: 3000,
            min_path_trace_ratio: 1.0,
            min_path_length: 16,
            min_conditionals: 2,
            min_paint_revisits: 1,
            max_unnecessary_paints: 0,
            ..Self::medium()
        }
    }

    /// Look up a named preset
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "easy" => Some(Self::easy()),
            "medium" => Some(Self::medium()),
            "hard" => Some(Self::hard()),
            _ => None,
        }
    }

    pub fn total_slots(&self) -> usize {
        self.slots_per_function.total()
    }

    /// Check every field is usable before a run starts
    pub fn validate(&self) -> ConfigResult<()> {
        if self.slots_per_function.f1 == 0 {
            return Err(ConfigError::NoEntrySlots);
        }
        for function in FunctionName::ALL {
            let slots = self.slots_per_function.get(function);
            if slots > MAX_SLOTS_PER_FUNCTION {
                return Err(ConfigError::TooManySlots {
                    function,
                    slots,
                    max: MAX_SLOTS_PER_FUNCTION,
                });
            }
        }
        if self.grid_size == 0 {
            return Err(ConfigError::TooSmall {
                field: "gridSize",
                min: 1,
            });
        }
        if self.max_steps == 0 {
            return Err(ConfigError::TooSmall {
                field: "maxSteps",
                min: 1,
            });
        }
        for (field, value) in [
            ("minCoveragePercent", self.min_coverage_percent),
            ("conditionalPercent", self.conditional_percent),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::NotAPercentage { field, value });
            }
        }
        for (field, value) in [
            ("colorRatios.red", self.color_ratios.red),
            ("colorRatios.green", self.color_ratios.green),
            ("colorRatios.blue", self.color_ratios.blue),
            ("instructionWeights.forward", self.instruction_weights.forward),
            ("instructionWeights.turn", self.instruction_weights.turn),
            ("instructionWeights.functionCall", self.instruction_weights.function_call),
            ("instructionWeights.paint", self.instruction_weights.paint),
            ("maxAvgExecutionsPerSlot", self.max_avg_executions_per_slot),
            ("minPathTraceRatio", self.min_path_trace_ratio),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Negative { field, value });
            }
        }
        let ratios = self.color_ratios;
        if ratios.red + ratios.green + ratios.blue <= 0.0 {
            return Err(ConfigError::ZeroWeights("colorRatios"));
        }
        let w = self.instruction_weights;
        if w.forward + w.turn + w.function_call + w.paint <= 0.0 {
            return Err(ConfigError::ZeroWeights("instructionWeights"));
        }
        if self.max_unnecessary_paints < -1 {
            return Err(ConfigError::UnnecessaryPaintLimit(self.max_unnecessary_paints));
        }
        Ok(())
    }
}
