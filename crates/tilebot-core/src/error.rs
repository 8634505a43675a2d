//! Rejection kinds and error types.

use crate::{FunctionName, Position};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a candidate program was rejected.
///
/// These are search control data: they pick the repair strategy and are
/// tallied for diagnostics. They never abort a generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Boundary,
    Coverage,
    Loop,
    MinTiles,
    MinBoundingBox,
    MinTurns,
    Density,
    MinStackDepth,
    MinSelfCalls,
    PathTraceRatio,
    MinPathLength,
    MinConditionals,
    MinPaintRevisits,
    UnnecessaryPaint,
    Other,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 15] = [
        ErrorKind::Boundary,
        ErrorKind::Coverage,
        ErrorKind::Loop,
        ErrorKind::MinTiles,
        ErrorKind::MinBoundingBox,
        ErrorKind::MinTurns,
        ErrorKind::Density,
        ErrorKind::MinStackDepth,
        ErrorKind::MinSelfCalls,
        ErrorKind::PathTraceRatio,
        ErrorKind::MinPathLength,
        ErrorKind::MinConditionals,
        ErrorKind::MinPaintRevisits,
        ErrorKind::UnnecessaryPaint,
        ErrorKind::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Boundary => "boundary",
            ErrorKind::Coverage => "coverage",
            ErrorKind::Loop => "loop",
            ErrorKind::MinTiles => "minTiles",
            ErrorKind::MinBoundingBox => "minBoundingBox",
            ErrorKind::MinTurns => "minTurns",
            ErrorKind::Density => "density",
            ErrorKind::MinStackDepth => "minStackDepth",
            ErrorKind::MinSelfCalls => "minSelfCalls",
            ErrorKind::PathTraceRatio => "pathTraceRatio",
            ErrorKind::MinPathLength => "minPathLength",
            ErrorKind::MinConditionals => "minConditionals",
            ErrorKind::MinPaintRevisits => "minPaintRevisits",
            ErrorKind::UnnecessaryPaint => "unnecessaryPaint",
            ErrorKind::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Faults inside a single interpreter run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("start position {0} is not on a tile")]
    StartOnVoid(Position),

    #[error("robot stepped onto void at {0}")]
    Fell(Position),

    #[error("function {0} has no slots")]
    EmptyEntry(FunctionName),
}

/// Invalid simulation configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("f1 must have at least one slot")]
    NoEntrySlots,

    #[error("{function} has {slots} slots, at most {max} allowed")]
    TooManySlots {
        function: FunctionName,
        slots: usize,
        max: usize,
    },

    #[error("{field} must be at least {min}")]
    TooSmall { field: &'static str, min: usize },

    #[error("{field} must be a percentage in 0..=100, got {value}")]
    NotAPercentage { field: &'static str, value: f64 },

    #[error("{field} must be finite and non-negative, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("{0} weights must not all be zero")]
    ZeroWeights(&'static str),

    #[error("maxUnnecessaryPaints must be -1 or more, got {0}")]
    UnnecessaryPaintLimit(i32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
