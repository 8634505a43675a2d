//! Procedural puzzle synthesis for a tile-walking robot.
//!
//! A puzzle is a board of coloured tiles with stars on it, plus a set of
//! short functions the player fills with instructions. [`Generator`] finds
//! puzzles by running random programs on an empty board that grows tiles
//! wherever the robot walks, keeping the first program whose trace passes
//! every difficulty check in [`SimulationConfig`].

pub mod config;
pub mod error;
pub mod evaluator;
pub mod generator;
pub mod grid;
pub mod interpreter;
pub mod playback;
pub mod program;
pub mod puzzle;
pub mod session;
pub mod types;

pub use config::{ColorRatios, InstructionWeights, SimulationConfig, SlotsPerFunction};
pub use error::{ConfigError, ErrorKind, ExecError};
pub use evaluator::{Metrics, Violation};
pub use generator::{Generator, SearchOptions};
pub use grid::Grid;
pub use interpreter::{execute, Machine, Run, RunOptions, Termination};
pub use playback::{PlayStatus, Playback};
pub use program::{FunctionName, Instruction, InstructionKind, Program, SlotId};
pub use puzzle::{verify_solution, GenerationResult, Outcome, Puzzle, VerifyError};
pub use session::{SearchSession, SessionStatus};
pub use types::{Color, Direction, Pose, Position, Tile};
