//! Step-by-step replay of a player's program on a finished puzzle.

use crate::error::ExecError;
use crate::interpreter::{Machine, NoTiles, RunOptions, Step, Termination};
use crate::puzzle::Puzzle;
use crate::{Grid, Pose, Position, Program, SlotId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Where a replay stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "position")]
pub enum PlayStatus {
    Running,
    /// Every star collected
    Won,
    /// Walked onto a cell with no tile
    Fell(Position),
    /// Walked off the edge of the board
    OutOfBounds,
    /// Came back to the start pose
    Looped,
    /// Ran out of steps with stars left
    OutOfSteps,
}

impl PlayStatus {
    pub fn is_over(self) -> bool {
        self != PlayStatus::Running
    }
}

/// A program running on a puzzle board, one instruction at a time
pub struct Playback<'p> {
    machine: Machine<'p>,
    stars: BTreeSet<Position>,
    collected: Vec<Position>,
    status: PlayStatus,
}

impl<'p> Playback<'p> {
    /// Replay without loop detection
    pub fn new(puzzle: &Puzzle, program: &'p Program, max_steps: usize) -> Result<Self, ExecError> {
        let options = RunOptions {
            max_steps,
            loop_check: false,
            early_exit: None,
            suppressed_paints: BTreeSet::new(),
            recent_forward_window: 0,
        };
        Self::with_options(puzzle, program, options)
    }

    pub fn with_options(puzzle: &Puzzle, program: &'p Program, options: RunOptions) -> Result<Self, ExecError> {
        let machine = Machine::new(program, puzzle.grid.without_stars(), puzzle.robot_start, options)?;
        Ok(Self {
            machine,
            stars: puzzle.grid.stars().into_iter().collect(),
            collected: Vec::new(),
            status: PlayStatus::Running,
        })
    }

    pub fn status(&self) -> PlayStatus {
        self.status
    }

    pub fn pose(&self) -> Pose {
        self.machine.pose()
    }

    /// Board as the robot sees it, including paint
    pub fn grid(&self) -> &Grid {
        self.machine.grid()
    }

    pub fn stars_remaining(&self) -> &BTreeSet<Position> {
        &self.stars
    }

    /// Stars in the order they were picked up
    pub fn collected(&self) -> &[Position] {
        &self.collected
    }

    pub fn steps(&self) -> usize {
        self.machine.trace().steps
    }

    /// Slot about to run, for highlighting
    pub fn next_slot(&self) -> Option<SlotId> {
        self.machine.next_slot()
    }

    /// Advance until one instruction executes or the replay ends
    pub fn step(&mut self) -> PlayStatus {
        while !self.status.is_over() {
            match self.machine.step(&mut NoTiles) {
                Ok(Step::Skipped) => continue,
                Ok(Step::Executed { .. }) => {
                    self.collect();
                    break;
                }
                Ok(Step::Halted(termination)) => {
                    self.collect();
                    if !self.status.is_over() {
                        self.status = match termination {
                            Termination::Boundary { .. } => PlayStatus::OutOfBounds,
                            Termination::Loop { .. } => PlayStatus::Looped,
                            Termination::Success | Termination::BudgetExhausted => PlayStatus::OutOfSteps,
                        };
                    }
                }
                Err(ExecError::Fell(position)) => self.status = PlayStatus::Fell(position),
                Err(_) => self.status = PlayStatus::OutOfSteps,
            }
        }
        self.status
    }

    /// Step until the replay ends
    pub fn run(&mut self) -> PlayStatus {
        while !self.step().is_over() {}
        self.status
    }

    fn collect(&mut self) {
        let here = self.machine.pose().position;
        if self.stars.remove(&here) {
            self.collected.push(here);
            if self.stars.is_empty() {
                self.status = PlayStatus::Won;
            }
        }
    }
}
