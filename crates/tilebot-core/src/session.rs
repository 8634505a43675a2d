//! Cooperative search for hosts that cannot block, such as a UI event loop.

use crate::generator::{Clock, Generator, ProgressSink, SystemClock};
use crate::puzzle::{GenerationResult, Outcome};
use rand::rngs::StdRng;
use rand::Rng;
use tracing::info;

/// What a poll found
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    /// Not started, or stopped and already reported
    Idle,
    Running { attempts: usize },
    Finished(GenerationResult),
}

/// A search the host advances a few attempts at a time
pub struct SearchSession<R = StdRng, C = SystemClock, P = ()> {
    generator: Generator<R, C, P>,
    running: bool,
    result: Option<GenerationResult>,
}

impl<R: Rng, C: Clock, P: ProgressSink> SearchSession<R, C, P> {
    pub fn new(generator: Generator<R, C, P>) -> Self {
        Self {
            generator,
            running: false,
            result: None,
        }
    }

    pub fn generator(&self) -> &Generator<R, C, P> {
        &self.generator
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Last finished result, if any
    pub fn result(&self) -> Option<&GenerationResult> {
        self.result.as_ref()
    }

    /// Begin a new search, discarding any previous one
    pub fn start(&mut self) {
        self.generator.reset();
        self.running = true;
        self.result = None;
        info!(seed = self.generator.seed(), "search session started");
    }

    /// Cancel a running search; the result has outcome `stopped`
    pub fn stop(&mut self) -> Option<&GenerationResult> {
        if self.running {
            self.running = false;
            self.result = Some(self.generator.finish(Outcome::Stopped));
        }
        self.result.as_ref()
    }

    /// Make at most `max_iterations` attempts
    pub fn poll(&mut self, max_iterations: usize) -> SessionStatus {
        if !self.running {
            return match &self.result {
                Some(result) => SessionStatus::Finished(result.clone()),
                None => SessionStatus::Idle,
            };
        }
        for _ in 0..max_iterations {
            if let Some(result) = self.generator.step() {
                self.running = false;
                self.result = Some(result.clone());
                return SessionStatus::Finished(result);
            }
        }
        SessionStatus::Running {
            attempts: self.generator.attempts(),
        }
    }
}
