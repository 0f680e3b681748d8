//! Event loop backed by the current compio runtime

use super::{EventLoop, Task};
use crate::engine::UringEngine;

/// Loop that schedules tasks on the current compio runtime
///
/// Must be used from inside a compio runtime (for example a
/// `#[compio::main]` or `#[compio::test]` function); scheduling outside one
/// panics in `compio::runtime::spawn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompioLoop {
    engine: UringEngine,
}

impl CompioLoop {
    /// Create a loop for the current runtime
    #[must_use]
    pub const fn new() -> Self {
        Self {
            engine: UringEngine::new(),
        }
    }
}

impl EventLoop for CompioLoop {
    type Engine = UringEngine;

    fn engine(&self) -> &UringEngine {
        &self.engine
    }

    fn schedule(&self, task: Task) {
        compio::runtime::spawn(async move { task() }).detach();
    }
}
