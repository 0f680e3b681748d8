//! Explicitly driven event loop

use super::{EventLoop, Task};
use crate::engine::Engine;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Loop whose task queue is drained only by [`ManualLoop::run_until_idle`]
///
/// Pairs with [`crate::MemoryEngine`] to make every interleaving
/// reproducible: nothing runs until the test says so, and tasks run in
/// FIFO order.
pub struct ManualLoop<E> {
    engine: Rc<E>,
    queue: Rc<RefCell<VecDeque<Task>>>,
}

impl<E> Clone for ManualLoop<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Rc::clone(&self.engine),
            queue: Rc::clone(&self.queue),
        }
    }
}

impl<E> std::fmt::Debug for ManualLoop<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualLoop")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl<E> ManualLoop<E> {
    /// Create a loop around `engine` with an empty queue
    #[must_use]
    pub fn new(engine: E) -> Self {
        Self {
            engine: Rc::new(engine),
            queue: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Number of queued tasks
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Run one queued task; `false` if the queue was empty
    pub fn run_once(&self) -> bool {
        let task = self.queue.borrow_mut().pop_front();
        task.map(|task| task()).is_some()
    }

    /// Run queued tasks, including ones they schedule, until none remain
    ///
    /// Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_once() {
            ran += 1;
        }
        ran
    }
}

impl<E: Engine> EventLoop for ManualLoop<E> {
    type Engine = E;

    fn engine(&self) -> &E {
        &self.engine
    }

    fn schedule(&self, task: Task) {
        self.queue.borrow_mut().push_back(task);
    }
}
