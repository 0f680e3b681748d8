//! Event loop boundary
//!
//! The filesystem never calls back into user code from an engine's
//! completion context directly. Every native callback is wrapped with
//! [`EventLoop::task_callback`], which reschedules it as a loop task, so
//! continuations run from the loop's own queue.
//!
//! The one exception is a callback the engine drops without invoking: its
//! completion rejects with `ECANCELED` immediately, on the stack that
//! dropped it. Scheduling from there is not always possible, for example
//! while the runtime is tearing down its tasks.

mod compio_loop;
mod manual;

pub use compio_loop::CompioLoop;
pub use manual::ManualLoop;

use crate::engine::{Engine, NativeCallback};

/// A unit of work queued on the loop
pub type Task = Box<dyn FnOnce()>;

/// Host event loop
///
/// Supplies the engine used as native dispatch context and a way to run
/// work later on the loop thread.
pub trait EventLoop: Clone + 'static {
    /// Engine native calls are submitted to
    type Engine: Engine;

    /// The loop's native dispatch context
    fn engine(&self) -> &Self::Engine;

    /// Queue `task` to run on the loop thread after the current task
    fn schedule(&self, task: Task);

    /// Wrap `f` so that invoking the callback schedules `f` on the loop
    ///
    /// The returned callback can be handed to an engine; its argument is
    /// carried into the scheduled task.
    fn task_callback<A, F>(&self, f: F) -> NativeCallback<A>
    where
        A: 'static,
        F: FnOnce(A) + 'static,
    {
        let event_loop = self.clone();
        Box::new(move |outcome: A| event_loop.schedule(Box::new(move || f(outcome))))
    }
}
