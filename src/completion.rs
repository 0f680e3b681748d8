//! Single-assignment completion cells
//!
//! A [`Deferred`] is the write end and a [`Completion`] the read end of a
//! cell that settles exactly once, to either a value or an [`IoError`].
//! Observers either attach continuations with [`Completion::on_settled`] or
//! await the completion as a future; both see the same outcome.
//!
//! Cells are `!Send`: they are created, settled and observed on the loop
//! thread.
//!
//! # Examples
//!
//! ```rust
//! use ringfs::{Deferred, ErrorMapper};
//! use futures::FutureExt;
//!
//! let mapper = ErrorMapper::new(ringfs_uring::status::strerror);
//! let (deferred, completion) = Deferred::new(mapper);
//! deferred.resolve(7u32);
//! assert_eq!(completion.now_or_never(), Some(Ok(7)));
//! ```

use crate::error::{ErrorMapper, IoError, Result};
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Continuation run with the settled outcome
type Continuation<T> = Box<dyn FnOnce(&Result<T>)>;

enum State<T> {
    Pending {
        continuations: Vec<Continuation<T>>,
        wakers: Vec<Waker>,
    },
    Settled(Rc<Result<T>>),
}

impl<T> State<T> {
    fn settled(&self) -> Option<Rc<Result<T>>> {
        match self {
            Self::Pending { .. } => None,
            Self::Settled(result) => Some(Rc::clone(result)),
        }
    }
}

/// Read end of a single-assignment cell
///
/// Cloning yields another handle to the same cell.
pub struct Completion<T> {
    state: Rc<RefCell<State<T>>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<T> Completion<T> {
    /// Whether the cell has been settled
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(&*self.state.borrow(), State::Settled(_))
    }
}

impl<T: 'static> Completion<T> {
    /// Run `continuation` once the cell settles
    ///
    /// If the cell is already settled the continuation runs immediately, on
    /// the caller's stack. Continuations attached while pending run in
    /// attachment order when the cell settles.
    pub fn on_settled<F>(&self, continuation: F)
    where
        F: FnOnce(&Result<T>) + 'static,
    {
        let settled = self.state.borrow().settled();
        if let Some(result) = settled {
            continuation(&result);
            return;
        }
        if let State::Pending { continuations, .. } = &mut *self.state.borrow_mut() {
            continuations.push(Box::new(continuation));
        }
    }
}

impl<T: Clone + 'static> Completion<T> {
    /// The outcome, if the cell has settled
    #[must_use]
    pub fn try_result(&self) -> Option<Result<T>> {
        self.state.borrow().settled().map(|result| (*result).clone())
    }
}

impl<T: Clone + 'static> Future for Completion<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let settled = self.state.borrow().settled();
        if let Some(result) = settled {
            return Poll::Ready((*result).clone());
        }
        if let State::Pending { wakers, .. } = &mut *self.state.borrow_mut() {
            if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                wakers.push(cx.waker().clone());
            }
        }
        Poll::Pending
    }
}

/// Write end of a single-assignment cell
///
/// Settling consumes the `Deferred`, so a cell can only settle once. A
/// `Deferred` dropped without settling rejects its cell with `ECANCELED`,
/// so every completion eventually settles even if the party holding the
/// write end goes away. That rejection, and any continuation attached by
/// then, runs on the stack doing the drop, not as a loop task.
pub struct Deferred<T> {
    state: Option<Rc<RefCell<State<T>>>>,
    mapper: ErrorMapper,
}

impl<T> Deferred<T> {
    /// Create a pending cell, returning both ends
    #[must_use]
    pub fn new(mapper: ErrorMapper) -> (Self, Completion<T>) {
        let state = Rc::new(RefCell::new(State::Pending {
            continuations: Vec::new(),
            wakers: Vec::new(),
        }));
        let completion = Completion {
            state: Rc::clone(&state),
        };
        (
            Self {
                state: Some(state),
                mapper,
            },
            completion,
        )
    }

    /// Settle with a value
    pub fn resolve(mut self, value: T) {
        if let Some(state) = self.state.take() {
            settle(&state, Ok(value));
        }
    }

    /// Settle with an error
    pub fn reject(mut self, error: IoError) {
        if let Some(state) = self.state.take() {
            settle(&state, Err(error));
        }
    }

    /// Settle with `result`
    pub fn settle(self, result: Result<T>) {
        match result {
            Ok(value) => self.resolve(value),
            Err(error) => self.reject(error),
        }
    }
}

impl<T> Drop for Deferred<T> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            settle(&state, Err(self.mapper.from_status(-libc::ECANCELED)));
        }
    }
}

fn settle<T>(cell: &RefCell<State<T>>, result: Result<T>) {
    let result = Rc::new(result);
    let previous = std::mem::replace(&mut *cell.borrow_mut(), State::Settled(Rc::clone(&result)));
    let State::Pending {
        continuations,
        wakers,
    } = previous
    else {
        return;
    };
    for continuation in continuations {
        continuation(&result);
    }
    for waker in wakers {
        waker.wake();
    }
}
