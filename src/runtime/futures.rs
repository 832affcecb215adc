//! Small leaf futures provided by the runtime.
//!
//! Both futures here are suspension points: each poll first consumes the
//! current task's pending-cancel flag, so a requested cancellation is
//! observed the next time the task touches the runtime.

use crate::error::Error;
use crate::runtime::scheduler;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future that yields execution back to the runtime once.
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = Result<(), Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(message) = scheduler::take_pending_cancel() {
            return Poll::Ready(Err(Error::cancelled(message)));
        }
        if self.yielded {
            Poll::Ready(Ok(()))
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

/// Yields execution back to the runtime, allowing other tasks and
/// dispatcher callbacks to run.
#[must_use]
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future that never completes on its own; it resolves only when the
/// task is cancelled.
pub struct Pending<T> {
    _marker: PhantomData<T>,
}

impl<T> Future for Pending<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match scheduler::take_pending_cancel() {
            Some(message) => Poll::Ready(Err(Error::cancelled(message))),
            None => Poll::Pending,
        }
    }
}

/// Waits forever. The only way out is cancellation of the waiting task.
#[must_use]
pub fn pending<T>() -> Pending<T> {
    Pending {
        _marker: PhantomData,
    }
}
