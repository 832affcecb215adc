//! The guard future: scoped acquisition of a fence around a body.

use crate::error::Error;
use crate::fence::Fence;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future returned by [`Fence::guard`].
///
/// Enters the fence on first poll and settles it when the body finishes.
/// Dropping the guard mid-flight is a legitimate exit path (a surrounding
/// [`timeout`](crate::time::timeout) may drop it): the drop handler
/// disarms every trigger handle, rescinds or balances the scheduled
/// interruption, and claims back an undelivered pending cancel so
/// nothing from this fence can strike later code on the task.
pub struct Guard<'a, F> {
    fence: &'a mut Fence,
    body: Pin<Box<F>>,
    entered: bool,
    finished: bool,
}

impl<'a, F> Guard<'a, F> {
    pub(crate) fn new(fence: &'a mut Fence, body: F) -> Self {
        Self {
            fence,
            body: Box::pin(body),
            entered: false,
            finished: false,
        }
    }
}

impl<F, T> Future for Guard<'_, F>
where
    F: Future<Output = Result<T, Error>>,
{
    type Output = Result<Option<T>, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        debug_assert!(!this.finished, "guard polled after completion");
        if !this.entered {
            if let Err(misuse) = this.fence.enter() {
                this.finished = true;
                return Poll::Ready(Err(misuse));
            }
            this.entered = true;
        }
        match this.body.as_mut().poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(output) => {
                this.finished = true;
                let suppress = this.fence.settle(output.as_ref().err());
                Poll::Ready(match output {
                    Ok(value) => Ok(Some(value)),
                    Err(_) if suppress => Ok(None),
                    Err(error) => Err(error),
                })
            }
        }
    }
}

impl<F> Drop for Guard<'_, F> {
    fn drop(&mut self) {
        if self.entered && !self.finished {
            self.fence.settle_on_drop();
        }
    }
}
