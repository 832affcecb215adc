//! The runtime's native single-deadline scope.
//!
//! [`timeout`] is drop-based: when the deadline passes, the wrapped
//! future is dropped and the call resolves to a
//! [`DeadlineExceeded`](crate::ErrorKind::DeadlineExceeded) error. It
//! makes no use of the task cancellation counter, which is what lets
//! counter-based scopes nest inside it (their drop path re-balances the
//! counter) and around it (the error passes through them untouched).

use crate::error::{Error, ErrorKind};
use crate::time::sleep::{sleep, Sleep};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

/// Runs `future` under a deadline of `duration` virtual time.
///
/// Resolves to the future's own output when it finishes in time, and to
/// a `DeadlineExceeded` error otherwise. The deadline check is itself a
/// suspension point: cancellation of the surrounding task is observed
/// here even when the wrapped future never touches the runtime.
#[must_use]
pub fn timeout<F, T>(duration: Duration, future: F) -> Timeout<F>
where
    F: Future<Output = Result<T, Error>>,
{
    Timeout {
        duration,
        sleep: sleep(duration),
        body: Box::pin(future),
    }
}

/// Future returned by [`timeout`].
pub struct Timeout<F> {
    duration: Duration,
    sleep: Sleep,
    body: Pin<Box<F>>,
}

impl<F, T> Future for Timeout<F>
where
    F: Future<Output = Result<T, Error>>,
{
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Poll::Ready(output) = this.body.as_mut().poll(cx) {
            return Poll::Ready(output);
        }
        match Pin::new(&mut this.sleep).poll(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(Err(Error::new(ErrorKind::DeadlineExceeded)
                .with_message(format!(
                    "timed out after {}s",
                    this.duration.as_secs_f64()
                )))),
            Poll::Ready(Err(error)) => Poll::Ready(Err(error)),
            Poll::Pending => Poll::Pending,
        }
    }
}
