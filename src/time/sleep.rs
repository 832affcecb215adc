//! Cancel-aware sleeping on the virtual clock.

use crate::error::{Error, ErrorKind};
use crate::runtime::scheduler::{self, CoreHandle};
use crate::runtime::ScheduledHandle;
use crate::types::Time;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

/// Suspends the current task for `duration` of virtual time.
///
/// A zero duration still suspends once, which makes `sleep(ZERO)` the
/// canonical "give the dispatcher a turn" suspension point. Every poll
/// is a cancellation point.
#[must_use]
pub fn sleep(duration: Duration) -> Sleep {
    Sleep {
        duration,
        state: SleepState::Idle,
    }
}

/// Future returned by [`sleep`].
pub struct Sleep {
    duration: Duration,
    state: SleepState,
}

enum SleepState {
    Idle,
    Armed {
        deadline: Time,
        core: CoreHandle,
        timer: ScheduledHandle,
        waker: Rc<RefCell<Option<Waker>>>,
    },
    Done,
}

impl Future for Sleep {
    type Output = Result<(), Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(message) = scheduler::take_pending_cancel() {
            return Poll::Ready(Err(Error::cancelled(message)));
        }
        if matches!(self.state, SleepState::Done) {
            return Poll::Ready(Ok(()));
        }
        if matches!(self.state, SleepState::Idle) {
            let Some(current) = scheduler::current() else {
                return Poll::Ready(Err(Error::new(ErrorKind::NotInTask)
                    .with_message("sleep must be polled from within a runtime task")));
            };
            let deadline = current.core.now().saturating_add(self.duration);
            let waker = Rc::new(RefCell::new(Some(cx.waker().clone())));
            let slot = Rc::clone(&waker);
            let timer = current.core.schedule_at(
                deadline,
                Box::new(move || {
                    if let Some(waker) = slot.borrow_mut().take() {
                        waker.wake();
                    }
                }),
            );
            self.state = SleepState::Armed {
                deadline,
                core: current.core.handle(),
                timer,
                waker,
            };
            return Poll::Pending;
        }

        let (deadline, core, waker) = match &self.state {
            SleepState::Armed {
                deadline,
                core,
                waker,
                ..
            } => (*deadline, core.clone(), Rc::clone(waker)),
            SleepState::Idle | SleepState::Done => return Poll::Pending,
        };
        match core.upgrade() {
            Some(core) if core.now() >= deadline => {
                self.state = SleepState::Done;
                Poll::Ready(Ok(()))
            }
            Some(_) => {
                *waker.borrow_mut() = Some(cx.waker().clone());
                Poll::Pending
            }
            None => Poll::Pending,
        }
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let SleepState::Armed { timer, .. } = &self.state {
            timer.cancel();
        }
    }
}
