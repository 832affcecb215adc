//! One-shot event signal.
//!
//! [`Event`] latches on the first [`set`](Event::set) and stays set.
//! Tasks observe it two ways:
//!
//! - `wait().await`: cancel-safe suspension until the event is set.
//! - Subscriptions (crate-internal, used by the event trigger): a
//!   callback attached directly to the event's notification list. No
//!   task is spawned on behalf of a subscription; `set` hands each live
//!   subscription to the dispatcher, so callbacks always fire from event
//!   dispatch, never synchronously inside `set`.

use crate::error::Error;
use crate::runtime::scheduler::{self, Callback, CoreHandle};
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

struct Waiter {
    key: u64,
    waker: Waker,
}

struct Subscriber {
    key: u64,
    armed: Rc<Cell<bool>>,
    core: CoreHandle,
    deliver: Callback,
}

#[derive(Default)]
struct EventInner {
    set: Cell<bool>,
    next_key: Cell<u64>,
    waiters: RefCell<SmallVec<[Waiter; 4]>>,
    subscribers: RefCell<SmallVec<[Subscriber; 2]>>,
}

impl EventInner {
    fn next_key(&self) -> u64 {
        let key = self.next_key.get();
        self.next_key.set(key + 1);
        key
    }
}

/// A one-shot signal shared between tasks.
///
/// Cloning is cheap; clones observe the same signal.
#[derive(Clone, Default)]
pub struct Event {
    inner: Rc<EventInner>,
}

impl Event {
    /// Creates an unset event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once the event has been set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.inner.set.get()
    }

    /// Sets the event. Idempotent: only the first call wakes waiters
    /// and dispatches subscriptions.
    pub fn set(&self) {
        if self.inner.set.replace(true) {
            return;
        }
        let waiters: SmallVec<[Waiter; 4]> = self.inner.waiters.borrow_mut().drain(..).collect();
        for waiter in waiters {
            waiter.waker.wake();
        }
        let subscribers: SmallVec<[Subscriber; 2]> =
            self.inner.subscribers.borrow_mut().drain(..).collect();
        for subscriber in subscribers {
            let Some(core) = subscriber.core.upgrade() else {
                continue;
            };
            let armed = subscriber.armed;
            let deliver = subscriber.deliver;
            let _ = core.schedule_soon(Box::new(move || {
                if armed.get() {
                    deliver();
                }
            }));
        }
    }

    /// Waits until the event is set. Cancel-safe: a cancelled waiter
    /// leaves no entry behind.
    #[must_use]
    pub fn wait(&self) -> EventWait {
        EventWait {
            inner: Rc::clone(&self.inner),
            key: None,
        }
    }

    /// Attaches a one-shot callback to the event's notification list.
    ///
    /// The callback is handed to the dispatcher when the event is set
    /// (or on the next step, when the event is already set) and is gated
    /// by the subscription's armed flag right up to the moment it runs.
    ///
    /// # Panics
    ///
    /// Panics when called outside a running runtime task.
    pub(crate) fn subscribe(&self, deliver: Callback) -> EventSubscription {
        let current =
            scheduler::current().expect("event subscription requires a running runtime task");
        let key = self.inner.next_key();
        let armed = Rc::new(Cell::new(true));
        if self.inner.set.get() {
            let gate = Rc::clone(&armed);
            let _ = current.core.schedule_soon(Box::new(move || {
                if gate.get() {
                    deliver();
                }
            }));
        } else {
            self.inner.subscribers.borrow_mut().push(Subscriber {
                key,
                armed: Rc::clone(&armed),
                core: current.core.handle(),
                deliver,
            });
        }
        EventSubscription {
            key,
            armed,
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event").field("set", &self.is_set()).finish()
    }
}

/// Live registration of a subscription callback. Disarming is idempotent
/// and effective even after the callback has been handed to the
/// dispatcher but before it has run.
pub(crate) struct EventSubscription {
    key: u64,
    armed: Rc<Cell<bool>>,
    inner: Weak<EventInner>,
}

impl EventSubscription {
    pub(crate) fn disarm(&mut self) {
        self.armed.set(false);
        if let Some(inner) = self.inner.upgrade() {
            inner
                .subscribers
                .borrow_mut()
                .retain(|subscriber| subscriber.key != self.key);
        }
    }
}

/// Future returned by [`Event::wait`].
pub struct EventWait {
    inner: Rc<EventInner>,
    key: Option<u64>,
}

impl Future for EventWait {
    type Output = Result<(), Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(message) = scheduler::take_pending_cancel() {
            return Poll::Ready(Err(Error::cancelled(message)));
        }
        if self.inner.set.get() {
            self.remove_waiter();
            return Poll::Ready(Ok(()));
        }
        let waker = cx.waker().clone();
        match self.key {
            Some(key) => {
                let mut waiters = self.inner.waiters.borrow_mut();
                if let Some(waiter) = waiters.iter_mut().find(|waiter| waiter.key == key) {
                    waiter.waker = waker;
                } else {
                    waiters.push(Waiter { key, waker });
                }
            }
            None => {
                let key = self.inner.next_key();
                self.inner.waiters.borrow_mut().push(Waiter { key, waker });
                self.key = Some(key);
            }
        }
        Poll::Pending
    }
}

impl EventWait {
    fn remove_waiter(&mut self) {
        if let Some(key) = self.key.take() {
            self.inner
                .waiters
                .borrow_mut()
                .retain(|waiter| waiter.key != key);
        }
    }
}

impl Drop for EventWait {
    fn drop(&mut self) {
        self.remove_waiter();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{spawn, yield_now, Runtime};
    use crate::test_utils::init_test_logging;
    use std::time::Duration;

    #[test]
    fn wait_completes_when_event_is_set() {
        init_test_logging();
        crate::test_phase!("wait_completes_when_event_is_set");
        Runtime::new().block_on(async {
            let event = Event::new();
            let waiter = {
                let event = event.clone();
                spawn(async move { event.wait().await })
            };
            crate::time::sleep(Duration::from_millis(1)).await.expect("sleep");
            assert!(!waiter.is_finished());
            event.set();
            let outcome = waiter.await.expect("join");
            assert_eq!(outcome, Ok(()));
        });
        crate::test_complete!("wait_completes_when_event_is_set");
    }

    #[test]
    fn wait_on_set_event_returns_immediately() {
        init_test_logging();
        crate::test_phase!("wait_on_set_event_returns_immediately");
        Runtime::new().block_on(async {
            let event = Event::new();
            event.set();
            event.set(); // idempotent
            assert!(event.is_set());
            event.wait().await.expect("already set");
        });
        crate::test_complete!("wait_on_set_event_returns_immediately");
    }

    #[test]
    fn subscription_fires_from_the_dispatcher() {
        init_test_logging();
        crate::test_phase!("subscription_fires_from_the_dispatcher");
        Runtime::new().block_on(async {
            let event = Event::new();
            let fired = Rc::new(Cell::new(false));
            let flag = Rc::clone(&fired);
            let _subscription = event.subscribe(Box::new(move || flag.set(true)));
            event.set();
            // Not synchronous: the callback waits for the next step.
            assert!(!fired.get());
            yield_now().await.expect("yield");
            assert!(fired.get());
        });
        crate::test_complete!("subscription_fires_from_the_dispatcher");
    }

    #[test]
    fn disarm_blocks_delivery_even_after_set() {
        init_test_logging();
        crate::test_phase!("disarm_blocks_delivery_even_after_set");
        Runtime::new().block_on(async {
            let event = Event::new();
            let fired = Rc::new(Cell::new(false));
            let flag = Rc::clone(&fired);
            let mut subscription = event.subscribe(Box::new(move || flag.set(true)));
            event.set();
            subscription.disarm();
            subscription.disarm(); // idempotent
            yield_now().await.expect("yield");
            assert!(!fired.get(), "disarmed subscription must not fire");
        });
        crate::test_complete!("disarm_blocks_delivery_even_after_set");
    }

    #[test]
    fn subscription_on_already_set_event_fires_deferred() {
        init_test_logging();
        crate::test_phase!("subscription_on_already_set_event_fires_deferred");
        Runtime::new().block_on(async {
            let event = Event::new();
            event.set();
            let fired = Rc::new(Cell::new(false));
            let flag = Rc::clone(&fired);
            let _subscription = event.subscribe(Box::new(move || flag.set(true)));
            assert!(!fired.get());
            yield_now().await.expect("yield");
            assert!(fired.get());
        });
        crate::test_complete!("subscription_on_already_set_event_fires_deferred");
    }
}
