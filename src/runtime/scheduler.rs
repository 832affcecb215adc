//! The single-threaded dispatcher.
//!
//! One thread runs everything: task polls, one-shot callbacks, and timer
//! expiries are serialized through a step loop, so no callback ever races
//! another. Each step runs due timers, then the current callback batch,
//! then polls woken tasks. Callbacks scheduled during a step run on the
//! *next* step, which is what "deferred to the next dispatch tick" means
//! throughout the crate.
//!
//! # Cancellation protocol
//!
//! Every task record carries a cancellation-request counter and a
//! pending-cancel flag. [`RuntimeCore::cancel_request`] increments the
//! counter, latches the flag with the requester's message, and wakes the
//! task; the flag is consumed by the first leaf future the task polls,
//! which resolves to a `Cancelled` error. [`RuntimeCore::uncancel_request`]
//! decrements the counter but deliberately does **not** clear the flag:
//! a scope that wants to withdraw a request it already delivered must
//! claim the flag explicitly, which is why interruption delivery is
//! always deferred through the dispatcher where it can still be
//! rescinded.

use crate::runtime::config::RuntimeConfig;
use crate::runtime::task::TaskTable;
use crate::runtime::timer::TimerHeap;
use crate::runtime::waker::WakerState;
use crate::tracing_compat::{error, trace};
use crate::types::{TaskId, Time};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::task::{Context, Poll};

pub(crate) type Callback = Box<dyn FnOnce()>;

/// A scheduled callback, taken out of its slot exactly once: either by
/// the dispatcher when it runs, or by [`ScheduledHandle::cancel`].
pub(crate) struct CallbackSlot {
    callback: RefCell<Option<Callback>>,
}

impl CallbackSlot {
    pub(crate) fn new(callback: Callback) -> Rc<Self> {
        Rc::new(Self {
            callback: RefCell::new(Some(callback)),
        })
    }

    pub(crate) fn take(&self) -> Option<Callback> {
        self.callback.borrow_mut().take()
    }

    /// True once the callback has run or been cancelled.
    pub(crate) fn is_consumed(&self) -> bool {
        self.callback.borrow().is_none()
    }
}

/// Cancellable handle to a one-shot callback scheduled on the dispatcher.
///
/// Cancelling is idempotent and is a no-op once the callback has run.
pub struct ScheduledHandle {
    slot: Rc<CallbackSlot>,
}

impl ScheduledHandle {
    pub(crate) fn new(slot: Rc<CallbackSlot>) -> Self {
        Self { slot }
    }

    /// Prevents the callback from running. No-op if it already ran.
    pub fn cancel(&self) {
        drop(self.slot.take());
    }

    /// True once the callback has run or been cancelled.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.slot.is_consumed()
    }
}

impl std::fmt::Debug for ScheduledHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledHandle")
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

/// Shared state of a running runtime.
pub(crate) struct RuntimeCore {
    config: RuntimeConfig,
    clock: Cell<Time>,
    ready: RefCell<VecDeque<Rc<CallbackSlot>>>,
    timers: RefCell<TimerHeap>,
    tasks: RefCell<TaskTable>,
    woken: Arc<WakerState>,
    steps: Cell<u64>,
}

impl RuntimeCore {
    pub(crate) fn new(config: RuntimeConfig) -> Rc<Self> {
        Rc::new(Self {
            config,
            clock: Cell::new(Time::ZERO),
            ready: RefCell::new(VecDeque::new()),
            timers: RefCell::new(TimerHeap::new()),
            tasks: RefCell::new(TaskTable::new()),
            woken: Arc::new(WakerState::new()),
            steps: Cell::new(0),
        })
    }

    pub(crate) fn handle(self: &Rc<Self>) -> CoreHandle {
        CoreHandle {
            inner: Rc::downgrade(self),
        }
    }

    pub(crate) fn now(&self) -> Time {
        self.clock.get()
    }

    /// Schedules a callback for the next dispatch step.
    pub(crate) fn schedule_soon(&self, callback: Callback) -> ScheduledHandle {
        let slot = CallbackSlot::new(callback);
        self.ready.borrow_mut().push_back(Rc::clone(&slot));
        ScheduledHandle::new(slot)
    }

    /// Schedules a callback to run once the clock reaches `deadline`.
    pub(crate) fn schedule_at(&self, deadline: Time, callback: Callback) -> ScheduledHandle {
        let slot = CallbackSlot::new(callback);
        self.timers.borrow_mut().insert(deadline, Rc::clone(&slot));
        ScheduledHandle::new(slot)
    }

    /// Inserts a task; the caller is responsible for the initial wake.
    pub(crate) fn insert_task(&self, future: Pin<Box<dyn Future<Output = ()>>>) -> TaskId {
        let task = self.tasks.borrow_mut().insert(future);
        trace!(task = %task, "task created");
        task
    }

    pub(crate) fn wake_task(&self, task: TaskId) {
        self.woken.wake(task);
    }

    /// Requests cancellation of a task: bumps its counter, latches the
    /// pending-cancel flag with `message`, and wakes it. Returns false if
    /// the task has already completed.
    pub(crate) fn cancel_request(&self, task: TaskId, message: Arc<str>) -> bool {
        {
            let mut tasks = self.tasks.borrow_mut();
            let Some(record) = tasks.get_mut(task) else {
                return false;
            };
            record.cancelling += 1;
            record.pending_cancel = Some(message);
            trace!(task = %task, cancelling = record.cancelling, "cancel requested");
        }
        self.wake_task(task);
        true
    }

    /// Decrements a task's cancellation counter and returns the new
    /// value. The pending-cancel flag is left untouched.
    pub(crate) fn uncancel_request(&self, task: TaskId) -> u32 {
        let mut tasks = self.tasks.borrow_mut();
        let Some(record) = tasks.get_mut(task) else {
            return 0;
        };
        record.cancelling = record.cancelling.saturating_sub(1);
        record.cancelling
    }

    /// Reads a task's cancellation counter.
    pub(crate) fn cancelling(&self, task: TaskId) -> u32 {
        self.tasks
            .borrow_mut()
            .get_mut(task)
            .map_or(0, |record| record.cancelling)
    }

    /// Consumes a task's pending-cancel flag.
    pub(crate) fn take_pending(&self, task: TaskId) -> Option<Arc<str>> {
        self.tasks
            .borrow_mut()
            .get_mut(task)
            .and_then(|record| record.pending_cancel.take())
    }

    /// Consumes the pending-cancel flag only if it still carries exactly
    /// `message` (pointer identity). Used by scopes to claim their own
    /// undelivered interruption without swallowing anyone else's.
    pub(crate) fn take_pending_if(&self, task: TaskId, message: &Arc<str>) -> bool {
        let mut tasks = self.tasks.borrow_mut();
        let Some(record) = tasks.get_mut(task) else {
            return false;
        };
        match &record.pending_cancel {
            Some(pending) if Arc::ptr_eq(pending, message) => {
                record.pending_cancel = None;
                true
            }
            _ => false,
        }
    }

    /// Runs one dispatch step: due timers, the current callback batch,
    /// then all woken tasks. Returns true if anything ran.
    pub(crate) fn step(self: &Rc<Self>) -> bool {
        let step_index = self.steps.get();
        self.steps.set(step_index + 1);
        assert!(
            step_index < self.config.max_steps,
            "runtime exceeded {} steps; likely a livelock",
            self.config.max_steps
        );

        let now = self.clock.get();
        let due = self.timers.borrow_mut().pop_due(now);
        let mut progress = !due.is_empty();
        self.ready.borrow_mut().extend(due);

        let batch: Vec<Rc<CallbackSlot>> = self.ready.borrow_mut().drain(..).collect();
        progress |= !batch.is_empty();
        for slot in batch {
            let Some(callback) = slot.take() else {
                continue;
            };
            if let Err(payload) = catch_unwind(AssertUnwindSafe(callback)) {
                let message = panic_message(&payload);
                error!(message, "dispatcher callback panicked; continuing");
            }
        }

        let woken = self.woken.drain();
        progress |= !woken.is_empty();
        for task in woken {
            self.poll_task(task);
        }
        progress
    }

    /// Jumps the clock to the next live timer deadline. Returns false if
    /// no timer remains.
    pub(crate) fn advance_to_next_timer(&self) -> bool {
        let Some(deadline) = self.timers.borrow_mut().next_deadline() else {
            return false;
        };
        if deadline > self.clock.get() {
            trace!(now = %self.clock.get(), to = %deadline, "advancing virtual clock");
            self.clock.set(deadline);
        }
        true
    }

    fn poll_task(self: &Rc<Self>, task: TaskId) {
        let Some(mut future) = self
            .tasks
            .borrow_mut()
            .get_mut(task)
            .and_then(|record| record.future.take())
        else {
            return; // stale wake: completed or mid-poll
        };

        let waker = self.woken.waker_for(task);
        let mut cx = Context::from_waker(&waker);
        let result = {
            let _guard = CurrentGuard::enter(CurrentTask {
                core: Rc::clone(self),
                task,
            });
            future.as_mut().poll(&mut cx)
        };

        match result {
            Poll::Ready(()) => {
                trace!(task = %task, "task completed");
                let record = self.tasks.borrow_mut().remove(task);
                drop(record);
            }
            Poll::Pending => {
                if let Some(record) = self.tasks.borrow_mut().get_mut(task) {
                    record.future = Some(future);
                }
            }
        }
    }
}

impl Drop for RuntimeCore {
    fn drop(&mut self) {
        // Pull pending task futures out of the table before dropping them:
        // their destructors (fence guards in particular) may call back
        // into the runtime, which must not happen while the table is
        // mid-teardown.
        let futures = self.tasks.get_mut().drain_futures();
        drop(futures);
        let callbacks: Vec<_> = self.ready.get_mut().drain(..).collect();
        drop(callbacks);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

/// Weak reference to a runtime, held by everything that lives inside
/// task futures. Keeping these weak is what lets a dropped runtime tear
/// down: the strong `Rc` lives only in [`Runtime`](super::Runtime) and
/// the thread-local current-task slot.
#[derive(Clone)]
pub(crate) struct CoreHandle {
    inner: Weak<RuntimeCore>,
}

impl CoreHandle {
    pub(crate) fn upgrade(&self) -> Option<Rc<RuntimeCore>> {
        self.inner.upgrade()
    }
}

/// The identity of the task currently being polled on this thread.
#[derive(Clone)]
pub(crate) struct CurrentTask {
    pub(crate) core: Rc<RuntimeCore>,
    pub(crate) task: TaskId,
}

thread_local! {
    static CURRENT: RefCell<Option<CurrentTask>> = const { RefCell::new(None) };
}

/// Returns the task being polled on this thread, if any.
pub(crate) fn current() -> Option<CurrentTask> {
    CURRENT.with(|current| current.borrow().clone())
}

/// Consumes the current task's pending-cancel flag. Leaf futures call
/// this first on every poll; a `Some` means the poll must resolve to a
/// `Cancelled` error carrying the returned message.
pub(crate) fn take_pending_cancel() -> Option<Arc<str>> {
    current().and_then(|current| current.core.take_pending(current.task))
}

struct CurrentGuard {
    previous: Option<CurrentTask>,
}

impl CurrentGuard {
    fn enter(current: CurrentTask) -> Self {
        let previous = CURRENT.with(|slot| slot.borrow_mut().replace(current));
        Self { previous }
    }
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|slot| *slot.borrow_mut() = previous);
    }
}
