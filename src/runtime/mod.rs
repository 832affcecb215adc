//! Single-threaded cooperative runtime with virtual time.
//!
//! The runtime drives tasks, one-shot dispatcher callbacks, and timers
//! on one thread. Time is virtual: whenever no work is ready, the clock
//! jumps straight to the next timer deadline, so timer-heavy code runs
//! deterministically and instantly.
//!
//! # Cancellation protocol
//!
//! Each task carries a cancellation-request counter and a pending-cancel
//! flag. [`cancel_request`] increments the counter, latches the flag, and
//! wakes the task; the next runtime leaf future the task polls consumes
//! the flag and resolves to a [`Cancelled`](crate::ErrorKind::Cancelled)
//! error. [`uncancel_request`] decrements the counter without touching
//! the flag. Scopes built on this protocol snapshot the counter on entry
//! and compare it on exit to decide whether an observed cancellation is
//! their own.
//!
//! # Example
//!
//! ```
//! use fenceline::runtime::Runtime;
//! use fenceline::time::sleep;
//! use std::time::Duration;
//!
//! let value = Runtime::new().block_on(async {
//!     sleep(Duration::from_millis(5)).await?;
//!     Ok::<_, fenceline::Error>(42)
//! });
//! assert_eq!(value, Ok(42));
//! ```

pub mod config;
mod futures;
pub(crate) mod scheduler;
mod task;
mod task_group;
mod timer;
mod waker;

pub use config::RuntimeConfig;
pub use futures::{pending, yield_now, Pending, YieldNow};
pub use scheduler::ScheduledHandle;
pub use task::{spawn, JoinHandle};
pub use task_group::{JoinGroup, TaskGroup};

use crate::types::{TaskId, Time};
use scheduler::RuntimeCore;
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;

/// A single-threaded virtual-time runtime.
pub struct Runtime {
    core: Rc<RuntimeCore>,
}

impl Runtime {
    /// Creates a runtime with the default configuration, honoring the
    /// `FENCELINE_MAX_STEPS` environment override for the step budget.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::from_env())
    }

    /// Creates a runtime with the given configuration.
    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            core: RuntimeCore::new(config),
        }
    }

    /// Runs a future as the root task until it completes.
    ///
    /// Additional tasks spawned by the root keep running while the root
    /// is pending; tasks still pending when the root completes are
    /// dropped with the runtime.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a running runtime task, when the
    /// root task deadlocks (pending with no ready work and no timers),
    /// or when the configured step budget is exhausted.
    pub fn block_on<T, F>(&self, future: F) -> T
    where
        F: Future<Output = T> + 'static,
        T: 'static,
    {
        assert!(
            scheduler::current().is_none(),
            "cannot nest Runtime::block_on inside a running task"
        );
        let slot: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
        let out = Rc::clone(&slot);
        let root = self.core.insert_task(Box::pin(async move {
            *out.borrow_mut() = Some(future.await);
        }));
        self.core.wake_task(root);
        loop {
            let progress = self.core.step();
            if let Some(value) = slot.borrow_mut().take() {
                return value;
            }
            if !progress && !self.core.advance_to_next_timer() {
                panic!("runtime deadlocked: root task pending with no ready work and no timers");
            }
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

fn expect_current(what: &str) -> scheduler::CurrentTask {
    scheduler::current()
        .unwrap_or_else(|| panic!("{what} must be called from within a runtime task"))
}

/// Returns the identity of the task currently being polled, if any.
#[must_use]
pub fn current_task() -> Option<TaskId> {
    scheduler::current().map(|current| current.task)
}

/// Returns the current virtual time.
///
/// # Panics
///
/// Panics when called outside a running runtime task.
#[must_use]
pub fn now() -> Time {
    expect_current("now").core.now()
}

/// Requests cancellation of a task: bumps its cancellation counter,
/// latches the pending-cancel flag with `message`, and wakes it. Returns
/// false if the task has already completed.
///
/// # Panics
///
/// Panics when called outside a running runtime task.
pub fn cancel_request(task: TaskId, message: impl Into<Arc<str>>) -> bool {
    expect_current("cancel_request")
        .core
        .cancel_request(task, message.into())
}

/// Decrements a task's cancellation counter and returns the new value.
///
/// # Panics
///
/// Panics when called outside a running runtime task.
pub fn uncancel_request(task: TaskId) -> u32 {
    expect_current("uncancel_request").core.uncancel_request(task)
}

/// Reads a task's cancellation counter. Completed tasks read as zero.
///
/// # Panics
///
/// Panics when called outside a running runtime task.
#[must_use]
pub fn cancelling(task: TaskId) -> u32 {
    expect_current("cancelling").core.cancelling(task)
}

/// Schedules a callback for the next dispatch step.
///
/// # Panics
///
/// Panics when called outside a running runtime task.
pub fn schedule_soon(callback: impl FnOnce() + 'static) -> ScheduledHandle {
    expect_current("schedule_soon")
        .core
        .schedule_soon(Box::new(callback))
}

/// Schedules a callback to run once the virtual clock reaches `deadline`.
///
/// # Panics
///
/// Panics when called outside a running runtime task.
pub fn schedule_at(deadline: Time, callback: impl FnOnce() + 'static) -> ScheduledHandle {
    expect_current("schedule_at")
        .core
        .schedule_at(deadline, Box::new(callback))
}
