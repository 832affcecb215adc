//! Deadline trigger.

use crate::runtime::scheduler::{self, CoreHandle};
use crate::runtime::ScheduledHandle;
use crate::trigger::{CancelCallback, Trigger, TriggerHandle};
use crate::types::{CancelReason, Time};
use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

/// Fires when a fixed duration has elapsed since arming.
///
/// A zero duration is reported by [`check`](Trigger::check) as already
/// elapsed, so a fence holding it interrupts its body at the first
/// suspension point without arming a timer.
///
/// # Example
///
/// ```no_run
/// use fenceline::{DeadlineTrigger, Fence};
/// use std::time::Duration;
///
/// let fence = Fence::new().with_trigger(DeadlineTrigger::after(Duration::from_millis(50)));
/// # let _ = fence;
/// ```
pub struct DeadlineTrigger {
    duration: Duration,
    code: Option<Arc<str>>,
    armed: RefCell<Option<ArmedDeadline>>,
}

struct ArmedDeadline {
    deadline: Time,
    core: CoreHandle,
}

impl DeadlineTrigger {
    /// Creates a trigger that fires `duration` after arming.
    #[must_use]
    pub fn after(duration: Duration) -> Self {
        Self {
            duration,
            code: None,
            armed: RefCell::new(None),
        }
    }

    /// Attaches a machine-readable code to the reasons this trigger
    /// produces.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<Arc<str>>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Returns the configured duration.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    fn reason(&self) -> CancelReason {
        let reason = CancelReason::deadline(format!(
            "timed out after {}s",
            self.duration.as_secs_f64()
        ));
        match &self.code {
            Some(code) => reason.with_code(Arc::clone(code)),
            None => reason,
        }
    }
}

impl Trigger for DeadlineTrigger {
    fn check(&self) -> Option<CancelReason> {
        if self.duration.is_zero() {
            Some(self.reason())
        } else {
            None
        }
    }

    /// # Panics
    ///
    /// Panics when armed outside a running runtime task.
    fn arm(&self, on_cancel: CancelCallback) -> Box<dyn TriggerHandle> {
        let current =
            scheduler::current().expect("deadline trigger must be armed inside a runtime task");
        let deadline = current.core.now().saturating_add(self.duration);
        *self.armed.borrow_mut() = Some(ArmedDeadline {
            deadline,
            core: current.core.handle(),
        });
        let reason = self.reason();
        let timer = current
            .core
            .schedule_at(deadline, Box::new(move || on_cancel(reason)));
        Box::new(DeadlineHandle { timer: Some(timer) })
    }

    fn remaining(&self) -> Option<Duration> {
        match &*self.armed.borrow() {
            None => Some(self.duration),
            Some(armed) => {
                let now = armed.core.upgrade().map_or(armed.deadline, |core| core.now());
                Some(armed.deadline.saturating_duration_since(now))
            }
        }
    }
}

/// Handle for an armed [`DeadlineTrigger`]: cancels the timer on disarm.
pub struct DeadlineHandle {
    timer: Option<ScheduledHandle>,
}

impl TriggerHandle for DeadlineHandle {
    fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}
