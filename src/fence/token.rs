//! The cancel token: one scheduled-but-not-yet-delivered interruption.
//!
//! A fence creates at most one token, when its first reason is recorded.
//! The token's job is narrow but delicate: make sure the host task *is*
//! interrupted if a reason was recorded, and make sure no interruption
//! attributable to this fence can strike code that runs after the fence.
//!
//! Delivery is always deferred through the dispatcher rather than
//! performed synchronously. A synchronous `cancel_request` from inside
//! the task's own execution would latch the pending-cancel flag at a
//! point where nothing is positioned to consume it if the body finishes
//! without suspending — `uncancel_request` deliberately leaves the flag
//! alone — and the stale flag would then interrupt whatever suspends
//! next on the task. Deferring means an undelivered interruption is
//! still a cancellable callback, which exit simply rescinds.

use crate::error::Error;
use crate::runtime::scheduler::RuntimeCore;
use crate::runtime::ScheduledHandle;
use crate::types::TaskId;
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenState {
    /// Interruption queued on the dispatcher, not yet run.
    Scheduled,
    /// `cancel_request` has been issued against the host task.
    Delivered,
    /// Withdrawn before delivery; terminal.
    Rescinded,
}

pub(crate) struct CancelToken {
    state: TokenState,
    handle: Option<ScheduledHandle>,
    message: Arc<str>,
}

impl CancelToken {
    pub(crate) fn new(message: Arc<str>) -> Self {
        Self {
            state: TokenState::Scheduled,
            handle: None,
            message,
        }
    }

    pub(crate) fn set_handle(&mut self, handle: ScheduledHandle) {
        self.handle = Some(handle);
    }

    pub(crate) fn state(&self) -> TokenState {
        self.state
    }

    pub(crate) fn message(&self) -> Arc<str> {
        Arc::clone(&self.message)
    }

    /// Transitions `Scheduled -> Delivered`. The caller then issues the
    /// actual `cancel_request`.
    pub(crate) fn mark_delivered(&mut self) {
        debug_assert_eq!(self.state, TokenState::Scheduled);
        self.state = TokenState::Delivered;
        self.handle = None;
    }

    /// Settles the token at fence exit. Returns true when the
    /// propagating error is this fence's own interruption and should be
    /// suppressed.
    ///
    /// - `Scheduled`: the interruption never ran (the body finished
    ///   first); rescind the callback. Nothing to suppress.
    /// - `Delivered`: this fence inflated the counter by one; decrement
    ///   to balance. Suppress iff the observed error is a cancellation
    ///   and the balanced counter is back at the entry snapshot — a
    ///   higher counter means an outer scope also requested
    ///   cancellation and owns the error.
    pub(crate) fn resolve(
        mut self,
        core: &Rc<RuntimeCore>,
        task: TaskId,
        cancelling_at_enter: u32,
        observed: Option<&Error>,
    ) -> bool {
        match self.state {
            TokenState::Scheduled => {
                if let Some(handle) = self.handle.take() {
                    handle.cancel();
                }
                self.state = TokenState::Rescinded;
                false
            }
            TokenState::Delivered => {
                let remaining = core.uncancel_request(task);
                observed.is_some_and(Error::is_cancelled) && remaining <= cancelling_at_enter
            }
            TokenState::Rescinded => false,
        }
    }

    /// Settles the token when the guard future is dropped mid-flight.
    ///
    /// There is no propagating error to suppress on this path. A
    /// delivered interruption still has to be balanced, and — because
    /// the body may have been dropped before observing it — a
    /// pending-cancel flag that still carries exactly this token's
    /// message is claimed back so it cannot strike a later suspension.
    pub(crate) fn resolve_on_drop(mut self, core: Option<&Rc<RuntimeCore>>, task: TaskId) {
        match self.state {
            TokenState::Scheduled => {
                if let Some(handle) = self.handle.take() {
                    handle.cancel();
                }
                self.state = TokenState::Rescinded;
            }
            TokenState::Delivered => {
                if let Some(core) = core {
                    core.uncancel_request(task);
                    core.take_pending_if(task, &self.message);
                }
            }
            TokenState::Rescinded => {}
        }
    }
}
