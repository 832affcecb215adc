//! The trigger contract.
//!
//! A [`Trigger`] answers one question: *when should cancellation fire?*
//! Fences consume triggers through two operations:
//!
//! - [`check`](Trigger::check): synchronous, effect-free pre-check. A
//!   `Some` means the condition already holds; the fence then schedules
//!   its interruption directly and never arms anything.
//! - [`arm`](Trigger::arm): register a callback to be invoked exactly
//!   once, from the dispatcher, when the condition becomes true. Arming
//!   must never invoke the callback synchronously, even when the
//!   condition is already true.
//!
//! Callbacks run on the single dispatcher thread and are serialized. A
//! callback must do O(1) work — record its reason and return.
//!
//! Triggers hold no per-fence state and may be reused, one arm at a
//! time. The [`TriggerHandle`] returned by `arm` is one-shot: disarming
//! is idempotent, prevents a not-yet-fired callback from ever firing,
//! and is a no-op after the callback has fired.

mod deadline;
mod event;

pub use deadline::{DeadlineHandle, DeadlineTrigger};
pub use event::{EventHandle, EventTrigger};

use crate::types::CancelReason;
use std::rc::Rc;
use std::time::Duration;

/// Callback invoked by an armed trigger when its condition becomes true.
pub type CancelCallback = Rc<dyn Fn(CancelReason)>;

/// A cancellation condition.
pub trait Trigger {
    /// Returns a reason iff the condition already holds. Must not block
    /// and must not suspend; safe to call repeatedly.
    fn check(&self) -> Option<CancelReason>;

    /// Starts asynchronous monitoring. The callback fires at most once,
    /// from the dispatcher, never synchronously inside `arm`.
    fn arm(&self, on_cancel: CancelCallback) -> Box<dyn TriggerHandle>;

    /// Remaining budget for deadline-bearing triggers.
    ///
    /// The default implementation reports no budget; deadline triggers
    /// override it. Feeds [`Fence::remaining`](crate::Fence::remaining).
    fn remaining(&self) -> Option<Duration> {
        None
    }
}

/// A live registration of an armed trigger.
pub trait TriggerHandle {
    /// Stops monitoring and releases resources. Idempotent; a no-op
    /// after the callback has fired.
    fn disarm(&mut self);
}
