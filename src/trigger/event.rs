//! External-event trigger.

use crate::sync::event::EventSubscription;
use crate::sync::Event;
use crate::trigger::{CancelCallback, Trigger, TriggerHandle};
use crate::types::CancelReason;
use std::sync::Arc;

/// Fires when an external one-shot [`Event`] is set.
///
/// The armed subscription attaches directly to the event's notification
/// list; no extra task is spawned to watch the signal.
///
/// # Example
///
/// ```no_run
/// use fenceline::sync::Event;
/// use fenceline::{EventTrigger, Fence};
///
/// let shutdown = Event::new();
/// let fence = Fence::new().with_trigger(EventTrigger::new(&shutdown).with_code("shutdown"));
/// # let _ = fence;
/// ```
pub struct EventTrigger {
    event: Event,
    code: Option<Arc<str>>,
}

impl EventTrigger {
    /// Creates a trigger watching `event`.
    #[must_use]
    pub fn new(event: &Event) -> Self {
        Self {
            event: event.clone(),
            code: None,
        }
    }

    /// Attaches a machine-readable code to the reasons this trigger
    /// produces.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<Arc<str>>) -> Self {
        self.code = Some(code.into());
        self
    }

    fn reason(&self) -> CancelReason {
        let reason = CancelReason::event("event was set");
        match &self.code {
            Some(code) => reason.with_code(Arc::clone(code)),
            None => reason,
        }
    }
}

impl Trigger for EventTrigger {
    fn check(&self) -> Option<CancelReason> {
        if self.event.is_set() {
            Some(self.reason())
        } else {
            None
        }
    }

    /// # Panics
    ///
    /// Panics when armed outside a running runtime task.
    fn arm(&self, on_cancel: CancelCallback) -> Box<dyn TriggerHandle> {
        let reason = self.reason();
        let subscription = self.event.subscribe(Box::new(move || on_cancel(reason)));
        Box::new(EventHandle {
            subscription: Some(subscription),
        })
    }
}

/// Handle for an armed [`EventTrigger`]: removes the subscription on
/// disarm.
pub struct EventHandle {
    subscription: Option<EventSubscription>,
}

impl TriggerHandle for EventHandle {
    fn disarm(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.disarm();
        }
    }
}
