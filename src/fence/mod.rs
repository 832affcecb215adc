//! Multi-source cancellation fences.
//!
//! A [`Fence`] surrounds a region of async work with zero or more
//! [`Trigger`]s. When any trigger fires, the work is interrupted at its
//! next suspension point; the fence reports what happened afterwards
//! through [`cancelled`](Fence::cancelled), [`reasons`](Fence::reasons),
//! [`cancelled_by`](Fence::cancelled_by) and
//! [`remaining`](Fence::remaining), and the surrounding code simply
//! continues.
//!
//! # Lifecycle
//!
//! A fence is single-use. [`Fence::guard`] returns a future that enters
//! the fence on its first poll, drives the body, and settles the fence
//! when the body finishes or the guard is dropped:
//!
//! 1. *Enter*: record the host task, snapshot its cancellation-request
//!    counter, pre-`check` every trigger. If any condition already
//!    holds, schedule the interruption at once and arm nothing;
//!    otherwise arm every trigger.
//! 2. *Fire*: the first firing records its reason and schedules the
//!    interruption; later firings only append their reasons.
//! 3. *Exit*: disarm every handle, then settle the token — rescind an
//!    undelivered interruption, or claim a delivered one by balancing
//!    the counter. A cancellation error is swallowed only when this
//!    fence owns it; anything else propagates.
//!
//! # Example
//!
//! ```
//! use fenceline::runtime::Runtime;
//! use fenceline::time::sleep;
//! use fenceline::Fence;
//! use std::time::Duration;
//!
//! Runtime::new().block_on(async {
//!     let mut fence = Fence::deadline(Duration::from_millis(50));
//!     let out = fence
//!         .guard(async {
//!             sleep(Duration::from_secs(10)).await?;
//!             Ok(())
//!         })
//!         .await;
//!     assert_eq!(out, Ok(None)); // interrupted and owned by the fence
//!     assert!(fence.cancelled());
//! });
//! ```

mod guard;
mod token;

pub use guard::Guard;

use crate::error::{Error, ErrorKind};
use crate::runtime::scheduler::{self, CoreHandle};
use crate::sync::Event;
use crate::tracing_compat::warn;
use crate::trigger::{CancelCallback, DeadlineTrigger, EventTrigger, Trigger, TriggerHandle};
use crate::types::{CancelReason, TaskId};
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;
use token::{CancelToken, TokenState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Inactive,
    Active,
    Settled,
}

/// State shared between the fence, its trigger callbacks, and the
/// scheduled interruption.
struct FenceState {
    phase: Phase,
    reasons: Vec<CancelReason>,
    token: Option<CancelToken>,
    core: Option<CoreHandle>,
    task: Option<TaskId>,
    cancelling_at_enter: u32,
    remaining_at_exit: Option<Duration>,
}

impl FenceState {
    fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            phase: Phase::Inactive,
            reasons: Vec::new(),
            token: None,
            core: None,
            task: None,
            cancelling_at_enter: 0,
            remaining_at_exit: None,
        }))
    }

    /// Trigger-firing callback: append the reason; the first firing also
    /// schedules the interruption.
    fn on_trigger(state: &Rc<RefCell<Self>>, reason: CancelReason) {
        {
            let mut fence = state.borrow_mut();
            if fence.phase != Phase::Active {
                warn!(%reason, "trigger fired on a settled fence; ignoring");
                return;
            }
            if let (Some(task), Some(current)) = (fence.task, scheduler::current()) {
                if current.task == task {
                    warn!(
                        %reason,
                        "trigger callback ran synchronously inside the host task; \
                         arm() callbacks must fire from the dispatcher"
                    );
                }
            }
            fence.reasons.push(reason);
        }
        Self::schedule_interruption(state);
    }

    /// Queues the deferred interruption of the host task. Idempotent:
    /// only the first caller creates the token.
    fn schedule_interruption(state: &Rc<RefCell<Self>>) {
        let core = {
            let fence = state.borrow();
            if fence.phase != Phase::Active || fence.token.is_some() {
                return;
            }
            let Some(core) = fence.core.as_ref().and_then(CoreHandle::upgrade) else {
                return;
            };
            core
        };
        {
            let mut fence = state.borrow_mut();
            let message = fence.reasons[0].message_arc();
            fence.token = Some(CancelToken::new(message));
        }
        let handle = core.schedule_soon({
            let state = Rc::clone(state);
            Box::new(move || Self::deliver_interruption(&state))
        });
        if let Some(token) = state.borrow_mut().token.as_mut() {
            token.set_handle(handle);
        }
    }

    /// Dispatcher callback: flip `Scheduled -> Delivered` and issue the
    /// actual cancel request. A rescinded token makes this a no-op.
    fn deliver_interruption(state: &Rc<RefCell<Self>>) {
        let delivery = {
            let mut fence = state.borrow_mut();
            let core = fence.core.as_ref().and_then(CoreHandle::upgrade);
            let task = fence.task;
            match fence.token.as_mut() {
                Some(token) if token.state() == TokenState::Scheduled => {
                    token.mark_delivered();
                    core.zip(task).map(|(core, task)| (core, task, token.message()))
                }
                _ => None,
            }
        };
        if let Some((core, task, message)) = delivery {
            core.cancel_request(task, message);
        }
    }
}

/// A multi-source cancellation fence.
///
/// See the [module documentation](self) for the lifecycle. A fence is
/// built with [`Fence::new`] plus [`with_trigger`](Fence::with_trigger),
/// or with the [`deadline`](Fence::deadline) / [`event`](Fence::event)
/// shorthands, and used exactly once via [`guard`](Fence::guard).
pub struct Fence {
    triggers: Vec<Box<dyn Trigger>>,
    handles: Vec<Box<dyn TriggerHandle>>,
    state: Rc<RefCell<FenceState>>,
}

impl Fence {
    /// Creates a fence with no triggers. Such a fence never interrupts
    /// its body; it is transparent.
    #[must_use]
    pub fn new() -> Self {
        Self {
            triggers: Vec::new(),
            handles: Vec::new(),
            state: FenceState::new(),
        }
    }

    /// Adds a trigger.
    #[must_use]
    pub fn with_trigger(mut self, trigger: impl Trigger + 'static) -> Self {
        self.triggers.push(Box::new(trigger));
        self
    }

    /// Shorthand for a fence with a single deadline trigger.
    #[must_use]
    pub fn deadline(duration: Duration) -> Self {
        Self::new().with_trigger(DeadlineTrigger::after(duration))
    }

    /// Shorthand for a fence with a single event trigger.
    #[must_use]
    pub fn event(event: &Event) -> Self {
        Self::new().with_trigger(EventTrigger::new(event))
    }

    /// Guards `body` with this fence.
    ///
    /// The returned future resolves to:
    ///
    /// - `Ok(Some(value))` — the body completed. The fence may still
    ///   report `cancelled()` if a trigger fired but the body finished
    ///   before the interruption was delivered; the scheduled
    ///   interruption is rescinded in that case.
    /// - `Ok(None)` — the body was interrupted and this fence owned the
    ///   cancellation.
    /// - `Err(error)` — a body error, or a cancellation belonging to an
    ///   outer scope; never swallowed here.
    ///
    /// Misuse — guarding outside a runtime task, or reusing a fence —
    /// resolves to an error without polling the body.
    pub fn guard<F, T>(&mut self, body: F) -> Guard<'_, F>
    where
        F: Future<Output = Result<T, Error>>,
    {
        Guard::new(self, body)
    }

    /// True iff at least one reason was recorded. Latched: once set
    /// during the guarded region it never resets.
    #[must_use]
    pub fn cancelled(&self) -> bool {
        !self.state.borrow().reasons.is_empty()
    }

    /// The recorded reasons, in trigger firing order.
    #[must_use]
    pub fn reasons(&self) -> Vec<CancelReason> {
        self.state.borrow().reasons.clone()
    }

    /// True iff any recorded reason carries `code`.
    #[must_use]
    pub fn cancelled_by(&self, code: &str) -> bool {
        self.state
            .borrow()
            .reasons
            .iter()
            .any(|reason| reason.code() == Some(code))
    }

    /// Minimum remaining budget across deadline-bearing triggers, or
    /// `None` when the fence holds no such trigger.
    ///
    /// Live while the fence is active; after exit, returns the value
    /// sampled at exit.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        if self.state.borrow().phase == Phase::Settled {
            return self.state.borrow().remaining_at_exit;
        }
        self.live_remaining()
    }

    fn live_remaining(&self) -> Option<Duration> {
        self.triggers
            .iter()
            .filter_map(|trigger| trigger.remaining())
            .min()
    }

    /// Enters the fence: records the host task, snapshots its counter,
    /// pre-checks and arms triggers.
    pub(crate) fn enter(&mut self) -> Result<(), Error> {
        let current = scheduler::current().ok_or_else(|| {
            Error::new(ErrorKind::NotInTask)
                .with_message("fence must be entered from within a runtime task")
        })?;
        {
            let mut fence = self.state.borrow_mut();
            if fence.phase != Phase::Inactive {
                return Err(
                    Error::new(ErrorKind::FenceReused).with_message("fence cannot be reused")
                );
            }
            fence.phase = Phase::Active;
            fence.core = Some(current.core.handle());
            fence.task = Some(current.task);
            fence.cancelling_at_enter = current.core.cancelling(current.task);
        }

        let mut pre_triggered = false;
        for trigger in &self.triggers {
            if let Some(reason) = trigger.check() {
                self.state.borrow_mut().reasons.push(reason);
                pre_triggered = true;
            }
        }
        if pre_triggered {
            // The body still runs until its first suspension point; the
            // interruption arrives from the dispatcher.
            FenceState::schedule_interruption(&self.state);
            return Ok(());
        }

        let callback: CancelCallback = {
            let state = Rc::clone(&self.state);
            Rc::new(move |reason| FenceState::on_trigger(&state, reason))
        };
        self.handles = self
            .triggers
            .iter()
            .map(|trigger| trigger.arm(Rc::clone(&callback)))
            .collect();
        Ok(())
    }

    /// Exits the fence: disarm everything, settle the token, decide
    /// whether the observed error is ours to suppress.
    pub(crate) fn settle(&mut self, observed: Option<&Error>) -> bool {
        let (core, task, cancelling_at_enter, token) = self.close();
        match (token, core) {
            (Some(token), Some(core)) => {
                let task = task.expect("fence settled without a host task");
                token.resolve(&core, task, cancelling_at_enter, observed)
            }
            (Some(token), None) => {
                // Runtime already gone; nothing to balance against.
                drop(token);
                false
            }
            (None, _) => false,
        }
    }

    /// Exit path for a guard dropped mid-flight: same cleanup, no
    /// suppression decision to make.
    pub(crate) fn settle_on_drop(&mut self) {
        let (core, task, _, token) = self.close();
        if let (Some(token), Some(task)) = (token, task) {
            token.resolve_on_drop(core.as_ref(), task);
        }
    }

    fn close(
        &mut self,
    ) -> (
        Option<Rc<crate::runtime::scheduler::RuntimeCore>>,
        Option<TaskId>,
        u32,
        Option<CancelToken>,
    ) {
        for handle in &mut self.handles {
            handle.disarm();
        }
        self.handles.clear();
        let sample = self.live_remaining();
        let mut fence = self.state.borrow_mut();
        fence.phase = Phase::Settled;
        fence.remaining_at_exit = sample;
        let core = fence.core.as_ref().and_then(CoreHandle::upgrade);
        (core, fence.task, fence.cancelling_at_enter, fence.token.take())
    }
}

impl Default for Fence {
    fn default() -> Self {
        Self::new()
    }
}
