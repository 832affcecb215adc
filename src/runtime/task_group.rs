//! Minimal structured task group.
//!
//! A [`TaskGroup`] owns a set of spawned children. The first child to
//! finish with a non-cancellation error cancels its siblings *and*
//! requests cancellation of the parent task, so the parent's current
//! suspension point observes the failure promptly. [`TaskGroup::join`]
//! waits for every child, withdraws the group's own parent-cancel
//! request (re-balancing the parent's counter), and reports the first
//! child error.
//!
//! Cancellation scopes compose with the group through the ordinary task
//! protocol: a scope that fires inside the parent while a child failure
//! is also in flight sees the parent's counter above its own snapshot
//! and yields the interruption to the group instead of suppressing it.

use crate::error::Error;
use crate::runtime::scheduler::{self, CoreHandle, RuntimeCore};
use crate::runtime::task;
use crate::types::TaskId;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

struct GroupState {
    core: CoreHandle,
    parent: TaskId,
    children: Vec<TaskId>,
    live: usize,
    first_error: Option<Error>,
    cancel_message: Arc<str>,
    parent_cancel_sent: bool,
    rebalanced: bool,
    joiner: Option<Waker>,
}

impl GroupState {
    fn on_child_done(state: &Rc<RefCell<GroupState>>, outcome: Result<(), Error>) {
        let mut fan_out: Option<(Rc<RuntimeCore>, Vec<TaskId>, TaskId, Arc<str>)> = None;
        {
            let mut group = state.borrow_mut();
            group.live -= 1;
            if let Err(error) = outcome {
                if !error.is_cancelled() && group.first_error.is_none() {
                    group.first_error = Some(error);
                    group.parent_cancel_sent = true;
                    if let Some(core) = group.core.upgrade() {
                        fan_out = Some((
                            core,
                            group.children.clone(),
                            group.parent,
                            Arc::clone(&group.cancel_message),
                        ));
                    }
                }
            }
            if let Some(waker) = group.joiner.take() {
                waker.wake();
            }
        }
        if let Some((core, children, parent, message)) = fan_out {
            for child in children {
                core.cancel_request(child, Arc::clone(&message));
            }
            core.cancel_request(parent, message);
        }
    }
}

/// A structured group of child tasks owned by the current task.
pub struct TaskGroup {
    state: Rc<RefCell<GroupState>>,
}

impl TaskGroup {
    /// Creates a task group owned by the current task.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotInTask`](crate::ErrorKind::NotInTask) when
    /// called outside a running runtime task.
    pub fn new() -> Result<Self, Error> {
        let current = scheduler::current().ok_or_else(|| {
            Error::new(crate::error::ErrorKind::NotInTask)
                .with_message("task group must be created inside a runtime task")
        })?;
        Ok(Self {
            state: Rc::new(RefCell::new(GroupState {
                core: current.core.handle(),
                parent: current.task,
                children: Vec::new(),
                live: 0,
                first_error: None,
                cancel_message: Arc::from("sibling task failed"),
                parent_cancel_sent: false,
                rebalanced: false,
                joiner: None,
            })),
        })
    }

    /// Spawns a child task into the group.
    ///
    /// # Panics
    ///
    /// Panics if the owning runtime has been dropped.
    pub fn spawn<F>(&self, future: F) -> TaskId
    where
        F: Future<Output = Result<(), Error>> + 'static,
    {
        let core = self
            .state
            .borrow()
            .core
            .upgrade()
            .expect("task group outlived its runtime");
        let state = Rc::clone(&self.state);
        let handle = task::spawn_on(&core, async move {
            let outcome = future.await;
            GroupState::on_child_done(&state, outcome);
        });
        let mut group = self.state.borrow_mut();
        group.children.push(handle.id());
        group.live += 1;
        handle.id()
    }

    /// Waits for every child, then reports the first child error.
    ///
    /// Joining absorbs the group's own cancellation of the parent task:
    /// the parent's counter is decremented back and a still-pending
    /// group interruption is withdrawn, so nothing leaks past the join.
    #[must_use]
    pub fn join(self) -> JoinGroup {
        JoinGroup { state: self.state }
    }
}

/// Future returned by [`TaskGroup::join`].
pub struct JoinGroup {
    state: Rc<RefCell<GroupState>>,
}

impl Future for JoinGroup {
    type Output = Result<(), Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut group = self.state.borrow_mut();
        if group.live > 0 {
            group.joiner = Some(cx.waker().clone());
            return Poll::Pending;
        }
        if group.parent_cancel_sent && !group.rebalanced {
            group.rebalanced = true;
            if let Some(core) = group.core.upgrade() {
                core.uncancel_request(group.parent);
                core.take_pending_if(group.parent, &group.cancel_message);
            }
        }
        Poll::Ready(match group.first_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        })
    }
}
