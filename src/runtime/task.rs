//! Task storage and join handles.

use crate::error::{Error, ErrorKind};
use crate::runtime::scheduler::{self, RuntimeCore};
use crate::types::TaskId;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

type TaskFuture = Pin<Box<dyn Future<Output = ()>>>;

/// Per-task state: the stored future plus the cancellation protocol
/// fields consumed by leaf futures.
pub(crate) struct TaskRecord {
    /// `None` while the task is being polled or after completion.
    pub(crate) future: Option<TaskFuture>,
    /// Cancellation-request counter.
    pub(crate) cancelling: u32,
    /// Latched message of an undelivered cancellation, consumed by the
    /// next leaf poll.
    pub(crate) pending_cancel: Option<Arc<str>>,
}

impl TaskRecord {
    fn new(future: TaskFuture) -> Self {
        Self {
            future: Some(future),
            cancelling: 0,
            pending_cancel: None,
        }
    }
}

/// Slot-based task storage with generation tags, so identifiers for
/// completed tasks go stale instead of aliasing their slot's next
/// occupant.
pub(crate) struct TaskTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

struct Slot {
    generation: u32,
    record: Option<TaskRecord>,
}

impl TaskTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, future: TaskFuture) -> TaskId {
        let record = TaskRecord::new(future);
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.record = Some(record);
            TaskId::new(index, slot.generation)
        } else {
            let index = u32::try_from(self.slots.len()).expect("task table overflow");
            self.slots.push(Slot {
                generation: 0,
                record: Some(record),
            });
            TaskId::new(index, 0)
        }
    }

    pub(crate) fn get_mut(&mut self, task: TaskId) -> Option<&mut TaskRecord> {
        let slot = self.slots.get_mut(task.index() as usize)?;
        if slot.generation != task.generation() {
            return None;
        }
        slot.record.as_mut()
    }

    pub(crate) fn remove(&mut self, task: TaskId) -> Option<TaskRecord> {
        let slot = self.slots.get_mut(task.index() as usize)?;
        if slot.generation != task.generation() {
            return None;
        }
        let record = slot.record.take();
        if record.is_some() {
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(task.index());
        }
        record
    }

    /// Takes every stored future out of the table. Used during runtime
    /// teardown so future destructors run with the table unborrowed.
    pub(crate) fn drain_futures(&mut self) -> Vec<TaskFuture> {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.record.as_mut().and_then(|record| record.future.take()))
            .collect()
    }
}

struct JoinInner<T> {
    result: Option<T>,
    finished: bool,
    waker: Option<Waker>,
}

/// Handle to a spawned task.
///
/// Awaiting the handle yields the task's output. The await is itself a
/// suspension point: if the *awaiting* task is cancelled, the await
/// resolves to a `Cancelled` error and the spawned task keeps running.
pub struct JoinHandle<T> {
    task: TaskId,
    inner: Rc<RefCell<JoinInner<T>>>,
}

impl<T> JoinHandle<T> {
    /// Returns the identifier of the spawned task.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.task
    }

    /// True once the spawned task has completed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.borrow().finished
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(message) = scheduler::take_pending_cancel() {
            return Poll::Ready(Err(Error::cancelled(message)));
        }
        let mut inner = self.inner.borrow_mut();
        if inner.finished {
            return Poll::Ready(inner.result.take().ok_or_else(|| {
                Error::new(ErrorKind::Internal).with_message("join result already taken")
            }));
        }
        inner.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

/// Spawns a task onto the current runtime.
///
/// The task starts on the next dispatch step, never synchronously inside
/// the caller.
///
/// # Panics
///
/// Panics when called outside a running runtime task.
pub fn spawn<T, F>(future: F) -> JoinHandle<T>
where
    F: Future<Output = T> + 'static,
    T: 'static,
{
    let current = scheduler::current().expect("spawn must be called from within a runtime task");
    spawn_on(&current.core, future)
}

pub(crate) fn spawn_on<T, F>(core: &Rc<RuntimeCore>, future: F) -> JoinHandle<T>
where
    F: Future<Output = T> + 'static,
    T: 'static,
{
    let inner = Rc::new(RefCell::new(JoinInner {
        result: None,
        finished: false,
        waker: None,
    }));
    let shared = Rc::clone(&inner);
    let task = core.insert_task(Box::pin(async move {
        let value = future.await;
        let mut join = shared.borrow_mut();
        join.result = Some(value);
        join.finished = true;
        if let Some(waker) = join.waker.take() {
            waker.wake();
        }
    }));
    core.wake_task(task);
    JoinHandle { task, inner }
}
