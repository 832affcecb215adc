//! Waker plumbing with deduplication.
//!
//! Task wakes funnel into a shared woken-queue that the scheduler drains
//! once per step. Wakes are deduplicated (waking a task twice before it
//! is polled queues it once) and drain in FIFO order so scheduling stays
//! deterministic.
//!
//! Note: this implementation uses safe Rust only (no unsafe).

use crate::types::TaskId;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::task::{Wake, Waker};

/// Shared queue of woken tasks.
#[derive(Debug, Default)]
pub(crate) struct WakerState {
    woken: Mutex<WokenQueue>,
}

#[derive(Debug, Default)]
struct WokenQueue {
    queue: VecDeque<TaskId>,
    members: HashSet<TaskId>,
}

impl WakerState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queues a task for polling. Duplicate wakes before the next drain
    /// are coalesced.
    pub(crate) fn wake(&self, task: TaskId) {
        let mut woken = self.woken.lock();
        if woken.members.insert(task) {
            woken.queue.push_back(task);
        }
    }

    /// Drains all woken tasks in wake order.
    pub(crate) fn drain(&self) -> Vec<TaskId> {
        let mut woken = self.woken.lock();
        woken.members.clear();
        woken.queue.drain(..).collect()
    }

    /// Creates a waker that queues `task` when woken.
    pub(crate) fn waker_for(self: &Arc<Self>, task: TaskId) -> Waker {
        Waker::from(Arc::new(TaskWaker {
            state: Arc::clone(self),
            task,
        }))
    }
}

struct TaskWaker {
    state: Arc<WakerState>,
    task: TaskId,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.state.wake(self.task);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.state.wake(self.task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(n: u32) -> TaskId {
        TaskId::new_for_test(n, 0)
    }

    #[test]
    fn duplicate_wakes_coalesce() {
        crate::test_utils::init_test_logging();
        crate::test_phase!("duplicate_wakes_coalesce");
        let state = WakerState::new();
        state.wake(task(1));
        state.wake(task(1));
        state.wake(task(2));
        let drained = state.drain();
        crate::assert_with_log!(
            drained == vec![task(1), task(2)],
            "one entry per task, FIFO",
            vec![task(1), task(2)],
            drained
        );
        crate::test_complete!("duplicate_wakes_coalesce");
    }

    #[test]
    fn drain_resets_dedup() {
        crate::test_utils::init_test_logging();
        crate::test_phase!("drain_resets_dedup");
        let state = WakerState::new();
        state.wake(task(7));
        let _ = state.drain();
        state.wake(task(7));
        let drained = state.drain();
        crate::assert_with_log!(
            drained == vec![task(7)],
            "task wakeable again after drain",
            vec![task(7)],
            drained
        );
        crate::test_complete!("drain_resets_dedup");
    }

    #[test]
    fn std_waker_routes_to_queue() {
        crate::test_utils::init_test_logging();
        crate::test_phase!("std_waker_routes_to_queue");
        let state = Arc::new(WakerState::new());
        let waker = state.waker_for(task(3));
        waker.wake_by_ref();
        waker.wake();
        let drained = state.drain();
        crate::assert_with_log!(
            drained == vec![task(3)],
            "waker wakes exactly once",
            vec![task(3)],
            drained
        );
        crate::test_complete!("std_waker_routes_to_queue");
    }
}
