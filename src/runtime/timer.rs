//! Timer heap for deadline-scheduled callbacks.
//!
//! A small min-heap of `(deadline, callback)` pairs. Entries with equal
//! deadlines fire in insertion order via a generation tie-break, which
//! keeps same-tick trigger races deterministic. Cancelled entries stay in
//! the heap and are skipped lazily when they surface.

use crate::runtime::scheduler::CallbackSlot;
use crate::types::Time;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

struct TimerEntry {
    deadline: Time,
    generation: u64,
    slot: Rc<CallbackSlot>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.generation == other.generation
    }
}

impl Eq for TimerEntry {}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest deadline first, then
        // insertion order).
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A min-heap of scheduled callbacks ordered by deadline.
#[derive(Default)]
pub(crate) struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
    next_generation: u64,
}

impl TimerHeap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    /// Schedules a callback slot for the given deadline.
    pub(crate) fn insert(&mut self, deadline: Time, slot: Rc<CallbackSlot>) {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.heap.push(TimerEntry {
            deadline,
            generation,
            slot,
        });
    }

    /// Returns the earliest deadline with a live callback, dropping
    /// cancelled entries encountered on the way.
    pub(crate) fn next_deadline(&mut self) -> Option<Time> {
        while let Some(entry) = self.heap.peek() {
            if entry.slot.is_consumed() {
                self.heap.pop();
            } else {
                return Some(entry.deadline);
            }
        }
        None
    }

    /// Pops all callback slots whose deadline is `<= now`, in deadline
    /// order with ties broken by insertion order.
    pub(crate) fn pop_due(&mut self, now: Time) -> Vec<Rc<CallbackSlot>> {
        let mut due = Vec::new();
        while let Some(entry) = self.heap.peek() {
            if entry.deadline <= now {
                if let Some(entry) = self.heap.pop() {
                    due.push(entry.slot);
                } else {
                    break;
                }
            } else {
                break;
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use std::cell::Cell;

    fn slot_with_flag() -> (Rc<CallbackSlot>, Rc<Cell<bool>>) {
        let flag = Rc::new(Cell::new(false));
        let fired = Rc::clone(&flag);
        let slot = CallbackSlot::new(Box::new(move || fired.set(true)));
        (slot, flag)
    }

    fn run(slot: &Rc<CallbackSlot>) {
        if let Some(callback) = slot.take() {
            callback();
        }
    }

    #[test]
    fn due_slots_pop_in_deadline_order() {
        init_test_logging();
        crate::test_phase!("due_slots_pop_in_deadline_order");
        let mut heap = TimerHeap::new();
        let (a, fired_a) = slot_with_flag();
        let (b, fired_b) = slot_with_flag();
        let (c, fired_c) = slot_with_flag();
        heap.insert(Time::from_millis(200), a);
        heap.insert(Time::from_millis(100), b);
        heap.insert(Time::from_millis(150), c);

        let due = heap.pop_due(Time::from_millis(150));
        crate::assert_with_log!(due.len() == 2, "two timers due", 2usize, due.len());
        for slot in &due {
            run(slot);
        }
        crate::assert_with_log!(fired_b.get(), "100ms timer fired", true, fired_b.get());
        crate::assert_with_log!(fired_c.get(), "150ms timer fired", true, fired_c.get());
        crate::assert_with_log!(!fired_a.get(), "200ms timer not due", false, fired_a.get());
        crate::assert_with_log!(
            heap.next_deadline() == Some(Time::from_millis(200)),
            "remaining deadline is 200ms",
            Some(Time::from_millis(200)),
            heap.next_deadline()
        );
        crate::test_complete!("due_slots_pop_in_deadline_order");
    }

    #[test]
    fn same_deadline_pops_in_insertion_order() {
        init_test_logging();
        crate::test_phase!("same_deadline_pops_in_insertion_order");
        let mut heap = TimerHeap::new();
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));
        let deadline = Time::from_millis(100);
        for label in ["a", "b", "c"] {
            let order = Rc::clone(&order);
            heap.insert(
                deadline,
                CallbackSlot::new(Box::new(move || order.borrow_mut().push(label))),
            );
        }

        for slot in heap.pop_due(deadline) {
            run(&slot);
        }
        crate::assert_with_log!(
            *order.borrow() == vec!["a", "b", "c"],
            "same-deadline timers fire in insertion order",
            vec!["a", "b", "c"],
            order.borrow().clone()
        );
        crate::test_complete!("same_deadline_pops_in_insertion_order");
    }

    #[test]
    fn exact_deadline_is_due() {
        init_test_logging();
        crate::test_phase!("exact_deadline_is_due");
        let mut heap = TimerHeap::new();
        let (slot, fired) = slot_with_flag();
        heap.insert(Time::from_millis(250), slot);

        let due = heap.pop_due(Time::from_millis(250));
        crate::assert_with_log!(due.len() == 1, "timer at exact deadline is due", 1usize, due.len());
        run(&due[0]);
        crate::assert_with_log!(fired.get(), "timer fired", true, fired.get());
        crate::test_complete!("exact_deadline_is_due");
    }

    #[test]
    fn cancelled_entries_are_skipped_by_next_deadline() {
        init_test_logging();
        crate::test_phase!("cancelled_entries_are_skipped_by_next_deadline");
        let mut heap = TimerHeap::new();
        let (early, _) = slot_with_flag();
        let (late, _) = slot_with_flag();
        heap.insert(Time::from_millis(100), Rc::clone(&early));
        heap.insert(Time::from_millis(500), late);

        let _ = early.take();
        crate::assert_with_log!(
            heap.next_deadline() == Some(Time::from_millis(500)),
            "cancelled head is skipped",
            Some(Time::from_millis(500)),
            heap.next_deadline()
        );
        crate::assert_with_log!(heap.len() == 1, "cancelled entry dropped", 1usize, heap.len());
        crate::test_complete!("cancelled_entries_are_skipped_by_next_deadline");
    }

    #[test]
    fn nothing_due_before_first_deadline() {
        init_test_logging();
        crate::test_phase!("nothing_due_before_first_deadline");
        let mut heap = TimerHeap::new();
        let (slot, _) = slot_with_flag();
        heap.insert(Time::from_millis(500), slot);

        let due = heap.pop_due(Time::from_millis(100));
        crate::assert_with_log!(due.is_empty(), "no timers due", true, due.is_empty());
        crate::assert_with_log!(heap.len() == 1, "heap unchanged", 1usize, heap.len());
        crate::test_complete!("nothing_due_before_first_deadline");
    }
}
