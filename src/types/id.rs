//! Identifier types for tasks and virtual time.

use core::fmt;
use std::time::Duration;

/// Identifies a task within a runtime.
///
/// Task identifiers are slot-based with a generation counter, so a slot
/// reused for a new task never aliases a stale identifier: operations on
/// a `TaskId` whose task has completed are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId {
    index: u32,
    generation: u32,
}

impl TaskId {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Creates a task ID for testing purposes.
    ///
    /// The resulting ID is not connected to any runtime; operations that
    /// look it up will treat it as a completed task.
    #[must_use]
    pub const fn new_for_test(index: u32, generation: u32) -> Self {
        Self::new(index, generation)
    }

    /// Returns the slot index of this task.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Returns the slot generation of this task.
    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}.{}", self.index, self.generation)
    }
}

/// A point on the runtime's virtual clock, in nanoseconds since start.
///
/// The runtime advances this clock deterministically: it jumps straight
/// to the next timer deadline whenever no work is ready, so timer-driven
/// tests complete without wall-clock waiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Time(u64);

impl Time {
    /// The start of the virtual clock.
    pub const ZERO: Self = Self(0);

    /// The far future; no timer scheduled here ever fires.
    pub const MAX: Self = Self(u64::MAX);

    /// Creates a time from nanoseconds since runtime start.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a time from milliseconds since runtime start.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Creates a time from seconds since runtime start.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Returns this time as nanoseconds since runtime start.
    #[must_use]
    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Returns this time as whole milliseconds since runtime start.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0 / 1_000_000
    }

    /// Returns this time advanced by `duration`, saturating at [`Time::MAX`].
    #[must_use]
    pub fn saturating_add(&self, duration: Duration) -> Self {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(nanos))
    }

    /// Returns the duration from `earlier` to this time, or zero when
    /// `earlier` is in the future.
    #[must_use]
    pub const fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}
