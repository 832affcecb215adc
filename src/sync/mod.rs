//! Synchronization primitives.
//!
//! - [`Event`]: a one-shot signal with cancel-aware waiting and a
//!   subscription hook for cancellation triggers.

pub(crate) mod event;

pub use event::{Event, EventWait};
