//! Multi-source cancellation fences for cooperative single-threaded
//! async execution.
//!
//! A [`Fence`] declares, at a lexical boundary, one or more independent
//! cancellation *triggers* — deadline expiry, an externally held
//! [`Event`](sync::Event), or user-defined conditions implementing
//! [`Trigger`]. When any trigger fires, the work guarded by the fence is
//! interrupted at its next suspension point without any collaboration
//! from that work. On exit the fence reports whether cancellation
//! occurred and which triggers caused it; the surrounding code resumes
//! normally.
//!
//! Interruption rides the [`runtime`]'s task cancellation protocol: a
//! per-task request counter plus a pending-cancel flag that runtime leaf
//! futures consume. The fence snapshots the counter on entry, defers its
//! own cancel request through the dispatcher so it can still be
//! rescinded, and balances the counter on exit — which is how it tells
//! *its* interruption apart from one requested by an outer scope, and
//! how it guarantees no stale interruption outlives it.
//!
//! # Example
//!
//! ```
//! use fenceline::runtime::Runtime;
//! use fenceline::sync::Event;
//! use fenceline::time::sleep;
//! use fenceline::{DeadlineTrigger, EventTrigger, Fence};
//! use std::time::Duration;
//!
//! Runtime::new().block_on(async {
//!     let shutdown = Event::new();
//!     let mut fence = Fence::new()
//!         .with_trigger(DeadlineTrigger::after(Duration::from_millis(50)))
//!         .with_trigger(EventTrigger::new(&shutdown).with_code("shutdown"));
//!
//!     let out = fence
//!         .guard(async {
//!             sleep(Duration::from_secs(10)).await?;
//!             Ok("finished")
//!         })
//!         .await;
//!
//!     assert_eq!(out, Ok(None)); // interrupted, owned by the fence
//!     assert!(fence.cancelled());
//!     assert!(!fence.cancelled_by("shutdown")); // the deadline won
//! });
//! ```
//!
//! Cancellation is reported as data, not as a dedicated error subtype:
//! the interruption itself is always a plain
//! [`ErrorKind::Cancelled`] error, and the *why* lives in
//! [`Fence::reasons`]. See [`error`] for the rationale.

#![warn(missing_docs)]

pub mod error;
pub mod fence;
pub mod runtime;
pub mod sync;
pub mod test_utils;
pub mod time;
pub mod tracing_compat;
pub mod trigger;
pub mod types;

pub use error::{Error, ErrorKind};
pub use fence::{Fence, Guard};
pub use trigger::{
    CancelCallback, DeadlineHandle, DeadlineTrigger, EventHandle, EventTrigger, Trigger,
    TriggerHandle,
};
pub use types::{CancelKind, CancelReason};
