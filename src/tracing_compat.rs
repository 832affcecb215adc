//! Indirection point for the `tracing` macros.
//!
//! Runtime internals log through this module rather than naming the
//! `tracing` crate directly, keeping the logging backend swappable in
//! one place.

pub use tracing::{debug, error, info, trace, warn};
