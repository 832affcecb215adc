//! Cancellation reason and kind types.
//!
//! Cancellation in fenceline is reported as data, not as a dedicated
//! error subtype. A fence records one [`CancelReason`] per trigger firing
//! and exposes the ordered record after it exits; the interruption itself
//! always travels as the runtime's plain cancellation error.

use core::fmt;
use std::sync::Arc;

/// The kind of condition that produced a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelKind {
    /// A deadline elapsed.
    Deadline,
    /// An external one-shot event was set.
    Event,
    /// A user-defined trigger condition, tagged with a static label.
    Custom(&'static str),
}

impl fmt::Display for CancelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deadline => write!(f, "deadline"),
            Self::Event => write!(f, "event"),
            Self::Custom(label) => write!(f, "{label}"),
        }
    }
}

/// Immutable record describing why cancellation occurred.
///
/// Reasons are cheap to clone; the message and code are shared.
///
/// # Example
///
/// ```
/// use fenceline::types::{CancelKind, CancelReason};
///
/// let reason = CancelReason::event("shutdown requested").with_code("shutdown");
/// assert_eq!(reason.kind(), CancelKind::Event);
/// assert_eq!(reason.code(), Some("shutdown"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReason {
    message: Arc<str>,
    kind: CancelKind,
    code: Option<Arc<str>>,
}

impl CancelReason {
    /// Creates a reason with the given kind and message.
    #[must_use]
    pub fn new(kind: CancelKind, message: impl Into<Arc<str>>) -> Self {
        Self {
            message: message.into(),
            kind,
            code: None,
        }
    }

    /// Creates a deadline reason.
    #[must_use]
    pub fn deadline(message: impl Into<Arc<str>>) -> Self {
        Self::new(CancelKind::Deadline, message)
    }

    /// Creates an event reason.
    #[must_use]
    pub fn event(message: impl Into<Arc<str>>) -> Self {
        Self::new(CancelKind::Event, message)
    }

    /// Creates a user-defined reason with a custom kind label.
    #[must_use]
    pub fn custom(label: &'static str, message: impl Into<Arc<str>>) -> Self {
        Self::new(CancelKind::Custom(label), message)
    }

    /// Attaches a machine-readable code for [`cancelled_by`] queries.
    ///
    /// [`cancelled_by`]: crate::fence::Fence::cancelled_by
    #[must_use]
    pub fn with_code(mut self, code: impl Into<Arc<str>>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the kind tag.
    #[must_use]
    pub const fn kind(&self) -> CancelKind {
        self.kind
    }

    /// Returns the machine-readable code, if one was attached.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub(crate) fn message_arc(&self) -> Arc<str> {
        Arc::clone(&self.message)
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(code) = &self.code {
            write!(f, " ({code})")?;
        }
        Ok(())
    }
}
