//! Error types for fenceline.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Cancellation is a plain [`ErrorKind::Cancelled`] error; there is no
//!   dedicated cancellation subtype. Structured-concurrency constructs
//!   dispatch on the kind, so a subtype would be misclassified, and user
//!   code matching on `Cancelled` would inadvertently catch fence-owned
//!   cancellations. The *why* travels as data on the fence instead.
//! - Misuse (entering a fence outside a task, reusing a fence) is
//!   reported at the boundary and never recovered from.

use core::fmt;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The current task received a cancellation request and observed it
    /// at a suspension point.
    Cancelled,
    /// A native deadline scope ([`crate::time::timeout`]) expired.
    DeadlineExceeded,
    /// A fence was entered outside any runtime task.
    NotInTask,
    /// A fence object was entered a second time.
    FenceReused,
    /// User-provided error.
    User,
    /// Internal runtime error (bug).
    Internal,
}

impl ErrorKind {
    /// Returns a human-readable name for the kind.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline exceeded",
            Self::NotInTask => "not in task",
            Self::FenceReused => "fence reused",
            Self::User => "user error",
            Self::Internal => "internal error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The crate error type: a kind plus an optional shared message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: Option<Arc<str>>,
}

impl Error {
    /// Creates a new error with the given kind and no message.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Attaches a message to this error.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<Arc<str>>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Creates a cancellation error carrying the requester's message.
    #[must_use]
    pub fn cancelled(message: impl Into<Arc<str>>) -> Self {
        Self::new(ErrorKind::Cancelled).with_message(message)
    }

    /// Creates a user error with a message.
    #[must_use]
    pub fn user(message: impl Into<Arc<str>>) -> Self {
        Self::new(ErrorKind::User).with_message(message)
    }

    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns true if this error is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.kind, message),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Error {}
