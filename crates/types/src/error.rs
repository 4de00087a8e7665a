//! The cross-subsystem error taxonomy.
//!
//! `ErrorKind` is the classification used by the retry primitive, the
//! broker's fallback logic, and the queue's backoff logic to decide whether
//! a failure is transient. Individual crates define their own `thiserror`
//! error enums for their public API and implement [`Classify`] to map into
//! this shared taxonomy.
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection/timeout to a provider or skill service. Recovered locally
    /// by retry and provider fallback.
    Transport,
    /// Provider signaled rate limiting. Recovered by longer backoff and
    /// provider fallback; flagged in the cost record.
    RateLimit,
    /// Bad/expired credentials. Provider removed from `available_providers`;
    /// never retried under the same key.
    Auth,
    /// The LLM returned non-conforming JSON, or a malformed stream chunk.
    Parse,
    /// No provider is available for the task.
    Capacity,
    /// A skill returned `success=false` or raised.
    Skill,
    /// Invalid intent/role/category.
    Validation,
    /// Queue enqueue/dequeue failure.
    Queue,
    /// Configuration missing at startup; the process refuses to start.
    Fatal,
}

impl ErrorKind {
    /// Whether [`crate::retry`]-style wrappers should retry this kind at all.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transport | ErrorKind::RateLimit)
    }
}

/// A minimal, crate-agnostic error carrying a classification, used at
/// boundaries where a concrete per-crate error type would be overkill.
#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn capacity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Capacity, message)
    }
}

/// Implemented by per-crate error enums to expose their [`ErrorKind`]
/// without forcing every crate to depend on every other crate's error type.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

impl Classify for CoreError {
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}
