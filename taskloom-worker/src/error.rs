//! [`WorkerError`] — the structured error a failed [`crate::WorkerResult`]
//! carries back to the orchestrator (§7).

use taskloom_types::error::ErrorKind;

/// A structured error terminating a worker turn.
///
/// Mirrors [`taskloom_types::step::StepError`]'s shape but keeps `kind`
/// typed rather than a bare string, since the worker already depends on
/// `taskloom-types` directly.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct WorkerError {
    /// Stable error taxonomy tag.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub detail: String,
}

impl WorkerError {
    /// Construct a worker error of the given kind.
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// A `limit_exceeded` error: a turn bound was hit.
    pub fn limit_exceeded(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::LimitExceeded, detail)
    }

    /// A `cancelled` error: the caller requested cancellation mid-turn.
    pub fn cancelled(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, detail)
    }

    /// This error's stable taxonomy tag, lowercased (e.g. `"limit_exceeded"`).
    pub fn kind_tag(&self) -> String {
        match self.kind {
            ErrorKind::Validation => "validation".to_string(),
            ErrorKind::Policy => "policy".to_string(),
            ErrorKind::Runtime => "runtime".to_string(),
            ErrorKind::LimitExceeded => "limit_exceeded".to_string(),
            ErrorKind::InvariantViolated => "invariant_violated".to_string(),
            ErrorKind::Storage => "storage".to_string(),
            ErrorKind::Cancelled => "cancelled".to_string(),
            ErrorKind::Upstream => "upstream".to_string(),
        }
    }
}

impl std::fmt::Display for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind_tag(), self.detail)
    }
}

impl std::error::Error for WorkerError {}
