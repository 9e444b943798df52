//! Shared error vocabulary and plan/message validation errors.

use thiserror::Error;

/// The error taxonomy every crate-local error maps onto via `kind()`.
///
/// Subscribers and callers can match on this without depending on any
/// individual crate's concrete error type.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed tool arguments. Recoverable by worker self-correction.
    Validation,
    /// Violated sandbox or access policy. Recoverable.
    Policy,
    /// Tool crashed or timed out. Recoverable up to a retry budget.
    Runtime,
    /// Worker budget exhausted.
    LimitExceeded,
    /// Plan DAG broken, seq gap, or other invariant violation. Non-recoverable.
    InvariantViolated,
    /// Durable storage unavailable. Non-recoverable at that moment.
    Storage,
    /// Caller-initiated cancellation. Not a failure.
    Cancelled,
    /// LLM provider error. Retried before being treated as runtime.
    Upstream,
}

impl ErrorKind {
    /// Whether an error of this kind can be fed back to a worker for
    /// self-correction rather than aborting the enclosing turn/task.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Validation | ErrorKind::Policy | ErrorKind::Runtime | ErrorKind::Upstream
        )
    }
}

/// Errors raised validating or mutating a [`crate::plan::Plan`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PlanError {
    /// Two steps in the plan share the same id.
    #[error("duplicate step id: {0}")]
    DuplicateStepId(String),

    /// A step depends on an id that isn't in the plan.
    #[error("step '{step}' depends on non-existent step '{dependency}'")]
    DanglingDependency {
        /// The step with the bad dependency.
        step: String,
        /// The missing dependency id.
        dependency: String,
    },

    /// The dependency graph contains a cycle. Carries the ids that never
    /// reached zero indegree, so callers can render a diagnostic without
    /// re-deriving them.
    #[error("plan dependency graph contains a cycle among: {0:?}")]
    Cycle(Vec<String>),

    /// Requested a transition the step state machine forbids.
    #[error("invalid transition for step '{step}': {from:?} -> {to:?}")]
    InvalidTransition {
        /// The step the transition was attempted on.
        step: String,
        /// The status the step was in.
        from: String,
        /// The status that was requested.
        to: String,
    },

    /// Referenced a step id that isn't in the plan.
    #[error("unknown step id: {0}")]
    UnknownStep(String),
}

impl PlanError {
    /// This crate's [`ErrorKind`] classification — always
    /// [`ErrorKind::InvariantViolated`] since every `PlanError` represents
    /// a broken DAG invariant rather than a recoverable worker mistake.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvariantViolated
    }
}

/// Errors raised validating a [`crate::message::Message`] sequence.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MessageError {
    /// A `tool_result` part referenced a `call_id` with no matching
    /// `tool_call` earlier in the conversation.
    #[error("tool_result references unknown call_id: {0}")]
    UnresolvedCallId(String),

    /// `seq` was not strictly increasing / gap-free.
    #[error("message seq {got} is not the expected {expected}")]
    SeqGap {
        /// The seq that was expected.
        expected: u64,
        /// The seq that was actually supplied.
        got: u64,
    },
}

impl MessageError {
    /// This crate's [`ErrorKind`] classification.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvariantViolated
    }
}
