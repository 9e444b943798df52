//! Errors raised by the taskspace store.

use taskloom_types::ErrorKind;
use thiserror::Error;

/// Errors raised by [`crate::TaskspaceStore`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TaskspaceError {
    /// `create` was called for a task id that already has a taskspace.
    #[error("taskspace already exists for task {0}")]
    AlreadyExists(String),

    /// `load` was called for a task id with no taskspace on disk.
    #[error("no taskspace for task {0}")]
    NotFound(String),

    /// `state.json` or a log file was unreadable or malformed. Recovery
    /// truncates `events.log` at the last fully-written record; this
    /// variant reports how many trailing bytes were discarded.
    #[error("taskspace for {task} is corrupt: {detail}")]
    Corrupt {
        /// The affected task.
        task: String,
        /// What was wrong.
        detail: String,
    },

    /// A mutating call was made against a task whose status is terminal.
    #[error("taskspace for {0} is closed")]
    Closed(String),

    /// `write_plan` was given a plan that violates I1-I3.
    #[error("invalid plan: {0}")]
    InvalidPlan(#[from] taskloom_types::PlanError),

    /// `append_event`/`append_message` was given an entity whose
    /// `task_id` doesn't match the taskspace it was called against.
    #[error("event/message task_id mismatch: expected {expected}, got {got}")]
    TaskIdMismatch {
        /// The taskspace this call targeted.
        expected: String,
        /// The `task_id` carried by the entity.
        got: String,
    },

    /// `write_artifact` was given a path that escapes the taskspace root.
    #[error("artifact path escapes taskspace root: {0}")]
    UnsafePath(String),

    /// Underlying filesystem I/O failed.
    #[error("taskspace I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record failed to (de)serialize.
    #[error("taskspace serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TaskspaceError {
    /// This crate's [`ErrorKind`] classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskspaceError::AlreadyExists(_)
            | TaskspaceError::NotFound(_)
            | TaskspaceError::Closed(_) => ErrorKind::InvariantViolated,
            TaskspaceError::Corrupt { .. } => ErrorKind::Storage,
            TaskspaceError::InvalidPlan(_) => ErrorKind::InvariantViolated,
            TaskspaceError::TaskIdMismatch { .. } => ErrorKind::InvariantViolated,
            TaskspaceError::UnsafePath(_) => ErrorKind::Policy,
            TaskspaceError::Io(_) => ErrorKind::Storage,
            TaskspaceError::Serialization(_) => ErrorKind::Storage,
        }
    }
}
