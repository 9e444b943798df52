//! [`OrchestratorError`] — the error taxonomy surfaced by [`crate::Orchestrator`]'s
//! public contract (§4.6, §7).

use taskloom_types::error::ErrorKind;
use thiserror::Error;

/// Errors raised by [`crate::Orchestrator`]'s public operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// No taskspace exists for the given task id.
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// The call requires a generated plan but `write_plan` was never
    /// called for this task.
    #[error("task {0} has no plan yet")]
    NoPlan(String),

    /// The task is already in a terminal status (`completed`/`failed`)
    /// and cannot accept further dispatch.
    #[error("task {0} is already terminal")]
    Terminal(String),

    /// The plan engine rejected a DAG mutation (I1-I3). Non-recoverable:
    /// requires operator intervention via a manual plan edit.
    #[error("plan engine error: {0}")]
    Plan(#[from] taskloom_plan::PlanError),

    /// The taskspace store rejected a read or write.
    #[error("taskspace error: {0}")]
    Taskspace(#[from] taskloom_taskspace::TaskspaceError),

    /// The event bus failed to publish or replay.
    #[error("event bus error: {0}")]
    EventBus(#[from] taskloom_eventbus::EventBusError),

    /// The memory gateway failed to serve context or persist a rule.
    #[error("memory gateway error: {0}")]
    Memory(#[from] taskloom_memory::MemoryError),
}

impl OrchestratorError {
    /// This crate's [`ErrorKind`] classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::UnknownTask(_) | OrchestratorError::Terminal(_) => {
                ErrorKind::InvariantViolated
            }
            OrchestratorError::NoPlan(_) => ErrorKind::InvariantViolated,
            OrchestratorError::Plan(e) => e.kind(),
            OrchestratorError::Taskspace(e) => e.kind(),
            OrchestratorError::EventBus(e) => e.kind(),
            OrchestratorError::Memory(e) => e.kind(),
        }
    }
}
