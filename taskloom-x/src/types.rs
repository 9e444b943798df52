//! Small result and configuration types for the Orchestrator's public
//! contract (§4.6).

use taskloom_plan::PlannerConfig;
use taskloom_types::id::{StepId, TaskId};
use taskloom_types::step::StepStatus;
use taskloom_types::task::TaskStatus;

use crate::briefing::DEFAULT_CONTEXT_BUDGET_TOKENS;
use crate::classifier::Intent;

/// Static configuration for an [`crate::Orchestrator`] instance.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Configuration handed to the internal `taskloom_plan::PlanEngine`.
    pub planner: PlannerConfig,
    /// Token budget passed to `MemoryGateway::context_for` per briefing.
    pub context_budget_tokens: usize,
    /// Available worker roles offered to `PlanEngine::generate`, beyond
    /// whatever `TeamConfig::agents` supplies for a given `start`/`chat`
    /// call. Kept separate from `TeamConfig` since it's deployment-wide,
    /// not per-task.
    pub available_roles: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            planner: PlannerConfig::default(),
            context_budget_tokens: DEFAULT_CONTEXT_BUDGET_TOKENS,
            available_roles: Vec::new(),
        }
    }
}

/// Scope of a `cancel` call (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelScope {
    /// Abort only the currently running worker turn; the dispatch loop
    /// keeps going (the step is retried or failed, same as any other
    /// worker failure).
    Turn,
    /// Abort the running worker turn and pause the task: the dispatch
    /// loop exits and `Task::status` becomes `paused`. A subsequent
    /// `chat` resumes it.
    Task,
}

/// What `Orchestrator::chat` returns. The user message is persisted and
/// classified synchronously; only the dispatch-loop drain that follows a
/// `continue` classification runs in the background, since draining many
/// steps can take arbitrarily long. Callers await completion (or read
/// incrementally) by subscribing to the event bus from `from_seq`.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// The task this message was sent to.
    pub task_id: TaskId,
    /// The event `seq` immediately after the persisted user message;
    /// subscribe from here to see everything this call's follow-on work
    /// produces (plan regeneration, dispatch, an informational answer).
    pub from_seq: u64,
    /// How the message was classified. Resolved synchronously: only the
    /// work that follows classification (draining the dispatch loop for
    /// `continue`) happens in the background.
    pub intent: Intent,
}

/// What `Orchestrator::step` produces: the outcome of advancing exactly
/// one ready step, or a report that nothing was dispatched.
#[derive(Debug, Clone)]
pub struct StepReport {
    /// The step dispatched, or `None` if the plan had no ready step.
    pub step_id: Option<StepId>,
    /// The step's status after this call.
    pub status: Option<StepStatus>,
    /// The task's status after this call, in case dispatching this step
    /// happened to complete or fail the whole plan.
    pub task_status: TaskStatus,
}

impl StepReport {
    pub(crate) fn idle(task_status: TaskStatus) -> Self {
        Self {
            step_id: None,
            status: None,
            task_status,
        }
    }
}
