//! [`Task`] — a top-level unit of work owned by exactly one orchestrator.

use crate::id::TaskId;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Lifecycle status of a task.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, plan not yet generated or dispatch not yet started.
    Pending,
    /// Dispatch loop is actively advancing steps.
    Running,
    /// Dispatch loop exited on user/operator cancellation; resumable.
    Paused,
    /// Plan is fully satisfied; terminal.
    Completed,
    /// Plan cannot make further progress; terminal.
    Failed,
}

impl TaskStatus {
    /// Whether this status is terminal (no further transitions expected
    /// without operator intervention).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// A top-level, long-running unit of work with its own plan, taskspace,
/// and event stream.
///
/// `goal` and `created_at` are immutable for the life of the task; `status`
/// and `plan_version` change as the orchestrator drives the dispatch loop.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Opaque, URL-safe, globally-unique (within a deployment) identifier.
    pub task_id: TaskId,
    /// Original user intent. Never rewritten — revisions produce new plans,
    /// not a new goal.
    pub goal: String,
    /// Opaque tag identifying the owning user. Access control is external.
    pub user_id: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Monotone counter bumped on every `write_plan`.
    pub plan_version: u64,
    /// Creation timestamp, milliseconds since the Unix epoch.
    pub created_at: u64,
    /// Last-modified timestamp, milliseconds since the Unix epoch.
    pub updated_at: u64,
}

impl Task {
    /// Create a new task in `Pending` status at plan version 0.
    pub fn new(task_id: TaskId, goal: impl Into<String>, user_id: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            task_id,
            goal: goal.into(),
            user_id: user_id.into(),
            status: TaskStatus::Pending,
            plan_version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to a new status, bumping `updated_at`.
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = now_millis();
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
