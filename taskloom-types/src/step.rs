//! [`Step`] — a unit of work within a [`crate::plan::Plan`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::id::StepId;

/// Default retry ceiling for a failed step (§3 Step, `MAX_ATTEMPTS`).
pub const MAX_ATTEMPTS: u32 = 3;

/// Lifecycle status of a [`Step`].
///
/// State machine: `Pending -> InProgress -> {Completed, Failed}`;
/// `Failed -> Pending` allowed once on retry if `attempts < MAX_ATTEMPTS`;
/// `Pending -> Skipped` allowed only during plan revision.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet dispatched; may be waiting on dependencies.
    Pending,
    /// Currently assigned to a worker. At most one per plan (I4).
    InProgress,
    /// Worker produced a result; terminal for this step.
    Completed,
    /// Worker exhausted retries or hit a non-recoverable error.
    Failed,
    /// Dropped during a plan revision; kept for audit, never re-dispatched.
    Skipped,
}

/// A structured error attached to a failed step.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepError {
    /// Stable error taxonomy tag (mirrors `taskloom_types::ErrorKind`, kept
    /// as a string here so steps stay serializable without a dependency
    /// edge back onto the worker/tool crates).
    pub kind: String,
    /// Human-readable detail.
    pub detail: String,
}

impl StepError {
    /// Construct a new structured step error.
    pub fn new(kind: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            detail: detail.into(),
        }
    }
}

/// A node in the plan DAG, executed by a specialist worker.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Identifier, unique within the owning plan (I1).
    pub id: StepId,
    /// Short human-readable name.
    pub name: String,
    /// Free-text instruction handed to the worker as `step_goal`.
    pub goal: String,
    /// Worker role tag (e.g. `researcher`, `writer`) used to select a
    /// role prompt and tool projection.
    pub assigned_role: String,
    /// Step ids this step depends on (I2: must exist in the same plan).
    pub dependencies: BTreeSet<StepId>,
    /// Current lifecycle status.
    pub status: StepStatus,
    /// Number of dispatch attempts so far.
    pub attempts: u32,
    /// Pointer to the worker's final message/artifact, once completed.
    pub result_ref: Option<String>,
    /// Structured error, once failed.
    pub error: Option<StepError>,
}

impl Step {
    /// Create a new, not-yet-dispatched step.
    pub fn new(
        id: impl Into<StepId>,
        name: impl Into<String>,
        goal: impl Into<String>,
        assigned_role: impl Into<String>,
        dependencies: impl IntoIterator<Item = StepId>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            goal: goal.into(),
            assigned_role: assigned_role.into(),
            dependencies: dependencies.into_iter().collect(),
            status: StepStatus::Pending,
            attempts: 0,
            result_ref: None,
            error: None,
        }
    }

    /// Whether `new_status` is a legal transition from the step's current
    /// status, per the §3 state machine.
    pub fn can_transition_to(&self, new_status: StepStatus) -> bool {
        use StepStatus::*;
        match (self.status, new_status) {
            (Pending, InProgress) => true,
            (InProgress, Completed) => true,
            (InProgress, Failed) => true,
            (Failed, Pending) => self.attempts < MAX_ATTEMPTS,
            (Pending, Skipped) => true,
            (from, to) if from == to => true,
            _ => false,
        }
    }
}
