//! [`Event`] — an immutable, seq-stamped record broadcast on the event bus.

use serde::{Deserialize, Serialize};

use crate::id::TaskId;

/// Tagged variant of everything that can happen inside a task, in the
/// vocabulary subscribers (SSE clients, dashboards) render directly.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// A new assistant message began streaming.
    MessageStart {
        /// The message's eventual `seq` in the message log.
        message_seq: u64,
    },
    /// A token/content delta within an in-flight message.
    PartDelta {
        /// The message this delta belongs to.
        message_seq: u64,
        /// Index of the part within the message being streamed.
        part_index: usize,
        /// Incremental text.
        text: String,
    },
    /// A part finished streaming (tool call fully parsed, text block closed).
    PartComplete {
        /// The message this part belongs to.
        message_seq: u64,
        /// Index of the completed part.
        part_index: usize,
    },
    /// A message reached a terminal state (`completed` or `cancelled`).
    MessageComplete {
        /// The completed message's `seq`.
        message_seq: u64,
        /// Terminal status: `"completed"` or `"cancelled"`.
        status: String,
    },
    /// A worker is about to invoke a tool.
    ToolCallStart {
        /// Correlates with the matching `ToolCallResult`.
        call_id: String,
        /// Tool name.
        tool_name: String,
    },
    /// A tool invocation resolved.
    ToolCallResult {
        /// The `call_id` this resolves.
        call_id: String,
        /// Tool name.
        tool_name: String,
        /// Whether the invocation errored.
        is_error: bool,
        /// Error taxonomy tag, present only when `is_error`.
        error_kind: Option<String>,
        /// Wall-clock duration, in milliseconds.
        duration_ms: u64,
    },
    /// A step transitioned status.
    StepStatusChanged {
        /// The step that transitioned.
        step_id: String,
        /// New status, as its serde tag (e.g. `"completed"`).
        status: String,
    },
    /// The plan was (re)written; carries the new version, not the full plan
    /// body — subscribers re-fetch from the taskspace if they need it.
    PlanUpdated {
        /// The plan version after the write.
        plan_version: u64,
    },
    /// Task-level status changed (includes `paused` with a `reason`).
    TaskUpdate {
        /// New task status, as its serde tag.
        status: String,
        /// Optional reason (e.g. `"storage"` for a storage-induced pause).
        reason: Option<String>,
    },
    /// An artifact was created or a new version written.
    ArtifactUpdate {
        /// Artifact path, relative to the taskspace root.
        path: String,
        /// Version number after the write.
        version: u64,
    },
    /// An error surfaced to subscribers without otherwise changing task
    /// or step status (e.g. `cancelled`).
    Error {
        /// Stable taxonomy tag.
        kind: String,
        /// Human-readable detail.
        detail: String,
    },
}

/// An immutable record broadcast on the event bus.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// The task this event belongs to.
    pub task_id: TaskId,
    /// Monotone, gap-free sequence number within the task (P3).
    pub seq: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// The event payload.
    pub kind: EventKind,
}

impl Event {
    /// Construct an event. `seq` is assigned by the taskspace on append,
    /// not by the caller — this constructor takes 0 as a placeholder.
    pub fn new(task_id: TaskId, timestamp: u64, kind: EventKind) -> Self {
        Self {
            task_id,
            seq: 0,
            timestamp,
            kind,
        }
    }
}
