//! [`Message`] — an element of the per-task conversation log, and the
//! [`Part`] variants it's made of (I6, I7).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::MessageError;

/// Author role of a [`Message`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The end user.
    User,
    /// The worker/model.
    Assistant,
    /// System-authored (briefings, orchestrator narration).
    System,
    /// A tool result, recorded as its own message in some transports.
    Tool,
}

/// A tagged content element within a [`Message`].
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// A tool invocation request emitted by the worker's model.
    ToolCall {
        /// Correlates with the `ToolResult` part that resolves this call (I6).
        call_id: String,
        /// Registered tool name.
        tool_name: String,
        /// Arguments as passed to the tool.
        args: serde_json::Value,
    },
    /// The outcome of a resolved `ToolCall`.
    ToolResult {
        /// The `call_id` of the `ToolCall` this resolves.
        call_id: String,
        /// Tool name, duplicated for readability without a join.
        tool_name: String,
        /// Result payload (may itself encode an error body).
        result: serde_json::Value,
        /// Whether execution errored.
        is_error: bool,
        /// Wall-clock duration of the tool invocation, in milliseconds.
        duration_ms: u64,
    },
    /// Chain-of-thought / scratch reasoning, kept separate from `Text` so
    /// transports can choose whether to surface it.
    Reasoning {
        /// The reasoning text.
        text: String,
    },
    /// Marks the start of a step's worker turn within the message log.
    StepStart {
        /// The step this turn was dispatched for.
        step_id: String,
    },
    /// A structured error surfaced inline in the conversation.
    Error {
        /// Stable taxonomy tag (mirrors `ErrorKind`).
        kind: String,
        /// Human-readable detail.
        detail: String,
    },
}

impl Part {
    /// The `call_id` a `ToolCall` introduces, or a `ToolResult` resolves.
    pub fn call_id(&self) -> Option<&str> {
        match self {
            Part::ToolCall { call_id, .. } => Some(call_id),
            Part::ToolResult { call_id, .. } => Some(call_id),
            _ => None,
        }
    }
}

/// An element of the conversation log.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Monotone, gap-free sequence number within the task (I7).
    pub seq: u64,
    /// Author role.
    pub role: Role,
    /// Ordered content parts.
    pub parts: Vec<Part>,
    /// Creation timestamp, milliseconds since the Unix epoch.
    pub created_at: u64,
}

impl Message {
    /// Construct a message. `created_at` is the caller's responsibility —
    /// the taskspace assigns `seq` on append, not the message itself.
    pub fn new(role: Role, parts: Vec<Part>, created_at: u64) -> Self {
        Self {
            seq: 0,
            role,
            parts,
            created_at,
        }
    }

    /// Validate I6: every `ToolResult` in this message references a
    /// `call_id` introduced by a `ToolCall` in `prior_call_ids` or earlier
    /// in this same message.
    pub fn validate_resolution(&self, prior_call_ids: &HashSet<String>) -> Result<(), MessageError> {
        let mut known: HashSet<&str> = prior_call_ids.iter().map(String::as_str).collect();
        for part in &self.parts {
            match part {
                Part::ToolCall { call_id, .. } => {
                    known.insert(call_id.as_str());
                }
                Part::ToolResult { call_id, .. } => {
                    if !known.contains(call_id.as_str()) {
                        return Err(MessageError::UnresolvedCallId(call_id.clone()));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// `call_id`s this message introduces via `ToolCall` parts.
    pub fn introduced_call_ids(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            Part::ToolCall { call_id, .. } => Some(call_id.as_str()),
            _ => None,
        })
    }

    /// Whether every `ToolCall` in this message has a matching `ToolResult`
    /// (I8: the worker-turn-local variant of resolution).
    pub fn all_calls_resolved(&self) -> bool {
        let resolved: HashSet<&str> = self
            .parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolResult { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect();
        self.introduced_call_ids().all(|id| resolved.contains(id))
    }
}

/// Validate I7 (seq is gap-free and strictly increasing) across an ordered
/// slice of already-appended messages.
pub fn validate_seq_sequence(messages: &[Message]) -> Result<(), MessageError> {
    for (i, message) in messages.iter().enumerate() {
        let expected = i as u64;
        if message.seq != expected {
            return Err(MessageError::SeqGap {
                expected,
                got: message.seq,
            });
        }
    }
    Ok(())
}
