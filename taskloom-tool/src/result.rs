//! [`ToolCall`] / [`ToolResult`] — the executor's request/response pair
//! (§4.3 execution contract).

use serde::{Deserialize, Serialize};

use taskloom_types::Artifact;

/// A request to invoke one registered tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlates with the worker's `tool_call_start`/`tool_call_result`
    /// events.
    pub call_id: String,
    /// The tool's registered name.
    pub name: String,
    /// Arguments, validated against the tool's `parameter_schema`.
    pub args: serde_json::Value,
}

impl ToolCall {
    /// Construct a tool call.
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, args: serde_json::Value) -> Self {
        Self { call_id: call_id.into(), name: name.into(), args }
    }
}

/// Why a [`ToolResult`] is an error, when it is one. Matches the
/// taxonomy `invoke`'s six steps can fail at.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultKind {
    /// Step 1: no descriptor registered under that name.
    UnknownTool,
    /// Step 2: arguments failed JSON Schema validation.
    Validation,
    /// Step 3: the call violates the tool's effect-class policy.
    Policy,
    /// Step 4: the tool itself failed, timed out, or its sandbox crashed.
    Runtime,
}

/// The outcome of `Executor::invoke` (§4.3). Validation and policy
/// errors are always returned here rather than raised, so the worker
/// can feed them back to the model for self-correction.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Echoes the originating call's id.
    pub call_id: String,
    /// Whether this is an error outcome.
    pub is_error: bool,
    /// Present only when `is_error`.
    pub kind: Option<ToolResultKind>,
    /// Human-readable detail: `<field, reason>` for validation errors,
    /// the policy violated, or the runtime failure.
    pub detail: Option<String>,
    /// The tool's return value, clipped to the configured output size.
    /// `None` on error.
    pub value: Option<serde_json::Value>,
    /// Wall-clock duration of the invocation.
    pub duration_ms: u64,
    /// Present when a `workspace_write` tool persisted output that was
    /// registered as an artifact via C1.
    pub artifact: Option<Artifact>,
}

impl ToolResult {
    /// Construct a successful result.
    pub fn ok(call_id: impl Into<String>, value: serde_json::Value, duration_ms: u64) -> Self {
        Self {
            call_id: call_id.into(),
            is_error: false,
            kind: None,
            detail: None,
            value: Some(value),
            duration_ms,
            artifact: None,
        }
    }

    /// Construct an error result.
    pub fn error(call_id: impl Into<String>, kind: ToolResultKind, detail: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            call_id: call_id.into(),
            is_error: true,
            kind: Some(kind),
            detail: Some(detail.into()),
            value: None,
            duration_ms,
            artifact: None,
        }
    }

    /// Attach artifact metadata to an otherwise-built successful result.
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifact = Some(artifact);
        self
    }
}
