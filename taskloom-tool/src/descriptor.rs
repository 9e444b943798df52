//! [`ToolDescriptor`] — the declarative shape a tool is registered with
//! (§4.3): name, schema, and the effect class policy enforcement keys
//! off of.

use serde::{Deserialize, Serialize};

/// Which category of side effect a tool has. Drives the policy checks
/// `Executor::invoke` applies before running the tool.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectClass {
    /// No observable side effect; always safe to run.
    ReadOnly,
    /// Writes under the task's artifacts root. The argument named by
    /// [`ToolDescriptor::path_arg`] must resolve inside it.
    WorkspaceWrite,
    /// Makes an outbound network call.
    Network,
    /// Spawns a subprocess; always sandboxed regardless of
    /// `requires_sandbox`.
    Shell,
}

/// Declarative description of a registered tool, carrying the JSON
/// Schema (Draft 2020-12) its arguments must validate against plus the
/// effect class the executor enforces policy on.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// The tool's unique name.
    pub name: String,
    /// Human-readable description, surfaced to the model.
    pub description: String,
    /// JSON Schema (Draft 2020-12) for the tool's arguments.
    pub parameter_schema: serde_json::Value,
    /// The effect class, used for policy enforcement.
    pub effect_class: EffectClass,
    /// Whether execution must go through a sandboxed environment. Always
    /// `true` for `EffectClass::Shell` regardless of this field.
    pub requires_sandbox: bool,
    /// Whether the tool is permitted outbound network access when
    /// sandboxed (ignored unless `effect_class` is `Network` or `Shell`).
    pub requires_network: bool,
    /// For `EffectClass::WorkspaceWrite` tools, the name of the argument
    /// property holding the path to validate against the taskspace
    /// artifacts root. `None` means the tool takes no single path
    /// argument and is exempt from the path-escape check.
    pub path_arg: Option<String>,
}

impl ToolDescriptor {
    /// Describe a read-only tool: no sandboxing, no path policy.
    pub fn read_only(name: impl Into<String>, description: impl Into<String>, parameter_schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema,
            effect_class: EffectClass::ReadOnly,
            requires_sandbox: false,
            requires_network: false,
            path_arg: None,
        }
    }

    /// Describe a tool that writes into the taskspace artifacts root,
    /// validated against the argument named `path_arg`.
    pub fn workspace_write(
        name: impl Into<String>,
        description: impl Into<String>,
        parameter_schema: serde_json::Value,
        path_arg: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema,
            effect_class: EffectClass::WorkspaceWrite,
            requires_sandbox: false,
            requires_network: false,
            path_arg: Some(path_arg.into()),
        }
    }

    /// Describe a sandboxed shell tool.
    pub fn shell(name: impl Into<String>, description: impl Into<String>, parameter_schema: serde_json::Value, requires_network: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema,
            effect_class: EffectClass::Shell,
            requires_sandbox: true,
            requires_network,
            path_arg: None,
        }
    }
}
