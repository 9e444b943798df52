//! Declarative team/agent configuration. The parser (YAML/TOML/JSON front
//! end) is an external collaborator (§6); this crate only owns the
//! resolved, in-memory shape, with `Default` on every optional field so a
//! front end can deserialize straight into it.

use serde::{Deserialize, Serialize};

/// One agent role available to the orchestrator.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Role tag referenced by `Step::assigned_role` (e.g. `"researcher"`).
    pub role: String,
    /// Role prompt, immutable at runtime.
    pub prompt: String,
    /// Names of tools this role may see. `None` means "all registered
    /// tools visible to the task".
    #[serde(default)]
    pub tools: Option<Vec<String>>,
    /// Model override for this role. `None` falls back to `TeamDefaults`.
    #[serde(default)]
    pub model: Option<String>,
}

/// Defaults applied when an `AgentConfig` or per-call override doesn't
/// specify a value.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamDefaults {
    /// Default model identifier.
    #[serde(default)]
    pub model: Option<String>,
    /// Default `max_retry_corrections` for the worker loop (§4.4).
    #[serde(default = "default_max_retry_corrections")]
    pub max_retry_corrections: u32,
    /// Default `max_tool_calls_per_turn` for the worker loop (§4.4).
    #[serde(default = "default_max_tool_calls_per_turn")]
    pub max_tool_calls_per_turn: u32,
}

fn default_max_retry_corrections() -> u32 {
    3
}

fn default_max_tool_calls_per_turn() -> u32 {
    16
}

impl Default for TeamDefaults {
    fn default() -> Self {
        Self {
            model: None,
            max_retry_corrections: default_max_retry_corrections(),
            max_tool_calls_per_turn: default_max_tool_calls_per_turn(),
        }
    }
}

/// A declarative team/agent configuration document (§6).
#[non_exhaustive]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamConfig {
    /// Every available agent role, including the implicit `"planner"` and
    /// classifier roles if the deployment overrides their prompts.
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    /// The role that drives top-level conversation/classification, if
    /// distinct from the orchestrator's built-in classifier.
    #[serde(default)]
    pub lead: Option<String>,
    /// Defaults applied across all agents unless overridden.
    #[serde(default)]
    pub defaults: TeamDefaults,
}

impl TeamConfig {
    /// Look up an agent role by name.
    pub fn role(&self, role: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.role == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_defaults_has_sane_defaults() {
        let defaults = TeamDefaults::default();
        assert_eq!(defaults.max_retry_corrections, 3);
        assert_eq!(defaults.max_tool_calls_per_turn, 16);
        assert!(defaults.model.is_none());
    }

    #[test]
    fn role_lookup() {
        let config = TeamConfig {
            agents: vec![AgentConfig {
                role: "researcher".into(),
                prompt: "find sources".into(),
                tools: None,
                model: None,
            }],
            lead: None,
            defaults: TeamDefaults::default(),
        };
        assert!(config.role("researcher").is_some());
        assert!(config.role("writer").is_none());
    }

    #[test]
    fn deserializes_from_minimal_json() {
        let json = serde_json::json!({
            "agents": [{"role": "writer", "prompt": "write well"}]
        });
        let config: TeamConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.defaults.max_tool_calls_per_turn, 16);
        assert_eq!(config.agents[0].role, "writer");
    }
}
