//! [`MemoryRule`] — constraints, preferences, and hot issues that the
//! Memory Gateway always re-injects into worker briefings until cleared.

use serde::{Deserialize, Serialize};

/// An item extracted from user input or tool failures.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryRule {
    /// A hard requirement the user stated (e.g. "never touch `main`").
    Constraint {
        /// The constraint text.
        text: String,
    },
    /// A soft preference (e.g. "prefer bullet points").
    Preference {
        /// The preference text.
        text: String,
    },
    /// A transient problem that must be surfaced to every subsequent
    /// worker turn until resolved (e.g. a failing check).
    HotIssue {
        /// The issue text.
        text: String,
        /// The step whose failure produced this hot issue.
        origin_step_id: String,
    },
}

impl MemoryRule {
    /// The step id a `HotIssue` originated from, if any. Used by
    /// `clear_hot_issue` to find matching rules.
    pub fn origin_step_id(&self) -> Option<&str> {
        match self {
            MemoryRule::HotIssue { origin_step_id, .. } => Some(origin_step_id),
            _ => None,
        }
    }

    /// The human-readable text of the rule, regardless of variant.
    pub fn text(&self) -> &str {
        match self {
            MemoryRule::Constraint { text } => text,
            MemoryRule::Preference { text } => text,
            MemoryRule::HotIssue { text, .. } => text,
        }
    }
}
