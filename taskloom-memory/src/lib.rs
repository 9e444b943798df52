#![deny(missing_docs)]
//! Memory Gateway (C7): the narrow, stable facade the core reads
//! context through and writes rules through (§4.7).
//!
//! The real semantic store, summarizer, or rule extractor is an
//! external collaborator behind [`MemoryGateway`]; [`LocalMemoryGateway`]
//! is the reference backend — it persists rules via
//! [`taskloom_taskspace::TaskspaceStore`] and returns an empty semantic
//! retrieval list, since it has no vector index of its own.

mod error;

pub use error::MemoryError;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use taskloom_taskspace::TaskspaceStore;
use taskloom_types::{MemoryRule, TaskId};

/// Chars-per-token ratio used to size `context_for`'s budget.
const CHARS_PER_TOKEN: usize = 4;

/// One block of context handed to a worker briefing. Ordering within a
/// `context_for` response is significant: rules first, most-similar
/// semantic retrievals next.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBlock {
    /// Where this block came from.
    pub source: ContextSource,
    /// The block's rendered text.
    pub text: String,
}

/// Provenance tag for a [`ContextBlock`], so a worker prompt can group or
/// weight blocks differently by origin without string-sniffing.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    /// A `constraint` memory rule.
    Constraint,
    /// A `preference` memory rule.
    Preference,
    /// A `hot_issue` memory rule.
    HotIssue,
    /// A semantic retrieval from an external index.
    Retrieval,
}

impl ContextBlock {
    fn from_rule(rule: &MemoryRule) -> Self {
        let source = match rule {
            MemoryRule::Constraint { .. } => ContextSource::Constraint,
            MemoryRule::Preference { .. } => ContextSource::Preference,
            MemoryRule::HotIssue { .. } => ContextSource::HotIssue,
        };
        ContextBlock { source, text: rule.text().to_string() }
    }

    fn approx_tokens(&self) -> usize {
        (self.text.len() / CHARS_PER_TOKEN).max(1)
    }
}

/// Narrow, stable interface the core reads context through and writes
/// rules through. The concrete backend (vector store, summarizer, rule
/// extractor) is an external collaborator; this trait is the contract
/// it implements.
#[async_trait]
pub trait MemoryGateway: Send + Sync {
    /// Up to `budget_tokens` worth of context blocks for `task_id`: all
    /// active `constraint`s and `hot_issue`s first, then semantic
    /// retrievals for `query_text` until the budget is spent.
    async fn context_for(
        &self,
        task_id: &TaskId,
        query_text: &str,
        budget_tokens: usize,
    ) -> Result<Vec<ContextBlock>, MemoryError>;

    /// Persist `rule` so future `context_for` calls include it.
    async fn record_rule(&self, task_id: &TaskId, rule: MemoryRule) -> Result<(), MemoryError>;

    /// Remove every active hot issue whose `origin_step_id` matches.
    async fn clear_hot_issue(&self, task_id: &TaskId, origin_step_id: &str) -> Result<(), MemoryError>;

    /// Offer `text` (tagged with `tags`) for asynchronous indexing.
    /// Non-blocking: a failure here must never block the orchestrator,
    /// so implementations log and swallow rather than propagate.
    async fn ingest(&self, task_id: &TaskId, text: &str, tags: &[String]);
}

/// Reference [`MemoryGateway`] backend: rules persist through
/// [`TaskspaceStore`]; `ingest` is accepted and logged but not indexed,
/// and `context_for`'s semantic-retrieval portion is always empty.
pub struct LocalMemoryGateway {
    store: Arc<TaskspaceStore>,
}

impl LocalMemoryGateway {
    /// Build a gateway over a shared taskspace store.
    pub fn new(store: Arc<TaskspaceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MemoryGateway for LocalMemoryGateway {
    async fn context_for(
        &self,
        task_id: &TaskId,
        _query_text: &str,
        budget_tokens: usize,
    ) -> Result<Vec<ContextBlock>, MemoryError> {
        let rules = self.store.read_memory_rules(task_id).await?;
        let mut blocks = Vec::with_capacity(rules.len());
        let mut spent = 0usize;
        for rule in &rules {
            let block = ContextBlock::from_rule(rule);
            let cost = block.approx_tokens();
            if spent + cost > budget_tokens && !blocks.is_empty() {
                break;
            }
            spent += cost;
            blocks.push(block);
        }
        // No semantic index backs this reference implementation: the
        // retrieval portion of the budget goes unused rather than
        // fabricating blocks.
        Ok(blocks)
    }

    async fn record_rule(&self, task_id: &TaskId, rule: MemoryRule) -> Result<(), MemoryError> {
        self.store.append_memory_rule(task_id, rule).await?;
        Ok(())
    }

    async fn clear_hot_issue(&self, task_id: &TaskId, origin_step_id: &str) -> Result<(), MemoryError> {
        self.store.clear_hot_issue(task_id, origin_step_id).await?;
        Ok(())
    }

    async fn ingest(&self, task_id: &TaskId, text: &str, tags: &[String]) {
        tracing::debug!(
            target: "memory",
            task_id = %task_id,
            tags = ?tags,
            len = text.len(),
            "ingest accepted but not indexed by the local reference backend"
        );
    }
}
