//! The `chat` classifier (§4.6): a single worker turn over a fixed prompt
//! that routes an incoming user message to one of four intents.

use std::sync::Arc;

use taskloom_eventbus::EventBus;
use taskloom_proto::CancellationToken;
use taskloom_taskspace::TaskspaceStore;
use taskloom_tool::Executor;
use taskloom_turn::provider::Provider;
use taskloom_types::id::{StepId, TaskId};
use taskloom_worker::{Briefing, Worker, WorkerConfig, WorkerStatus};

/// What the classifier decided about an incoming user message (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Discard the current plan and generate a fresh one from this message.
    NewGoal,
    /// Feed this message through `Plan.revise`.
    Revision,
    /// Answer directly from the message log / memory; no plan change.
    Informational,
    /// No classification change; proceed to the next ready step.
    Continue,
}

impl Intent {
    /// Parse a classifier tag. Anything other than the three named tags
    /// is treated as `informational`, per §4.6.
    fn from_tag(tag: &str) -> Self {
        let cleaned = tag
            .trim()
            .trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .to_ascii_lowercase();
        match cleaned.as_str() {
            "new_goal" => Intent::NewGoal,
            "revision" => Intent::Revision,
            "continue" => Intent::Continue,
            _ => Intent::Informational,
        }
    }
}

/// Step id the classifier's worker turn is recorded under. Not a real
/// plan step; chosen to be unambiguous in the message log.
pub const CLASSIFIER_STEP_ID: &str = "__classifier__";

const CLASSIFIER_ROLE_PROMPT: &str = "You are the routing classifier for a task orchestrator. \
Read the user's message and respond with exactly one word and nothing else: `new_goal` if the \
message replaces the task's goal with an unrelated one, `revision` if it changes or adds \
requirements to the existing plan, `continue` if it's an instruction to proceed with no plan \
change, or `informational` if it's a question or comment that needs an answer but no plan \
change.";

/// Classifier-sized worker bounds: one short completion, no tool calls.
fn classifier_worker_config() -> WorkerConfig {
    WorkerConfig {
        max_tool_calls_per_turn: 0,
        max_retry_corrections: 0,
        max_tokens: 16,
        ..WorkerConfig::default()
    }
}

/// Run the classifier over `user_message`: a worker turn with no tools
/// and a fixed system prompt, reusing the same retry/provider machinery
/// as any other worker turn (§4.6 "Ambient").
pub async fn classify<P: Provider>(
    provider: P,
    executor: Arc<Executor>,
    event_bus: Arc<EventBus>,
    store: Arc<TaskspaceStore>,
    task_id: &TaskId,
    user_message: &str,
    cancel: CancellationToken,
) -> Intent {
    let worker = Worker::new(provider, executor, event_bus, store, classifier_worker_config());
    let briefing = Briefing::new(CLASSIFIER_ROLE_PROMPT, user_message.to_string());
    let result = worker
        .run(task_id, &StepId::new(CLASSIFIER_STEP_ID), briefing, cancel)
        .await;
    match result.status {
        WorkerStatus::Completed => result
            .final_text
            .as_deref()
            .map(Intent::from_tag)
            .unwrap_or(Intent::Informational),
        WorkerStatus::Failed => Intent::Informational,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_exact_tags() {
        assert_eq!(Intent::from_tag("new_goal"), Intent::NewGoal);
        assert_eq!(Intent::from_tag("revision"), Intent::Revision);
        assert_eq!(Intent::from_tag("continue"), Intent::Continue);
        assert_eq!(Intent::from_tag("informational"), Intent::Informational);
    }

    #[test]
    fn tolerates_surrounding_punctuation_and_case() {
        assert_eq!(Intent::from_tag(" New_Goal.\n"), Intent::NewGoal);
        assert_eq!(Intent::from_tag("`revision`"), Intent::Revision);
    }

    #[test]
    fn anything_else_is_informational() {
        assert_eq!(Intent::from_tag("I'm not sure"), Intent::Informational);
        assert_eq!(Intent::from_tag(""), Intent::Informational);
    }
}
