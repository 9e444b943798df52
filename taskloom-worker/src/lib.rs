#![deny(missing_docs)]
//! Worker Reasoning Loop (C4): drives a language model through a bounded
//! sequence of think -> tool -> observe cycles for a single assigned step.
//!
//! Structured the way the donor codebase's ReAct operator is structured
//! (resolve inputs, loop over the model, dispatch tool calls, check
//! bounds) but adapted to this system's seams: tool calls go through
//! [`taskloom_tool::Executor::invoke`] rather than a bare `ToolDyn::call`,
//! every turn publishes its own events to [`taskloom_eventbus::EventBus`],
//! and a subset of tool failures drive a retry-budget-gated
//! self-correction loop instead of being treated uniformly.

mod error;

pub use error::WorkerError;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::Instrument;

use taskloom_eventbus::EventBus;
use taskloom_proto::CancellationToken;
use taskloom_taskspace::TaskspaceStore;
use taskloom_tool::{Executor, ToolCall, ToolResult, ToolResultKind};
use taskloom_turn::provider::Provider;
use taskloom_turn::types::{
    ContentPart, ProviderMessage, ProviderRequest, Role as TurnRole, StopReason, ToolSchema,
};
use taskloom_types::artifact::Artifact;
use taskloom_types::error::ErrorKind;
use taskloom_types::id::{StepId, TaskId};
use taskloom_types::message::{Message, Part, Role as DomainRole};

/// Recent-message window taken from [`Briefing::conversation_tail`] if the
/// caller supplied more than this many messages.
pub const DEFAULT_CONVERSATION_TAIL: usize = 20;

/// Target size, in characters, of a simulated streaming chunk.
const STREAM_CHUNK_CHARS: usize = 40;

/// Everything the worker needs to drive one step to completion, assembled
/// by the orchestrator from the plan, the role config, and the memory
/// gateway (§4.4).
#[derive(Debug, Clone)]
pub struct Briefing {
    /// The role's system prompt, fixed at runtime.
    pub role_prompt: String,
    /// What this step is trying to accomplish.
    pub step_goal: String,
    /// Context blocks surfaced by the memory gateway: constraints, hot
    /// issues, semantic retrievals, summaries of prior completed steps.
    pub relevant_context: Vec<String>,
    /// Tool schemas visible to this role for this step.
    pub visible_tools: Vec<ToolSchema>,
    /// A bounded window of recent provider-level messages.
    pub conversation_tail: Vec<ProviderMessage>,
}

impl Briefing {
    /// Construct a briefing with no prior context or conversation.
    pub fn new(role_prompt: impl Into<String>, step_goal: impl Into<String>) -> Self {
        Self {
            role_prompt: role_prompt.into(),
            step_goal: step_goal.into(),
            relevant_context: Vec::new(),
            visible_tools: Vec::new(),
            conversation_tail: Vec::new(),
        }
    }

    fn system_prompt(&self) -> String {
        if self.relevant_context.is_empty() {
            self.role_prompt.clone()
        } else {
            format!(
                "{}\n\n{}",
                self.role_prompt,
                self.relevant_context.join("\n\n")
            )
        }
    }
}

/// Bounds enforced across a single turn (§4.4 "Bounds").
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Upper bound on tool calls invoked within one turn.
    pub max_tool_calls_per_turn: u32,
    /// Shared self-correction budget for `validation`/`policy`/`runtime`
    /// tool errors within one turn.
    pub max_retry_corrections: u32,
    /// Wall-clock budget for the whole turn, from the first model call to
    /// the returned result.
    pub max_wall_clock_per_turn: Duration,
    /// Model identifier passed through to the provider request, if any.
    pub model: Option<String>,
    /// `max_tokens` passed through to the provider request.
    pub max_tokens: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_tool_calls_per_turn: 16,
            max_retry_corrections: 3,
            max_wall_clock_per_turn: Duration::from_secs(600),
            model: None,
            max_tokens: 4096,
        }
    }
}

/// Terminal status of a completed worker turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// The turn reached end-of-message with no pending tool calls.
    Completed,
    /// The turn was terminated early: a non-recoverable error, an
    /// exhausted bound, or a cancellation.
    Failed,
}

/// What a single call to [`Worker::run`] produces (§4.4 "Outputs").
#[derive(Debug, Clone)]
pub struct WorkerResult {
    /// Whether the turn completed or failed.
    pub status: WorkerStatus,
    /// The model's final text, if the turn completed.
    pub final_text: Option<String>,
    /// Artifacts written by tools invoked during the turn.
    pub artifacts_written: Vec<Artifact>,
    /// The terminating error, if the turn failed.
    pub error: Option<WorkerError>,
}

impl WorkerResult {
    fn completed(final_text: String, artifacts_written: Vec<Artifact>) -> Self {
        Self {
            status: WorkerStatus::Completed,
            final_text: Some(final_text),
            artifacts_written,
            error: None,
        }
    }

    fn failed(error: WorkerError, artifacts_written: Vec<Artifact>) -> Self {
        Self {
            status: WorkerStatus::Failed,
            final_text: None,
            artifacts_written,
            error: Some(error),
        }
    }
}

/// Drives one worker turn: [`Provider`] calls, tool dispatch through
/// [`Executor`], and event publication through [`EventBus`].
///
/// Stateless across turns (§4.4 invariant) — all persisted state lives in
/// the [`TaskspaceStore`]; a `Worker` only carries its collaborators.
pub struct Worker<P: Provider> {
    provider: P,
    executor: Arc<Executor>,
    event_bus: Arc<EventBus>,
    store: Arc<TaskspaceStore>,
    config: WorkerConfig,
}

impl<P: Provider> Worker<P> {
    /// Build a worker over the given provider and collaborators.
    pub fn new(
        provider: P,
        executor: Arc<Executor>,
        event_bus: Arc<EventBus>,
        store: Arc<TaskspaceStore>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            provider,
            executor,
            event_bus,
            store,
            config,
        }
    }

    /// Drive the assigned step through the §4.4 single-turn algorithm.
    pub async fn run(
        &self,
        task_id: &TaskId,
        step_id: &StepId,
        briefing: Briefing,
        cancel: CancellationToken,
    ) -> WorkerResult {
        let span = tracing::info_span!("worker_turn", task_id = %task_id, step_id = %step_id);
        self.run_inner(task_id, step_id, briefing, cancel)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        task_id: &TaskId,
        step_id: &StepId,
        briefing: Briefing,
        cancel: CancellationToken,
    ) -> WorkerResult {
        let turn_start = Instant::now();
        let mut artifacts_written = Vec::new();
        let mut tool_call_count: u32 = 0;
        let mut retry_budget = self.config.max_retry_corrections;

        self.emit_step_start(task_id, step_id).await;

        let system = briefing.system_prompt();
        let tools = briefing.visible_tools.clone();
        let tail_start = briefing
            .conversation_tail
            .len()
            .saturating_sub(DEFAULT_CONVERSATION_TAIL);
        let mut messages: Vec<ProviderMessage> =
            briefing.conversation_tail[tail_start..].to_vec();
        messages.push(ProviderMessage {
            role: TurnRole::User,
            content: vec![ContentPart::Text {
                text: briefing.step_goal.clone(),
            }],
        });

        loop {
            if turn_start.elapsed() >= self.config.max_wall_clock_per_turn {
                return self.fail(
                    task_id,
                    WorkerError::limit_exceeded("max_wall_clock_per_turn exceeded"),
                    artifacts_written,
                )
                .await;
            }

            let request = ProviderRequest {
                model: self.config.model.clone(),
                messages: messages.clone(),
                tools: tools.clone(),
                max_tokens: Some(self.config.max_tokens),
                temperature: None,
                system: Some(system.clone()),
                extra: json!({}),
            };

            let response = match self.call_with_retry(request, &cancel).await {
                Ok(response) => response,
                Err(err) if err.kind == ErrorKind::Cancelled => {
                    return self.finalize_cancelled(task_id, artifacts_written).await;
                }
                Err(err) => return self.fail(task_id, err, artifacts_written).await,
            };

            let assistant_parts: Vec<Part> = response
                .content
                .iter()
                .map(Self::provider_part_to_domain)
                .collect();
            let assistant_message = self
                .store
                .append_message(
                    task_id,
                    Message::new(DomainRole::Assistant, assistant_parts.clone(), now_placeholder()),
                )
                .await;
            let assistant_message = match assistant_message {
                Ok(m) => m,
                Err(e) => {
                    return self
                        .fail(
                            task_id,
                            WorkerError::new(ErrorKind::Storage, e.to_string()),
                            artifacts_written,
                        )
                        .await;
                }
            };
            let message_seq = assistant_message.seq;

            self.publish(task_id, taskloom_types::event::EventKind::MessageStart {
                message_seq,
            })
            .await;

            let cancelled_mid_stream = self
                .stream_deltas(task_id, message_seq, &response.content, &cancel)
                .await;
            if cancelled_mid_stream {
                return self.finalize_cancelled(task_id, artifacts_written).await;
            }

            let tool_uses: Vec<(&str, &str, &serde_json::Value)> = response
                .content
                .iter()
                .filter_map(|part| match part {
                    ContentPart::ToolUse { id, name, input } => {
                        Some((id.as_str(), name.as_str(), input))
                    }
                    _ => None,
                })
                .collect();

            if tool_uses.is_empty() {
                match response.stop_reason {
                    StopReason::MaxTokens => {
                        self.publish_message_complete(task_id, message_seq, "completed")
                            .await;
                        return self
                            .fail(
                                task_id,
                                WorkerError::new(ErrorKind::Runtime, "model stopped: max_tokens"),
                                artifacts_written,
                            )
                            .await;
                    }
                    StopReason::ContentFilter => {
                        self.publish_message_complete(task_id, message_seq, "completed")
                            .await;
                        return self
                            .fail(
                                task_id,
                                WorkerError::new(
                                    ErrorKind::Runtime,
                                    "model stopped: content_filter",
                                ),
                                artifacts_written,
                            )
                            .await;
                    }
                    _ => {
                        self.publish_message_complete(task_id, message_seq, "completed")
                            .await;
                        let final_text = Self::extract_text(&response.content);
                        return WorkerResult::completed(final_text, artifacts_written);
                    }
                }
            }

            // Dispatch the batch of tool calls, then resume generation.
            let mut domain_results: Vec<Part> = Vec::new();
            let mut provider_results: Vec<ContentPart> = Vec::new();
            let mut terminate: Option<WorkerError> = None;

            for (call_id, tool_name, args) in &tool_uses {
                if terminate.is_some() {
                    domain_results.push(Self::not_executed_part(call_id, tool_name));
                    provider_results.push(Self::not_executed_content_part(call_id));
                    continue;
                }

                if cancel.is_cancelled() {
                    domain_results.push(Self::not_executed_part(call_id, tool_name));
                    provider_results.push(Self::not_executed_content_part(call_id));
                    continue;
                }

                if tool_call_count >= self.config.max_tool_calls_per_turn {
                    terminate = Some(WorkerError::limit_exceeded(
                        "max_tool_calls_per_turn exceeded",
                    ));
                    domain_results.push(Self::not_executed_part(call_id, tool_name));
                    provider_results.push(Self::not_executed_content_part(call_id));
                    continue;
                }

                self.publish(
                    task_id,
                    taskloom_types::event::EventKind::ToolCallStart {
                        call_id: call_id.to_string(),
                        tool_name: tool_name.to_string(),
                    },
                )
                .await;

                let call = ToolCall::new(call_id.to_string(), tool_name.to_string(), (*args).clone());
                let result = self.executor.invoke(task_id, call).await;
                tool_call_count += 1;

                self.publish(
                    task_id,
                    taskloom_types::event::EventKind::ToolCallResult {
                        call_id: call_id.to_string(),
                        tool_name: tool_name.to_string(),
                        is_error: result.is_error,
                        error_kind: result.kind.map(Self::tool_kind_tag),
                        duration_ms: result.duration_ms,
                    },
                )
                .await;

                if let Some(artifact) = &result.artifact {
                    artifacts_written.push(artifact.clone());
                }

                domain_results.push(Self::tool_result_part(call_id, tool_name, &result));
                provider_results.push(Self::tool_result_content_part(call_id, &result));

                if result.is_error {
                    let recoverable = matches!(
                        result.kind,
                        Some(ToolResultKind::Validation)
                            | Some(ToolResultKind::Policy)
                            | Some(ToolResultKind::Runtime)
                    );
                    if recoverable && retry_budget > 0 {
                        retry_budget -= 1;
                    } else if recoverable {
                        terminate = Some(WorkerError::limit_exceeded(
                            "max_retry_corrections exhausted",
                        ));
                    } else {
                        terminate = Some(WorkerError::new(
                            ErrorKind::Runtime,
                            result
                                .detail
                                .clone()
                                .unwrap_or_else(|| "tool invocation failed".to_string()),
                        ));
                    }
                }
            }

            let results_message = self
                .store
                .append_message(
                    task_id,
                    Message::new(DomainRole::Tool, domain_results, now_placeholder()),
                )
                .await;
            if let Err(e) = results_message {
                return self
                    .fail(
                        task_id,
                        WorkerError::new(ErrorKind::Storage, e.to_string()),
                        artifacts_written,
                    )
                    .await;
            }

            self.publish_message_complete(task_id, message_seq, "completed")
                .await;

            if let Some(err) = terminate {
                return self.fail(task_id, err, artifacts_written).await;
            }

            messages.push(ProviderMessage {
                role: TurnRole::Assistant,
                content: response.content.clone(),
            });
            messages.push(ProviderMessage {
                role: TurnRole::User,
                content: provider_results,
            });
        }
    }

    async fn call_with_retry(
        &self,
        request: ProviderRequest,
        cancel: &CancellationToken,
    ) -> Result<taskloom_turn::types::ProviderResponse, WorkerError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(WorkerError::cancelled("cancelled while awaiting provider response"));
                }
                result = self.provider.complete(request.clone()) => result,
            };

            match outcome {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < 3 => {
                    let backoff = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(WorkerError::cancelled("cancelled while backing off"));
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                Err(e) => {
                    return Err(WorkerError::new(
                        ErrorKind::Runtime,
                        format!("upstream provider error: {e}"),
                    ));
                }
            }
        }
    }

    /// Chunk the text parts of a response into simulated streaming
    /// deltas, publishing `part_delta`/`part_complete` events. Returns
    /// `true` if cancellation was observed mid-stream.
    async fn stream_deltas(
        &self,
        task_id: &TaskId,
        message_seq: u64,
        content: &[ContentPart],
        cancel: &CancellationToken,
    ) -> bool {
        for (idx, part) in content.iter().enumerate() {
            if cancel.is_cancelled() {
                return true;
            }
            if let ContentPart::Text { text } = part {
                for chunk in chunk_text(text, STREAM_CHUNK_CHARS) {
                    if cancel.is_cancelled() {
                        return true;
                    }
                    self.publish(
                        task_id,
                        taskloom_types::event::EventKind::PartDelta {
                            message_seq,
                            part_index: idx,
                            text: chunk,
                        },
                    )
                    .await;
                    tokio::task::yield_now().await;
                }
            }
            self.publish(
                task_id,
                taskloom_types::event::EventKind::PartComplete {
                    message_seq,
                    part_index: idx,
                },
            )
            .await;
        }
        false
    }

    async fn emit_step_start(&self, task_id: &TaskId, step_id: &StepId) {
        let message = Message::new(
            DomainRole::System,
            vec![Part::StepStart {
                step_id: step_id.to_string(),
            }],
            now_placeholder(),
        );
        if let Err(e) = self.store.append_message(task_id, message).await {
            tracing::warn!(target: "worker", task_id = %task_id, step_id = %step_id, error = %e, "failed to record step start message");
        }
    }

    async fn publish(&self, task_id: &TaskId, kind: taskloom_types::event::EventKind) {
        let event = taskloom_types::event::Event::new(task_id.clone(), now_placeholder(), kind);
        if let Err(e) = self.event_bus.publish(task_id, event).await {
            tracing::warn!(target: "worker", task_id = %task_id, error = %e, "failed to publish event");
        }
    }

    async fn publish_message_complete(&self, task_id: &TaskId, message_seq: u64, status: &str) {
        self.publish(
            task_id,
            taskloom_types::event::EventKind::MessageComplete {
                message_seq,
                status: status.to_string(),
            },
        )
        .await;
    }

    async fn finalize_cancelled(
        &self,
        task_id: &TaskId,
        artifacts_written: Vec<Artifact>,
    ) -> WorkerResult {
        let message = Message::new(DomainRole::System, Vec::new(), now_placeholder());
        let seq = match self.store.append_message(task_id, message).await {
            Ok(m) => m.seq,
            Err(_) => 0,
        };
        self.publish_message_complete(task_id, seq, "cancelled")
            .await;
        self.publish(
            task_id,
            taskloom_types::event::EventKind::Error {
                kind: "cancelled".to_string(),
                detail: "worker turn cancelled".to_string(),
            },
        )
        .await;
        WorkerResult::failed(
            WorkerError::cancelled("worker turn cancelled"),
            artifacts_written,
        )
    }

    async fn fail(
        &self,
        task_id: &TaskId,
        error: WorkerError,
        artifacts_written: Vec<Artifact>,
    ) -> WorkerResult {
        self.publish(
            task_id,
            taskloom_types::event::EventKind::Error {
                kind: error.kind_tag(),
                detail: error.detail.clone(),
            },
        )
        .await;
        WorkerResult::failed(error, artifacts_written)
    }

    fn provider_part_to_domain(part: &ContentPart) -> Part {
        match part {
            ContentPart::Text { text } => Part::Text { text: text.clone() },
            ContentPart::ToolUse { id, name, input } => Part::ToolCall {
                call_id: id.clone(),
                tool_name: name.clone(),
                args: input.clone(),
            },
            ContentPart::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => Part::ToolResult {
                call_id: tool_use_id.clone(),
                tool_name: String::new(),
                result: json!(content),
                is_error: *is_error,
                duration_ms: 0,
            },
            ContentPart::Image { .. } => Part::Text {
                text: "[image]".to_string(),
            },
        }
    }

    fn extract_text(content: &[ContentPart]) -> String {
        content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn tool_kind_tag(kind: ToolResultKind) -> String {
        match kind {
            ToolResultKind::UnknownTool => "unknown_tool".to_string(),
            ToolResultKind::Validation => "validation".to_string(),
            ToolResultKind::Policy => "policy".to_string(),
            ToolResultKind::Runtime => "runtime".to_string(),
        }
    }

    fn tool_result_part(call_id: &str, tool_name: &str, result: &ToolResult) -> Part {
        Part::ToolResult {
            call_id: call_id.to_string(),
            tool_name: tool_name.to_string(),
            result: result
                .value
                .clone()
                .unwrap_or_else(|| json!({"detail": result.detail.clone().unwrap_or_default()})),
            is_error: result.is_error,
            duration_ms: result.duration_ms,
        }
    }

    fn tool_result_content_part(call_id: &str, result: &ToolResult) -> ContentPart {
        let content = match (&result.value, &result.detail) {
            (Some(v), _) => v.to_string(),
            (None, Some(d)) => d.clone(),
            _ => String::new(),
        };
        ContentPart::ToolResult {
            tool_use_id: call_id.to_string(),
            content,
            is_error: result.is_error,
        }
    }

    fn not_executed_part(call_id: &str, tool_name: &str) -> Part {
        Part::ToolResult {
            call_id: call_id.to_string(),
            tool_name: tool_name.to_string(),
            result: json!({"detail": "not executed: turn terminated before this call was reached"}),
            is_error: true,
            duration_ms: 0,
        }
    }

    fn not_executed_content_part(call_id: &str) -> ContentPart {
        ContentPart::ToolResult {
            tool_use_id: call_id.to_string(),
            content: "not executed: turn terminated before this call was reached".to_string(),
            is_error: true,
        }
    }
}

/// Split `text` into roughly `chunk_size`-character pieces on word
/// boundaries, simulating a token-delta stream from a full response.
fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut chunks = Vec::new();
    let mut current = String::new();
    for word in text.split_inclusive(' ') {
        current.push_str(word);
        if current.len() >= chunk_size {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Milliseconds since the Unix epoch, for stamping messages and events.
fn now_placeholder() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
