//! Briefing assembly (§4.4 "Inputs"): turns a step plus its collaborators
//! into the [`taskloom_worker::Briefing`] a worker turn consumes.

use taskloom_memory::ContextBlock;
use taskloom_tool::{Executor, ToolDescriptor};
use taskloom_turn::types::{ContentPart, ProviderMessage, Role as TurnRole, ToolSchema};
use taskloom_types::config::AgentConfig;
use taskloom_types::id::TaskId;
use taskloom_types::message::{Message, Part, Role as DomainRole};

/// Token budget handed to `MemoryGateway::context_for` per briefing.
pub const DEFAULT_CONTEXT_BUDGET_TOKENS: usize = 2_000;

/// Tool schemas visible to `agent`'s step: the task's full registration,
/// filtered down to `AgentConfig::tools` if it names an explicit subset.
pub fn visible_tool_schemas(
    executor: &Executor,
    task_id: &TaskId,
    agent: Option<&AgentConfig>,
) -> Vec<ToolSchema> {
    let allowed = agent.and_then(|a| a.tools.as_ref());
    executor
        .list_visible(task_id)
        .into_iter()
        .filter(|d| match allowed {
            Some(names) => names.contains(&d.name),
            None => true,
        })
        .map(descriptor_to_schema)
        .collect()
}

fn descriptor_to_schema(descriptor: &ToolDescriptor) -> ToolSchema {
    ToolSchema {
        name: descriptor.name.clone(),
        description: descriptor.description.clone(),
        input_schema: descriptor.parameter_schema.clone(),
    }
}

/// Flatten `MemoryGateway::context_for`'s blocks into the plain strings
/// `Briefing::relevant_context` wants. Ordering is preserved: the
/// gateway already orders rules before retrievals.
pub fn render_context_blocks(blocks: &[ContextBlock]) -> Vec<String> {
    blocks.iter().map(|b| b.text.clone()).collect()
}

/// Convert a task's persisted message log into the provider-level
/// conversation `Briefing::conversation_tail` wants.
///
/// System messages (step-start markers, the cancellation placeholder)
/// carry no conversational content and are dropped. `tool`-authored
/// messages fold into a `user`-role turn, the same shape the worker
/// itself builds tool results into mid-turn (§4.4).
pub fn conversation_tail(messages: &[Message]) -> Vec<ProviderMessage> {
    messages.iter().filter_map(domain_message_to_provider).collect()
}

fn domain_message_to_provider(message: &Message) -> Option<ProviderMessage> {
    let role = match message.role {
        DomainRole::User => TurnRole::User,
        DomainRole::Assistant => TurnRole::Assistant,
        DomainRole::Tool => TurnRole::User,
        DomainRole::System => return None,
        _ => return None,
    };
    let content: Vec<ContentPart> = message
        .parts
        .iter()
        .filter_map(domain_part_to_content)
        .collect();
    if content.is_empty() {
        return None;
    }
    Some(ProviderMessage { role, content })
}

fn domain_part_to_content(part: &Part) -> Option<ContentPart> {
    match part {
        Part::Text { text } => Some(ContentPart::Text { text: text.clone() }),
        Part::Reasoning { text } => Some(ContentPart::Text { text: text.clone() }),
        Part::ToolCall {
            call_id,
            tool_name,
            args,
        } => Some(ContentPart::ToolUse {
            id: call_id.clone(),
            name: tool_name.clone(),
            input: args.clone(),
        }),
        Part::ToolResult {
            call_id,
            result,
            is_error,
            ..
        } => Some(ContentPart::ToolResult {
            tool_use_id: call_id.clone(),
            content: result.to_string(),
            is_error: *is_error,
        }),
        Part::Error { kind, detail } => Some(ContentPart::Text {
            text: format!("[{kind}] {detail}"),
        }),
        Part::StepStart { .. } => None,
        _ => None,
    }
}
