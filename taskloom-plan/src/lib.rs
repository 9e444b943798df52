#![deny(missing_docs)]
//! Plan engine (C5): the DAG algorithms that create, advance, and revise
//! [`taskloom_types::Plan`]s.
//!
//! `generate` and `revise` delegate to a planner worker — a single model
//! call against the `planner` role, with no tool loop around it.
//! `next_ready` and `mark` are pure DAG operations and need no model
//! call at all.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use taskloom_turn::provider::{Provider, ProviderError};
use taskloom_turn::types::{ContentPart, ProviderMessage, ProviderRequest, Role as TurnRole};
use taskloom_types::id::StepId;
use taskloom_types::step::{Step, StepError, StepStatus, MAX_ATTEMPTS};
use taskloom_types::{Plan, PlanError as DagError};
use thiserror::Error;

/// Errors raised by the plan engine. Distinct from
/// [`taskloom_types::PlanError`] (`DagError` here), which covers only the
/// pure DAG invariants; this enum adds the planner-worker round trip.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PlanError {
    /// The proposed or revised plan violates a DAG invariant (I1-I3).
    #[error(transparent)]
    Dag(#[from] DagError),

    /// The planner worker's response wasn't valid JSON or didn't match
    /// the expected plan-document shape.
    #[error("planner returned an invalid plan document: {0}")]
    InvalidPlanDocument(String),

    /// The planner model call itself failed.
    #[error("planner model call failed: {0}")]
    Provider(#[from] ProviderError),

    /// `mark` was asked to apply a transition the step state machine
    /// forbids.
    #[error("invalid transition for step '{step}': {from:?} -> {to:?}")]
    InvalidTransition {
        /// The step the transition was attempted on.
        step: String,
        /// The status the step was in.
        from: StepStatus,
        /// The status that was requested.
        to: StepStatus,
    },

    /// `mark` was asked to transition a step id not present in the plan.
    #[error("unknown step id: {0}")]
    UnknownStep(String),
}

/// Static configuration for a [`PlanEngine`] instance.
pub struct PlannerConfig {
    /// System prompt prefix for `generate`. The engine appends the
    /// structured-output instructions itself.
    pub generate_system_prompt: String,
    /// System prompt prefix for `revise`.
    pub revise_system_prompt: String,
    /// Model identifier, or `None` for the provider default.
    pub model: Option<String>,
    /// Max output tokens for planner calls.
    pub max_tokens: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            generate_system_prompt: "You are a planning assistant. Decompose the user's goal \
                into a DAG of steps, each assigned to one of the available worker roles."
                .to_string(),
            revise_system_prompt: "You are a planning assistant revising an in-flight plan in \
                response to user feedback."
                .to_string(),
            model: None,
            max_tokens: 4096,
        }
    }
}

/// Wire shape a planner worker must emit for `generate` (§4.5).
#[derive(Debug, Deserialize)]
struct PlanDocument {
    goal_summary: String,
    steps: Vec<StepDoc>,
}

#[derive(Debug, Deserialize)]
struct StepDoc {
    id: String,
    name: String,
    goal: String,
    role: String,
    #[serde(default)]
    depends_on: Vec<String>,
}

/// Verdict the planner attaches to each step it recognizes from the prior
/// plan, per the diff-preserve algorithm (§4.5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Verdict {
    Preserve,
    Regenerate,
}

/// Wire shape a planner worker must emit for `revise` (§4.5.1): a
/// proposed plan, plus a verdict for every step the planner recognized
/// from the prior plan.
#[derive(Debug, Deserialize)]
struct ReviseDocument {
    goal_summary: String,
    steps: Vec<ReviseStepDoc>,
}

#[derive(Debug, Deserialize)]
struct ReviseStepDoc {
    id: String,
    name: String,
    goal: String,
    role: String,
    #[serde(default)]
    depends_on: Vec<String>,
    /// Present only for steps the planner recognized from the prior
    /// plan; absent for genuinely new steps.
    #[serde(default)]
    verdict: Option<Verdict>,
}

fn step_doc_to_step(doc: StepDoc) -> Step {
    Step::new(
        doc.id,
        doc.name,
        doc.goal,
        doc.role,
        doc.depends_on.into_iter().map(StepId::new),
    )
}

/// Extract the first top-level JSON value from a planner response. Models
/// sometimes wrap JSON in prose or a fenced code block despite
/// instructions; this tolerates the common cases without a full parser.
fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

fn response_text(parts: &[ContentPart]) -> String {
    parts
        .iter()
        .filter_map(|p| match p {
            ContentPart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// DAG create/advance/revise algorithms, parameterized over the provider
/// used for the planner worker's model calls.
///
/// Generic over `P: Provider` (RPITIT, not object-safe) — the same
/// seam `taskloom-worker` programs against for its own model calls.
pub struct PlanEngine<P: Provider> {
    provider: P,
    config: PlannerConfig,
}

impl<P: Provider> PlanEngine<P> {
    /// Construct a plan engine from a provider and configuration.
    pub fn new(provider: P, config: PlannerConfig) -> Self {
        Self { provider, config }
    }

    async fn call_planner(&self, system: &str, user_message: String) -> Result<String, PlanError> {
        let request = ProviderRequest {
            model: self.config.model.clone(),
            messages: vec![ProviderMessage {
                role: TurnRole::User,
                content: vec![ContentPart::Text { text: user_message }],
            }],
            tools: vec![],
            max_tokens: Some(self.config.max_tokens),
            temperature: None,
            system: Some(system.to_string()),
            extra: serde_json::Value::Null,
        };
        let response = self.provider.complete(request).await?;
        Ok(response_text(&response.content))
    }

    /// `generate(goal, available_roles) -> Plan` (§4.5).
    pub async fn generate(&self, goal: &str, available_roles: &[String]) -> Result<Plan, PlanError> {
        let user_message = format!(
            "Goal: {goal}\nAvailable roles: {}\n\nRespond with a single JSON object: \
             {{\"goal_summary\": string, \"steps\": [{{\"id\": string, \"name\": string, \
             \"goal\": string, \"role\": string, \"depends_on\": [string]}}]}}. No prose.",
            available_roles.join(", ")
        );
        let text = self
            .call_planner(&self.config.generate_system_prompt, user_message)
            .await?;
        let doc: PlanDocument = serde_json::from_str(extract_json(&text))
            .map_err(|e| PlanError::InvalidPlanDocument(e.to_string()))?;
        let steps = doc.steps.into_iter().map(step_doc_to_step).collect();
        Plan::new(doc.goal_summary, steps).map_err(PlanError::from)
    }

    /// `next_ready(plan) -> StepId?` (§4.5). A pure DAG query: no model
    /// call, so it doesn't need `&self` at all, but lives on `PlanEngine`
    /// to keep the engine's public surface in one place.
    pub fn next_ready(&self, plan: &Plan) -> Option<StepId> {
        plan.ready_steps().first().map(|s| s.id.clone())
    }

    /// `mark(plan, step_id, new_status, result_ref?, error?) -> Plan'`
    /// (§4.5): produces a new plan reflecting the transition, enforcing
    /// the step state machine.
    pub fn mark(
        &self,
        plan: &Plan,
        step_id: &StepId,
        new_status: StepStatus,
        result_ref: Option<String>,
        error: Option<StepError>,
    ) -> Result<Plan, PlanError> {
        let mut plan = plan.clone();
        let step = plan
            .get_mut(step_id)
            .ok_or_else(|| PlanError::UnknownStep(step_id.to_string()))?;
        if !step.can_transition_to(new_status) {
            return Err(PlanError::InvalidTransition {
                step: step_id.to_string(),
                from: step.status,
                to: new_status,
            });
        }
        if new_status == StepStatus::Pending && step.status == StepStatus::Failed {
            step.attempts += 1;
        }
        step.status = new_status;
        if result_ref.is_some() {
            step.result_ref = result_ref;
        }
        step.error = error;
        plan.version += 1;
        Ok(plan)
    }

    /// `revise(plan, user_message, completed_outputs) -> Plan'` — the
    /// diff-preserve algorithm (§4.5.1).
    ///
    /// Idempotence (P6): an empty `user_message` still round-trips
    /// through the planner worker (it has no other source of truth for
    /// "nothing changed"), but this engine treats an empty message as a
    /// short-circuit and returns `plan` unchanged without a model call —
    /// the stronger, cheaper guarantee the property actually asks for.
    pub async fn revise(
        &self,
        plan: &Plan,
        user_message: &str,
        completed_outputs: &HashMap<StepId, String>,
    ) -> Result<Plan, PlanError> {
        if user_message.trim().is_empty() {
            return Ok(plan.clone());
        }

        let completed_json: HashMap<&str, &str> = completed_outputs
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let current_json = serde_json::to_string(plan).unwrap_or_default();
        let prompt = format!(
            "Current plan: {current_json}\nCompleted outputs: {}\nUser revision: {user_message}\n\n\
             Respond with a single JSON object: {{\"goal_summary\": string, \"steps\": \
             [{{\"id\": string, \"name\": string, \"goal\": string, \"role\": string, \
             \"depends_on\": [string], \"verdict\": \"preserve\"|\"regenerate\"|null}}]}}. \
             Set verdict for every step id that already existed in the current plan; leave it \
             null for genuinely new steps. No prose.",
            serde_json::to_string(&completed_json).unwrap_or_default()
        );
        let text = self
            .call_planner(&self.config.revise_system_prompt, prompt)
            .await?;
        let doc: ReviseDocument = serde_json::from_str(extract_json(&text))
            .map_err(|e| PlanError::InvalidPlanDocument(e.to_string()))?;

        self.apply_revision(plan, doc)
    }

    fn apply_revision(&self, plan: &Plan, doc: ReviseDocument) -> Result<Plan, PlanError> {
        let proposed_ids: std::collections::HashSet<String> =
            doc.steps.iter().map(|s| s.id.clone()).collect();

        let mut new_steps = Vec::with_capacity(doc.steps.len());
        for step_doc in doc.steps {
            let id = StepId::new(step_doc.id.clone());
            let prior = plan.get(&id);
            let mut step = Step::new(
                step_doc.id,
                step_doc.name,
                step_doc.goal,
                step_doc.role,
                step_doc.depends_on.iter().cloned().map(StepId::new),
            );

            match (prior, step_doc.verdict) {
                (Some(prior), Some(Verdict::Preserve)) if prior.status == StepStatus::Completed => {
                    step.status = StepStatus::Completed;
                    step.result_ref = prior.result_ref.clone();
                    step.attempts = prior.attempts;
                }
                (Some(_), Some(Verdict::Regenerate)) | (Some(_), None) => {
                    step.status = StepStatus::Pending;
                    step.attempts = 0;
                    step.result_ref = None;
                }
                (Some(prior), Some(Verdict::Preserve)) => {
                    // planner asked to preserve a step that never actually
                    // completed; fall back to regenerate.
                    step.status = StepStatus::Pending;
                    step.attempts = prior.attempts;
                    step.result_ref = None;
                }
                (None, _) => {
                    step.status = StepStatus::Pending;
                }
            }
            new_steps.push(step);
        }

        // Steps in the prior plan but dropped from the proposal: keep for
        // audit, marked skipped.
        for prior in &plan.steps {
            if !proposed_ids.contains(prior.id.as_str()) {
                let mut skipped = prior.clone();
                if skipped.can_transition_to(StepStatus::Skipped) {
                    skipped.status = StepStatus::Skipped;
                }
                new_steps.push(skipped);
            }
        }

        // Re-validate: a preserved step's dependencies must still exist
        // and be completed, else downgrade it to regenerate.
        let by_id: HashMap<String, usize> = new_steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.to_string(), i))
            .collect();
        let snapshot: Vec<(StepStatus, Vec<StepId>)> = new_steps
            .iter()
            .map(|s| (s.status, s.dependencies.iter().cloned().collect()))
            .collect();
        for (i, step) in new_steps.iter_mut().enumerate() {
            if step.status != StepStatus::Completed {
                continue;
            }
            let (_, deps) = &snapshot[i];
            let deps_ok = deps.iter().all(|dep| {
                by_id
                    .get(dep.as_str())
                    .map(|&j| snapshot[j].0 == StepStatus::Completed)
                    .unwrap_or(false)
            });
            if !deps_ok {
                step.status = StepStatus::Pending;
                step.attempts = 0;
                step.result_ref = None;
            }
        }

        let mut revised = Plan::new(doc.goal_summary, new_steps)?;
        revised.version = plan.version + 1;
        Ok(revised)
    }
}
