#![deny(missing_docs)]
//! Orchestrator (C6): the single driver that owns one task's lifecycle
//! and exposes a conversational surface over it.
//!
//! `start`/`chat`/`step`/`run`/`cancel` are the public contract; the
//! dispatch loop, the classifier, and briefing assembly are internal.

mod briefing;
mod classifier;
mod error;
mod types;

pub use classifier::Intent;
pub use error::OrchestratorError;
pub use types::{CancelScope, ChatResponse, OrchestratorConfig, StepReport};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as SyncMutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex as AsyncMutex;
use tracing::Instrument;

use taskloom_eventbus::EventBus;
use taskloom_memory::MemoryGateway;
use taskloom_plan::PlanEngine;
use taskloom_proto::CancellationToken;
use taskloom_taskspace::TaskspaceStore;
use taskloom_tool::Executor;
use taskloom_turn::provider::Provider;
use taskloom_types::config::TeamConfig;
use taskloom_types::event::EventKind;
use taskloom_types::id::{StepId, TaskId};
use taskloom_types::step::{Step, StepError, StepStatus};
use taskloom_types::task::TaskStatus;
use taskloom_worker::{Briefing, Worker, WorkerConfig, WorkerStatus};

static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn new_task_id() -> TaskId {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let ordinal = TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    TaskId::new(format!("task-{now:x}-{ordinal:x}"))
}

fn task_status_tag(status: TaskStatus) -> String {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Running => "running",
        TaskStatus::Paused => "paused",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
    }
    .to_string()
}

fn step_status_tag(status: StepStatus) -> String {
    match status {
        StepStatus::Pending => "pending",
        StepStatus::InProgress => "in_progress",
        StepStatus::Completed => "completed",
        StepStatus::Failed => "failed",
        StepStatus::Skipped => "skipped",
    }
    .to_string()
}

/// Per-task runtime state not persisted to the taskspace: cancellation
/// tokens and the lock serializing concurrent dispatch against one task
/// (I4).
struct TaskHandle {
    team_config: TeamConfig,
    /// Cancelled by `cancel(task_id, Task)`; observed at the top of every
    /// dispatch-loop iteration. Replaced with a fresh token on resume,
    /// since a [`CancellationToken`] has no reset.
    task_cancel: SyncMutex<CancellationToken>,
    /// The currently running worker turn's token, if any. Cancelled by
    /// both `cancel(task_id, Turn)` and `cancel(task_id, Task)`.
    turn_cancel: AsyncMutex<Option<CancellationToken>>,
    /// Serializes `step`/`run`/`chat`-continuation calls against this
    /// task so at most one dispatch loop runs at a time (I4).
    dispatch_lock: AsyncMutex<()>,
}

impl TaskHandle {
    fn new(team_config: TeamConfig) -> Self {
        Self {
            team_config,
            task_cancel: SyncMutex::new(CancellationToken::new()),
            turn_cancel: AsyncMutex::new(None),
            dispatch_lock: AsyncMutex::new(()),
        }
    }

    fn current_task_cancel(&self) -> CancellationToken {
        self.task_cancel.lock().unwrap().clone()
    }

    fn reset_task_cancel(&self) {
        *self.task_cancel.lock().unwrap() = CancellationToken::new();
    }
}

/// The Orchestrator (C6). Generic over the language-model [`Provider`]
/// so callers can swap backends without touching dispatch logic.
///
/// `Clone` is cheap: every collaborator but `provider` is behind an
/// `Arc`, and `P` itself is required to be `Clone` since `Worker::new`
/// and `PlanEngine::new` each consume a fresh `P` by value per call.
pub struct Orchestrator<P: Provider + Clone + Send + Sync + 'static> {
    provider: P,
    store: Arc<TaskspaceStore>,
    event_bus: Arc<EventBus>,
    executor: Arc<Executor>,
    memory: Arc<dyn MemoryGateway>,
    config: OrchestratorConfig,
    tasks: Arc<SyncMutex<HashMap<TaskId, Arc<TaskHandle>>>>,
}

impl<P: Provider + Clone + Send + Sync + 'static> Clone for Orchestrator<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            store: Arc::clone(&self.store),
            event_bus: Arc::clone(&self.event_bus),
            executor: Arc::clone(&self.executor),
            memory: Arc::clone(&self.memory),
            config: self.config.clone(),
            tasks: Arc::clone(&self.tasks),
        }
    }
}

impl<P: Provider + Clone + Send + Sync + 'static> Orchestrator<P> {
    /// Build an orchestrator over the given provider and collaborators.
    pub fn new(
        provider: P,
        store: Arc<TaskspaceStore>,
        event_bus: Arc<EventBus>,
        executor: Arc<Executor>,
        memory: Arc<dyn MemoryGateway>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            store,
            event_bus,
            executor,
            memory,
            config,
            tasks: Arc::new(SyncMutex::new(HashMap::new())),
        }
    }

    fn plan_engine(&self) -> PlanEngine<P> {
        PlanEngine::new(self.provider.clone(), self.config.planner.clone())
    }

    fn worker(&self, worker_config: WorkerConfig) -> Worker<P> {
        Worker::new(
            self.provider.clone(),
            Arc::clone(&self.executor),
            Arc::clone(&self.event_bus),
            Arc::clone(&self.store),
            worker_config,
        )
    }

    fn worker_config(&self, team_config: &TeamConfig, role: &str) -> WorkerConfig {
        let agent = team_config.role(role);
        WorkerConfig {
            max_retry_corrections: team_config.defaults.max_retry_corrections,
            max_tool_calls_per_turn: team_config.defaults.max_tool_calls_per_turn,
            model: agent
                .and_then(|a| a.model.clone())
                .or_else(|| team_config.defaults.model.clone()),
            ..WorkerConfig::default()
        }
    }

    fn handle_for(&self, task_id: &TaskId) -> Result<Arc<TaskHandle>, OrchestratorError> {
        self.tasks
            .lock()
            .unwrap()
            .get(task_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::UnknownTask(task_id.to_string()))
    }

    async fn publish(&self, task_id: &TaskId, kind: EventKind) -> Result<(), OrchestratorError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let event = taskloom_types::event::Event::new(task_id.clone(), timestamp, kind);
        self.event_bus.publish(task_id, event).await?;
        Ok(())
    }

    async fn publish_task_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        reason: Option<String>,
    ) -> Result<(), OrchestratorError> {
        self.store.set_status(task_id, status, reason.clone()).await?;
        self.publish(
            task_id,
            EventKind::TaskUpdate {
                status: task_status_tag(status),
                reason,
            },
        )
        .await
    }

    async fn publish_step_status(
        &self,
        task_id: &TaskId,
        step_id: &StepId,
        status: StepStatus,
    ) -> Result<(), OrchestratorError> {
        self.publish(
            task_id,
            EventKind::StepStatusChanged {
                step_id: step_id.to_string(),
                status: step_status_tag(status),
            },
        )
        .await
    }

    async fn assemble_briefing(
        &self,
        task_id: &TaskId,
        step: &Step,
        handle: &TaskHandle,
    ) -> Result<Briefing, OrchestratorError> {
        let agent = handle.team_config.role(&step.assigned_role);
        let role_prompt = agent
            .map(|a| a.prompt.clone())
            .unwrap_or_else(|| format!("You are the {} for this task.", step.assigned_role));

        let context = self
            .memory
            .context_for(task_id, &step.goal, self.config.context_budget_tokens)
            .await?;
        let messages = self.store.read_messages(task_id).await?;

        let mut briefing = Briefing::new(role_prompt, step.goal.clone());
        briefing.relevant_context = briefing::render_context_blocks(&context);
        briefing.visible_tools = briefing::visible_tool_schemas(&self.executor, task_id, agent);
        briefing.conversation_tail = briefing::conversation_tail(&messages);
        Ok(briefing)
    }

    fn role_names(&self, team_config: &TeamConfig) -> Vec<String> {
        let mut roles: Vec<String> = team_config.agents.iter().map(|a| a.role.clone()).collect();
        for role in &self.config.available_roles {
            if !roles.contains(role) {
                roles.push(role.clone());
            }
        }
        roles
    }

    /// `start(goal, team_config, user_id) -> task_id` (§4.6): creates the
    /// taskspace, then (for a non-empty goal) triggers `generate` before
    /// returning — the caller tails events rather than awaiting full plan
    /// generation separately.
    pub async fn start(
        &self,
        goal: &str,
        team_config: TeamConfig,
        user_id: &str,
    ) -> Result<TaskId, OrchestratorError> {
        let task_id = new_task_id();
        let span = tracing::info_span!("task", task_id = %task_id);
        self.start_inner(&task_id, goal, team_config, user_id)
            .instrument(span)
            .await?;
        Ok(task_id)
    }

    async fn start_inner(
        &self,
        task_id: &TaskId,
        goal: &str,
        team_config: TeamConfig,
        user_id: &str,
    ) -> Result<(), OrchestratorError> {
        self.store.create(task_id, goal, user_id).await?;
        let roles = self.role_names(&team_config);
        let handle = TaskHandle::new(team_config);
        let handle = {
            let mut tasks = self.tasks.lock().unwrap();
            Arc::clone(tasks.entry(task_id.clone()).or_insert_with(|| Arc::new(handle)))
        };
        let _guard = handle.dispatch_lock.lock().await;

        if goal.trim().is_empty() {
            return Ok(());
        }

        let plan = self.plan_engine().generate(goal, &roles).await?;
        let plan = self.store.write_plan(task_id, plan).await?;
        self.publish(
            task_id,
            EventKind::PlanUpdated {
                plan_version: plan.version,
            },
        )
        .await?;
        self.publish_task_status(task_id, TaskStatus::Running, None)
            .await?;
        Ok(())
    }

    /// `chat(task_id, user_message) -> ChatResponse` (§4.6). Persists and
    /// classifies the message synchronously; for `new_goal`/`revision`/
    /// `informational` the corresponding work runs before returning too
    /// (it's bounded to one worker turn). Only `continue`'s dispatch-loop
    /// drain is backgrounded, since it may advance arbitrarily many steps.
    pub async fn chat(
        &self,
        task_id: &TaskId,
        user_message: &str,
    ) -> Result<ChatResponse, OrchestratorError> {
        let span = tracing::info_span!("task", task_id = %task_id);
        self.chat_inner(task_id, user_message).instrument(span).await
    }

    async fn chat_inner(
        &self,
        task_id: &TaskId,
        user_message: &str,
    ) -> Result<ChatResponse, OrchestratorError> {
        let handle = self.handle_for(task_id)?;
        let snapshot = self.store.load(task_id).await?;
        if snapshot.task.status.is_terminal() {
            return Err(OrchestratorError::Terminal(task_id.to_string()));
        }

        self.store
            .append_message(
                task_id,
                taskloom_types::message::Message::new(
                    taskloom_types::message::Role::User,
                    vec![taskloom_types::message::Part::Text {
                        text: user_message.to_string(),
                    }],
                    0,
                ),
            )
            .await?;
        let from_seq = snapshot.last_event_seq + 1;

        if snapshot.task.status == TaskStatus::Paused {
            self.resume_paused_task(task_id, &handle).await?;
        }

        let cancel = handle.current_task_cancel();
        let intent = classifier::classify(
            self.provider.clone(),
            Arc::clone(&self.executor),
            Arc::clone(&self.event_bus),
            Arc::clone(&self.store),
            task_id,
            user_message,
            cancel,
        )
        .await;

        match intent {
            Intent::NewGoal => {
                self.regenerate_plan(task_id, &handle, user_message).await?;
            }
            Intent::Revision => {
                self.revise_plan(task_id, &handle, user_message).await?;
            }
            Intent::Informational => {
                self.answer_informational(task_id, &handle, user_message)
                    .await?;
            }
            Intent::Continue => {
                let orchestrator = self.clone();
                let task_id = task_id.clone();
                tokio::spawn(async move {
                    if let Err(err) = orchestrator.run(&task_id).await {
                        tracing::warn!(target: "taskloom_x", %task_id, %err, "background dispatch failed");
                    }
                });
            }
        }

        Ok(ChatResponse {
            task_id: task_id.clone(),
            from_seq,
            intent,
        })
    }

    async fn resume_paused_task(
        &self,
        task_id: &TaskId,
        handle: &TaskHandle,
    ) -> Result<(), OrchestratorError> {
        handle.reset_task_cancel();
        self.requeue_cancelled_steps(task_id).await?;
        self.publish_task_status(task_id, TaskStatus::Running, None)
            .await
    }

    /// Re-admits steps left `failed` by a task-scoped cancellation (§4.6
    /// "Cancellation"): since `ErrorKind::Cancelled` never consumed an
    /// attempt on that path, `Failed -> Pending` is always legal here.
    async fn requeue_cancelled_steps(&self, task_id: &TaskId) -> Result<(), OrchestratorError> {
        let snapshot = self.store.snapshot(task_id).await?;
        let Some(plan) = snapshot.plan else {
            return Ok(());
        };
        let plan_engine = self.plan_engine();
        let cancelled_ids: Vec<StepId> = plan
            .steps
            .iter()
            .filter(|s| {
                s.status == StepStatus::Failed
                    && s.error.as_ref().is_some_and(|e| e.kind == "cancelled")
            })
            .map(|s| s.id.clone())
            .collect();
        if cancelled_ids.is_empty() {
            return Ok(());
        }
        let mut plan = plan;
        for step_id in &cancelled_ids {
            plan = plan_engine.mark(&plan, step_id, StepStatus::Pending, None, None)?;
        }
        self.store.write_plan(task_id, plan).await?;
        for step_id in &cancelled_ids {
            self.publish_step_status(task_id, step_id, StepStatus::Pending)
                .await?;
        }
        Ok(())
    }

    async fn regenerate_plan(
        &self,
        task_id: &TaskId,
        handle: &TaskHandle,
        user_message: &str,
    ) -> Result<(), OrchestratorError> {
        let _guard = handle.dispatch_lock.lock().await;
        let roles = self.role_names(&handle.team_config);
        let plan = self.plan_engine().generate(user_message, &roles).await?;
        let plan = self.store.write_plan(task_id, plan).await?;
        self.publish(
            task_id,
            EventKind::PlanUpdated {
                plan_version: plan.version,
            },
        )
        .await
    }

    async fn revise_plan(
        &self,
        task_id: &TaskId,
        handle: &TaskHandle,
        user_message: &str,
    ) -> Result<(), OrchestratorError> {
        let _guard = handle.dispatch_lock.lock().await;
        let snapshot = self.store.snapshot(task_id).await?;
        let plan = snapshot
            .plan
            .ok_or_else(|| OrchestratorError::NoPlan(task_id.to_string()))?;
        let completed_outputs: HashMap<StepId, String> = plan
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .filter_map(|s| s.result_ref.clone().map(|r| (s.id.clone(), r)))
            .collect();
        let revised = self
            .plan_engine()
            .revise(&plan, user_message, &completed_outputs)
            .await?;
        let revised = self.store.write_plan(task_id, revised).await?;
        self.publish(
            task_id,
            EventKind::PlanUpdated {
                plan_version: revised.version,
            },
        )
        .await
    }

    async fn answer_informational(
        &self,
        task_id: &TaskId,
        handle: &TaskHandle,
        user_message_text: &str,
    ) -> Result<(), OrchestratorError> {
        let lead_role = handle.team_config.lead.as_deref();
        let role_prompt = lead_role
            .and_then(|r| handle.team_config.role(r))
            .map(|a| a.prompt.clone())
            .unwrap_or_else(|| "Answer the user's question from the task's history.".to_string());

        let context = self
            .memory
            .context_for(task_id, user_message_text, self.config.context_budget_tokens)
            .await?;
        let messages = self.store.read_messages(task_id).await?;

        let mut briefing = Briefing::new(role_prompt, user_message_text.to_string());
        briefing.relevant_context = briefing::render_context_blocks(&context);
        briefing.conversation_tail = briefing::conversation_tail(&messages);

        let worker_config = WorkerConfig {
            max_tool_calls_per_turn: 0,
            ..self.worker_config(&handle.team_config, lead_role.unwrap_or(""))
        };
        let worker = self.worker(worker_config);
        let cancel = handle.current_task_cancel();
        let _ = worker
            .run(
                task_id,
                &StepId::new(classifier::CLASSIFIER_STEP_ID.to_string() + ":informational"),
                briefing,
                cancel,
            )
            .await;
        Ok(())
    }

    /// `step(task_id) -> StepReport` (§4.6): advances exactly one ready
    /// step to completion or failure and returns. Used for
    /// interactive/debug mode.
    pub async fn step(&self, task_id: &TaskId) -> Result<StepReport, OrchestratorError> {
        let span = tracing::info_span!("task", task_id = %task_id);
        self.step_inner(task_id).instrument(span).await
    }

    async fn step_inner(&self, task_id: &TaskId) -> Result<StepReport, OrchestratorError> {
        let handle = self.handle_for(task_id)?;
        let _guard = handle.dispatch_lock.lock().await;
        self.dispatch_one(task_id, &handle).await
    }

    /// `run(task_id)` (§4.6): loops `next_ready` -> dispatch until the
    /// task reaches a terminal or paused status; returns that status.
    pub async fn run(&self, task_id: &TaskId) -> Result<TaskStatus, OrchestratorError> {
        let span = tracing::info_span!("task", task_id = %task_id);
        self.run_inner(task_id).instrument(span).await
    }

    async fn run_inner(&self, task_id: &TaskId) -> Result<TaskStatus, OrchestratorError> {
        let handle = self.handle_for(task_id)?;
        let _guard = handle.dispatch_lock.lock().await;
        loop {
            let report = self.dispatch_one(task_id, &handle).await?;
            if report.step_id.is_none() || report.task_status.is_terminal() || report.task_status == TaskStatus::Paused
            {
                return Ok(report.task_status);
            }
        }
    }

    /// One iteration of the §4.6 dispatch loop: dispatches at most one
    /// ready step (or reports idle if there is none / the task is
    /// terminal / cancellation is pending).
    async fn dispatch_one(
        &self,
        task_id: &TaskId,
        handle: &Arc<TaskHandle>,
    ) -> Result<StepReport, OrchestratorError> {
        if handle.current_task_cancel().is_cancelled() {
            return Ok(StepReport::idle(TaskStatus::Paused));
        }

        let snapshot = self.store.snapshot(task_id).await?;
        if snapshot.task.status.is_terminal() {
            return Ok(StepReport::idle(snapshot.task.status));
        }
        let plan = snapshot
            .plan
            .ok_or_else(|| OrchestratorError::NoPlan(task_id.to_string()))?;

        let plan_engine = self.plan_engine();
        let Some(step_id) = plan_engine.next_ready(&plan) else {
            return self.finish_if_no_ready_step(task_id, &plan).await;
        };

        let plan = plan_engine.mark(&plan, &step_id, StepStatus::InProgress, None, None)?;
        self.store.write_plan(task_id, plan.clone()).await?;
        self.publish_step_status(task_id, &step_id, StepStatus::InProgress)
            .await?;

        let step = plan.get(&step_id).expect("just marked in_progress").clone();
        let briefing = self.assemble_briefing(task_id, &step, handle).await?;

        let turn_cancel = CancellationToken::new();
        *handle.turn_cancel.lock().await = Some(turn_cancel.clone());
        let worker_config = self.worker_config(&handle.team_config, &step.assigned_role);
        let worker = self.worker(worker_config);
        let result = worker.run(task_id, &step_id, briefing, turn_cancel).await;
        *handle.turn_cancel.lock().await = None;

        let (step_status, task_status) = self
            .resolve_step_result(task_id, handle, &step_id, result)
            .await?;
        self.publish_step_status(task_id, &step_id, step_status).await?;

        Ok(StepReport {
            step_id: Some(step_id),
            status: Some(step_status),
            task_status,
        })
    }

    async fn finish_if_no_ready_step(
        &self,
        task_id: &TaskId,
        plan: &taskloom_types::plan::Plan,
    ) -> Result<StepReport, OrchestratorError> {
        if plan.has_in_progress() {
            // Another in-flight step still owns the plan; nothing to do
            // this iteration (shouldn't happen under the dispatch lock,
            // but a manual `mark` via an external tool could produce it).
            return Ok(StepReport::idle(TaskStatus::Running));
        }
        let (status, reason) = if plan.is_success() {
            (TaskStatus::Completed, None)
        } else {
            (
                TaskStatus::Failed,
                Some("plan has no ready step and is not satisfied".to_string()),
            )
        };
        self.publish_task_status(task_id, status, reason).await?;
        Ok(StepReport::idle(status))
    }

    async fn resolve_step_result(
        &self,
        task_id: &TaskId,
        handle: &TaskHandle,
        step_id: &StepId,
        result: taskloom_worker::WorkerResult,
    ) -> Result<(StepStatus, TaskStatus), OrchestratorError> {
        let plan_engine = self.plan_engine();
        let snapshot = self.store.snapshot(task_id).await?;
        let plan = snapshot
            .plan
            .ok_or_else(|| OrchestratorError::NoPlan(task_id.to_string()))?;

        match result.status {
            WorkerStatus::Completed => {
                let plan = plan_engine.mark(
                    &plan,
                    step_id,
                    StepStatus::Completed,
                    result.final_text.clone(),
                    None,
                )?;
                self.store.write_plan(task_id, plan).await?;
                let task_status = self.advance_task_after_step(task_id).await?;
                Ok((StepStatus::Completed, task_status))
            }
            WorkerStatus::Failed => {
                let error = result.error.expect("failed result always carries an error");
                let is_task_cancel =
                    error.kind == taskloom_types::error::ErrorKind::Cancelled
                        && handle.current_task_cancel().is_cancelled();
                let step_error = StepError::new(error.kind_tag(), error.detail.clone());

                if is_task_cancel {
                    let plan =
                        plan_engine.mark(&plan, step_id, StepStatus::Failed, None, Some(step_error))?;
                    self.store.write_plan(task_id, plan).await?;
                    self.publish_task_status(
                        task_id,
                        TaskStatus::Paused,
                        Some("cancelled".to_string()),
                    )
                    .await?;
                    return Ok((StepStatus::Failed, TaskStatus::Paused));
                }

                let failed = plan_engine.mark(
                    &plan,
                    step_id,
                    StepStatus::Failed,
                    None,
                    Some(step_error),
                )?;
                let step = failed.get(step_id).expect("just marked");
                if step.attempts < taskloom_types::step::MAX_ATTEMPTS {
                    let retried = plan_engine.mark(&failed, step_id, StepStatus::Pending, None, None)?;
                    self.store.write_plan(task_id, retried).await?;
                    Ok((StepStatus::Pending, TaskStatus::Running))
                } else {
                    self.store.write_plan(task_id, failed.clone()).await?;
                    if failed.has_exhausted_failure() {
                        self.publish_task_status(
                            task_id,
                            TaskStatus::Failed,
                            Some("step exhausted retries".to_string()),
                        )
                        .await?;
                        Ok((StepStatus::Failed, TaskStatus::Failed))
                    } else {
                        Ok((StepStatus::Failed, TaskStatus::Running))
                    }
                }
            }
        }
    }

    async fn advance_task_after_step(&self, task_id: &TaskId) -> Result<TaskStatus, OrchestratorError> {
        let snapshot = self.store.snapshot(task_id).await?;
        let Some(plan) = snapshot.plan else {
            return Ok(snapshot.task.status);
        };
        if plan.is_success() {
            self.publish_task_status(task_id, TaskStatus::Completed, None)
                .await?;
            return Ok(TaskStatus::Completed);
        }
        Ok(snapshot.task.status)
    }

    /// `cancel(task_id, scope)` (§4.6): signals cancellation, honored
    /// within 200 ms at the worker. `Turn` aborts only the running
    /// worker; `Task` additionally sets `status = paused` and exits the
    /// dispatch loop. A subsequent `chat` resumes a paused task.
    pub async fn cancel(&self, task_id: &TaskId, scope: CancelScope) -> Result<(), OrchestratorError> {
        let handle = self.handle_for(task_id)?;
        let snapshot = self.store.snapshot(task_id).await?;
        if snapshot.task.status.is_terminal() {
            return Err(OrchestratorError::Terminal(task_id.to_string()));
        }

        if let Some(turn_cancel) = handle.turn_cancel.lock().await.as_ref() {
            turn_cancel.cancel();
        }

        if scope == CancelScope::Task {
            handle.current_task_cancel().cancel();
            self.publish_task_status(task_id, TaskStatus::Paused, Some("cancelled".to_string()))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    use taskloom_memory::LocalMemoryGateway;
    use taskloom_turn::provider::ProviderError;
    use taskloom_turn::types::{ContentPart, ProviderRequest, ProviderResponse, StopReason, TokenUsage};
    use taskloom_types::config::{AgentConfig, TeamDefaults};

    #[derive(Clone)]
    struct ScriptedProvider {
        responses: Arc<AsyncMutex<VecDeque<String>>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Arc::new(AsyncMutex::new(responses.into_iter().map(String::from).collect())),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl Provider for ScriptedProvider {
        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let mut queue = self.responses.lock().await;
            let text = queue.pop_front().unwrap_or_else(|| "continue".to_string());
            Ok(ProviderResponse {
                content: vec![ContentPart::Text { text }],
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::default(),
                model: "scripted".to_string(),
                cost: None,
                truncated: Some(false),
            })
        }
    }

    fn one_step_plan_json() -> &'static str {
        r#"{"goal_summary":"test goal","steps":[{"id":"s1","name":"do it","goal":"do it","role":"worker","depends_on":[]}]}"#
    }

    async fn test_orchestrator(
        dir: &tempfile::TempDir,
        responses: Vec<&str>,
    ) -> (Orchestrator<ScriptedProvider>, ScriptedProvider) {
        let store = Arc::new(TaskspaceStore::new(dir.path()));
        let event_bus = Arc::new(EventBus::new(Arc::clone(&store)));
        let executor = Arc::new(Executor::new(Arc::clone(&store)));
        let memory = Arc::new(LocalMemoryGateway::new(Arc::clone(&store)));
        let provider = ScriptedProvider::new(responses);
        let orchestrator = Orchestrator::new(
            provider.clone(),
            store,
            event_bus,
            executor,
            memory,
            OrchestratorConfig::default(),
        );
        (orchestrator, provider)
    }

    #[tokio::test]
    async fn start_generates_a_plan_for_a_nonempty_goal() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _provider) = test_orchestrator(&dir, vec![one_step_plan_json()]).await;
        let task_id = orchestrator
            .start("write a report", TeamConfig::default(), "user-1")
            .await
            .unwrap();
        let snapshot = orchestrator.store.snapshot(&task_id).await.unwrap();
        assert_eq!(snapshot.task.status, TaskStatus::Running);
        assert_eq!(snapshot.plan.unwrap().steps.len(), 1);
    }

    #[tokio::test]
    async fn start_with_empty_goal_leaves_task_pending_with_no_plan() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _provider) = test_orchestrator(&dir, vec![]).await;
        let task_id = orchestrator
            .start("", TeamConfig::default(), "user-1")
            .await
            .unwrap();
        let snapshot = orchestrator.store.snapshot(&task_id).await.unwrap();
        assert_eq!(snapshot.task.status, TaskStatus::Pending);
        assert!(snapshot.plan.is_none());
    }

    #[tokio::test]
    async fn run_drains_a_single_step_plan_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _provider) =
            test_orchestrator(&dir, vec![one_step_plan_json(), "done"]).await;
        let team_config = TeamConfig {
            agents: vec![AgentConfig {
                role: "worker".to_string(),
                prompt: "You do the work.".to_string(),
                tools: None,
                model: None,
            }],
            lead: None,
            defaults: TeamDefaults::default(),
        };
        let task_id = orchestrator
            .start("write a report", team_config, "user-1")
            .await
            .unwrap();
        let status = orchestrator.run(&task_id).await.unwrap();
        assert_eq!(status, TaskStatus::Completed);
        let snapshot = orchestrator.store.snapshot(&task_id).await.unwrap();
        let plan = snapshot.plan.unwrap();
        assert_eq!(plan.steps[0].status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn step_advances_exactly_one_step() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _provider) =
            test_orchestrator(&dir, vec![one_step_plan_json(), "done"]).await;
        let team_config = TeamConfig {
            agents: vec![AgentConfig {
                role: "worker".to_string(),
                prompt: "You do the work.".to_string(),
                tools: None,
                model: None,
            }],
            lead: None,
            defaults: TeamDefaults::default(),
        };
        let task_id = orchestrator
            .start("write a report", team_config, "user-1")
            .await
            .unwrap();
        let report = orchestrator.step(&task_id).await.unwrap();
        assert_eq!(report.status, Some(StepStatus::Completed));
        assert_eq!(report.task_status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn cancel_task_pauses_and_chat_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _provider) = test_orchestrator(&dir, vec![one_step_plan_json()]).await;
        let team_config = TeamConfig {
            agents: vec![AgentConfig {
                role: "worker".to_string(),
                prompt: "You do the work.".to_string(),
                tools: None,
                model: None,
            }],
            lead: None,
            defaults: TeamDefaults::default(),
        };
        let task_id = orchestrator
            .start("write a report", team_config, "user-1")
            .await
            .unwrap();

        orchestrator
            .cancel(&task_id, CancelScope::Task)
            .await
            .unwrap();
        let snapshot = orchestrator.store.snapshot(&task_id).await.unwrap();
        assert_eq!(snapshot.task.status, TaskStatus::Paused);

        let report = orchestrator.step(&task_id).await.unwrap();
        assert_eq!(report.step_id, None);
        assert_eq!(report.task_status, TaskStatus::Paused);
    }
}
