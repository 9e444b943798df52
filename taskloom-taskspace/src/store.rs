//! [`TaskspaceStore`] — the filesystem-backed per-task store (C1, §4.1).

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tokio::time::Instant;

use taskloom_types::artifact::is_safe_relative_path;
use taskloom_types::{Artifact, Event, EventKind, Message, MemoryRule, Plan, Task, TaskId, TaskStatus};

use crate::atomic::write_atomic;
use crate::error::TaskspaceError;
use crate::layout::{
    artifact_versions_dir, artifacts_dir, events_path, memory_rules_path, messages_path,
    plan_path, state_path, task_dir, TaskState,
};

/// Events are fsynced every N appends...
const EVENT_FSYNC_BATCH_N: u32 = 16;
/// ...or every T milliseconds, whichever comes first (§4.1).
const EVENT_FSYNC_BATCH_MS: u64 = 50;

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn status_tag(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Running => "running",
        TaskStatus::Paused => "paused",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
    }
}

struct BatchState {
    unflushed: u32,
    last_flush: Instant,
}

struct TaskLock {
    rw: RwLock<()>,
    batch: Mutex<BatchState>,
}

/// A point-in-time, consistent read of a task's durable state (`load` and
/// `snapshot` both return this — a snapshot is just a load taken under a
/// shared read lease rather than mid-mutation).
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// The domain task record.
    pub task: Task,
    /// The current plan, or `None` if `write_plan` was never called.
    pub plan: Option<Plan>,
    /// The last `seq` assigned in this task's `events.log`.
    pub last_event_seq: u64,
}

/// Filesystem-backed implementation of the Taskspace Store (C1).
///
/// One directory per task under `root`, laid out per §4.1: `plan.json`,
/// `messages.log`, `events.log`, `state.json`, `artifacts/`,
/// `memory/rules.json`. Every mutating call holds that task's writer
/// lock for the duration of the call; `load`/`snapshot` take a shared
/// read lease so they never observe a half-written file.
pub struct TaskspaceStore {
    root: std::path::PathBuf,
    locks: Mutex<HashMap<TaskId, Arc<TaskLock>>>,
}

impl TaskspaceStore {
    /// Create a store rooted at `root`. The directory is created lazily
    /// as tasks are created under it.
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, task_id: &TaskId) -> Arc<TaskLock> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(task_id.clone())
            .or_insert_with(|| {
                Arc::new(TaskLock {
                    rw: RwLock::new(()),
                    batch: Mutex::new(BatchState {
                        unflushed: 0,
                        last_flush: Instant::now(),
                    }),
                })
            })
            .clone()
    }

    /// `create(task_id, goal, user_id)` (§4.1).
    pub async fn create(&self, task_id: &TaskId, goal: &str, user_id: &str) -> Result<Task, TaskspaceError> {
        let dir = task_dir(&self.root, task_id.as_str());
        let lock = self.lock_for(task_id);
        let _guard = lock.rw.write().await;

        match tokio::fs::metadata(state_path(&dir)).await {
            Ok(_) => return Err(TaskspaceError::AlreadyExists(task_id.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        tokio::fs::create_dir_all(artifacts_dir(&dir)).await?;
        let task = Task::new(task_id.clone(), goal, user_id);
        let state = TaskState {
            task: task.clone(),
            last_event_seq: 0,
            next_message_seq: 0,
        };
        write_atomic(&state_path(&dir), &serde_json::to_vec_pretty(&state)?).await?;
        write_atomic(&memory_rules_path(&dir), b"[]").await?;

        tracing::debug!(target: "taskspace", task_id = %task_id, op = "create", "created taskspace");
        Ok(task)
    }

    async fn read_state(&self, dir: &Path, task_id: &TaskId) -> Result<TaskState, TaskspaceError> {
        let bytes = match tokio::fs::read(&state_path(dir)).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TaskspaceError::NotFound(task_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|e| TaskspaceError::Corrupt {
            task: task_id.to_string(),
            detail: e.to_string(),
        })
    }

    async fn read_plan_file(&self, dir: &Path) -> Result<Option<Plan>, TaskspaceError> {
        match tokio::fs::read(&plan_path(dir)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// `load(task_id)` (§4.1): hydrate plan, last event seq, and status.
    pub async fn load(&self, task_id: &TaskId) -> Result<Snapshot, TaskspaceError> {
        let dir = task_dir(&self.root, task_id.as_str());
        let lock = self.lock_for(task_id);
        let _guard = lock.rw.read().await;
        let state = self.read_state(&dir, task_id).await?;
        let plan = self.read_plan_file(&dir).await?;
        Ok(Snapshot {
            task: state.task,
            plan,
            last_event_seq: state.last_event_seq,
        })
    }

    /// `snapshot(task_id)` (§4.1): a point-in-time consistent read, taken
    /// under the same shared read lease as `load`.
    pub async fn snapshot(&self, task_id: &TaskId) -> Result<Snapshot, TaskspaceError> {
        self.load(task_id).await
    }

    /// `append_message(task_id, message)` (§4.1): assigns a monotone
    /// `seq` and fsyncs before returning.
    pub async fn append_message(&self, task_id: &TaskId, mut message: Message) -> Result<Message, TaskspaceError> {
        let dir = task_dir(&self.root, task_id.as_str());
        let lock = self.lock_for(task_id);
        let _guard = lock.rw.write().await;

        let mut state = self.read_state(&dir, task_id).await?;
        if state.task.status.is_terminal() {
            return Err(TaskspaceError::Closed(task_id.to_string()));
        }

        message.seq = state.next_message_seq;
        let line = serde_json::to_string(&message)?;
        append_line(&messages_path(&dir), &line, true).await?;

        state.next_message_seq += 1;
        state.task.updated_at = now_millis();
        write_atomic(&state_path(&dir), &serde_json::to_vec_pretty(&state)?).await?;

        tracing::debug!(target: "taskspace", task_id = %task_id, op = "append_message", seq = message.seq, "appended message");
        Ok(message)
    }

    /// Read the full message log, in `seq` order.
    pub async fn read_messages(&self, task_id: &TaskId) -> Result<Vec<Message>, TaskspaceError> {
        let dir = task_dir(&self.root, task_id.as_str());
        let lock = self.lock_for(task_id);
        let _guard = lock.rw.read().await;
        let contents = match tokio::fs::read_to_string(&messages_path(&dir)).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        contents
            .lines()
            .map(|line| {
                serde_json::from_str(line).map_err(|e| TaskspaceError::Corrupt {
                    task: task_id.to_string(),
                    detail: e.to_string(),
                })
            })
            .collect()
    }

    /// Append an event to `events.log` while the caller already holds
    /// the write guard, bumping `state.last_event_seq`. Used both by
    /// `append_event` and internally by operations that must
    /// write-ahead an event before replacing their target file.
    async fn append_event_locked(
        &self,
        dir: &Path,
        task_id: &TaskId,
        state: &mut TaskState,
        mut event: Event,
    ) -> Result<Event, TaskspaceError> {
        if event.task_id != *task_id {
            return Err(TaskspaceError::TaskIdMismatch {
                expected: task_id.to_string(),
                got: event.task_id.to_string(),
            });
        }
        event.seq = state.last_event_seq;
        let line = serde_json::to_string(&event)?;

        let lock = self.lock_for(task_id);
        let should_flush = {
            let mut batch = lock.batch.lock().unwrap();
            batch.unflushed += 1;
            let due = batch.unflushed >= EVENT_FSYNC_BATCH_N
                || batch.last_flush.elapsed() >= Duration::from_millis(EVENT_FSYNC_BATCH_MS);
            if due {
                batch.unflushed = 0;
                batch.last_flush = Instant::now();
            }
            due
        };
        append_line(&events_path(dir), &line, should_flush).await?;
        state.last_event_seq += 1;
        Ok(event)
    }

    /// `append_event(task_id, event)` (§4.1): fsyncs every N events or T
    /// ms (defaults 16 / 50ms); returns the assigned seq.
    pub async fn append_event(&self, task_id: &TaskId, event: Event) -> Result<Event, TaskspaceError> {
        let dir = task_dir(&self.root, task_id.as_str());
        let lock = self.lock_for(task_id);
        let _guard = lock.rw.write().await;

        let mut state = self.read_state(&dir, task_id).await?;
        let event = self.append_event_locked(&dir, task_id, &mut state, event).await?;
        write_atomic(&state_path(&dir), &serde_json::to_vec_pretty(&state)?).await?;

        tracing::debug!(target: "taskspace", task_id = %task_id, op = "append_event", seq = event.seq, "appended event");
        Ok(event)
    }

    /// Read events from `events.log`, recovering from a crash-truncated
    /// trailing record by discarding it (P7), then filtering to
    /// `seq >= from_seq`.
    pub async fn read_events(&self, task_id: &TaskId, from_seq: u64) -> Result<Vec<Event>, TaskspaceError> {
        let dir = task_dir(&self.root, task_id.as_str());
        let lock = self.lock_for(task_id);
        let _guard = lock.rw.read().await;
        let events = self.read_events_recovering(&dir, task_id).await?;
        Ok(events.into_iter().filter(|e| e.seq >= from_seq).collect())
    }

    async fn read_events_recovering(&self, dir: &Path, task_id: &TaskId) -> Result<Vec<Event>, TaskspaceError> {
        let path = events_path(dir);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let mut events = Vec::new();
        let mut valid_bytes = 0usize;
        let mut truncated = false;
        for line in contents.lines() {
            match serde_json::from_str::<Event>(line) {
                Ok(event) => {
                    events.push(event);
                    valid_bytes += line.len() + 1;
                }
                Err(_) => {
                    truncated = true;
                    break;
                }
            }
        }
        if truncated {
            tracing::warn!(target: "taskspace", task_id = %task_id, "events.log corrupt past offset {valid_bytes}, truncating to last fully-written record");
            write_atomic(&path, &contents.as_bytes()[..valid_bytes]).await?;
        }
        Ok(events)
    }

    /// `write_plan(task_id, plan)` (§4.1): atomic overwrite, bumps
    /// `plan_version`, write-ahead-appends `plan_updated` before
    /// replacing `plan.json`. Rejects I1-I3 violations with
    /// `InvalidPlan`.
    pub async fn write_plan(&self, task_id: &TaskId, mut plan: Plan) -> Result<Plan, TaskspaceError> {
        plan.validate()?;

        let dir = task_dir(&self.root, task_id.as_str());
        let lock = self.lock_for(task_id);
        let _guard = lock.rw.write().await;

        let mut state = self.read_state(&dir, task_id).await?;
        if state.task.status.is_terminal() {
            return Err(TaskspaceError::Closed(task_id.to_string()));
        }

        plan.version = state.task.plan_version + 1;
        let now = now_millis();
        let event = Event::new(task_id.clone(), now, EventKind::PlanUpdated { plan_version: plan.version });
        self.append_event_locked(&dir, task_id, &mut state, event).await?;

        write_atomic(&plan_path(&dir), &serde_json::to_vec_pretty(&plan)?).await?;
        state.task.plan_version = plan.version;
        state.task.updated_at = now;
        write_atomic(&state_path(&dir), &serde_json::to_vec_pretty(&state)?).await?;

        tracing::debug!(target: "taskspace", task_id = %task_id, op = "write_plan", plan_version = plan.version, "wrote plan");
        Ok(plan)
    }

    /// `write_artifact(task_id, path, bytes)` (§4.1): creates a new
    /// version, rejecting paths that escape the taskspace root.
    pub async fn write_artifact(&self, task_id: &TaskId, path: &str, bytes: &[u8]) -> Result<Artifact, TaskspaceError> {
        if !is_safe_relative_path(path) {
            return Err(TaskspaceError::UnsafePath(path.to_string()));
        }

        let dir = task_dir(&self.root, task_id.as_str());
        let lock = self.lock_for(task_id);
        let _guard = lock.rw.write().await;

        let mut state = self.read_state(&dir, task_id).await?;
        if state.task.status.is_terminal() {
            return Err(TaskspaceError::Closed(task_id.to_string()));
        }

        let history_dir = artifact_versions_dir(&dir, path);
        let meta_path = history_dir.join("meta.json");
        let mut history: Vec<Artifact> = match tokio::fs::read(&meta_path).await {
            Ok(b) => serde_json::from_slice(&b)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let now = now_millis();
        let version = history.len() as u64 + 1;
        // `Artifact` is `#[non_exhaustive]`: build the first version via
        // its constructor, then clone-and-bump for later versions so
        // `created_at` survives across the history.
        let artifact = match history.last() {
            Some(prior) => {
                let mut next = prior.clone();
                next.version = version;
                next.modified_at = now;
                next.size = bytes.len() as u64;
                next
            }
            None => Artifact::new(path, bytes.len() as u64, version, now),
        };

        write_atomic(&history_dir.join(version.to_string()), bytes).await?;
        history.push(artifact.clone());
        write_atomic(&meta_path, &serde_json::to_vec_pretty(&history)?).await?;
        write_atomic(&artifacts_dir(&dir).join(path), bytes).await?;

        let event = Event::new(task_id.clone(), now, EventKind::ArtifactUpdate { path: path.to_string(), version });
        self.append_event_locked(&dir, task_id, &mut state, event).await?;
        state.task.updated_at = now;
        write_atomic(&state_path(&dir), &serde_json::to_vec_pretty(&state)?).await?;

        tracing::debug!(target: "taskspace", task_id = %task_id, op = "write_artifact", path, version, "wrote artifact");
        Ok(artifact)
    }

    /// Transition the task's own status (not a step's), write-ahead
    /// appending a `task_update` event. Not in the spec's literal
    /// operation list but required to ever move a task out of `pending`
    /// or into a terminal state — the orchestrator is the only caller.
    pub async fn set_status(&self, task_id: &TaskId, status: TaskStatus, reason: Option<String>) -> Result<Task, TaskspaceError> {
        let dir = task_dir(&self.root, task_id.as_str());
        let lock = self.lock_for(task_id);
        let _guard = lock.rw.write().await;

        let mut state = self.read_state(&dir, task_id).await?;
        let now = now_millis();
        let event = Event::new(
            task_id.clone(),
            now,
            EventKind::TaskUpdate { status: status_tag(status).to_string(), reason },
        );
        self.append_event_locked(&dir, task_id, &mut state, event).await?;

        state.task.status = status;
        state.task.updated_at = now;
        write_atomic(&state_path(&dir), &serde_json::to_vec_pretty(&state)?).await?;

        tracing::debug!(target: "taskspace", task_id = %task_id, op = "set_status", status = status_tag(status), "task status changed");
        Ok(state.task)
    }

    /// Read the task's active memory rules (`memory/rules.json`).
    pub async fn read_memory_rules(&self, task_id: &TaskId) -> Result<Vec<MemoryRule>, TaskspaceError> {
        let dir = task_dir(&self.root, task_id.as_str());
        let lock = self.lock_for(task_id);
        let _guard = lock.rw.read().await;
        self.read_memory_rules_unlocked(&dir).await
    }

    async fn read_memory_rules_unlocked(&self, dir: &Path) -> Result<Vec<MemoryRule>, TaskspaceError> {
        match tokio::fs::read(&memory_rules_path(dir)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Append a memory rule to the task's active set, persisting it
    /// atomically. Duplicate `constraint`/`preference` text is kept as
    /// written — the caller (Memory Gateway) is responsible for dedup
    /// policy.
    pub async fn append_memory_rule(&self, task_id: &TaskId, rule: MemoryRule) -> Result<Vec<MemoryRule>, TaskspaceError> {
        let dir = task_dir(&self.root, task_id.as_str());
        let lock = self.lock_for(task_id);
        let _guard = lock.rw.write().await;

        // create() guarantees the taskspace exists; surface NotFound if not.
        self.read_state(&dir, task_id).await?;

        let mut rules = self.read_memory_rules_unlocked(&dir).await?;
        rules.push(rule);
        write_atomic(&memory_rules_path(&dir), &serde_json::to_vec_pretty(&rules)?).await?;

        tracing::debug!(target: "taskspace", task_id = %task_id, op = "append_memory_rule", count = rules.len(), "recorded memory rule");
        Ok(rules)
    }

    /// Remove every `HotIssue` rule whose `origin_step_id` matches.
    /// Returns the rule set after removal.
    pub async fn clear_hot_issue(&self, task_id: &TaskId, origin_step_id: &str) -> Result<Vec<MemoryRule>, TaskspaceError> {
        let dir = task_dir(&self.root, task_id.as_str());
        let lock = self.lock_for(task_id);
        let _guard = lock.rw.write().await;

        self.read_state(&dir, task_id).await?;

        let mut rules = self.read_memory_rules_unlocked(&dir).await?;
        rules.retain(|rule| rule.origin_step_id() != Some(origin_step_id));
        write_atomic(&memory_rules_path(&dir), &serde_json::to_vec_pretty(&rules)?).await?;

        tracing::debug!(target: "taskspace", task_id = %task_id, op = "clear_hot_issue", origin_step_id, "cleared hot issue");
        Ok(rules)
    }
}

async fn append_line(path: &Path, line: &str, flush: bool) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    if flush {
        file.sync_all().await?;
    }
    Ok(())
}
