//! On-disk layout for a single task's directory (§4.1).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use taskloom_types::Task;

pub(crate) fn task_dir(root: &Path, task_id: &str) -> PathBuf {
    root.join(task_id)
}

pub(crate) fn plan_path(dir: &Path) -> PathBuf {
    dir.join("plan.json")
}

pub(crate) fn state_path(dir: &Path) -> PathBuf {
    dir.join("state.json")
}

pub(crate) fn messages_path(dir: &Path) -> PathBuf {
    dir.join("messages.log")
}

pub(crate) fn events_path(dir: &Path) -> PathBuf {
    dir.join("events.log")
}

pub(crate) fn artifacts_dir(dir: &Path) -> PathBuf {
    dir.join("artifacts")
}

pub(crate) fn artifact_versions_dir(dir: &Path, path: &str) -> PathBuf {
    artifacts_dir(dir).join(".versions").join(path)
}

pub(crate) fn memory_rules_path(dir: &Path) -> PathBuf {
    dir.join("memory").join("rules.json")
}

/// `state.json`: the domain [`Task`] record plus the taskspace-internal
/// sequence counters that don't belong on the domain type itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    /// The domain task record: `status`, `plan_version`, `goal`, etc.
    pub task: Task,
    /// The last `seq` assigned in `events.log`.
    pub last_event_seq: u64,
    /// The next `seq` to assign in `messages.log`.
    pub next_message_seq: u64,
}
