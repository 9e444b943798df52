//! [`EventBusError`] — the bus's error taxonomy, mapped onto the shared
//! [`taskloom_types::ErrorKind`] vocabulary.

use taskloom_types::ErrorKind;

/// Errors the Event Bus (C2) can surface to publishers and subscribers.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    /// The publishing task's taskspace rejected the append.
    #[error("publish failed: {0}")]
    Taskspace(#[from] taskloom_taskspace::TaskspaceError),
    /// A subscriber's bounded queue overflowed; it has been disconnected
    /// and must reconnect with `from_seq` set to its last acknowledged
    /// sequence number.
    #[error("subscriber for task {task_id} lagged and was disconnected")]
    SlowConsumer {
        /// The task whose subscription lagged.
        task_id: String,
    },
}

impl EventBusError {
    /// Map onto the shared error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EventBusError::Taskspace(e) => e.kind(),
            EventBusError::SlowConsumer { .. } => ErrorKind::Cancelled,
        }
    }
}
