//! [`MemoryError`] — the gateway's error taxonomy.

use taskloom_types::ErrorKind;

/// Errors the Memory Gateway (C7) can surface.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// The backing taskspace rejected the read/write.
    #[error("memory gateway storage error: {0}")]
    Storage(#[from] taskloom_taskspace::TaskspaceError),
}

impl MemoryError {
    /// Map onto the shared error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MemoryError::Storage(e) => e.kind(),
        }
    }
}
