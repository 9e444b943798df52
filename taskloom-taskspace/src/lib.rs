#![deny(missing_docs)]
//! Taskspace Store (C1): atomic, versioned per-task persistence.
//!
//! One directory per task holds `plan.json`, `messages.log`,
//! `events.log`, `state.json`, `artifacts/`, and `memory/rules.json`
//! (§4.1). [`TaskspaceStore`] is the single source of truth every other
//! component reads through or writes through — the Orchestrator holds
//! the only write-capable handle to a running task's plan, workers get
//! read-only projections, and the Event Bus replays `events.log` for
//! historical catch-up before tailing live appends.

mod atomic;
mod error;
mod layout;
mod store;

pub use error::TaskspaceError;
pub use layout::TaskState;
pub use store::{Snapshot, TaskspaceStore};
