#![deny(missing_docs)]
//! # taskloom — umbrella crate
//!
//! Single import surface for the taskloom multi-agent task orchestration
//! runtime. Re-exports protocol and key implementations behind feature
//! flags, plus a `prelude` for the happy path.

#[cfg(feature = "core")]
pub use taskloom_proto;
#[cfg(feature = "core")]
pub use taskloom_types;
#[cfg(feature = "eventbus")]
pub use taskloom_eventbus;
#[cfg(feature = "hooks")]
pub use taskloom_hook_security;
#[cfg(feature = "hooks")]
pub use taskloom_hooks;
#[cfg(feature = "memory")]
pub use taskloom_memory;
#[cfg(feature = "x")]
pub use taskloom_plan;
#[cfg(feature = "state-fs")]
pub use taskloom_state_fs;
#[cfg(feature = "state-memory")]
pub use taskloom_state_memory;
#[cfg(feature = "taskspace")]
pub use taskloom_taskspace;
#[cfg(feature = "core")]
pub use taskloom_tool;
#[cfg(feature = "core")]
pub use taskloom_turn;
#[cfg(feature = "worker")]
pub use taskloom_worker;
#[cfg(feature = "x")]
pub use taskloom_x;

/// Happy-path imports for composing taskloom systems.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use taskloom_proto::{
        AgentId, Content, ContentBlock, Effect, Environment, ExitReason, Hook, HookAction,
        HookContext, HookPoint, Operator, OperatorConfig, OperatorInput, OperatorOutput, Scope,
        SessionId, StateReader, StateStore, WorkflowId,
    };

    #[cfg(feature = "core")]
    pub use taskloom_types::{
        Artifact, Event, EventKind, MemoryRule, Message, Part, Plan, Step, StepStatus, Task,
        TaskId, TaskStatus,
    };

    #[cfg(feature = "hooks")]
    pub use taskloom_hook_security::{ExfilGuardHook, RedactionHook};
    #[cfg(feature = "hooks")]
    pub use taskloom_hooks::HookRegistry;

    #[cfg(feature = "core")]
    pub use taskloom_tool::{ToolDyn, ToolError, ToolRegistry};

    #[cfg(feature = "core")]
    pub use taskloom_turn::provider::{Provider, ProviderError};

    #[cfg(feature = "worker")]
    pub use taskloom_worker::{Briefing, Worker, WorkerResult};

    #[cfg(feature = "x")]
    pub use taskloom_plan::{PlanEngine, PlanError};
    #[cfg(feature = "x")]
    pub use taskloom_x::Orchestrator as TaskOrchestrator;

    #[cfg(feature = "state-memory")]
    pub use taskloom_state_memory::MemoryStore;

    #[cfg(feature = "state-fs")]
    pub use taskloom_state_fs::FsStore;

    #[cfg(feature = "taskspace")]
    pub use taskloom_taskspace::TaskspaceStore;

    #[cfg(feature = "eventbus")]
    pub use taskloom_eventbus::EventBus;

    #[cfg(feature = "memory")]
    pub use taskloom_memory::{LocalMemoryGateway, MemoryGateway};
}
