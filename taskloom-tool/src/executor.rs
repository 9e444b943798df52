//! [`Executor`] — validates and executes tool calls against the policy
//! and concurrency rules of §4.3.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use jsonschema::validator_for;
use tokio::sync::Semaphore;

use taskloom_taskspace::TaskspaceStore;
use taskloom_types::artifact::is_safe_relative_path;
use taskloom_types::TaskId;

use crate::descriptor::{EffectClass, ToolDescriptor};
use crate::policy::{clip_output, SandboxPolicy, DEFAULT_OUTPUT_CLIP_BYTES};
use crate::result::{ToolCall, ToolResult, ToolResultKind};
use crate::{ToolDyn, ToolError};

/// Validated, policy-enforced entry point for invoking registered tools
/// (C3). Owns the global cross-task concurrency cap and the optional
/// per-task visible-tool-set overrides.
pub struct Executor {
    tools: HashMap<String, Arc<dyn ToolDyn>>,
    descriptors: HashMap<String, ToolDescriptor>,
    visible_overrides: Mutex<HashMap<TaskId, HashSet<String>>>,
    store: Arc<TaskspaceStore>,
    concurrency: Arc<Semaphore>,
    sandbox_policy: SandboxPolicy,
    output_clip_bytes: usize,
}

impl Executor {
    /// Build an executor with the default global concurrency cap:
    /// `min(32, 4 * available_parallelism)`.
    pub fn new(store: Arc<TaskspaceStore>) -> Self {
        let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        Self::with_concurrency(store, (4 * cpus).min(32))
    }

    /// Build an executor with an explicit global concurrency cap.
    pub fn with_concurrency(store: Arc<TaskspaceStore>, max_concurrent: usize) -> Self {
        Self {
            tools: HashMap::new(),
            descriptors: HashMap::new(),
            visible_overrides: Mutex::new(HashMap::new()),
            store,
            concurrency: Arc::new(Semaphore::new(max_concurrent.max(1))),
            sandbox_policy: SandboxPolicy::default(),
            output_clip_bytes: DEFAULT_OUTPUT_CLIP_BYTES,
        }
    }

    /// Register a tool under its descriptor. Static registration at
    /// process start; per-task restriction is layered on via
    /// `restrict_visible_tools`.
    pub fn register(&mut self, descriptor: ToolDescriptor, tool: Arc<dyn ToolDyn>) {
        self.tools.insert(descriptor.name.clone(), tool);
        self.descriptors.insert(descriptor.name.clone(), descriptor);
    }

    /// Restrict the tool set visible to `task_id` to `names`. Call with
    /// an empty set to hide every tool; never call to leave the task
    /// with the full static registration.
    pub fn restrict_visible_tools(&self, task_id: TaskId, names: impl IntoIterator<Item = String>) {
        self.visible_overrides.lock().unwrap().insert(task_id, names.into_iter().collect());
    }

    /// The descriptors visible to `task_id`: the full static
    /// registration, filtered by any override installed via
    /// `restrict_visible_tools`.
    pub fn list_visible(&self, task_id: &TaskId) -> Vec<&ToolDescriptor> {
        let overrides = self.visible_overrides.lock().unwrap();
        match overrides.get(task_id) {
            Some(allowed) => self.descriptors.values().filter(|d| allowed.contains(&d.name)).collect(),
            None => self.descriptors.values().collect(),
        }
    }

    fn validate_args(descriptor: &ToolDescriptor, args: &serde_json::Value) -> Result<(), String> {
        let validator = validator_for(&descriptor.parameter_schema)
            .map_err(|e| format!("<schema>: invalid parameter_schema: {e}"))?;
        let errors: Vec<String> = validator
            .iter_errors(args)
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }

    fn check_policy(descriptor: &ToolDescriptor, args: &serde_json::Value) -> Result<(), String> {
        match descriptor.effect_class {
            EffectClass::ReadOnly | EffectClass::Network => Ok(()),
            EffectClass::WorkspaceWrite => {
                let Some(path_arg) = &descriptor.path_arg else { return Ok(()) };
                let path = args.get(path_arg).and_then(|v| v.as_str()).unwrap_or("");
                if is_safe_relative_path(path) {
                    Ok(())
                } else {
                    Err(format!("path '{path}' escapes the taskspace artifacts root"))
                }
            }
            EffectClass::Shell => Ok(()),
        }
    }

    fn artifact_content(value: &serde_json::Value) -> Vec<u8> {
        match value {
            serde_json::Value::String(s) => s.clone().into_bytes(),
            serde_json::Value::Object(map) => match map.get("content").and_then(|c| c.as_str()) {
                Some(s) => s.to_string().into_bytes(),
                None => serde_json::to_vec_pretty(value).unwrap_or_default(),
            },
            _ => serde_json::to_vec_pretty(value).unwrap_or_default(),
        }
    }

    /// Invoke a tool call under the task's taskspace (§4.3 steps 1-6).
    pub async fn invoke(&self, task_id: &TaskId, call: ToolCall) -> ToolResult {
        let start = Instant::now();

        let Some(descriptor) = self.descriptors.get(&call.name) else {
            return ToolResult::error(call.call_id, ToolResultKind::UnknownTool, format!("no such tool: {}", call.name), elapsed_ms(start));
        };

        if let Err(detail) = Self::validate_args(descriptor, &call.args) {
            return ToolResult::error(call.call_id, ToolResultKind::Validation, detail, elapsed_ms(start));
        }

        if let Err(detail) = Self::check_policy(descriptor, &call.args) {
            return ToolResult::error(call.call_id, ToolResultKind::Policy, detail, elapsed_ms(start));
        }

        let tool = self.tools.get(&call.name).expect("descriptor implies a registered tool");

        let _permit = match self.concurrency.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return ToolResult::error(call.call_id, ToolResultKind::Runtime, "concurrency semaphore closed", elapsed_ms(start));
            }
        };

        let call_future = tool.call(call.args.clone());
        let outcome = if descriptor.requires_sandbox {
            match tokio::time::timeout(Duration::from_secs(self.sandbox_policy.timeout_secs), call_future).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(target: "tool", tool = %call.name, task_id = %task_id, "tool invocation timed out");
                    return ToolResult::error(call.call_id, ToolResultKind::Runtime, "sandbox timeout exceeded", elapsed_ms(start));
                }
            }
        } else {
            call_future.await
        };

        let value = match outcome {
            Ok(value) => value,
            Err(ToolError::InvalidInput(detail)) => {
                return ToolResult::error(call.call_id, ToolResultKind::Validation, detail, elapsed_ms(start));
            }
            Err(e) => {
                return ToolResult::error(call.call_id, ToolResultKind::Runtime, e.to_string(), elapsed_ms(start));
            }
        };

        let clipped = clip_json_strings(value, self.output_clip_bytes);
        let duration_ms = elapsed_ms(start);
        let mut result = ToolResult::ok(call.call_id, clipped.clone(), duration_ms);

        if descriptor.effect_class == EffectClass::WorkspaceWrite {
            if let Some(path_arg) = &descriptor.path_arg {
                if let Some(path) = call.args.get(path_arg).and_then(|v| v.as_str()) {
                    let bytes = Self::artifact_content(&clipped);
                    match self.store.write_artifact(task_id, path, &bytes).await {
                        Ok(artifact) => result = result.with_artifact(artifact),
                        Err(e) => {
                            return ToolResult::error(call.call_id.clone(), ToolResultKind::Runtime, format!("artifact registration failed: {e}"), duration_ms);
                        }
                    }
                }
            }
        }

        result
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Clip every string leaf in a JSON value to `max_bytes`, so clipping
/// applies whether the tool returned a bare string or a structured
/// object with a `stdout`/`content` field.
fn clip_json_strings(value: serde_json::Value, max_bytes: usize) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(clip_output(s, max_bytes)),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(|v| clip_json_strings(v, max_bytes)).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter().map(|(k, v)| (k, clip_json_strings(v, max_bytes))).collect(),
        ),
        other => other,
    }
}
