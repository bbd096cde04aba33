//! Lifecycle hooks around create / modify / complete / delete.
//!
//! Hooks for one event run strictly one after another in discovery order.
//! `create` and `modify` hooks may rewrite the task by printing a JSON task
//! on stdout; their failures abort the mutation. `complete` and `delete` hooks
//! run after the change is committed, for side effects only, and each failure
//! is logged and ignored.

pub mod discovery;
pub mod process;

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::recurrence::dates::parse_timestamp;
use tally_models::{HookEvent, Task};

pub use discovery::HookHandle;
pub use process::ProcessHookRunner;

pub const ENV_EVENT: &str = "TALLY_EVENT";
pub const ENV_TASK_ID: &str = "TALLY_TASK_ID";
pub const ENV_DATA_DIR: &str = "TALLY_DATA_DIR";

/// One hook execution's input. Built per hook, discarded afterwards.
#[derive(Debug, Clone)]
pub struct HookInvocation {
    pub event: HookEvent,
    pub task_id: String,
    pub stdin_payload: String,
    pub env: Vec<(String, String)>,
}

/// Captured output of a hook that exited successfully.
#[derive(Debug, Clone, Default)]
pub struct HookOutput {
    pub stdout: String,
    pub stderr: String,
}

/// How hooks are found and executed. The pipeline only sees this seam, so the
/// local-subprocess runner can be swapped for a sandboxed or remote one.
#[async_trait]
pub trait HookRunner: Send + Sync {
    /// Hooks for `event` in execution order.
    fn discover(&self, event: HookEvent) -> Result<Vec<HookHandle>>;

    /// Run one hook. Non-zero exit, spawn errors and timeouts are `Error::HookExecution`.
    async fn invoke(&self, hook: &HookHandle, invocation: &HookInvocation) -> Result<HookOutput>;
}

#[derive(Serialize)]
struct ModifyPayload<'a> {
    old: &'a Task,
    new: &'a Task,
}

#[derive(Clone)]
pub struct HookPipeline {
    runner: Arc<dyn HookRunner>,
    data_dir: PathBuf,
}

impl HookPipeline {
    pub fn new(runner: Arc<dyn HookRunner>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            data_dir: data_dir.into(),
        }
    }

    /// Subprocess hooks from `hooks_dir`.
    pub fn from_dir(
        hooks_dir: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        timeout: Option<std::time::Duration>,
    ) -> Self {
        let runner = ProcessHookRunner::new(hooks_dir).with_timeout(timeout);
        Self::new(Arc::new(runner), data_dir)
    }

    fn invocation(&self, event: HookEvent, task_id: &str, payload: String) -> HookInvocation {
        HookInvocation {
            event,
            task_id: task_id.to_string(),
            stdin_payload: payload,
            env: vec![
                (ENV_EVENT.to_string(), event.as_str().to_string()),
                (ENV_TASK_ID.to_string(), task_id.to_string()),
                (
                    ENV_DATA_DIR.to_string(),
                    self.data_dir.to_string_lossy().into_owned(),
                ),
            ],
        }
    }

    /// Run `create` hooks in order; each sees the previous hook's replacement.
    pub async fn run_create_hooks(&self, task: Task) -> Result<Task> {
        let mut current = task;
        for hook in self.runner.discover(HookEvent::Create)? {
            let payload = serde_json::to_string(&current)?;
            let invocation = self.invocation(HookEvent::Create, &current.id, payload);
            let output = self.runner.invoke(&hook, &invocation).await?;
            if let Some(replacement) = parse_replacement(&hook, &output)? {
                tracing::debug!(hook = %hook.name, task_id = %replacement.id, "create hook replaced task");
                current = replacement;
            }
        }
        Ok(current)
    }

    /// Run `modify` hooks in order with `{old, new}`, where `new` accumulates
    /// replacements. A hook that changes the id, or moves the recurrence
    /// watermark earlier than `old`'s, rejects the whole update.
    pub async fn run_modify_hooks(&self, old: &Task, new: Task) -> Result<Task> {
        let mut current = new;
        for hook in self.runner.discover(HookEvent::Modify)? {
            let payload = serde_json::to_string(&ModifyPayload {
                old,
                new: &current,
            })?;
            let invocation = self.invocation(HookEvent::Modify, &old.id, payload);
            let output = self.runner.invoke(&hook, &invocation).await?;
            if let Some(replacement) = parse_replacement(&hook, &output)? {
                if replacement.id != old.id {
                    return Err(Error::HookContractViolation {
                        hook: hook.name.clone(),
                        expected: old.id.clone(),
                        found: replacement.id,
                    });
                }
                check_watermark(&hook, old, &replacement)?;
                tracing::debug!(hook = %hook.name, task_id = %old.id, "modify hook replaced task");
                current = replacement;
            }
        }
        Ok(current)
    }

    /// Run `complete` or `delete` hooks for side effects. Output is ignored and
    /// a failing hook does not stop the ones after it.
    pub async fn run_non_mutating_hooks(&self, event: HookEvent, task: &Task) {
        if event.is_blocking() {
            tracing::warn!(event = event.as_str(), "blocking event passed to non-mutating hook runner");
        }
        let hooks = match self.runner.discover(event) {
            Ok(hooks) => hooks,
            Err(e) => {
                tracing::warn!(event = event.as_str(), error = %e, "hook discovery failed");
                return;
            }
        };
        let payload = match serde_json::to_string(task) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(event = event.as_str(), error = %e, "cannot serialize hook payload");
                return;
            }
        };

        for hook in hooks {
            let invocation = self.invocation(event, &task.id, payload.clone());
            if let Err(e) = self.runner.invoke(&hook, &invocation).await {
                tracing::warn!(
                    hook = %hook.name,
                    event = event.as_str(),
                    task_id = %task.id,
                    error = %e,
                    "hook failed; continuing"
                );
            }
        }
    }
}

/// The watermark only moves forward: a replacement may not clear it or set
/// it earlier than the stored one.
fn check_watermark(hook: &HookHandle, old: &Task, replacement: &Task) -> Result<()> {
    let Some(before) = old.recurrence_last_generated.as_deref() else {
        return Ok(());
    };
    let violation = |found: &str| Error::HookContractViolation {
        hook: hook.name.clone(),
        expected: format!("recurrence_last_generated >= {before}"),
        found: found.to_string(),
    };
    match replacement.recurrence_last_generated.as_deref() {
        None => Err(violation("none")),
        Some(after) if parse_timestamp(after)? < parse_timestamp(before)? => Err(violation(after)),
        Some(_) => Ok(()),
    }
}

/// Empty stdout means "no change"; anything else must be a task record.
fn parse_replacement(hook: &HookHandle, output: &HookOutput) -> Result<Option<Task>> {
    let body = output.stdout.trim();
    if body.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(body)
        .map(Some)
        .map_err(|e| Error::HookOutputInvalid {
            hook: hook.name.clone(),
            message: e.to_string(),
        })
}
