use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::discovery::{discover_hooks, HookHandle};
use super::{HookInvocation, HookOutput, HookRunner};
use crate::error::{Error, Result};
use tally_models::HookEvent;

/// Runs executables found in a hooks directory, one blocking child per hook.
///
/// The payload goes to stdin, stdout is the result. Without a timeout a hung
/// hook blocks the calling mutation forever; with one, the child is killed
/// when it expires.
#[derive(Debug, Clone)]
pub struct ProcessHookRunner {
    hooks_dir: PathBuf,
    timeout: Option<Duration>,
}

impl ProcessHookRunner {
    pub fn new(hooks_dir: impl Into<PathBuf>) -> Self {
        Self {
            hooks_dir: hooks_dir.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn hooks_dir(&self) -> &PathBuf {
        &self.hooks_dir
    }
}

fn failure(hook: &HookHandle, reason: impl Into<String>) -> Error {
    Error::HookExecution {
        hook: hook.name.clone(),
        reason: reason.into(),
    }
}

#[async_trait]
impl HookRunner for ProcessHookRunner {
    fn discover(&self, event: HookEvent) -> Result<Vec<HookHandle>> {
        discover_hooks(&self.hooks_dir, event)
    }

    async fn invoke(&self, hook: &HookHandle, invocation: &HookInvocation) -> Result<HookOutput> {
        let mut child = Command::new(&hook.path)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| failure(hook, format!("spawn error: {e}")))?;

        // Feed stdin concurrently so a hook that prints before reading cannot deadlock us.
        let writer = child.stdin.take().map(|mut stdin| {
            let payload = invocation.stdin_payload.clone().into_bytes();
            tokio::spawn(async move {
                match stdin.write_all(&payload).await {
                    // Hooks are free to ignore their input
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                    other => other,
                }
            })
        });

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| failure(hook, format!("timed out after {}s", limit.as_secs())))?,
            None => child.wait_with_output().await,
        }
        .map_err(|e| failure(hook, format!("wait error: {e}")))?;

        if let Some(writer) = writer {
            if let Ok(Err(e)) = writer.await {
                tracing::debug!(hook = %hook.name, error = %e, "failed to write hook stdin");
            }
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let status = match output.status.code() {
                Some(code) => format!("exit code {code}"),
                None => "terminated by signal".to_string(),
            };
            let detail = stderr.trim();
            let reason = if detail.is_empty() {
                status
            } else {
                format!("{status}: {detail}")
            };
            return Err(failure(hook, reason));
        }

        if !stderr.trim().is_empty() {
            tracing::debug!(hook = %hook.name, stderr = %stderr.trim(), "hook stderr");
        }
        Ok(HookOutput { stdout, stderr })
    }
}
