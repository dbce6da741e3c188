// ABOUTME: Claude CLI backend - spawns claude with --output-format json and a result schema.
// ABOUTME: Collects stdout/stderr fully, enforces the optional timeout, normalizes the envelope.

use crate::error::AgentError;
use crate::locate::{candidate_paths, find_claude_cli};
use crate::request::AgentRequest;
use crate::schema::{normalize, preview, AgentOutcome};
use crate::traits::AgentInvoker;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Environment variable the agent's send-message tool reads the recipient from
pub const RECIPIENT_ENV: &str = "JARVIS_CHAT_RECIPIENT";

/// Environment variable that suppresses the CLI's nonessential network calls
pub const QUIET_TRAFFIC_ENV: &str = "CLAUDE_CODE_DISABLE_NONESSENTIAL_TRAFFIC";

/// Configuration for the Claude CLI backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeCliConfig {
    /// Explicit path to the claude binary; discovered when unset
    #[serde(default)]
    pub binary: Option<String>,
    /// Working directory for the agent (the project it may modify)
    pub working_dir: PathBuf,
}

pub struct ClaudeCliInvoker {
    config: ClaudeCliConfig,
}

impl ClaudeCliInvoker {
    pub fn new(config: ClaudeCliConfig) -> Self {
        Self { config }
    }

    fn locate(&self) -> Result<PathBuf, AgentError> {
        find_claude_cli(self.config.binary.as_deref()).ok_or_else(|| AgentError::Unavailable {
            searched: candidate_paths(self.config.binary.as_deref())
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
        })
    }

    async fn run(&self, binary: &Path, request: &AgentRequest) -> Result<AgentOutcome, AgentError> {
        let mut command = Command::new(binary);
        command
            .args(request.cli_args())
            .current_dir(&self.config.working_dir)
            .env(QUIET_TRAFFIC_ENV, "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(recipient) = &request.recipient {
            command.env(RECIPIENT_ENV, recipient);
        }

        tracing::debug!(
            binary = %binary.display(),
            resume = ?request.resume,
            schema = ?request.schema,
            "Spawning claude CLI"
        );

        let mut child = command.spawn().map_err(AgentError::Process)?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Process(pipe_missing("stdout")))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| AgentError::Process(pipe_missing("stderr")))?;

        let collect = async {
            let mut out = Vec::new();
            let mut err = Vec::new();
            let (out_read, err_read) =
                tokio::join!(stdout.read_to_end(&mut out), stderr.read_to_end(&mut err));
            out_read?;
            err_read?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, out, err))
        };

        let finished = match request.timeout {
            Some(limit) => tokio::time::timeout(limit, collect).await.ok(),
            None => Some(collect.await),
        };

        let Some(collected) = finished else {
            tracing::warn!(
                timeout_secs = request.timeout.map(|t| t.as_secs()).unwrap_or(0),
                "Claude CLI timed out, killing process"
            );
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "Failed to kill timed-out claude process");
            }
            return Ok(AgentOutcome::timed_out(String::new()));
        };

        let (status, out, err) = collected.map_err(AgentError::Process)?;
        let stdout_text = String::from_utf8_lossy(&out).to_string();
        let stderr_text = String::from_utf8_lossy(&err).to_string();

        if !status.success() {
            tracing::error!(
                code = ?status.code(),
                stderr = %stderr_text,
                stdout = %preview(&stdout_text, 500),
                "Claude CLI failed"
            );
            let stderr = if stderr_text.trim().is_empty() {
                "Unknown error".to_string()
            } else {
                preview(&stderr_text, 200)
            };
            return Err(AgentError::Execution {
                code: status.code(),
                stderr,
            });
        }

        normalize(&stdout_text, request.schema, request.resume.as_deref())
    }
}

#[async_trait]
impl AgentInvoker for ClaudeCliInvoker {
    fn name(&self) -> &'static str {
        "claude-cli"
    }

    async fn invoke(&self, request: AgentRequest) -> Result<AgentOutcome, AgentError> {
        let binary = self.locate()?;
        let started = Instant::now();
        let outcome = self.run(&binary, &request).await;

        match &outcome {
            Ok(result) => tracing::info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                finished = result.finished,
                restart_requested = result.restart_requested,
                timed_out = result.timed_out,
                has_token = result.continuation_token.is_some(),
                "Claude turn completed"
            ),
            Err(e) => tracing::warn!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %e,
                "Claude turn failed"
            ),
        }
        outcome
    }
}

fn pipe_missing(name: &str) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        format!("{} was not captured", name),
    )
}
