// ABOUTME: Typed failures of an agent invocation.
// ABOUTME: Separates "cannot run", "ran and failed", and "ran but spoke gibberish".

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// No usable agent executable was found
    #[error("claude CLI not found (searched: {})", searched.join(", "))]
    Unavailable { searched: Vec<String> },

    /// The executable could not be started, or its pipes failed mid-run
    #[error("claude process I/O failed: {0}")]
    Process(#[source] std::io::Error),

    /// The process ran and exited non-zero
    #[error("claude process failed (exit code {code:?}): {stderr}")]
    Execution { code: Option<i32>, stderr: String },

    /// The process output was not a JSON envelope
    #[error("claude returned invalid output ({reason}): {preview}")]
    Protocol { reason: String, preview: String },
}

impl AgentError {
    /// Execution-class failures: the agent was reachable but the turn did not complete
    pub fn is_execution(&self) -> bool {
        matches!(self, AgentError::Process(_) | AgentError::Execution { .. })
    }

    /// Short machine-friendly label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Unavailable { .. } => "unavailable",
            AgentError::Process(_) => "process",
            AgentError::Execution { .. } => "execution",
            AgentError::Protocol { .. } => "protocol",
        }
    }
}
