// ABOUTME: Invocation request for one agent turn and its command-line rendering.
// ABOUTME: Carries the fixed deny-list of dangerous tool patterns passed on every call.

use crate::schema::ResultSchema;
use std::time::Duration;

/// Tool patterns the agent may never use, regardless of caller
pub const DISALLOWED_TOOLS: [&str; 6] = [
    "Read(*.env*)",
    "Read(**/.env*)",
    "Bash(cat *.env*)",
    "Bash(cat **/.env*)",
    "Bash(rm -rf*)",
    "Bash(rm -r /*)",
];

/// Scheduled and proactive runs are killed after this long
pub const UNATTENDED_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRequest {
    pub prompt: String,
    /// Continuation token of a still-valid session
    pub resume: Option<String>,
    pub schema: ResultSchema,
    /// Chat recipient exported to the agent's environment for its send-message tool
    pub recipient: Option<String>,
    /// None = no wall-clock limit (interactive turns are supervised by the caller)
    pub timeout: Option<Duration>,
    /// Appended to [`DISALLOWED_TOOLS`], never replacing it
    pub extra_disallowed: Vec<String>,
}

impl AgentRequest {
    pub fn conversation(prompt: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            resume: None,
            schema: ResultSchema::Conversation,
            recipient: Some(recipient.into()),
            timeout: None,
            extra_disallowed: Vec::new(),
        }
    }

    pub fn unattended(prompt: impl Into<String>, schema: ResultSchema) -> Self {
        Self {
            prompt: prompt.into(),
            resume: None,
            schema,
            recipient: None,
            timeout: Some(UNATTENDED_TIMEOUT),
            extra_disallowed: Vec::new(),
        }
    }

    pub fn with_resume(mut self, token: Option<String>) -> Self {
        self.resume = token;
        self
    }

    pub fn with_recipient(mut self, recipient: Option<String>) -> Self {
        self.recipient = recipient;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn disallow(mut self, pattern: impl Into<String>) -> Self {
        self.extra_disallowed.push(pattern.into());
        self
    }

    pub fn disallowed_tools(&self) -> Vec<String> {
        DISALLOWED_TOOLS
            .iter()
            .map(|s| s.to_string())
            .chain(self.extra_disallowed.iter().cloned())
            .collect()
    }

    /// Arguments passed to the claude binary, in order
    pub fn cli_args(&self) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.prompt.clone(),
            "--output-format".to_string(),
            "json".to_string(),
            "--json-schema".to_string(),
            self.schema.to_arg(),
            "--permission-mode".to_string(),
            "bypassPermissions".to_string(),
            "--disallowedTools".to_string(),
        ];
        args.extend(self.disallowed_tools());

        if let Some(token) = &self.resume {
            args.push("--resume".to_string());
            args.push(token.clone());
        }
        args
    }
}
