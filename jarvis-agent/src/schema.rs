// ABOUTME: Structured-result schemas requested from the agent and normalization of its output.
// ABOUTME: Accepts inline, structured_output-nested, and result-string-encoded payloads.

use crate::error::AgentError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Which structured result the agent is asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSchema {
    /// Interactive chat turn: `conversation_finished` + `code_changes`
    Conversation,
    /// Scheduled task: `conversation_finished` + `skipped`
    ScheduledTask,
    /// Proactive check-in: `conversation_finished` only
    CheckIn,
}

impl ResultSchema {
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        let finished_description = match self {
            ResultSchema::CheckIn => {
                "True if not sending a message, False if starting conversation"
            }
            _ => "Whether this topic/conversation is wrapped up",
        };
        properties.insert(
            "conversation_finished".to_string(),
            json!({ "type": "boolean", "description": finished_description }),
        );

        match self {
            ResultSchema::Conversation => {
                properties.insert(
                    "code_changes".to_string(),
                    json!({
                        "type": "boolean",
                        "description": "Set to true if you made code changes to jarvis that require a restart",
                    }),
                );
            }
            ResultSchema::ScheduledTask => {
                properties.insert(
                    "skipped".to_string(),
                    json!({
                        "type": "boolean",
                        "description": "Set to true if the task is no longer relevant based on context",
                    }),
                );
            }
            ResultSchema::CheckIn => {}
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": ["conversation_finished"],
        })
    }

    /// Compact JSON text for the `--json-schema` argument
    pub fn to_arg(&self) -> String {
        self.json_schema().to_string()
    }

    /// Value of `finished` when the payload does not say.
    ///
    /// Interactive turns keep the session open; unattended runs close it.
    pub fn default_finished(&self) -> bool {
        !matches!(self, ResultSchema::Conversation)
    }
}

/// Normalized result of one agent invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOutcome {
    pub finished: bool,
    pub restart_requested: bool,
    pub skipped: bool,
    pub timed_out: bool,
    pub raw_output: String,
    pub continuation_token: Option<String>,
}

impl AgentOutcome {
    /// Outcome recorded when the process had to be killed: the turn counts as finished
    pub fn timed_out(raw_output: impl Into<String>) -> Self {
        Self {
            finished: true,
            restart_requested: false,
            skipped: false,
            timed_out: true,
            raw_output: raw_output.into(),
            continuation_token: None,
        }
    }
}

/// Keys tried, in order, before falling back to the envelope itself
const PAYLOAD_KEYS: [&str; 2] = ["structured_output", "result"];

/// Parse raw stdout from the agent into an [`AgentOutcome`].
///
/// Only a missing or non-object envelope is an error. Anything wrong inside the
/// payload degrades to the schema defaults.
pub fn normalize(
    raw_output: &str,
    schema: ResultSchema,
    resumed_token: Option<&str>,
) -> Result<AgentOutcome, AgentError> {
    let envelope: Value = serde_json::from_str(raw_output).map_err(|e| AgentError::Protocol {
        reason: e.to_string(),
        preview: preview(raw_output, 200),
    })?;
    let Value::Object(envelope) = envelope else {
        return Err(AgentError::Protocol {
            reason: "envelope is not a JSON object".to_string(),
            preview: preview(raw_output, 200),
        });
    };

    let payload = decode_payload(select_payload(&envelope));
    let flag = |key: &str, default: bool| {
        payload
            .as_ref()
            .and_then(|p| p.get(key))
            .and_then(Value::as_bool)
            .unwrap_or(default)
    };

    let continuation_token = envelope
        .get("session_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or(resumed_token)
        .map(str::to_string);

    Ok(AgentOutcome {
        finished: flag("conversation_finished", schema.default_finished()),
        restart_requested: flag("code_changes", false),
        skipped: flag("skipped", false),
        timed_out: false,
        raw_output: raw_output.to_string(),
        continuation_token,
    })
}

/// First non-empty nested payload, else the whole envelope
fn select_payload(envelope: &Map<String, Value>) -> Value {
    PAYLOAD_KEYS
        .iter()
        .filter_map(|key| envelope.get(*key))
        .find(|value| !is_empty_value(value))
        .cloned()
        .unwrap_or_else(|| Value::Object(envelope.clone()))
}

/// Objects pass through; strings are decoded as JSON; everything else yields nothing
fn decode_payload(payload: Value) -> Option<Map<String, Value>> {
    match payload {
        Value::Object(map) => Some(map),
        Value::String(text) if !text.trim().is_empty() => {
            match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => Some(map),
                Ok(_) | Err(_) => {
                    tracing::debug!(payload = %preview(&text, 100), "Result payload is not a JSON object");
                    None
                }
            }
        }
        _ => None,
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(_) => false,
    }
}

pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
