// ABOUTME: Tests for result normalization across the three payload shapes
// ABOUTME: Verifies defaults, continuation-token handling, and protocol errors

use jarvis_agent::schema::normalize;
use jarvis_agent::{AgentError, ResultSchema};

#[test]
fn test_inline_payload() {
    let raw = r#"{"session_id": "S1", "conversation_finished": false, "code_changes": true}"#;
    let outcome = normalize(raw, ResultSchema::Conversation, None).unwrap();
    assert!(!outcome.finished);
    assert!(outcome.restart_requested);
    assert_eq!(outcome.continuation_token.as_deref(), Some("S1"));
    assert_eq!(outcome.raw_output, raw);
}

#[test]
fn test_structured_output_payload() {
    let raw = r#"{"session_id": "S2", "structured_output": {"conversation_finished": true}}"#;
    let outcome = normalize(raw, ResultSchema::Conversation, None).unwrap();
    assert!(outcome.finished);
    assert!(!outcome.restart_requested);
    assert_eq!(outcome.continuation_token.as_deref(), Some("S2"));
}

#[test]
fn test_result_string_payload() {
    let raw = r#"{"session_id": "S3", "result": "{\"conversation_finished\": true, \"code_changes\": true}"}"#;
    let outcome = normalize(raw, ResultSchema::Conversation, None).unwrap();
    assert!(outcome.finished);
    assert!(outcome.restart_requested);
}

#[test]
fn test_plain_text_result_degrades_to_defaults() {
    let raw = r#"{"session_id": "S4", "result": "Sure, I sent the message."}"#;
    let outcome = normalize(raw, ResultSchema::Conversation, None).unwrap();
    assert!(!outcome.finished);
    assert!(!outcome.restart_requested);
    assert_eq!(outcome.continuation_token.as_deref(), Some("S4"));
}

#[test]
fn test_empty_result_string_uses_envelope() {
    // An empty "result" is skipped like any other empty value; the envelope has no flags
    let raw = r#"{"result": ""}"#;
    let outcome = normalize(raw, ResultSchema::Conversation, None).unwrap();
    assert!(!outcome.finished);
}

#[test]
fn test_unattended_schemas_default_to_finished() {
    let raw = r#"{"result": "not json"}"#;
    let task = normalize(raw, ResultSchema::ScheduledTask, None).unwrap();
    assert!(task.finished);
    assert!(!task.skipped);

    let checkin = normalize(raw, ResultSchema::CheckIn, None).unwrap();
    assert!(checkin.finished);
}

#[test]
fn test_skipped_flag_is_read() {
    let raw = r#"{"structured_output": {"conversation_finished": true, "skipped": true}}"#;
    let outcome = normalize(raw, ResultSchema::ScheduledTask, None).unwrap();
    assert!(outcome.skipped);
}

#[test]
fn test_missing_session_id_keeps_resumed_token() {
    let raw = r#"{"conversation_finished": false}"#;
    let outcome = normalize(raw, ResultSchema::Conversation, Some("S1")).unwrap();
    assert_eq!(outcome.continuation_token.as_deref(), Some("S1"));

    let fresh = normalize(raw, ResultSchema::Conversation, None).unwrap();
    assert!(fresh.continuation_token.is_none());
}

#[test]
fn test_non_json_output_is_protocol_error() {
    let err = normalize("Error: rate limited", ResultSchema::Conversation, None).unwrap_err();
    assert!(matches!(err, AgentError::Protocol { .. }));
    assert_eq!(err.kind(), "protocol");
}

#[test]
fn test_non_object_envelope_is_protocol_error() {
    let err = normalize("[1, 2, 3]", ResultSchema::Conversation, None).unwrap_err();
    assert!(matches!(err, AgentError::Protocol { .. }));
}
