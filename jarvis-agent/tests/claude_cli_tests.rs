// ABOUTME: Process-level tests for the Claude CLI backend using fake shell-script binaries.
// ABOUTME: Covers success, resume arguments, environment, non-zero exit, timeout, and discovery.

#![cfg(unix)]

use jarvis_agent::backends::claude_cli::{ClaudeCliConfig, ClaudeCliInvoker};
use jarvis_agent::{AgentError, AgentInvoker, AgentRequest, ResultSchema};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

fn fake_claude(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("claude");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn invoker_for(dir: &TempDir, binary: &Path) -> ClaudeCliInvoker {
    ClaudeCliInvoker::new(ClaudeCliConfig {
        binary: Some(binary.display().to_string()),
        working_dir: dir.path().to_path_buf(),
    })
}

#[test]
fn test_claude_cli_config_deserializes() {
    let json = serde_json::json!({ "working_dir": "/srv/jarvis" });
    let config: ClaudeCliConfig = serde_json::from_value(json).unwrap();
    assert!(config.binary.is_none());
    assert_eq!(config.working_dir, PathBuf::from("/srv/jarvis"));
}

#[tokio::test]
async fn test_successful_turn_is_normalized() {
    let dir = TempDir::new().unwrap();
    let binary = fake_claude(
        dir.path(),
        r#"echo '{"session_id": "S1", "structured_output": {"conversation_finished": false, "code_changes": true}}'"#,
    );
    let invoker = invoker_for(&dir, &binary);
    assert_eq!(invoker.name(), "claude-cli");

    let outcome = invoker
        .invoke(AgentRequest::conversation("hello", "15550001111"))
        .await
        .unwrap();
    assert!(!outcome.finished);
    assert!(outcome.restart_requested);
    assert!(!outcome.timed_out);
    assert_eq!(outcome.continuation_token.as_deref(), Some("S1"));
}

#[tokio::test]
async fn test_arguments_include_resume_token() {
    let dir = TempDir::new().unwrap();
    let args_file = dir.path().join("args.txt");
    let binary = fake_claude(
        dir.path(),
        &format!(
            "for a in \"$@\"; do echo \"$a\" >> {}; done\necho '{{\"result\": \"\"}}'",
            args_file.display()
        ),
    );
    let invoker = invoker_for(&dir, &binary);

    let request =
        AgentRequest::conversation("what's up", "u1").with_resume(Some("S9".to_string()));
    let outcome = invoker.invoke(request).await.unwrap();
    // No session_id in the envelope: the resumed token carries over
    assert_eq!(outcome.continuation_token.as_deref(), Some("S9"));

    let args = std::fs::read_to_string(&args_file).unwrap();
    let lines: Vec<&str> = args.lines().collect();
    assert_eq!(lines[0], "-p");
    assert_eq!(lines[1], "what's up");
    assert!(lines.contains(&"--permission-mode"));
    assert!(lines.contains(&"bypassPermissions"));
    assert!(lines.contains(&"Bash(rm -rf*)"));
    assert_eq!(&lines[lines.len() - 2..], &["--resume", "S9"]);
}

#[tokio::test]
async fn test_recipient_and_quiet_traffic_are_exported() {
    let dir = TempDir::new().unwrap();
    let binary = fake_claude(
        dir.path(),
        r#"echo "{\"session_id\": \"$JARVIS_CHAT_RECIPIENT-$CLAUDE_CODE_DISABLE_NONESSENTIAL_TRAFFIC\"}""#,
    );
    let invoker = invoker_for(&dir, &binary);

    let outcome = invoker
        .invoke(AgentRequest::conversation("hi", "15550001111"))
        .await
        .unwrap();
    assert_eq!(
        outcome.continuation_token.as_deref(),
        Some("15550001111-1")
    );
}

#[tokio::test]
async fn test_non_zero_exit_is_execution_error() {
    let dir = TempDir::new().unwrap();
    let binary = fake_claude(dir.path(), "echo 'rate limited' >&2\nexit 3");
    let invoker = invoker_for(&dir, &binary);

    let err = invoker
        .invoke(AgentRequest::conversation("hi", "u1"))
        .await
        .unwrap_err();
    match &err {
        AgentError::Execution { code, stderr } => {
            assert_eq!(*code, Some(3));
            assert!(stderr.contains("rate limited"));
        }
        other => panic!("expected execution error, got {other:?}"),
    }
    assert!(err.is_execution());
}

#[tokio::test]
async fn test_silent_failure_reports_unknown_error() {
    let dir = TempDir::new().unwrap();
    let binary = fake_claude(dir.path(), "exit 1");
    let invoker = invoker_for(&dir, &binary);

    let err = invoker
        .invoke(AgentRequest::conversation("hi", "u1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Execution { ref stderr, .. } if stderr == "Unknown error"));
}

#[tokio::test]
async fn test_garbage_output_is_protocol_error() {
    let dir = TempDir::new().unwrap();
    let binary = fake_claude(dir.path(), "echo 'not json at all'");
    let invoker = invoker_for(&dir, &binary);

    let err = invoker
        .invoke(AgentRequest::conversation("hi", "u1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "protocol");
}

#[tokio::test]
async fn test_timeout_yields_finished_outcome() {
    let dir = TempDir::new().unwrap();
    let binary = fake_claude(dir.path(), "sleep 30\necho '{}'");
    let invoker = invoker_for(&dir, &binary);

    let request = AgentRequest::unattended("daily summary", ResultSchema::ScheduledTask)
        .with_timeout(Some(Duration::from_millis(200)));
    let outcome = invoker.invoke(request).await.unwrap();
    assert!(outcome.timed_out);
    assert!(outcome.finished);
    assert!(outcome.continuation_token.is_none());
}

#[tokio::test]
async fn test_missing_binary_is_unavailable() {
    if jarvis_agent::locate::find_claude_cli(None).is_some() {
        // A real install would be picked up as a fallback
        return;
    }
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("no-such-claude");
    let invoker = invoker_for(&dir, &missing);

    let err = invoker
        .invoke(AgentRequest::conversation("hi", "u1"))
        .await
        .unwrap_err();
    match err {
        AgentError::Unavailable { searched } => {
            assert_eq!(searched[0], missing.display().to_string());
        }
        other => panic!("expected unavailable, got {other:?}"),
    }
}
