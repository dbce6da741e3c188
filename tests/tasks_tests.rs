// ABOUTME: Tests for scheduled task and proactive check-in runners.
// ABOUTME: Uses the scripted mock invoker to cover success, skip and every failure class.

use jarvis::tasks::{run_checkin, run_scheduled_task, task_prompt, TaskOutcome};
use jarvis_agent::backends::mock::{outcome, MockInvoker};
use jarvis_agent::request::UNATTENDED_TIMEOUT;
use jarvis_core::{AgentError, AgentOutcome, ResultSchema};

fn skipped() -> AgentOutcome {
    AgentOutcome {
        skipped: true,
        ..outcome(true, None)
    }
}

#[test]
fn task_prompt_leads_with_name_and_description() {
    let prompt = task_prompt("laundry", "Remind the user to take out the laundry");
    assert!(prompt.starts_with("Scheduled task: laundry\n\nRemind the user to take out the laundry\n\n"));
    assert!(prompt.contains("send-message skill"));
    assert!(prompt.contains("skipped"));
}

#[tokio::test]
async fn scheduled_task_runs_unattended() {
    let mock = MockInvoker::new().then_reply(outcome(true, Some("S1")));

    let result = run_scheduled_task(
        &mock,
        "laundry",
        "Remind the user",
        Some("15550001111".to_string()),
    )
    .await
    .unwrap();
    assert_eq!(result, TaskOutcome::Completed);

    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.schema, ResultSchema::ScheduledTask);
    assert_eq!(request.timeout, Some(UNATTENDED_TIMEOUT));
    assert_eq!(request.recipient.as_deref(), Some("15550001111"));
    assert!(request.resume.is_none());
    assert!(request.prompt.starts_with("Scheduled task: laundry"));
}

#[tokio::test]
async fn scheduled_task_reports_skip() {
    let mock = MockInvoker::new().then_reply(skipped());
    let result = run_scheduled_task(&mock, "run", "Suggest a run", None)
        .await
        .unwrap();
    assert_eq!(result, TaskOutcome::Skipped);
    assert_eq!(
        result.to_string(),
        "skipped (no longer relevant based on context)"
    );
}

#[tokio::test]
async fn scheduled_task_garbled_output_counts_as_completed() {
    let mock = MockInvoker::new().then_fail(AgentError::Protocol {
        reason: "expected value".to_string(),
        preview: "oops".to_string(),
    });
    let result = run_scheduled_task(&mock, "news", "Morning news", None)
        .await
        .unwrap();
    assert_eq!(result, TaskOutcome::Completed);
}

#[tokio::test]
async fn scheduled_task_failure_is_an_error() {
    let mock = MockInvoker::new().then_fail(AgentError::Execution {
        code: Some(1),
        stderr: "boom".to_string(),
    });
    let err = run_scheduled_task(&mock, "news", "Morning news", None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Task 'news' failed"));
}

#[tokio::test]
async fn checkin_forbids_interactive_questions() {
    let mock = MockInvoker::new().then_reply(outcome(false, None));

    let result = run_checkin(&mock, Some("15550001111".to_string()))
        .await
        .unwrap();
    assert!(result.conversation_started);

    let request = &mock.requests()[0];
    assert_eq!(request.schema, ResultSchema::CheckIn);
    assert_eq!(request.timeout, Some(UNATTENDED_TIMEOUT));
    assert_eq!(request.recipient.as_deref(), Some("15550001111"));
    let tools = request.disallowed_tools();
    assert!(tools.iter().any(|t| t == "AskUserQuestion"));
    assert!(tools.iter().any(|t| t == "Bash(rm -rf*)"));
}

#[tokio::test]
async fn checkin_silence_when_finished() {
    let mock = MockInvoker::new().then_reply(outcome(true, None));
    let result = run_checkin(&mock, None).await.unwrap();
    assert!(!result.conversation_started);
}

#[tokio::test]
async fn checkin_failures_degrade_to_silence() {
    let mock = MockInvoker::new()
        .then_fail(AgentError::Execution {
            code: Some(2),
            stderr: "crashed".to_string(),
        })
        .then_fail(AgentError::Protocol {
            reason: "eof".to_string(),
            preview: String::new(),
        });

    for _ in 0..2 {
        let result = run_checkin(&mock, None).await.unwrap();
        assert!(!result.conversation_started);
    }
}

#[tokio::test]
async fn checkin_without_claude_is_an_error() {
    let mock = MockInvoker::new().then_fail(AgentError::Unavailable {
        searched: vec!["/usr/local/bin/claude".to_string()],
    });
    assert!(run_checkin(&mock, None).await.is_err());
}
