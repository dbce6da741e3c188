// ABOUTME: Unattended agent runs - cron-style scheduled tasks and proactive check-ins.
// ABOUTME: Both run without a session, with a 30 minute limit, and message the owner themselves.

use anyhow::Result;
use jarvis_core::{AgentError, AgentInvoker, AgentRequest, ResultSchema};

/// How a scheduled task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    /// The agent judged the task no longer relevant
    Skipped,
}

impl std::fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskOutcome::Completed => write!(f, "completed"),
            TaskOutcome::Skipped => write!(f, "skipped (no longer relevant based on context)"),
        }
    }
}

/// How a proactive check-in ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckInOutcome {
    /// The agent messaged the owner instead of staying silent
    pub conversation_started: bool,
}

pub fn task_prompt(name: &str, description: &str) -> String {
    format!(
        "Scheduled task: {name}\n\n{description}\n\n{}",
        SCHEDULED_TASK_RULES
    )
}

const SCHEDULED_TASK_RULES: &str = "\
RULES FOR SCHEDULED TASKS:
- Message the user only through the send-message skill
- Before writing anything, go through chat history, memories and news for context
- Stay in character as jarvis
- Set skipped to true when recent context makes the task irrelevant

CONTEXT CHECKS:
- Read at least the last 30 messages of chat history first
- For reminders, check whether the user already took care of it; if so skip or acknowledge it instead of reminding again
- Do not suggest an activity the user already did in the last day or two
- Every message must reflect what happened in the last 24 to 48 hours, never a generic one";

pub const CHECKIN_PROMPT: &str = "\
You are running the proactive-checkin skill. Follow its SKILL.md exactly.

FIRST, REACH OUT:
1. Read data/proactive-log.md for your recent activity
2. Read recent sessions in data/sessions/ to see what the user has been doing
3. Look up relevant memories as SKILL.md describes
4. Check the local time and never message between midnight and 8am
5. Decide whether anything is worth reaching out about
6. The user wants to hear from you more often, so lean toward messaging when you have something to say
7. Send through the send-message skill, like a friend texting; several short messages are fine

THEN, HOUSEKEEPING:
1. List memories and find duplicates, stale facts or entries to merge
2. Read .claude/CLAUDE.md and look for contradictions or redundancy
3. Make at most 2-3 memory cleanups and at most 1 instruction fix per run
4. Log the cleanup

Finally log your decision to data/proactive-log.md, keeping only the last 24 hours.

Report your decision through the structured response.";

/// Run one scheduled task.
///
/// A garbled result counts as completed; a failed or missing agent is an error.
pub async fn run_scheduled_task(
    invoker: &dyn AgentInvoker,
    name: &str,
    description: &str,
    recipient: Option<String>,
) -> Result<TaskOutcome> {
    let request = AgentRequest::unattended(task_prompt(name, description), ResultSchema::ScheduledTask)
        .with_recipient(recipient);

    tracing::info!(task = %name, "Running scheduled task");
    let outcome = match invoker.invoke(request).await {
        Ok(outcome) => outcome,
        Err(e @ AgentError::Protocol { .. }) => {
            tracing::warn!(task = %name, error = %e, "Unreadable task result, treating as completed");
            return Ok(TaskOutcome::Completed);
        }
        Err(e) => return Err(anyhow::Error::new(e).context(format!("Task '{}' failed", name))),
    };

    if outcome.timed_out {
        tracing::warn!(task = %name, "Scheduled task hit its time limit");
    }
    if outcome.skipped {
        Ok(TaskOutcome::Skipped)
    } else {
        Ok(TaskOutcome::Completed)
    }
}

/// Run one proactive check-in.
///
/// Only a missing claude binary is an error. Every other failure means the
/// agent stayed silent.
pub async fn run_checkin(
    invoker: &dyn AgentInvoker,
    recipient: Option<String>,
) -> Result<CheckInOutcome> {
    let request = AgentRequest::unattended(CHECKIN_PROMPT, ResultSchema::CheckIn)
        .with_recipient(recipient)
        .disallow("AskUserQuestion");

    tracing::info!("Running proactive check-in");
    let finished = match invoker.invoke(request).await {
        Ok(outcome) => {
            if outcome.timed_out {
                tracing::warn!("Check-in hit its time limit");
            }
            outcome.finished
        }
        Err(e @ AgentError::Unavailable { .. }) => return Err(e.into()),
        Err(e) => {
            tracing::warn!(error = %e, kind = e.kind(), "Check-in failed, treating as silent");
            true
        }
    };

    Ok(CheckInOutcome {
        conversation_started: !finished,
    })
}
