// ABOUTME: Dispatch loop tying admission, context lookup, per-user gates and the agent together
// ABOUTME: Every failure for one message ends here as a log line and, at most, an apology
use crate::{
    admission::{Admission, AdmissionFilter},
    archive::MessageArchive,
    dispatcher::{coalesce, GateOutcome, PendingEntry, TurnInput, UserDispatcher},
    media::{image_extension, TempMedia},
    message::{InboundMessage, MessageKind},
    metrics, outbound,
    restart::RestartSignal,
    session::SessionRegistry,
    traits::{Transcriber, Transport},
};
use anyhow::{Context, Result};
use chrono_tz::Tz;
use jarvis_agent::prompt::{build_prompt, PromptContext};
use jarvis_agent::{AgentInvoker, AgentRequest};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

pub const UNSUPPORTED_APOLOGY: &str =
    "sorry, i can only handle text, voice and image messages right now";
pub const FAILURE_APOLOGY: &str =
    "oops, something went wrong on my end. give me a sec and try again?";
pub const DEFAULT_IMAGE_PROMPT: &str = "what do you see in this image?";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Platform named in every prompt
    pub platform: String,
    /// Reference timezone for prompts and queued-message timestamps
    pub timezone: Tz,
    /// Wall-clock limit for interactive turns; None leaves them unbounded
    pub turn_timeout: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            platform: "WhatsApp".to_string(),
            timezone: chrono_tz::Europe::Vienna,
            turn_timeout: None,
        }
    }
}

/// Result of handling one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleResult {
    /// Rejected by admission; nothing was done
    Duplicate,
    /// Kind the assistant cannot handle; the user was told so
    Unsupported,
    /// Another turn for this user was running; the message joined its queue
    Queued { position: usize },
    /// This message held the gate for `turns` agent calls (itself plus drained batches)
    Completed { turns: usize, restart_requested: bool },
    /// The input could not be prepared (media download or transcription)
    Failed,
}

/// What one gated turn reported back
#[derive(Debug, Clone, Copy, Default)]
struct TurnReport {
    restart_requested: bool,
}

/// Everything the dispatch loop needs, shared by all messages
pub struct Orchestrator {
    transport: Arc<dyn Transport>,
    transcriber: Arc<dyn Transcriber>,
    invoker: Arc<dyn AgentInvoker>,
    archive: MessageArchive,
    sessions: SessionRegistry,
    admission: AdmissionFilter,
    dispatcher: UserDispatcher,
    restart: RestartSignal,
    config: OrchestratorConfig,
    tasks: TaskTracker,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Arc<dyn Transport>,
        transcriber: Arc<dyn Transcriber>,
        invoker: Arc<dyn AgentInvoker>,
        archive: MessageArchive,
        sessions: SessionRegistry,
        dispatcher: UserDispatcher,
        restart: RestartSignal,
        config: OrchestratorConfig,
    ) -> Self {
        let admission = AdmissionFilter::new(archive.clone());
        Self {
            transport,
            transcriber,
            invoker,
            archive,
            sessions,
            admission,
            dispatcher,
            restart,
            config,
            tasks: TaskTracker::new(),
        }
    }

    pub fn dispatcher(&self) -> &UserDispatcher {
        &self.dispatcher
    }

    pub fn admission(&self) -> &AdmissionFilter {
        &self.admission
    }

    /// Handle a message on a background task that `drain` will wait for.
    ///
    /// The task is tracked from the moment it is spawned, so a message still
    /// downloading or transcribing counts as in flight before it reaches a gate.
    pub fn spawn_handle(self: &Arc<Self>, msg: InboundMessage) -> JoinHandle<()> {
        let this = Arc::clone(self);
        self.tasks.spawn(async move {
            if let Err(e) = this.handle(msg).await {
                tracing::error!(error = %e, "Message handling failed");
            }
        })
    }

    /// Wait for every spawned message task and every held gate to finish.
    pub async fn drain(&self) {
        self.tasks.close();
        tracing::debug!(pending = self.tasks.len(), "Draining message tasks");
        self.tasks.wait().await;
        self.dispatcher.wait_idle().await;
    }

    /// Handle one inbound message end to end.
    ///
    /// Errors never escape for a single message: they are logged and the user
    /// gets an apology. The `Result` only reports bugs in the pipeline itself.
    pub async fn handle(&self, msg: InboundMessage) -> Result<HandleResult> {
        metrics::record_message_received(msg.kind.as_str());

        let _admission = match self.admission.try_admit(msg.id.as_deref()) {
            Admission::Admitted(guard) => guard,
            Admission::Duplicate(reason) => {
                tracing::info!(
                    message_id = ?msg.id,
                    reason = reason.as_str(),
                    "Skipping duplicate message"
                );
                metrics::record_duplicate(reason.as_str());
                return Ok(HandleResult::Duplicate);
            }
        };

        let user = msg.sender_id.as_str();
        let quoted_text = msg.quoted_id.as_deref().and_then(|id| self.lookup(id));
        if let Some(quoted) = &quoted_text {
            tracing::debug!(user_id = %user, quoted = %preview(quoted), "Message is a reply");
        }

        let entry = match self.prepare_entry(&msg, quoted_text).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::warn!(user_id = %user, kind = msg.kind.as_str(), "Unsupported message type");
                self.apologize(user, UNSUPPORTED_APOLOGY).await;
                return Ok(HandleResult::Unsupported);
            }
            Err(e) => {
                tracing::error!(user_id = %user, error = ?e, "Failed to prepare message input");
                metrics::record_error("input");
                self.apologize(user, FAILURE_APOLOGY).await;
                return Ok(HandleResult::Failed);
            }
        };

        if let Some(id) = &msg.id {
            if let Err(e) = self.archive.store(id, &entry.text, msg.display_sender()) {
                tracing::warn!(message_id = %id, error = %e, "Failed to archive inbound message");
            }
        }

        let user_name = msg.sender_name.as_deref();
        let outcome = self
            .dispatcher
            .with_user_gate(user, entry, |input| self.run_turn(user, user_name, input))
            .await;

        match outcome {
            GateOutcome::Queued { position } => {
                metrics::record_message_queued();
                Ok(HandleResult::Queued { position })
            }
            GateOutcome::Completed(reports) => {
                let restart_requested = reports.iter().any(|r| r.restart_requested);
                if restart_requested {
                    tracing::info!(user_id = %user, "Agent changed code, requesting restart");
                    self.restart.request();
                }
                Ok(HandleResult::Completed {
                    turns: reports.len(),
                    restart_requested,
                })
            }
        }
    }

    /// Turn an inbound message into a queue entry; None means unsupported
    async fn prepare_entry(
        &self,
        msg: &InboundMessage,
        quoted_text: Option<String>,
    ) -> Result<Option<PendingEntry>> {
        let entry = match &msg.kind {
            MessageKind::Reaction if has_text(&msg.reaction_emoji) => {
                let emoji = msg.reaction_emoji.as_deref().unwrap_or_default();
                let reacted = msg.reacted_id.as_deref().and_then(|id| self.lookup(id));
                let text = match reacted {
                    Some(content) => format!("[reacted with {} to: \"{}\"]", emoji, content),
                    None => format!("[reacted with {}]", emoji),
                };
                PendingEntry::new(text)
            }
            MessageKind::Voice if has_text(&msg.media_id) => {
                let media_id = msg.media_id.as_deref().unwrap_or_default();
                let audio = self
                    .transport
                    .download_media(media_id)
                    .await
                    .context("Failed to download voice message")?;
                let text = self
                    .transcriber
                    .transcribe(audio)
                    .await
                    .context("Failed to transcribe voice message")?;
                tracing::info!(transcript = %preview(&text), "Transcribed voice message");
                PendingEntry::new(text).voice(true)
            }
            MessageKind::Image if has_text(&msg.media_id) => {
                let media_id = msg.media_id.as_deref().unwrap_or_default();
                let blob = self
                    .transport
                    .download_media(media_id)
                    .await
                    .context("Failed to download image")?;
                let image = TempMedia::write(&blob.bytes, image_extension(&blob.content_type))?;
                tracing::info!(path = %image.path().display(), "Saved image");
                let text = msg
                    .caption
                    .clone()
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| DEFAULT_IMAGE_PROMPT.to_string());
                PendingEntry::new(text).with_image(Some(image))
            }
            _ if has_text(&msg.text) => PendingEntry::new(msg.text.clone().unwrap_or_default()),
            _ => return Ok(None),
        };
        Ok(Some(entry.with_quoted(quoted_text)))
    }

    /// One agent call under the user's gate. Failures are absorbed here so
    /// the drain loop keeps going.
    async fn run_turn(&self, user: &str, user_name: Option<&str>, input: TurnInput) -> TurnReport {
        let mut ctx = PromptContext::new(self.config.platform.clone(), self.config.timezone);
        ctx.user_name = user_name.map(str::to_string);

        let body = match &input {
            TurnInput::Single(entry) => {
                ctx.is_voice = entry.is_voice;
                ctx.image_paths = entry.image_path().into_iter().collect();
                ctx.quoted_text = entry.quoted_text.clone();
                entry.text.clone()
            }
            TurnInput::Coalesced(entries) => {
                tracing::info!(user_id = %user, count = entries.len(), "Running coalesced turn");
                ctx.image_paths = entries.iter().filter_map(|e| e.image_path()).collect();
                ctx.is_voice = entries.iter().all(|e| e.is_voice);
                coalesce(entries, self.config.timezone)
            }
        };

        let resume = self.sessions.get(user).unwrap_or_else(|e| {
            tracing::warn!(user_id = %user, error = %e, "Session lookup failed, starting fresh");
            None
        });
        let request = AgentRequest::conversation(build_prompt(&ctx, &body), user)
            .with_resume(resume)
            .with_timeout(self.config.turn_timeout);

        tracing::info!(user_id = %user, message = %preview(&body), "Running agent turn");
        let started = Instant::now();
        let result = self.invoker.invoke(request).await;
        let elapsed = started.elapsed().as_secs_f64();

        // Media for this turn is no longer needed, whatever happened
        drop(input);

        match result {
            Ok(outcome) => {
                metrics::record_agent_invocation(
                    if outcome.timed_out { "timed_out" } else { "completed" },
                    elapsed,
                );
                if outcome.timed_out {
                    tracing::warn!(user_id = %user, "Agent turn timed out, treating as finished");
                }

                let saved = match &outcome.continuation_token {
                    Some(token) => self.sessions.update(user, token, outcome.finished),
                    None if outcome.finished => self.sessions.delete(user),
                    None => Ok(()),
                };
                if let Err(e) = saved {
                    tracing::warn!(user_id = %user, error = %e, "Failed to save session");
                }

                TurnReport {
                    restart_requested: outcome.restart_requested,
                }
            }
            Err(e) => {
                tracing::error!(
                    user_id = %user,
                    kind = e.kind(),
                    error = %e,
                    elapsed_secs = elapsed,
                    "Agent turn failed"
                );
                metrics::record_agent_invocation(e.kind(), elapsed);
                self.apologize(user, FAILURE_APOLOGY).await;
                TurnReport::default()
            }
        }
    }

    /// Archived content for a referenced message; lookup failures read as "not found"
    fn lookup(&self, id: &str) -> Option<String> {
        match self.archive.content_of(id) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(message_id = %id, error = %e, "Archive lookup failed");
                None
            }
        }
    }

    async fn apologize(&self, user: &str, text: &str) {
        if let Err(e) =
            outbound::send_archived(self.transport.as_ref(), &self.archive, user, text).await
        {
            tracing::error!(user_id = %user, error = %e, "Failed to send error message");
            metrics::record_error("send");
        }
    }
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}
