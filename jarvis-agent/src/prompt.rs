// ABOUTME: Builds the context-annotated prompt for an interactive turn.
// ABOUTME: Adds platform, user, local time, voice/image/reply annotations ahead of the message.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::path::PathBuf;

/// Everything about a turn besides the message body
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub platform: String,
    pub user_name: Option<String>,
    pub timezone: Tz,
    pub is_voice: bool,
    pub image_paths: Vec<PathBuf>,
    pub quoted_text: Option<String>,
}

impl PromptContext {
    pub fn new(platform: impl Into<String>, timezone: Tz) -> Self {
        Self {
            platform: platform.into(),
            user_name: None,
            timezone,
            is_voice: false,
            image_paths: Vec::new(),
            quoted_text: None,
        }
    }
}

pub fn build_prompt(ctx: &PromptContext, message: &str) -> String {
    build_prompt_at(ctx, message, Utc::now())
}

pub fn build_prompt_at(ctx: &PromptContext, message: &str, now: DateTime<Utc>) -> String {
    let local = now.with_timezone(&ctx.timezone);

    let mut parts = vec![format!("[Platform: {}]", ctx.platform)];
    if let Some(name) = ctx.user_name.as_deref().filter(|n| !n.is_empty()) {
        parts.push(format!("[User: {}]", name));
    }
    parts.push(format!(
        "[Local time ({}): {}]",
        ctx.timezone.name(),
        local.format("%Y-%m-%d %H:%M (%A)")
    ));
    if ctx.is_voice {
        parts.push("[Voice message transcription]".to_string());
    }
    for path in &ctx.image_paths {
        parts.push(format!(
            "[Image attached - use Read tool to view: {}]",
            path.display()
        ));
    }
    if let Some(quoted) = &ctx.quoted_text {
        parts.push(format!("[Replying to: {}]", quoted));
    }
    parts.push(format!("\nMessage: {}", message));

    parts.join("\n")
}
