// ABOUTME: Inbound message record produced by the transport.
// ABOUTME: Read-only to the pipeline; kind drives how the turn input is built.
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Voice,
    Image,
    Reaction,
    /// Platform type the assistant cannot handle (sticker, location, ...)
    Unsupported(String),
}

impl MessageKind {
    /// Map a platform message type; `audio` is a voice note
    pub fn from_platform(kind: &str) -> Self {
        match kind {
            "text" => MessageKind::Text,
            "audio" | "voice" => MessageKind::Voice,
            "image" => MessageKind::Image,
            "reaction" => MessageKind::Reaction,
            other => MessageKind::Unsupported(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Voice => "voice",
            MessageKind::Image => "image",
            MessageKind::Reaction => "reaction",
            MessageKind::Unsupported(kind) => kind,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Platform message id; may repeat on redelivery
    pub id: Option<String>,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub kind: MessageKind,
    pub text: Option<String>,
    /// Media handle for voice and image messages
    pub media_id: Option<String>,
    pub caption: Option<String>,
    /// Id of the message this one replies to
    pub quoted_id: Option<String>,
    pub reacted_id: Option<String>,
    pub reaction_emoji: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn text(id: impl Into<String>, sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            sender_id: sender_id.into(),
            sender_name: None,
            kind: MessageKind::Text,
            text: Some(text.into()),
            media_id: None,
            caption: None,
            quoted_id: None,
            reacted_id: None,
            reaction_emoji: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }

    pub fn with_media(mut self, media_id: impl Into<String>) -> Self {
        self.media_id = Some(media_id.into());
        self
    }

    pub fn replying_to(mut self, quoted_id: impl Into<String>) -> Self {
        self.quoted_id = Some(quoted_id.into());
        self
    }

    pub fn reacting(mut self, reacted_id: impl Into<String>, emoji: impl Into<String>) -> Self {
        self.kind = MessageKind::Reaction;
        self.reacted_id = Some(reacted_id.into());
        self.reaction_emoji = Some(emoji.into());
        self
    }

    /// Name recorded as the archive sender
    pub fn display_sender(&self) -> &str {
        self.sender_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.sender_id)
    }
}
