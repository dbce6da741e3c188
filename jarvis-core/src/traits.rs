// ABOUTME: Collaborator traits the pipeline calls out to.
// ABOUTME: Transport sends and downloads; Transcriber turns voice notes into text.

use anyhow::Result;
use async_trait::async_trait;

/// Downloaded media bytes plus the content type the platform reported
#[derive(Debug, Clone)]
pub struct MediaBlob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Messaging platform the assistant talks through
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a text message; returns the platform id of the sent message
    async fn send_text(&self, recipient: &str, text: &str) -> Result<String>;

    /// Fetch a media attachment by its platform handle
    async fn download_media(&self, media_id: &str) -> Result<MediaBlob>;
}

/// Speech-to-text for voice notes
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: MediaBlob) -> Result<String>;
}
