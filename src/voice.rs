// ABOUTME: Voice-note transcription through the OpenAI audio transcription endpoint.
// ABOUTME: Uploads the downloaded bytes as a multipart file named after their content type.

use anyhow::{Context, Result};
use async_trait::async_trait;
use jarvis_core::config::OpenAiConfig;
use jarvis_core::{MediaBlob, Transcriber};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// File extension OpenAI should see for an audio content type
pub fn audio_extension(content_type: &str) -> &'static str {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    match essence {
        "audio/mpeg" => ".mp3",
        "audio/mp4" => ".m4a",
        "audio/wav" => ".wav",
        "audio/webm" => ".webm",
        _ => ".ogg",
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

pub struct OpenAiTranscriber {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl OpenAiTranscriber {
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        Self::with_base_url(config, OPENAI_BASE_URL)
    }

    pub fn with_base_url(config: &OpenAiConfig, base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            model: config.transcription_model.clone(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(&self, audio: MediaBlob) -> Result<String> {
        // Checked per call so the server still starts without voice support
        let api_key = self
            .api_key
            .as_deref()
            .context("openai.api_key is required for voice messages (OPENAI_API_KEY)")?;

        let filename = format!("voice{}", audio_extension(&audio.content_type));
        let size = audio.bytes.len();
        let file = Part::bytes(audio.bytes)
            .file_name(filename)
            .mime_str(&audio.content_type)
            .context("Invalid audio content type")?;
        let form = Form::new()
            .text("model", self.model.clone())
            .part("file", file);

        let response = self
            .http
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .context("Failed to reach OpenAI")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("Transcription failed ({}): {}", status, detail);
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .context("Transcription response is not valid JSON")?;
        tracing::info!(bytes = size, chars = body.text.len(), "Voice note transcribed");
        Ok(body.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_audio_types_map_to_extensions() {
        assert_eq!(audio_extension("audio/mpeg"), ".mp3");
        assert_eq!(audio_extension("audio/mp4"), ".m4a");
        assert_eq!(audio_extension("audio/wav"), ".wav");
        assert_eq!(audio_extension("audio/webm"), ".webm");
        assert_eq!(audio_extension("audio/ogg"), ".ogg");
    }

    #[test]
    fn codec_parameters_are_ignored() {
        assert_eq!(audio_extension("audio/ogg; codecs=opus"), ".ogg");
        assert_eq!(audio_extension("audio/mpeg; charset=binary"), ".mp3");
    }

    #[test]
    fn unknown_types_default_to_ogg() {
        assert_eq!(audio_extension("application/octet-stream"), ".ogg");
        assert_eq!(audio_extension(""), ".ogg");
    }
}
