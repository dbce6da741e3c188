// ABOUTME: WhatsApp Cloud API client - sends text, downloads media, verifies webhooks.
// ABOUTME: Also maps raw webhook payloads onto InboundMessage.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use jarvis_core::config::WhatsAppConfig;
use jarvis_core::{InboundMessage, MediaBlob, MessageKind, Transport};
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::Duration;

const GRAPH_BASE_URL: &str = "https://graph.facebook.com";
const SIGNATURE_PREFIX: &str = "sha256=";

type HmacSha256 = Hmac<Sha256>;

pub struct WhatsAppClient {
    http: reqwest::Client,
    config: WhatsAppConfig,
    base_url: String,
}

impl WhatsAppClient {
    pub fn new(config: WhatsAppConfig) -> Result<Self> {
        Self::with_base_url(config, GRAPH_BASE_URL)
    }

    /// Point the client at another Graph API host (used by tests)
    pub fn with_base_url(config: WhatsAppConfig, base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            config,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.config.api_version, path)
    }

    /// Meta subscription handshake; returns the challenge to echo on success
    pub fn verify_webhook(&self, mode: &str, token: &str, challenge: &str) -> Option<String> {
        verify_subscription(&self.config.verify_token, mode, token, challenge)
    }

    /// Check `X-Hub-Signature-256`; always passes when no app secret is configured
    pub fn verify_signature(&self, body: &[u8], header: &str) -> bool {
        match self.config.app_secret.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => verify_signature(secret, body, header),
            None => true,
        }
    }
}

pub fn verify_subscription(
    expected_token: &str,
    mode: &str,
    token: &str,
    challenge: &str,
) -> Option<String> {
    if mode == "subscribe" && !expected_token.is_empty() && token == expected_token {
        Some(challenge.to_string())
    } else {
        None
    }
}

/// Constant-time HMAC-SHA256 check of a `sha256=<hex>` signature header
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let Some(hex_sig) = header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Signature header value for a body, as Meta computes it
pub fn sign(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid HMAC key: {}", e))?;
    mac.update(body);
    Ok(format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Extract the first user message from a webhook delivery.
///
/// Status callbacks and malformed deliveries yield `None`.
pub fn parse_webhook_message(payload: &Value) -> Option<InboundMessage> {
    let value = payload
        .get("entry")?
        .get(0)?
        .get("changes")?
        .get(0)?
        .get("value")?;
    let message = value.get("messages")?.get(0)?;

    let sender_id = str_at(message, &["from"])?;
    let kind_name = str_at(message, &["type"]).unwrap_or_default();
    let kind = MessageKind::from_platform(&kind_name);

    let sender_name = value
        .get("contacts")
        .and_then(|c| c.get(0))
        .and_then(|c| str_at(c, &["profile", "name"]));

    let mut inbound = InboundMessage {
        id: str_at(message, &["id"]),
        sender_id,
        sender_name,
        kind: kind.clone(),
        text: None,
        media_id: None,
        caption: None,
        quoted_id: str_at(message, &["context", "id"]),
        reacted_id: None,
        reaction_emoji: None,
        received_at: Utc::now(),
    };

    match kind {
        MessageKind::Text => inbound.text = str_at(message, &["text", "body"]),
        // "audio" and "voice" both carry the handle under their own key
        MessageKind::Voice => inbound.media_id = str_at(message, &[kind_name.as_str(), "id"]),
        MessageKind::Image => {
            inbound.media_id = str_at(message, &["image", "id"]);
            inbound.caption = str_at(message, &["image", "caption"]);
        }
        MessageKind::Reaction => {
            inbound.reacted_id = str_at(message, &["reaction", "message_id"]);
            inbound.reaction_emoji = str_at(message, &["reaction", "emoji"]);
        }
        MessageKind::Unsupported(_) => {}
    }

    Some(inbound)
}

/// Non-empty string at a nested key path
fn str_at(value: &Value, path: &[&str]) -> Option<String> {
    path.iter()
        .try_fold(value, |v, key| v.get(*key))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl Transport for WhatsAppClient {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<String> {
        let url = self.api_url(&format!("{}/messages", self.config.phone_number_id));
        let body = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": recipient,
            "type": "text",
            "text": { "preview_url": false, "body": text },
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await
            .context("Failed to reach WhatsApp API")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("WhatsApp send failed ({}): {}", status, detail);
        }

        let reply: Value = response
            .json()
            .await
            .context("WhatsApp send returned invalid JSON")?;
        let message_id = reply
            .get("messages")
            .and_then(|m| m.get(0))
            .and_then(|m| str_at(m, &["id"]))
            .context("WhatsApp send response has no message id")?;

        tracing::debug!(recipient = %recipient, message_id = %message_id, "WhatsApp message sent");
        Ok(message_id)
    }

    async fn download_media(&self, media_id: &str) -> Result<MediaBlob> {
        let metadata: Value = self
            .http
            .get(self.api_url(media_id))
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .context("Failed to reach WhatsApp API")?
            .error_for_status()
            .with_context(|| format!("Media lookup failed for {}", media_id))?
            .json()
            .await
            .context("Media metadata is not valid JSON")?;

        let media_url = str_at(&metadata, &["url"])
            .with_context(|| format!("Media {} has no download URL", media_id))?;
        let mime_type = str_at(&metadata, &["mime_type"]);

        let response = self
            .http
            .get(&media_url)
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .context("Failed to download media")?
            .error_for_status()
            .with_context(|| format!("Media download failed for {}", media_id))?;

        let header_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.context("Failed to read media body")?;

        Ok(MediaBlob {
            bytes: bytes.to_vec(),
            content_type: mime_type
                .or(header_type)
                .unwrap_or_else(|| "application/octet-stream".to_string()),
        })
    }
}
