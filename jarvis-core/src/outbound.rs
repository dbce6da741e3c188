// ABOUTME: Sends a message and archives it under the id the platform returned.
// ABOUTME: Keeps replies and reactions to the assistant's own messages resolvable.
use crate::archive::{MessageArchive, SYSTEM_SENDER};
use crate::metrics;
use crate::traits::Transport;
use anyhow::Result;

pub async fn send_archived(
    transport: &dyn Transport,
    archive: &MessageArchive,
    recipient: &str,
    text: &str,
) -> Result<String> {
    let message_id = transport.send_text(recipient, text).await?;
    metrics::record_message_sent();

    // The message is already out; an archive failure only costs reply context
    if let Err(e) = archive.store(&message_id, text, SYSTEM_SENDER) {
        tracing::warn!(message_id = %message_id, error = %e, "Failed to archive outbound message");
    }
    Ok(message_id)
}
