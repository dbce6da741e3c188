// ABOUTME: Durable message archive keyed by platform message id.
// ABOUTME: Resolves reply/reaction context and marks ids as already processed across restarts.
use crate::store::{self, Db};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::params;

/// Sender recorded for messages the assistant itself sent
pub const SYSTEM_SENDER: &str = "jarvis";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedMessage {
    pub id: String,
    pub content: String,
    pub sender: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct MessageArchive {
    db: Db,
}

impl MessageArchive {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Record a message once; a second store for the same id is ignored
    pub fn store(&self, id: &str, content: &str, sender: &str) -> Result<()> {
        self.store_at(id, content, sender, Utc::now())
    }

    pub fn store_at(
        &self,
        id: &str,
        content: &str,
        sender: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = store::lock(&self.db)?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO messages (id, content, sender, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, content, sender, timestamp(created_at)],
            )
            .context("Failed to archive message")?;
        if inserted == 0 {
            tracing::debug!(message_id = %id, "Message already archived, keeping original");
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<ArchivedMessage>> {
        let conn = store::lock(&self.db)?;
        let result = conn.query_row(
            "SELECT id, content, sender, created_at FROM messages WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        );

        match result {
            Ok((id, content, sender, created_at)) => {
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map(|t| t.with_timezone(&Utc))
                    .with_context(|| format!("Corrupt created_at for message {}", id))?;
                Ok(Some(ArchivedMessage {
                    id,
                    content,
                    sender,
                    created_at,
                }))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Content of an archived message, if any
    pub fn content_of(&self, id: &str) -> Result<Option<String>> {
        Ok(self.get(id)?.map(|m| m.content))
    }

    /// True once a message id has been archived, i.e. handled at least once
    pub fn is_processed(&self, id: &str) -> Result<bool> {
        let conn = store::lock(&self.db)?;
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM messages WHERE id = ?1)",
                params![id],
                |row| row.get(0),
            )
            .context("Failed to check archive")?;
        Ok(exists)
    }

    /// Delete messages older than `age`; returns how many were removed
    pub fn prune_older_than(&self, age: chrono::Duration) -> Result<usize> {
        let cutoff = timestamp(Utc::now() - age);
        let conn = store::lock(&self.db)?;
        let removed = conn
            .execute("DELETE FROM messages WHERE created_at < ?1", params![cutoff])
            .context("Failed to prune message archive")?;
        Ok(removed)
    }
}

/// Fixed-width UTC timestamps so text comparison matches time order
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
