// ABOUTME: Durable per-user continuation tokens with a 30 minute inactivity timeout.
// ABOUTME: Expiry is lazy: reading an expired session deletes it.
use crate::store::{self, Db};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::params;
use std::time::Duration;

/// A session idle for this long (or longer) no longer resumes
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub continuation_token: String,
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let idle = now.signed_duration_since(self.last_activity_at);
        // A clock step backwards counts as fresh activity
        match idle.to_std() {
            Ok(idle) => idle >= SESSION_TIMEOUT,
            Err(_) => false,
        }
    }
}

#[derive(Clone)]
pub struct SessionRegistry {
    db: Db,
}

impl SessionRegistry {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Continuation token for a user, if their session is still valid
    pub fn get(&self, user_id: &str) -> Result<Option<String>> {
        self.get_at(user_id, Utc::now())
    }

    pub fn get_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<Option<String>> {
        let Some(session) = self.load(user_id)? else {
            return Ok(None);
        };

        if session.is_expired_at(now) {
            tracing::info!(
                user_id = %user_id,
                last_activity = %session.last_activity_at,
                "Session expired, starting fresh"
            );
            self.delete(user_id)?;
            return Ok(None);
        }
        Ok(Some(session.continuation_token))
    }

    /// Record the outcome of a turn: finished conversations are forgotten
    pub fn update(&self, user_id: &str, token: &str, finished: bool) -> Result<()> {
        self.update_at(user_id, token, finished, Utc::now())
    }

    pub fn update_at(
        &self,
        user_id: &str,
        token: &str,
        finished: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if finished {
            tracing::debug!(user_id = %user_id, "Conversation finished, clearing session");
            return self.delete(user_id);
        }

        let conn = store::lock(&self.db)?;
        conn.execute(
            "INSERT INTO sessions (user_id, continuation_token, last_activity_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                continuation_token = excluded.continuation_token,
                last_activity_at = excluded.last_activity_at",
            params![
                user_id,
                token,
                now.to_rfc3339_opts(SecondsFormat::Millis, true)
            ],
        )
        .context("Failed to save session")?;
        Ok(())
    }

    pub fn delete(&self, user_id: &str) -> Result<()> {
        let conn = store::lock(&self.db)?;
        conn.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Raw stored row, ignoring expiry
    pub fn load(&self, user_id: &str) -> Result<Option<Session>> {
        let conn = store::lock(&self.db)?;
        let result = conn.query_row(
            "SELECT continuation_token, last_activity_at FROM sessions WHERE user_id = ?1",
            params![user_id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        );

        let (token, last_activity) = match result {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let last_activity_at = match DateTime::parse_from_rfc3339(&last_activity) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => {
                // Unreadable timestamp: treat as long expired
                tracing::warn!(user_id = %user_id, error = %e, "Corrupt session timestamp");
                DateTime::<Utc>::MIN_UTC
            }
        };

        Ok(Some(Session {
            user_id: user_id.to_string(),
            continuation_token: token,
            last_activity_at,
        }))
    }
}
