// ABOUTME: Per-user gates guaranteeing one agent turn in flight per user.
// ABOUTME: Messages arriving while busy are queued, then drained as one coalesced turn.
use crate::media::TempMedia;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// Header of a coalesced turn
pub const COALESCED_HEADER: &str = "[Messages received while you were working]\n";

/// One user input waiting for (or being given to) the agent
#[derive(Debug)]
pub struct PendingEntry {
    pub text: String,
    pub is_voice: bool,
    /// Owned image file; deleted once the entry is dropped after its turn
    pub image: Option<TempMedia>,
    pub quoted_text: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

impl PendingEntry {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_voice: false,
            image: None,
            quoted_text: None,
            enqueued_at: Utc::now(),
        }
    }

    pub fn voice(mut self, is_voice: bool) -> Self {
        self.is_voice = is_voice;
        self
    }

    pub fn with_image(mut self, image: Option<TempMedia>) -> Self {
        self.image = image;
        self
    }

    pub fn with_quoted(mut self, quoted_text: Option<String>) -> Self {
        self.quoted_text = quoted_text;
        self
    }

    pub fn at(mut self, enqueued_at: DateTime<Utc>) -> Self {
        self.enqueued_at = enqueued_at;
        self
    }

    pub fn image_path(&self) -> Option<PathBuf> {
        self.image.as_ref().map(|m| m.path().to_path_buf())
    }

    /// One line of a coalesced turn: `(HH:MM) <annotations><text>`
    fn coalesced_line(&self, tz: Tz) -> String {
        let mut line = format!("({}) ", self.enqueued_at.with_timezone(&tz).format("%H:%M"));
        if self.is_voice {
            line.push_str("[voice] ");
        }
        if let Some(path) = self.image_path() {
            line.push_str(&format!("[image: {}] ", path.display()));
        }
        if let Some(quoted) = &self.quoted_text {
            line.push_str(&format!("[replying to: \"{}\"] ", quoted));
        }
        line.push_str(&self.text);
        line
    }
}

/// What a gated task is asked to process
#[derive(Debug)]
pub enum TurnInput {
    /// The message that acquired the gate
    Single(PendingEntry),
    /// Everything queued during the previous turn, in arrival order
    Coalesced(Vec<PendingEntry>),
}

impl TurnInput {
    pub fn is_coalesced(&self) -> bool {
        matches!(self, TurnInput::Coalesced(_))
    }

    pub fn entries(&self) -> &[PendingEntry] {
        match self {
            TurnInput::Single(entry) => std::slice::from_ref(entry),
            TurnInput::Coalesced(entries) => entries,
        }
    }
}

/// Merge queued entries into one message body
pub fn coalesce(entries: &[PendingEntry], tz: Tz) -> String {
    let mut parts = vec![COALESCED_HEADER.to_string()];
    parts.extend(entries.iter().map(|e| e.coalesced_line(tz)));
    parts.join("\n")
}

#[derive(Debug)]
pub enum GateOutcome<R> {
    /// Gate was busy; the entry waits at this 1-based queue position
    Queued { position: usize },
    /// Gate was acquired; one result per turn run, the first being the caller's own
    Completed(Vec<R>),
}

#[derive(Default)]
struct UserSlot {
    busy: bool,
    pending: Vec<PendingEntry>,
}

struct Inner {
    slots: Mutex<HashMap<String, UserSlot>>,
    idle: Notify,
}

/// Process-wide registry of per-user gates and queues
#[derive(Clone)]
pub struct UserDispatcher {
    inner: Arc<Inner>,
}

impl Default for UserDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl UserDispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(HashMap::new()),
                idle: Notify::new(),
            }),
        }
    }

    /// Run `task` for `user` under their gate, or queue `entry` if the gate is held.
    ///
    /// The holder keeps the gate until a drain check finds the queue empty; every
    /// drained batch is passed to `task` as one [`TurnInput::Coalesced`]. Draining
    /// depends only on queue occupancy, so a failed turn does not strand entries.
    pub async fn with_user_gate<F, Fut, R>(
        &self,
        user: &str,
        entry: PendingEntry,
        mut task: F,
    ) -> GateOutcome<R>
    where
        F: FnMut(TurnInput) -> Fut,
        Fut: Future<Output = R>,
    {
        {
            let mut slots = self.lock();
            let slot = slots.entry(user.to_string()).or_default();
            if slot.busy {
                slot.pending.push(entry);
                let position = slot.pending.len();
                tracing::info!(user_id = %user, position, "Agent busy, message queued");
                return GateOutcome::Queued { position };
            }
            slot.busy = true;
        }

        let mut release = GateRelease {
            inner: &self.inner,
            user,
            armed: true,
        };

        let mut results = vec![task(TurnInput::Single(entry)).await];

        loop {
            let batch = {
                let mut slots = self.lock();
                match slots.get_mut(user) {
                    Some(slot) if !slot.pending.is_empty() => std::mem::take(&mut slot.pending),
                    _ => {
                        slots.remove(user);
                        release.armed = false;
                        break;
                    }
                }
            };
            tracing::info!(user_id = %user, count = batch.len(), "Draining queued messages");
            results.push(task(TurnInput::Coalesced(batch)).await);
        }

        self.inner.idle.notify_waiters();
        GateOutcome::Completed(results)
    }

    pub fn is_busy(&self, user: &str) -> bool {
        self.lock().get(user).map(|s| s.busy).unwrap_or(false)
    }

    pub fn pending_len(&self, user: &str) -> usize {
        self.lock().get(user).map(|s| s.pending.len()).unwrap_or(0)
    }

    /// Users with a live gate entry; idle users are evicted
    pub fn tracked_users(&self) -> usize {
        self.lock().len()
    }

    /// Resolve once no user's gate is held
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.lock().values().any(|s| s.busy) {
                return;
            }
            notified.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, UserSlot>> {
        lock_slots(&self.inner)
    }
}

// Slot state is plain data, so a poisoned lock is still consistent
fn lock_slots(inner: &Inner) -> MutexGuard<'_, HashMap<String, UserSlot>> {
    inner.slots.lock().unwrap_or_else(|e| e.into_inner())
}

/// Frees the gate if the holder panics or is cancelled mid-turn
struct GateRelease<'a> {
    inner: &'a Inner,
    user: &'a str,
    armed: bool,
}

impl Drop for GateRelease<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(slot) = lock_slots(self.inner).remove(self.user) {
            if !slot.pending.is_empty() {
                tracing::warn!(
                    user_id = %self.user,
                    dropped = slot.pending.len(),
                    "Gate holder aborted, queued messages discarded"
                );
            }
        }
        self.inner.idle.notify_waiters();
    }
}
