// ABOUTME: Admission filter rejecting duplicate webhook deliveries.
// ABOUTME: In-flight ids live in memory; the archive catches ids handled before a restart.
use crate::archive::MessageArchive;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateReason {
    /// Another delivery of this id is being processed right now
    InFlight,
    /// This id was archived by an earlier delivery
    AlreadyProcessed,
}

impl DuplicateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateReason::InFlight => "in_flight",
            DuplicateReason::AlreadyProcessed => "already_processed",
        }
    }
}

#[derive(Debug)]
pub enum Admission {
    Admitted(AdmissionGuard),
    Duplicate(DuplicateReason),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted(_))
    }
}

/// Membership of one message id in the in-flight set; released on drop
#[derive(Debug)]
pub struct AdmissionGuard {
    id: Option<String>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl AdmissionGuard {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            lock_set(&self.in_flight).remove(&id);
        }
    }
}

#[derive(Clone)]
pub struct AdmissionFilter {
    in_flight: Arc<Mutex<HashSet<String>>>,
    archive: MessageArchive,
}

impl AdmissionFilter {
    pub fn new(archive: MessageArchive) -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            archive,
        }
    }

    /// Admit a message id unless it is in flight or already archived.
    ///
    /// The whole check-then-insert runs under one lock with no await point, so
    /// of two concurrent attempts for the same id exactly one is admitted.
    /// Messages without an id are always admitted.
    pub fn try_admit(&self, id: Option<&str>) -> Admission {
        let Some(id) = id.filter(|id| !id.is_empty()) else {
            return Admission::Admitted(AdmissionGuard {
                id: None,
                in_flight: Arc::clone(&self.in_flight),
            });
        };

        let mut set = lock_set(&self.in_flight);
        if set.contains(id) {
            return Admission::Duplicate(DuplicateReason::InFlight);
        }

        match self.archive.is_processed(id) {
            Ok(true) => return Admission::Duplicate(DuplicateReason::AlreadyProcessed),
            Ok(false) => {}
            Err(e) => {
                // Fail open: the in-flight check still holds
                tracing::warn!(message_id = %id, error = %e, "Archive lookup failed during admission");
            }
        }

        set.insert(id.to_string());
        Admission::Admitted(AdmissionGuard {
            id: Some(id.to_string()),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Remove an id from the in-flight set; guards do this on drop
    pub fn release(&self, id: &str) {
        lock_set(&self.in_flight).remove(id);
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        lock_set(&self.in_flight).contains(id)
    }

    pub fn in_flight_len(&self) -> usize {
        lock_set(&self.in_flight).len()
    }
}

// The set holds plain strings, so a poisoned lock is still consistent
fn lock_set(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(|e| e.into_inner())
}
