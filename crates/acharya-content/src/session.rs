//! In-memory session state keyed by opaque handles.
//!
//! Entries carry a per-entry TTL and are reaped by an explicit
//! `purge_expired` sweep the owner calls on its own schedule; there are
//! no interval timers tied to process lifetime. Re-validation replaces a
//! report in place via `replace`, and no history is kept.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque handle to one stored session entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHandle(Uuid);

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct SessionEntry<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

pub struct SessionStore<T> {
    entries: DashMap<Uuid, SessionEntry<T>>,
    ttl: Duration,
}

impl<T: Clone> SessionStore<T> {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::hours(1)),
        }
    }

    /// Store a value and hand back its opaque handle.
    pub fn insert(&self, value: T) -> SessionHandle {
        let id = Uuid::new_v4();
        self.entries.insert(
            id,
            SessionEntry {
                value,
                expires_at: Utc::now() + self.ttl,
            },
        );
        SessionHandle(id)
    }

    /// Fetch a live entry. Expired entries read as absent even before the
    /// next sweep removes them.
    pub fn get(&self, handle: &SessionHandle) -> Option<T> {
        let entry = self.entries.get(&handle.0)?;
        if entry.expires_at <= Utc::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Replace the value behind an existing handle, refreshing its TTL.
    /// Returns false when the handle is unknown or already expired.
    pub fn replace(&self, handle: &SessionHandle, value: T) -> bool {
        match self.entries.get_mut(&handle.0) {
            Some(mut entry) if entry.expires_at > Utc::now() => {
                entry.value = value;
                entry.expires_at = Utc::now() + self.ttl;
                true
            }
            _ => false,
        }
    }

    pub fn remove(&self, handle: &SessionHandle) -> Option<T> {
        self.entries.remove(&handle.0).map(|(_, entry)| entry.value)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
