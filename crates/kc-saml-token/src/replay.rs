//! Token replay detection.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Seconds between sweeps of expired entries.
const PURGE_INTERVAL_SECS: i64 = 60;

/// Remembers tokens that were already accepted.
///
/// Both operations take the validation instant so the cache and the
/// lifetime checks agree on what has expired.
pub trait TokenReplayCache: Send + Sync {
    /// Returns true if the token was seen and has not expired at `now`.
    fn try_find(&self, token: &str, now: DateTime<Utc>) -> bool;

    /// Records the token until `expires_at`. Returns false if it could not
    /// be recorded, including when it is already present.
    fn try_add(&self, token: &str, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool;
}

/// Process-local replay cache.
///
/// Tokens are keyed by their SHA-256 digest; the raw token is not kept.
/// Expired entries are swept at most once per minute, on insert.
#[derive(Debug, Default)]
pub struct InMemoryReplayCache {
    entries: DashMap<Vec<u8>, DateTime<Utc>>,
    next_purge: AtomicI64,
}

impl InMemoryReplayCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, expired ones included until the next sweep.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_expired(&self, now: DateTime<Utc>) {
        let due = self.next_purge.load(Ordering::Relaxed);
        if now.timestamp() < due {
            return;
        }
        // Only the caller that moves the deadline sweeps.
        if self
            .next_purge
            .compare_exchange(
                due,
                now.timestamp().saturating_add(PURGE_INTERVAL_SECS),
                Ordering::Relaxed,
                Ordering::Relaxed,
            )
            .is_ok()
        {
            self.entries.retain(|_, expiry| *expiry > now);
        }
    }
}

impl TokenReplayCache for InMemoryReplayCache {
    fn try_find(&self, token: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .get(&kc_crypto::sha256(token.as_bytes()))
            .is_some_and(|expires_at| *expires_at > now)
    }

    fn try_add(&self, token: &str, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if expires_at <= now {
            return false;
        }
        self.purge_expired(now);

        match self.entries.entry(kc_crypto::sha256(token.as_bytes())) {
            Entry::Occupied(mut entry) if *entry.get() <= now => {
                entry.insert(expires_at);
                true
            }
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(expires_at);
                true
            }
        }
    }
}
