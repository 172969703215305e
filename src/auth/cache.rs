//! In-memory session cache
//!
//! Caches resolved sessions (access token plus the service coordinates it
//! was resolved for) keyed by [`CacheKey`]. Entries live for a fixed TTL
//! measured from insertion, not last access, so a heavily used entry still
//! gets revalidated against the durable store on schedule.
//!
//! Expiry is lazy: an entry past its deadline is dropped when it is next
//! looked up. There is no background sweeper and no size bound; the
//! population is bounded by identities times services in practice.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::auth::record::CacheKey;

/// A cached resolved session.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    /// Access token usable for the key's service and scopes
    pub access_token: String,
    /// Identity the session belongs to (resolved, never `None`)
    pub identity: String,
}

#[derive(Debug)]
struct CachedAt {
    entry: SessionEntry,
    inserted_at: DateTime<Utc>,
}

/// TTL-bounded session cache, safe to share behind an `Arc`.
#[derive(Debug)]
pub struct SessionCache {
    entries: Mutex<HashMap<CacheKey, CachedAt>>,
    ttl: Duration,
}

impl SessionCache {
    /// Creates a cache whose entries expire `ttl` after insertion.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Looks up a live session for `key`.
    ///
    /// An expired entry is removed on the spot and reported as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<SessionEntry> {
        let mut entries = self.entries.lock().expect("session cache lock poisoned");
        match entries.get(key) {
            Some(cached) if Utc::now() - cached.inserted_at < self.ttl => {
                Some(cached.entry.clone())
            }
            Some(_) => {
                debug!(%key, "session cache entry expired");
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Inserts a session, resetting the TTL clock for the key.
    pub fn insert(&self, key: CacheKey, entry: SessionEntry) {
        let mut entries = self.entries.lock().expect("session cache lock poisoned");
        entries.insert(
            key,
            CachedAt {
                entry,
                inserted_at: Utc::now(),
            },
        );
    }

    /// Removes the session for `key`, if present.
    pub fn invalidate(&self, key: &CacheKey) {
        let mut entries = self.entries.lock().expect("session cache lock poisoned");
        entries.remove(key);
    }

    /// Removes every session belonging to `identity`, regardless of
    /// service or scope set. Used when credentials are revoked or a
    /// refresh is rejected.
    pub fn invalidate_identity(&self, identity: &str) {
        let mut entries = self.entries.lock().expect("session cache lock poisoned");
        let before = entries.len();
        entries.retain(|key, _| key.identity != identity);
        let dropped = before - entries.len();
        if dropped > 0 {
            debug!(identity, dropped, "invalidated cached sessions");
        }
    }

    /// Number of entries currently held, counting expired-but-unswept ones.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("session cache lock poisoned").len()
    }

    /// Returns `true` when the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
