use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use log::{debug, trace};

/// Upper bound applied to every TTL so that `now + ttl` cannot overflow.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A resolved address list with its expiry instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Addresses in the order the lookup returned them
    pub addresses: Vec<String>,
    /// When this entry stops being served
    pub expires_at: Instant,
}

impl CacheEntry {
    /// Returns true if the entry is still fresh at `now`
    #[must_use]
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// A thread-safe DNS cache keyed by normalized domain name.
///
/// Expiry is checked on every read, so a stale entry is never returned even
/// if it has not been swept yet. Cloning the cache is cheap and every clone
/// shares the same storage.
#[derive(Debug, Clone, Default)]
pub struct DnsCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl DnsCache {
    /// Create a new, empty DNS cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Every write replaces a whole entry, so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the cached addresses for `name` if they have not expired
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Vec<String>> {
        let entries = self.read();
        match entries.get(name) {
            Some(entry) if entry.is_fresh(Instant::now()) => {
                trace!("cache hit for {name}");
                Some(entry.addresses.clone())
            }
            Some(_) => {
                trace!("cache entry for {name} is stale");
                None
            }
            None => None,
        }
    }

    /// Store `addresses` for `name`, replacing any previous entry.
    ///
    /// An empty address list is never cached. TTLs above [`MAX_TTL`] are
    /// clamped.
    pub fn put(&self, name: impl Into<String>, addresses: Vec<String>, ttl: Duration) {
        let name = name.into();
        if addresses.is_empty() {
            debug!("refusing to cache empty answer for {name}");
            return;
        }

        let entry = CacheEntry {
            addresses,
            expires_at: Instant::now() + ttl.min(MAX_TTL),
        };
        self.write().insert(name, entry);
    }

    /// Remove the entry for `name`. Returns true if one was present.
    pub fn remove(&self, name: &str) -> bool {
        self.write().remove(name).is_some()
    }

    /// Remove every entry that has expired, returning how many were dropped
    pub fn sweep_expired(&self) -> usize {
        let mut entries = self.write();
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!("swept {removed} expired cache entries");
        }
        removed
    }

    /// Get the remaining lifetime of a fresh entry
    #[must_use]
    pub fn ttl(&self, name: &str) -> Option<Duration> {
        let entries = self.read();
        let now = Instant::now();
        entries
            .get(name)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.expires_at.duration_since(now))
    }

    /// Clear all entries from the cache
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Number of stored entries, including stale ones not yet swept
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
