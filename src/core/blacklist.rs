//! Search source blacklist
//!
//! Process-local TTL set of (indexer, guid) pairs that failed a verified
//! download. Entries expire lazily on read; nothing is persisted, so a
//! restart clears the list. This is a soft defense against re-grabbing a
//! known-bad source within a search session, not an audit record.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_BLACKLIST_TTL: Duration = Duration::from_secs(3600);

/// In-memory blacklist of failed search sources
pub struct BlacklistManager {
    ttl: Duration,
    entries: Mutex<HashMap<String, Instant>>,
}

impl BlacklistManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn key(indexer_id: &str, guid: &str) -> String {
        format!("{}:{}", indexer_id, guid)
    }

    /// Record a failed source
    pub fn add(&self, indexer_id: &str, guid: &str) {
        let key = Self::key(indexer_id, guid);
        debug!(key = %key, "Blacklisting source");
        self.entries
            .lock()
            .expect("blacklist lock poisoned")
            .insert(key, Instant::now());
    }

    /// Check a candidate source, expiring its entry if the TTL has passed
    pub fn is_blacklisted(&self, indexer_id: &str, guid: &str) -> bool {
        let key = Self::key(indexer_id, guid);
        let mut entries = self.entries.lock().expect("blacklist lock poisoned");
        match entries.get(&key) {
            Some(added_at) if added_at.elapsed() <= self.ttl => true,
            Some(_) => {
                entries.remove(&key);
                debug!(key = %key, "Blacklist entry expired");
                false
            }
            None => false,
        }
    }

    /// Remove a source explicitly (e.g. after a successful retry)
    pub fn remove(&self, indexer_id: &str, guid: &str) {
        self.entries
            .lock()
            .expect("blacklist lock poisoned")
            .remove(&Self::key(indexer_id, guid));
    }

    /// Batch sweep of expired entries; returns how many were dropped
    pub fn clear_expired(&self) -> usize {
        let mut entries = self.entries.lock().expect("blacklist lock poisoned");
        let before = entries.len();
        entries.retain(|_, added_at| added_at.elapsed() <= self.ttl);
        before - entries.len()
    }

    /// Drop every entry
    pub fn clear_all(&self) {
        self.entries
            .lock()
            .expect("blacklist lock poisoned")
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("blacklist lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BlacklistManager {
    fn default() -> Self {
        Self::new(DEFAULT_BLACKLIST_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_check() {
        let blacklist = BlacklistManager::default();
        blacklist.add("idx", "g1");
        assert!(blacklist.is_blacklisted("idx", "g1"));
        assert!(!blacklist.is_blacklisted("idx", "missing"));
        // The same guid from another indexer is a different source
        assert!(!blacklist.is_blacklisted("other", "g1"));
    }

    #[test]
    fn test_ttl_expiry_on_read() {
        let blacklist = BlacklistManager::new(Duration::from_millis(0));
        blacklist.add("idx", "g1");
        std::thread::sleep(Duration::from_millis(5));
        assert!(!blacklist.is_blacklisted("idx", "g1"));
        // The expired entry was removed, not just hidden
        assert_eq!(blacklist.len(), 0);
    }

    #[test]
    fn test_remove() {
        let blacklist = BlacklistManager::default();
        blacklist.add("idx", "g1");
        blacklist.remove("idx", "g1");
        assert!(!blacklist.is_blacklisted("idx", "g1"));
    }

    #[test]
    fn test_clear_expired_sweep() {
        let blacklist = BlacklistManager::new(Duration::from_millis(0));
        blacklist.add("idx", "g1");
        blacklist.add("idx", "g2");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(blacklist.clear_expired(), 2);
        assert!(blacklist.is_empty());
    }

    #[test]
    fn test_clear_all() {
        let blacklist = BlacklistManager::default();
        blacklist.add("idx", "g1");
        blacklist.add("idx2", "g2");
        blacklist.clear_all();
        assert_eq!(blacklist.len(), 0);
    }
}
