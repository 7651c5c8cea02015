//! In-memory cache of currently held unlock keys.

use std::collections::BTreeMap;

use crate::types::LockKey;

/// Maps a collection name (or hashed standalone secret name) to the unlock
/// key currently held for it.
///
/// Keys live only in memory and zeroise on eviction via [`LockKey`]'s drop.
/// Encrypted-storage collections never appear here; their plugin owns the
/// lock state.
#[derive(Default)]
pub(crate) struct LockKeyCache {
    keys: BTreeMap<String, LockKey>,
}

impl LockKeyCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.keys.contains_key(name)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&LockKey> {
        self.keys.get(name)
    }

    pub(crate) fn insert(&mut self, name: String, key: LockKey) {
        self.keys.insert(name, key);
    }

    /// Evicts the key for `name`; the dropped key zeroises itself.
    pub(crate) fn remove(&mut self, name: &str) {
        self.keys.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut cache = LockKeyCache::new();
        assert!(!cache.contains("vault"));
        assert!(cache.get("vault").is_none());

        cache.insert("vault".to_owned(), LockKey::new(b"k1".to_vec()));
        assert!(cache.contains("vault"));
        assert_eq!(cache.get("vault").unwrap().as_bytes(), b"k1");

        cache.insert("vault".to_owned(), LockKey::new(b"k2".to_vec()));
        assert_eq!(cache.get("vault").unwrap().as_bytes(), b"k2");

        cache.remove("vault");
        assert!(!cache.contains("vault"));
    }
}
