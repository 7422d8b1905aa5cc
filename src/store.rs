//! The in-memory key/value store backing both `primary` and each
//! `replicas[j]` slot of a node.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// A stored value plus its absolute expiration time (unix seconds).
/// `expires_at == 0` means "never expires".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub value: String,
    pub expires_at: u64,
}

impl StoredEntry {
    pub fn is_expired(&self) -> bool {
        self.expires_at != 0 && now_unix() >= self.expires_at
    }
}

pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

pub fn expiration_from_ttl(ttl_secs: u64) -> u64 {
    if ttl_secs == 0 {
        0
    } else {
        now_unix() + ttl_secs
    }
}

/// A key/value map keyed by the canonical byte representation of the key,
/// not by its ring identifier — the identifier is only ever used to decide
/// which node's store a key belongs in.
#[derive(Debug, Default, Clone)]
pub struct KvStore {
    entries: HashMap<Vec<u8>, StoredEntry>,
}

impl KvStore {
    pub fn new() -> KvStore {
        KvStore { entries: HashMap::new() }
    }

    pub fn insert(&mut self, key: Vec<u8>, entry: StoredEntry) -> Option<StoredEntry> {
        self.entries.insert(key, entry)
    }

    /// Returns `None` for an absent key, `Some(Err(_))` for a present but
    /// expired key (and evicts it), `Some(Ok(_))` otherwise.
    pub fn get(&mut self, key: &[u8]) -> Option<Result<StoredEntry, ()>> {
        match self.entries.get(key) {
            None => None,
            Some(entry) if entry.is_expired() => {
                self.entries.remove(key);
                Some(Err(()))
            }
            Some(entry) => Some(Ok(entry.clone())),
        }
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<StoredEntry> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &StoredEntry)> {
        self.entries.iter()
    }

    /// Removes and returns every entry for which `predicate` (evaluated on
    /// the key's ring id) is false — used to peel off keys that no longer
    /// belong to this node (handoff on predecessor change).
    pub fn drain_not_matching<F>(&mut self, predicate: F) -> Vec<(Vec<u8>, StoredEntry)>
    where
        F: Fn(&[u8]) -> bool,
    {
        let stale_keys: Vec<Vec<u8>> = self
            .entries
            .keys()
            .filter(|k| !predicate(k))
            .cloned()
            .collect();
        stale_keys
            .into_iter()
            .filter_map(|k| self.entries.remove(&k).map(|v| (k, v)))
            .collect()
    }

    /// Inserts every pair, overwriting any existing entry for the same key.
    pub fn merge(&mut self, pairs: impl IntoIterator<Item = (Vec<u8>, StoredEntry)>) {
        for (key, entry) in pairs {
            self.entries.insert(key, entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(value: &str) -> StoredEntry {
        StoredEntry { value: value.to_string(), expires_at: 0 }
    }

    #[test]
    fn put_then_get_round_trips() {
        let mut store = KvStore::new();
        store.insert(b"x".to_vec(), entry("1"));
        assert_eq!(store.get(b"x").unwrap().unwrap().value, "1");
    }

    #[test]
    fn missing_key_is_none() {
        let mut store = KvStore::new();
        assert!(store.get(b"missing").is_none());
    }

    #[test]
    fn expired_key_reads_as_expired_and_is_evicted() {
        let mut store = KvStore::new();
        store.insert(b"x".to_vec(), StoredEntry { value: "1".into(), expires_at: 1 });
        assert!(store.get(b"x").unwrap().is_err());
        assert!(store.get(b"x").is_none());
    }

    #[test]
    fn drain_not_matching_peels_off_the_right_keys() {
        let mut store = KvStore::new();
        store.insert(vec![1], entry("a"));
        store.insert(vec![2], entry("b"));
        let drained = store.drain_not_matching(|k| k != [1]);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0, vec![1]);
        assert_eq!(store.len(), 1);
    }
}
