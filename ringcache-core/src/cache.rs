//! Bounded `key → (value, timestamp, hash_index)` store (spec.md §4.2).

use crate::error::CacheError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// One resident cache entry.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Stored value. Never empty — an empty value means "deleted".
    pub value: Bytes,
    /// Last time this key was written, monotone per key.
    pub last_update: DateTime<Utc>,
    /// Memoized hash index so rebalance never re-hashes a resident key.
    pub hash_index: f64,
    seq: u64,
}

struct Slot {
    value: Bytes,
    last_update: DateTime<Utc>,
    hash_index: f64,
    seq: u64,
}

/// Bounded, last-writer-wins, oldest-timestamp-evicting cache.
pub struct Cache {
    max_size: usize,
    size: usize,
    entries: HashMap<Bytes, Slot>,
    // (last_update, seq) -> key, kept in sync with `entries` for O(log n)
    // oldest-first eviction instead of an O(n) scan per `set`.
    eviction_order: BTreeMap<(DateTime<Utc>, u64), Bytes>,
    next_seq: u64,
}

impl Cache {
    /// Build an empty cache bounded to `max_size` bytes.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            size: 0,
            entries: HashMap::new(),
            eviction_order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of `len(key) + len(value)` across resident entries.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Configured capacity in bytes.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn entry_cost(key: &[u8], value: &[u8]) -> usize {
        key.len() + value.len()
    }

    fn remove_slot(&mut self, key: &Bytes) {
        if let Some(slot) = self.entries.remove(key) {
            self.size -= Self::entry_cost(key, &slot.value);
            self.eviction_order.remove(&(slot.last_update, slot.seq));
        }
    }

    /// Insert, update or delete `key`.
    ///
    /// An empty `value` deletes the key and always returns `Ok(())`, even if
    /// the key was absent. A stale write (`timestamp < stored.last_update`)
    /// is silently ignored. Otherwise, if the key is new, oldest entries are
    /// evicted (excluding `key` itself) until it fits.
    pub fn set(
        &mut self,
        key: Bytes,
        value: Bytes,
        timestamp: DateTime<Utc>,
        hash_index: f64,
    ) -> Result<(), CacheError> {
        if value.is_empty() {
            self.remove_slot(&key);
            return Ok(());
        }

        let cost = Self::entry_cost(&key, &value);
        if cost > self.max_size {
            return Err(CacheError::TooBig);
        }

        if let Some(existing) = self.entries.get(&key) {
            if timestamp < existing.last_update {
                return Ok(());
            }
            let old_cost = Self::entry_cost(&key, &existing.value);
            // Evict other entries (never this key) until the delta fits.
            self.make_room(cost.saturating_sub(old_cost), Some(&key));
            let seq = self.next_seq();
            let old = self.entries.remove(&key).expect("checked above");
            self.eviction_order.remove(&(old.last_update, old.seq));
            self.size = self.size - old_cost + cost;
            self.entries.insert(
                key.clone(),
                Slot { value, last_update: timestamp, hash_index, seq },
            );
            self.eviction_order.insert((timestamp, seq), key);
            return Ok(());
        }

        self.make_room(cost, Some(&key));
        let seq = self.next_seq();
        self.size += cost;
        self.entries.insert(
            key.clone(),
            Slot { value, last_update: timestamp, hash_index, seq },
        );
        self.eviction_order.insert((timestamp, seq), key);
        Ok(())
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Evict oldest-first entries (skipping `protect`) until `additional`
    /// more bytes fit within `max_size`.
    fn make_room(&mut self, additional: usize, protect: Option<&Bytes>) {
        while self.size + additional > self.max_size {
            let Some((&order_key, victim)) = self
                .eviction_order
                .iter()
                .find(|(_, k)| Some(k.as_ref()) != protect.map(|p| p.as_ref()))
                .map(|(k, v)| (k, v.clone()))
            else {
                break;
            };
            self.eviction_order.remove(&order_key);
            if let Some(slot) = self.entries.remove(&victim) {
                self.size -= Self::entry_cost(&victim, &slot.value);
            }
        }
    }

    /// `(timestamp, value)` for `key`, or `(None, None)` if absent.
    pub fn get(&self, key: &[u8]) -> (Option<DateTime<Utc>>, Option<Bytes>) {
        match self.entries.get(key) {
            Some(slot) => (Some(slot.last_update), Some(slot.value.clone())),
            None => (None, None),
        }
    }

    /// Memoized hash index for `key`, if resident.
    pub fn index_for(&self, key: &[u8]) -> Option<f64> {
        self.entries.get(key).map(|s| s.hash_index)
    }

    /// Iterate all resident `(key, entry)` pairs.
    pub fn items(&self) -> impl Iterator<Item = (&Bytes, Entry)> + '_ {
        self.entries.iter().map(|(k, s)| {
            (
                k,
                Entry {
                    value: s.value.clone(),
                    last_update: s.last_update,
                    hash_index: s.hash_index,
                    seq: s.seq,
                },
            )
        })
    }

    /// Remove `key` outright (used by rebalance when ownership is lost).
    pub fn remove(&mut self, key: &[u8]) {
        if let Some((k, slot)) = self.entries.remove_entry(key) {
            self.size -= Self::entry_cost(&k, &slot.value);
            self.eviction_order.remove(&(slot.last_update, slot.seq));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn too_big_rejected_and_absent() {
        let mut cache = Cache::new(2);
        let err = cache
            .set(Bytes::from("a"), Bytes::from("12"), ts(1), 0.0)
            .unwrap_err();
        assert_eq!(err, CacheError::TooBig);
        assert_eq!(cache.get(b"a"), (None, None));
    }

    #[test]
    fn basic_get_after_set() {
        let mut cache = Cache::new(1024);
        cache.set(Bytes::from("a"), Bytes::from("1"), ts(1), 0.0).unwrap();
        cache.set(Bytes::from("b"), Bytes::from("2"), ts(2), 0.0).unwrap();
        assert_eq!(cache.get(b"a"), (Some(ts(1)), Some(Bytes::from("1"))));
        assert_eq!(cache.get(b"b"), (Some(ts(2)), Some(Bytes::from("2"))));
        assert_eq!(cache.get(b"c"), (None, None));
    }

    #[test]
    fn delete_by_empty_value() {
        let mut cache = Cache::new(1024);
        cache.set(Bytes::from("a"), Bytes::from("1"), ts(1), 0.0).unwrap();
        cache.set(Bytes::from("a"), Bytes::new(), ts(2), 0.0).unwrap();
        assert_eq!(cache.get(b"a"), (None, None));
    }

    #[test]
    fn delete_absent_key_is_ok() {
        let mut cache = Cache::new(1024);
        assert!(cache.set(Bytes::from("ghost"), Bytes::new(), ts(1), 0.0).is_ok());
    }

    #[test]
    fn stale_write_ignored() {
        let mut cache = Cache::new(1024);
        cache.set(Bytes::from("a"), Bytes::from("1"), ts(2), 0.0).unwrap();
        cache.set(Bytes::from("a"), Bytes::from("2"), ts(1), 0.0).unwrap();
        assert_eq!(cache.get(b"a"), (Some(ts(2)), Some(Bytes::from("1"))));
    }

    #[test]
    fn eviction_under_pressure() {
        let mut cache = Cache::new(2);
        cache.set(Bytes::from("a"), Bytes::from("1"), ts(1), 0.0).unwrap();
        cache.set(Bytes::from("b"), Bytes::from("2"), ts(2), 0.0).unwrap();
        assert_eq!(cache.get(b"a"), (None, None));
        assert!(cache.get(b"b").1.is_some());
    }

    #[test]
    fn size_accounting_tracks_overwrites() {
        let mut cache = Cache::new(1024);
        cache.set(Bytes::from("a"), Bytes::from("1"), ts(1), 0.0).unwrap();
        assert_eq!(cache.size(), 2);
        cache.set(Bytes::from("a"), Bytes::from("22"), ts(2), 0.0).unwrap();
        assert_eq!(cache.size(), 3);
    }
}
