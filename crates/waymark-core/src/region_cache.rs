//! Per-region store of the message sets last fetched from the backend.
//!
//! Every [`RegionCache::put`] replaces the region's whole partition: a fetch is
//! the current remote truth for that region, never a delta to merge.

use rustc_hash::FxHashMap;

use crate::location::{RegionId, WorldId};
use crate::message::{MessageId, MessageRecord};

/// Identifies a cache partition: one region of one world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionKey {
    /// World the region belongs to.
    pub world: WorldId,
    /// Region within that world.
    pub region: RegionId,
}

impl RegionKey {
    /// Creates a new partition key.
    pub fn new(world: WorldId, region: RegionId) -> Self {
        Self { world, region }
    }
}

/// Owns the fetched message set of every tracked region.
#[derive(Debug, Default)]
pub struct RegionCache {
    entries: FxHashMap<RegionKey, Vec<MessageRecord>>,
}

impl RegionCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    /// Stores `records` as the full content of `key`, returning the set it
    /// replaced.
    pub fn put(&mut self, key: RegionKey, records: Vec<MessageRecord>) -> Option<Vec<MessageRecord>> {
        self.entries.insert(key, records)
    }

    /// The records cached for `key`.
    pub fn get(&self, key: &RegionKey) -> Option<&[MessageRecord]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Removes the partition for `key`.
    pub fn evict(&mut self, key: &RegionKey) -> Option<Vec<MessageRecord>> {
        self.entries.remove(key)
    }

    /// Whether `key` has a partition.
    pub fn contains(&self, key: &RegionKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Mutable access to a cached record, wherever it lives.
    pub fn record_mut(&mut self, id: &MessageId) -> Option<&mut MessageRecord> {
        self.entries
            .values_mut()
            .flat_map(|records| records.iter_mut())
            .find(|r| &r.id == id)
    }

    /// Removes a message from every partition. Returns `true` if it was found.
    pub fn remove_message(&mut self, id: &MessageId) -> bool {
        let mut removed = false;
        for records in self.entries.values_mut() {
            let before = records.len();
            records.retain(|r| &r.id != id);
            removed |= records.len() != before;
        }
        removed
    }

    /// Number of partitions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no partition is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total records across all partitions.
    pub fn record_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Iterates over partition keys.
    pub fn keys(&self) -> impl Iterator<Item = &RegionKey> {
        self.entries.keys()
    }

    /// Drops every partition.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record_in;

    fn key(region: i32) -> RegionKey {
        RegionKey::new(WorldId(301), RegionId(region))
    }

    #[test]
    fn test_put_then_get() {
        let mut cache = RegionCache::new();
        cache.put(key(10), vec![record_in("a", "Bob", 10, 0, 0)]);

        let got = cache.get(&key(10)).expect("partition present");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, MessageId::new("a"));
        assert!(cache.get(&key(11)).is_none());
    }

    #[test]
    fn test_put_replaces_instead_of_appending() {
        let mut cache = RegionCache::new();
        let first = vec![record_in("a", "Bob", 10, 0, 0), record_in("b", "Bob", 10, 1, 0)];
        cache.put(key(10), first.clone());

        // Same region fetched again with overlapping content.
        let replaced = cache.put(key(10), vec![record_in("b", "Bob", 10, 1, 0)]);

        assert_eq!(replaced, Some(first));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.record_count(), 1);
    }

    #[test]
    fn test_partitions_are_per_world() {
        let mut cache = RegionCache::new();
        cache.put(RegionKey::new(WorldId(1), RegionId(10)), vec![]);
        cache.put(RegionKey::new(WorldId(2), RegionId(10)), vec![]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_evict_removes_partition() {
        let mut cache = RegionCache::new();
        cache.put(key(10), vec![record_in("a", "Bob", 10, 0, 0)]);

        assert!(cache.evict(&key(10)).is_some());
        assert!(!cache.contains(&key(10)));
        assert!(cache.evict(&key(10)).is_none());
    }

    #[test]
    fn test_remove_message_searches_all_partitions() {
        let mut cache = RegionCache::new();
        cache.put(key(10), vec![record_in("a", "Bob", 10, 0, 0)]);
        cache.put(key(11), vec![record_in("b", "Bob", 11, 0, 0), record_in("c", "Al", 11, 1, 0)]);

        assert!(cache.remove_message(&MessageId::new("b")));
        assert!(!cache.remove_message(&MessageId::new("b")));
        assert_eq!(cache.record_count(), 2);
    }

    #[test]
    fn test_record_mut_allows_local_vote_update() {
        let mut cache = RegionCache::new();
        cache.put(key(10), vec![record_in("a", "Bob", 10, 0, 0)]);

        cache
            .record_mut(&MessageId::new("a"))
            .expect("record present")
            .upvotes += 1;
        assert_eq!(cache.get(&key(10)).expect("present")[0].upvotes, 1);
    }
}
