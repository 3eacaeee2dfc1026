//! Partition bookkeeping for the object cache.
//!
//! Pure data: no filesystem access happens here, which keeps the eviction
//! policy testable on its own.

use std::collections::BTreeMap;

use fit_types::ContentHash;
use serde::{Deserialize, Serialize};

/// Which partition an object lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Partition {
    Lru,
    Pending,
}

/// An evictable object. Lower ordinals were used longer ago.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u64, u64)", into = "(u64, u64)")]
pub struct LruItem {
    pub size: u64,
    pub ordinal: u64,
}

impl From<(u64, u64)> for LruItem {
    fn from((size, ordinal): (u64, u64)) -> Self {
        Self { size, ordinal }
    }
}

impl From<LruItem> for (u64, u64) {
    fn from(item: LruItem) -> Self {
        (item.size, item.ordinal)
    }
}

/// A non-evictable object awaiting upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u64, bool)", into = "(u64, bool)")]
pub struct PendingItem {
    pub size: u64,
    /// Set once a VCS commit referencing the object has landed.
    pub committed: bool,
}

impl From<(u64, bool)> for PendingItem {
    fn from((size, committed): (u64, bool)) -> Self {
        Self { size, committed }
    }
}

impl From<PendingItem> for (u64, bool) {
    fn from(item: PendingItem) -> Self {
        (item.size, item.committed)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LruPartition {
    /// Sum of item sizes.
    pub size: u64,
    /// Next ordinal to hand out.
    pub count: u64,
    pub items: BTreeMap<ContentHash, LruItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPartition {
    /// Sum of item sizes.
    pub size: u64,
    pub items: BTreeMap<ContentHash, PendingItem>,
}

/// The two partitions of the object cache.
///
/// Invariants maintained by every method:
/// - an object is in at most one partition;
/// - each partition's `size` equals the sum of its item sizes;
/// - LRU ordinals are unique and below `lru.count`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub lru: LruPartition,
    pub pending: PendingPartition,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition_of(&self, hash: &ContentHash) -> Option<Partition> {
        if self.lru.items.contains_key(hash) {
            Some(Partition::Lru)
        } else if self.pending.items.contains_key(hash) {
            Some(Partition::Pending)
        } else {
            None
        }
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.partition_of(hash).is_some()
    }

    /// Place an object in the LRU partition as most recently used, moving it
    /// out of pending if it was there.
    pub fn touch(&mut self, hash: &ContentHash, size: u64) {
        self.remove_pending(hash);
        let ordinal = self.lru.count;
        self.lru.count += 1;
        match self.lru.items.get_mut(hash) {
            Some(item) => item.ordinal = ordinal,
            None => {
                self.lru.items.insert(hash.clone(), LruItem { size, ordinal });
                self.lru.size += size;
            }
        }
    }

    /// Bump the ordinal of an object already in LRU. No-op otherwise.
    pub fn bump(&mut self, hash: &ContentHash) {
        if let Some(item) = self.lru.items.get_mut(hash) {
            item.ordinal = self.lru.count;
            self.lru.count += 1;
        }
    }

    /// Record a freshly saved object. An object already in LRU stays there
    /// and just becomes most recently used.
    pub fn add_pending(&mut self, hash: &ContentHash, size: u64) {
        if self.lru.items.contains_key(hash) {
            self.bump(hash);
            return;
        }
        if !self.pending.items.contains_key(hash) {
            self.pending.items.insert(
                hash.clone(),
                PendingItem {
                    size,
                    committed: false,
                },
            );
            self.pending.size += size;
        }
    }

    /// Flag a pending object as referenced by a landed commit.
    pub fn set_committed(&mut self, hash: &ContentHash) -> bool {
        match self.pending.items.get_mut(hash) {
            Some(item) => {
                item.committed = true;
                true
            }
            None => false,
        }
    }

    /// Move a pending object to LRU. Returns whether it was pending.
    pub fn promote(&mut self, hash: &ContentHash) -> bool {
        match self.pending.items.get(hash) {
            Some(item) => {
                let size = item.size;
                self.touch(hash, size);
                true
            }
            None => false,
        }
    }

    pub fn remove_lru(&mut self, hash: &ContentHash) -> Option<LruItem> {
        let item = self.lru.items.remove(hash)?;
        self.lru.size -= item.size;
        Some(item)
    }

    pub fn remove_pending(&mut self, hash: &ContentHash) -> Option<PendingItem> {
        let item = self.pending.items.remove(hash)?;
        self.pending.size -= item.size;
        Some(item)
    }

    /// LRU objects to evict, oldest first, so that the LRU size drops to at
    /// most `target`.
    pub fn eviction_candidates(&self, target: u64) -> Vec<ContentHash> {
        let mut by_age: Vec<(&ContentHash, &LruItem)> = self.lru.items.iter().collect();
        by_age.sort_by_key(|(_, item)| item.ordinal);

        let mut size = self.lru.size;
        let mut out = Vec::new();
        for (hash, item) in by_age {
            if size <= target {
                break;
            }
            size -= item.size;
            out.push(hash.clone());
        }
        out
    }

    /// Compact ordinals to `0..n`, preserving order.
    pub fn renumber(&mut self) {
        let mut by_age: Vec<(ContentHash, u64)> = self
            .lru
            .items
            .iter()
            .map(|(h, item)| (h.clone(), item.ordinal))
            .collect();
        by_age.sort_by_key(|(_, ordinal)| *ordinal);
        for (next, (hash, _)) in by_age.iter().enumerate() {
            if let Some(item) = self.lru.items.get_mut(hash) {
                item.ordinal = next as u64;
            }
        }
        self.lru.count = by_age.len() as u64;
    }

    /// Verify the invariants listed on the type.
    pub fn is_consistent(&self) -> bool {
        let lru_sum: u64 = self.lru.items.values().map(|i| i.size).sum();
        let pending_sum: u64 = self.pending.items.values().map(|i| i.size).sum();
        let disjoint = self
            .lru
            .items
            .keys()
            .all(|h| !self.pending.items.contains_key(h));
        let mut ordinals: Vec<u64> = self.lru.items.values().map(|i| i.ordinal).collect();
        ordinals.sort_unstable();
        let unique = ordinals.windows(2).all(|w| w[0] != w[1]);
        let bounded = ordinals.last().map_or(true, |&max| max < self.lru.count);

        lru_sum == self.lru.size
            && pending_sum == self.pending.size
            && disjoint
            && unique
            && bounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(n: u8) -> ContentHash {
        ContentHash::of_blob(&[n])
    }

    #[test]
    fn touch_orders_by_recency() {
        let mut ledger = Ledger::new();
        ledger.touch(&h(1), 100);
        ledger.touch(&h(2), 200);
        ledger.touch(&h(1), 100);

        assert_eq!(ledger.lru.size, 300);
        assert_eq!(ledger.eviction_candidates(250), vec![h(2)]);
        assert!(ledger.is_consistent());
    }

    #[test]
    fn pending_moves_and_bumps() {
        let mut ledger = Ledger::new();
        ledger.touch(&h(1), 10);
        ledger.add_pending(&h(1), 10);
        assert_eq!(ledger.partition_of(&h(1)), Some(Partition::Lru));

        ledger.add_pending(&h(2), 20);
        assert_eq!(ledger.partition_of(&h(2)), Some(Partition::Pending));
        assert!(ledger.set_committed(&h(2)));
        assert!(ledger.pending.items[&h(2)].committed);

        assert!(ledger.promote(&h(2)));
        assert_eq!(ledger.partition_of(&h(2)), Some(Partition::Lru));
        assert_eq!(ledger.pending.size, 0);
        assert_eq!(ledger.lru.size, 30);
        assert!(ledger.is_consistent());
    }

    #[test]
    fn renumber_compacts() {
        let mut ledger = Ledger::new();
        for n in 0..5 {
            ledger.touch(&h(n), 1);
        }
        ledger.remove_lru(&h(1));
        ledger.remove_lru(&h(3));
        ledger.renumber();
        assert_eq!(ledger.lru.count, 3);
        assert_eq!(ledger.lru.items[&h(0)].ordinal, 0);
        assert_eq!(ledger.lru.items[&h(4)].ordinal, 2);
        assert!(ledger.is_consistent());
    }

    #[test]
    fn json_shape() {
        let mut ledger = Ledger::new();
        ledger.touch(&h(1), 7);
        ledger.add_pending(&h(2), 9);
        let value = serde_json::to_value(&ledger).unwrap();
        assert_eq!(value["lru"]["items"][h(1).as_str()], serde_json::json!([7, 0]));
        assert_eq!(value["pending"]["items"][h(2).as_str()], serde_json::json!([9, false]));

        let back: Ledger = serde_json::from_value(value).unwrap();
        assert_eq!(back, ledger);
    }
}
