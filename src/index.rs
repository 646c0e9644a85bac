//  Copyright 2024 vestibule contributors
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

//! The concurrent hash index.
//!
//! A fixed number of shards, each a lock-guarded `hashbrown::HashMap`,
//! striped by key hash. The shard only ever owns the map: eviction and
//! expiration state live behind the separate maintenance lock in
//! `cache.rs`, which is never acquired while holding a shard lock.

use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use ahash::RandomState;
use hashbrown::hash_map::Entry as MapEntry;
use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::entry::{ComputeOp, DeletionCause, EntryData};

struct Shard<K, V> {
    map: Mutex<HashMap<K, Arc<EntryData<K, V>>, RandomState>>,
}

/// Striped by fingerprint; `shard_count` must be a power of two (validated by
/// `CacheBuilder`).
pub struct Index<K, V> {
    shards: Vec<Shard<K, V>>,
    mask: u64,
    hasher: RandomState,
}

/// Outcome of a `compute` call.
pub enum ComputeOutcome<K, V> {
    /// The callback returned `Cancel`, or returned `Invalidate` on an absent key.
    NoChange,
    /// A new or replacement entry was installed; carries the superseded
    /// entry, if any.
    Inserted {
        new: Arc<EntryData<K, V>>,
        old: Option<Arc<EntryData<K, V>>>,
    },
    /// A live entry was removed.
    Removed(Arc<EntryData<K, V>>),
}

impl<K, V> Index<K, V>
where
    K: Hash + Eq + Clone,
{
    pub fn new(shard_count: usize, initial_capacity: usize) -> Self {
        let shard_count = shard_count.max(1).next_power_of_two();
        let per_shard_hint = initial_capacity / shard_count;
        Self {
            shards: (0..shard_count)
                .map(|_| Shard {
                    map: Mutex::new(HashMap::with_capacity_and_hasher(per_shard_hint, RandomState::new())),
                })
                .collect(),
            mask: (shard_count - 1) as u64,
            hasher: RandomState::new(),
        }
    }

    pub fn fingerprint(&self, key: &K) -> u64 {
        self.hasher.hash_one(key)
    }

    fn shard_for(&self, fingerprint: u64) -> &Shard<K, V> {
        &self.shards[(fingerprint & self.mask) as usize]
    }

    pub fn get(&self, key: &K, fingerprint: u64) -> Option<Arc<EntryData<K, V>>> {
        let shard = self.shard_for(fingerprint);
        let map = shard.map.lock();
        map.get(key).filter(|e| e.is_alive()).cloned()
    }

    /// Atomic read-modify-write under the owning shard's lock: `fn` observes
    /// the live entry (or `None`) and returns the op to apply. `fn` runs
    /// while the shard lock is held but before any mutation is committed, so
    /// a panic inside `fn` leaves the map untouched (the lock guard unwinds
    /// and releases normally).
    ///
    /// `weigh` computes the weight of a newly written value.
    /// `on_atomic_deletion` is invoked, still under the shard lock, for any
    /// entry this call supersedes or removes.
    pub fn compute<F>(
        &self,
        key: K,
        fingerprint: u64,
        weigh: &dyn Fn(&K, &V) -> u32,
        on_atomic_deletion: &dyn Fn(&Arc<EntryData<K, V>>, DeletionCause),
        f: F,
    ) -> ComputeOutcome<K, V>
    where
        F: FnOnce(Option<&Arc<EntryData<K, V>>>) -> ComputeOp<V>,
    {
        let shard = self.shard_for(fingerprint);
        let mut map = shard.map.lock();
        let existing = map.get(&key).filter(|e| e.is_alive()).cloned();
        let op = f(existing.as_ref());
        match op {
            ComputeOp::Cancel => ComputeOutcome::NoChange,
            ComputeOp::Invalidate => match existing {
                Some(_) => {
                    let removed = map.remove(&key).expect("existing checked above");
                    on_atomic_deletion(&removed, DeletionCause::Invalidation);
                    ComputeOutcome::Removed(removed)
                }
                None => ComputeOutcome::NoChange,
            },
            ComputeOp::Write(value) => {
                let weight = weigh(&key, &value);
                let new = EntryData::new(key.clone(), value, fingerprint, weight);
                let old = match map.entry(key) {
                    MapEntry::Occupied(mut occ) => Some(occ.insert(new.clone())),
                    MapEntry::Vacant(vac) => {
                        vac.insert(new.clone());
                        None
                    }
                };
                if let Some(old) = &old {
                    on_atomic_deletion(old, DeletionCause::Replacement);
                }
                ComputeOutcome::Inserted { new, old }
            }
        }
    }

    pub fn remove(&self, key: &K, fingerprint: u64) -> Option<Arc<EntryData<K, V>>> {
        let shard = self.shard_for(fingerprint);
        let mut map = shard.map.lock();
        map.remove(key)
    }

    pub fn clear(&self) -> Vec<Arc<EntryData<K, V>>> {
        let mut drained = Vec::new();
        for shard in &self.shards {
            let mut map = shard.map.lock();
            drained.extend(map.drain().map(|(_, v)| v));
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.map.lock().len()).sum()
    }

    /// Weakly-consistent snapshot for `all()`/`keys()`/`values()`: each
    /// shard is locked and copied in turn, so the result reflects no single
    /// global instant but never includes a retired entry.
    pub fn snapshot(&self) -> Vec<Arc<EntryData<K, V>>> {
        let mut out = Vec::new();
        for shard in &self.shards {
            let map = shard.map.lock();
            out.extend(map.values().filter(|e| e.is_alive()).cloned());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_weigh(_: &u64, _: &u64) -> u32 {
        1
    }

    fn noop_atomic(_: &Arc<EntryData<u64, u64>>, _: DeletionCause) {}

    #[test]
    fn compute_write_then_get_round_trips() {
        let idx: Index<u64, u64> = Index::new(4, 0);
        let fp = idx.fingerprint(&1);
        idx.compute(1, fp, &unit_weigh, &noop_atomic, |existing| {
            assert!(existing.is_none());
            ComputeOp::Write(100)
        });
        let got = idx.get(&1, fp).unwrap();
        assert_eq!(got.value, 100);
    }

    #[test]
    fn compute_cancel_leaves_state_untouched() {
        let idx: Index<u64, u64> = Index::new(4, 0);
        let fp = idx.fingerprint(&1);
        idx.compute(1, fp, &unit_weigh, &noop_atomic, |_| ComputeOp::Write(1));
        idx.compute(1, fp, &unit_weigh, &noop_atomic, |_| ComputeOp::Cancel);
        assert_eq!(idx.get(&1, fp).unwrap().value, 1);
    }

    #[test]
    fn compute_invalidate_on_absent_is_no_change() {
        let idx: Index<u64, u64> = Index::new(4, 0);
        let fp = idx.fingerprint(&42);
        let outcome = idx.compute(42, fp, &unit_weigh, &noop_atomic, |existing| {
            assert!(existing.is_none());
            ComputeOp::Invalidate
        });
        assert!(matches!(outcome, ComputeOutcome::NoChange));
    }

    #[test]
    fn compute_replace_fires_atomic_deletion_synchronously() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let idx: Index<u64, u64> = Index::new(4, 0);
        let fp = idx.fingerprint(&1);
        idx.compute(1, fp, &unit_weigh, &noop_atomic, |_| ComputeOp::Write(1));
        let seen = AtomicUsize::new(0);
        let track = |_: &Arc<EntryData<u64, u64>>, cause: DeletionCause| {
            assert_eq!(cause, DeletionCause::Replacement);
            seen.fetch_add(1, Ordering::SeqCst);
        };
        idx.compute(1, fp, &unit_weigh, &track, |_| ComputeOp::Write(2));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn snapshot_excludes_retired_entries() {
        let idx: Index<u64, u64> = Index::new(4, 0);
        let fp = idx.fingerprint(&1);
        idx.compute(1, fp, &unit_weigh, &noop_atomic, |_| ComputeOp::Write(1));
        let e = idx.get(&1, fp).unwrap();
        e.retire();
        assert!(idx.snapshot().is_empty());
    }
}
