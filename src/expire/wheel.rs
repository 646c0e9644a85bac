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

//! Hierarchical timer wheel for variable expirations.
//!
//! Five levels, each with 64 sentinel-free buckets; a bucket's span is
//! `1 << SHIFTS[level]` nanoseconds, chosen so bucket index is
//! `(deadline >> shift) & 63`. The spans land at roughly {1.07s, 1m8s,
//! 1h13m, 1d5h, 6d23h} — any monotone-increasing power-of-two sequence of
//! spans works equally well.
//!
//! `delete_expired` takes the simpler of two valid implementations: a full
//! bucket rescan every call (`O(levels * buckets)`) rather than tracking
//! exactly which bucket ranges were crossed since the last call. Entries
//! that are not yet due are reinserted via `add`, which naturally cascades
//! them to the correct lower level — the same externally-observable
//! behavior as an incremental wheel, traded for simplicity since this
//! crate is not benchmarked for wheel-scan cost.

use std::collections::HashMap;
use std::sync::Arc;

use crate::entry::EntryData;

const LEVELS: usize = 5;
const BUCKET_BITS: u32 = 6;
const BUCKETS: usize = 1 << BUCKET_BITS;
const BUCKET_MASK: u64 = (BUCKETS as u64) - 1;
const SHIFTS: [u32; LEVELS] = [30, 36, 42, 48, 54];

struct Location {
    level: usize,
    bucket: usize,
}

pub struct TimerWheel<K, V> {
    buckets: Vec<Vec<Arc<EntryData<K, V>>>>,
    index: HashMap<u64, Location>,
    time: i64,
}

impl<K, V> TimerWheel<K, V> {
    pub fn new() -> Self {
        Self {
            buckets: (0..LEVELS * BUCKETS).map(|_| Vec::new()).collect(),
            index: HashMap::new(),
            time: 0,
        }
    }

    fn slot(level: usize, bucket: usize) -> usize {
        level * BUCKETS + bucket
    }

    fn level_for(delay: u64) -> usize {
        for (level, shift) in SHIFTS.iter().enumerate() {
            if delay < (1u64 << shift) {
                return level;
            }
        }
        LEVELS - 1
    }

    /// Links `entry` into the bucket for `entry.expire_at()`. Overwrites any
    /// prior link for the same fingerprint (callers must not double-add).
    pub fn add(&mut self, entry: Arc<EntryData<K, V>>) {
        let deadline = entry.expire_at() as u64;
        let delay = deadline.saturating_sub(self.time.max(0) as u64);
        let level = Self::level_for(delay);
        let bucket = ((deadline >> SHIFTS[level]) & BUCKET_MASK) as usize;
        let fp = entry.fingerprint;
        self.buckets[Self::slot(level, bucket)].push(entry);
        self.index.insert(fp, Location { level, bucket });
    }

    /// Unlinks the entry for `fingerprint`, if present. No-op otherwise.
    pub fn remove(&mut self, fingerprint: u64) {
        if let Some(loc) = self.index.remove(&fingerprint) {
            let slot = Self::slot(loc.level, loc.bucket);
            self.buckets[slot].retain(|e| e.fingerprint != fingerprint);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Advances the wheel to `now` and returns every entry whose deadline has
    /// passed, sorted by `expire_at` ascending so callers observing several
    /// calls in increasing `now` see a globally deadline-ordered stream.
    pub fn delete_expired(&mut self, now: i64) -> Vec<Arc<EntryData<K, V>>> {
        self.time = now;
        let mut expired = Vec::new();
        for slot in 0..self.buckets.len() {
            if self.buckets[slot].is_empty() {
                continue;
            }
            let pending = std::mem::take(&mut self.buckets[slot]);
            for entry in pending {
                self.index.remove(&entry.fingerprint);
                if entry.expire_at() <= now {
                    expired.push(entry);
                } else {
                    self.add(entry);
                }
            }
        }
        expired.sort_by_key(|e| e.expire_at());
        expired
    }
}

impl<K, V> Default for TimerWheel<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
