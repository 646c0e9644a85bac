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

//! S3-FIFO admission and eviction: Small/Main/Ghost queues gated by a
//! frequency sketch.
//!
//! `Policy` keeps a queue-of-handles design but uses plain
//! `VecDeque<Arc<EntryData<K, V>>>` queues rather than an intrusive linked
//! list. Arbitrary-position removal (on `Invalidate`/`Replace`, not on a
//! capacity/ghost decision) is therefore an O(n) scan of the owning queue
//! rather than an O(1) intrusive unlink — a deliberate simplification
//! recorded in DESIGN.md, acceptable since correctness matters far more here
//! than shaving a linear scan off an already-rare code path.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::entry::{DeletionCause, EntryData, QueueState};
use crate::expire::ExpireStructure;
use crate::sketch::FrequencySketch;

/// Small gets roughly 10% of total capacity, the common literature default.
const SMALL_SHARE_PERCENT: u64 = 10;

/// Ceiling on the capacity basis used to size the Small-queue target weight,
/// the ghost set, and the frequency sketch. An unbounded cache (built
/// without `maximum_size`/`maximum_weight`) reports `max_weight ==
/// u64::MAX`; sizing these structures directly off that would overflow the
/// `* 10` used for the 10% share and ask the sketch to allocate for it.
/// Capping the basis keeps every derived size finite while leaving
/// `max_weight` itself exact for capacity enforcement.
const SIZING_CAP: u64 = 1 << 20;

fn sizing_basis(max_weight: u64) -> u64 {
    max_weight.min(SIZING_CAP).max(1)
}

pub struct Policy<K, V> {
    small: VecDeque<Arc<EntryData<K, V>>>,
    main: VecDeque<Arc<EntryData<K, V>>>,
    ghost_queue: VecDeque<u64>,
    ghost_set: HashSet<u64>,
    ghost_capacity: usize,

    small_weight: u64,
    main_weight: u64,
    small_target_weight: u64,
    max_weight: u64,

    sketch: FrequencySketch,
    rng: SmallRng,

    pub expire: ExpireStructure<K, V>,
}

impl<K, V> Policy<K, V> {
    pub fn new(max_weight: u64, expire: ExpireStructure<K, V>, rng_seed: u64) -> Self {
        let basis = sizing_basis(max_weight);
        let small_target_weight = (basis.saturating_mul(SMALL_SHARE_PERCENT) / 100).max(1);
        let ghost_capacity = basis.max(16) as usize;
        Self {
            small: VecDeque::new(),
            main: VecDeque::new(),
            ghost_queue: VecDeque::new(),
            ghost_set: HashSet::new(),
            ghost_capacity,
            small_weight: 0,
            main_weight: 0,
            small_target_weight,
            max_weight,
            sketch: FrequencySketch::new(basis),
            rng: SmallRng::seed_from_u64(rng_seed),
            expire,
        }
    }

    pub fn total_weight(&self) -> u64 {
        self.small_weight + self.main_weight
    }

    pub fn max_weight(&self) -> u64 {
        self.max_weight
    }

    /// `SetMaximum`/`Resize` task.
    pub fn resize(&mut self, new_max: u64) {
        self.max_weight = new_max;
        let basis = sizing_basis(new_max);
        self.small_target_weight = (basis.saturating_mul(SMALL_SHARE_PERCENT) / 100).max(1);
        self.ghost_capacity = basis.max(16) as usize;
        self.sketch = FrequencySketch::new(basis);
    }

    fn ghost_insert(&mut self, fingerprint: u64) {
        if self.ghost_set.insert(fingerprint) {
            self.ghost_queue.push_back(fingerprint);
            if self.ghost_queue.len() > self.ghost_capacity {
                if let Some(old) = self.ghost_queue.pop_front() {
                    self.ghost_set.remove(&old);
                }
            }
        }
    }

    fn ghost_take(&mut self, fingerprint: u64) -> bool {
        if self.ghost_set.remove(&fingerprint) {
            self.ghost_queue.retain(|fp| *fp != fingerprint);
            true
        } else {
            false
        }
    }

    /// `Add` task: land in Main if the key has a ghost (recently-evicted)
    /// entry, else at the head of Small.
    pub fn insert(&mut self, entry: Arc<EntryData<K, V>>) {
        if self.ghost_take(entry.fingerprint) {
            entry.set_state(QueueState::Main);
            self.main_weight += entry.weight as u64;
            self.main.push_back(entry);
        } else {
            entry.set_state(QueueState::Small);
            self.small_weight += entry.weight as u64;
            self.small.push_back(entry);
        }
    }

    /// Read-buffer drain: bump the sketch, and for Main residents move them
    /// to the tail immediately (Small is append-only until eviction).
    pub fn touch(&mut self, entry: &Arc<EntryData<K, V>>) {
        self.sketch.increment(entry.fingerprint);
        if entry.state() == QueueState::Main {
            if let Some(pos) = self.main.iter().position(|e| Arc::ptr_eq(e, entry)) {
                let e = self.main.remove(pos).unwrap();
                self.main.push_back(e);
            }
        }
    }

    /// Invalidate/Replace: drop `entry` from whichever queue currently owns
    /// it (a no-op if it is already retired/unassigned) and unlink its
    /// expiry, if any.
    pub fn remove(&mut self, entry: &Arc<EntryData<K, V>>) {
        match entry.state() {
            QueueState::Small => {
                if let Some(pos) = self.small.iter().position(|e| Arc::ptr_eq(e, entry)) {
                    let removed = self.small.remove(pos).unwrap();
                    self.small_weight -= removed.weight as u64;
                }
            }
            QueueState::Main => {
                if let Some(pos) = self.main.iter().position(|e| Arc::ptr_eq(e, entry)) {
                    let removed = self.main.remove(pos).unwrap();
                    self.main_weight -= removed.weight as u64;
                }
            }
            QueueState::Unassigned | QueueState::Retired => {}
        }
        entry.set_state(QueueState::Retired);
        entry.retire();
        if entry.has_expiry() {
            self.expire.remove(entry.fingerprint);
        }
    }

    /// One Small-queue eviction step: promotes warm tail entries to Main,
    /// returns the first cold one it evicts (ghosted), or `None` once Small
    /// is back under its target weight or the bounded scan is exhausted.
    fn evict_from_small_step(&mut self) -> Option<(Arc<EntryData<K, V>>, DeletionCause)> {
        let max_iterations = self.small.len().saturating_mul(2).max(4);
        for _ in 0..max_iterations {
            if self.small_weight <= self.small_target_weight {
                return None;
            }
            let candidate = self.small.pop_front()?;
            if candidate.is_pinned() {
                self.small.push_back(candidate);
                continue;
            }
            let freq = self.sketch.frequency(candidate.fingerprint);
            self.small_weight -= candidate.weight as u64;
            if freq >= 2 {
                candidate.set_freq_snapshot(freq);
                candidate.set_state(QueueState::Main);
                self.main_weight += candidate.weight as u64;
                self.main.push_back(candidate);
            } else {
                candidate.retire();
                candidate.set_state(QueueState::Retired);
                self.ghost_insert(candidate.fingerprint);
                if candidate.has_expiry() {
                    self.expire.remove(candidate.fingerprint);
                }
                return Some((candidate, DeletionCause::Overflow));
            }
        }
        None
    }

    /// One Main-queue eviction step: warm tail entries (per-entry frequency
    /// snapshot, refreshed on promotion and decremented here) get "another
    /// chance" and are requeued; cold entries are collected into a small
    /// window and an injectable, seedable RNG tiebreaks among them.
    fn evict_from_main_step(&mut self) -> Option<(Arc<EntryData<K, V>>, DeletionCause)> {
        let max_iterations = self.main.len().saturating_mul(5).max(8);
        let mut cold: Vec<Arc<EntryData<K, V>>> = Vec::new();
        for _ in 0..max_iterations {
            let candidate = match self.main.pop_front() {
                Some(c) => c,
                None => break,
            };
            if candidate.is_pinned() {
                self.main.push_back(candidate);
                continue;
            }
            let freq = candidate.freq_snapshot();
            if freq == 0 {
                cold.push(candidate);
                if cold.len() >= 4 {
                    break;
                }
            } else {
                candidate.set_freq_snapshot(freq - 1);
                self.main.push_back(candidate);
            }
        }
        if cold.is_empty() {
            return None;
        }
        let pick = self.rng.gen_range(0..cold.len());
        let victim = cold.swap_remove(pick);
        for leftover in cold {
            self.main.push_back(leftover);
        }
        victim.retire();
        victim.set_state(QueueState::Retired);
        self.main_weight -= victim.weight as u64;
        if victim.has_expiry() {
            self.expire.remove(victim.fingerprint);
        }
        Some((victim, DeletionCause::Overflow))
    }

    fn evict_one(&mut self) -> Option<(Arc<EntryData<K, V>>, DeletionCause)> {
        if self.small_weight > self.small_target_weight {
            if let Some(victim) = self.evict_from_small_step() {
                return Some(victim);
            }
        }
        self.evict_from_main_step()
    }

    /// Evicts until `total_weight() <= max_weight`, or until a bounded
    /// number of consecutive no-progress attempts gives up (e.g. every
    /// remaining entry is pinned).
    pub fn enforce_capacity(&mut self) -> Vec<(Arc<EntryData<K, V>>, DeletionCause)> {
        let mut evicted = Vec::new();
        let mut stall = 0usize;
        while self.total_weight() > self.max_weight {
            match self.evict_one() {
                Some(victim) => {
                    evicted.push(victim);
                    stall = 0;
                }
                None => {
                    stall += 1;
                    if stall > 8 {
                        break;
                    }
                }
            }
        }
        evicted
    }
}
