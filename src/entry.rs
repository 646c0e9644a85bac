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

//! The entry (node) type and its lifecycle companions.
//!
//! `EntryData` is the policy-agnostic base: the S3-FIFO queues and the timer
//! wheel never touch `key`/`value` directly, only the atomic bookkeeping
//! fields here plus an `Arc` clone for storage.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// `expire_at` sentinel meaning "never expires".
pub const NO_EXPIRY: i64 = i64::MAX;

/// Which S3-FIFO queue (if any) currently owns the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Unassigned,
    Small,
    Main,
    /// Retired: removed from the index, may still be briefly reachable
    /// through a stale `Arc` held by a read-buffer record.
    Retired,
}

/// The unit the cache owns. One `EntryData` per live key; shared via `Arc`
/// between the index shard, the policy queues, and the expiration structure.
pub struct EntryData<K, V> {
    pub key: K,
    pub value: V,
    pub fingerprint: u64,
    pub weight: u32,
    expire_at: AtomicI64,
    alive: AtomicBool,
    freq: AtomicU8,
    state: AtomicU8,
}

impl<K, V> EntryData<K, V> {
    pub fn new(key: K, value: V, fingerprint: u64, weight: u32) -> Arc<Self> {
        Arc::new(Self {
            key,
            value,
            fingerprint,
            weight,
            expire_at: AtomicI64::new(NO_EXPIRY),
            alive: AtomicBool::new(true),
            freq: AtomicU8::new(0),
            state: AtomicU8::new(QueueState::Unassigned as u8),
        })
    }

    /// `0` means pinned: counted for iteration/notification purposes but
    /// never selected as an eviction victim.
    pub fn is_pinned(&self) -> bool {
        self.weight == 0
    }

    pub fn expire_at(&self) -> i64 {
        self.expire_at.load(Ordering::Acquire)
    }

    pub fn set_expire_at(&self, at: i64) {
        self.expire_at.store(at, Ordering::Release);
    }

    pub fn has_expiry(&self) -> bool {
        self.expire_at() != NO_EXPIRY
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn retire(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub fn freq_snapshot(&self) -> u8 {
        self.freq.load(Ordering::Relaxed)
    }

    pub fn set_freq_snapshot(&self, freq: u8) {
        self.freq.store(freq.min(3), Ordering::Relaxed);
    }

    pub fn state(&self) -> QueueState {
        match self.state.load(Ordering::Relaxed) {
            1 => QueueState::Small,
            2 => QueueState::Main,
            3 => QueueState::Retired,
            _ => QueueState::Unassigned,
        }
    }

    pub fn set_state(&self, state: QueueState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }
}

/// The outcome a `compute` callback selects.
pub enum ComputeOp<V> {
    /// No mutation: the cache state is left exactly as it was.
    Cancel,
    /// Insert (if absent) or replace (if present) with the given value.
    Write(V),
    /// Remove the live entry, if any.
    Invalidate,
}

/// Carried by `on_deletion`/`on_atomic_deletion` callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionCause {
    Invalidation,
    Replacement,
    Overflow,
    Expiration,
}

impl DeletionCause {
    /// Overflow and Expiration count toward eviction stats; Invalidation and
    /// Replacement are ordinary removals the caller asked for.
    pub fn is_eviction(self) -> bool {
        matches!(self, DeletionCause::Overflow | DeletionCause::Expiration)
    }
}

pub struct DeletionEvent<K, V> {
    pub key: K,
    pub value: V,
    pub weight: u32,
    pub cause: DeletionCause,
}

/// Distinguishes why an expiry duration is being (re)computed, for the
/// `Variable` expiry calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpireEvent {
    Create,
    Update,
    Access,
}

/// The expiry calculator construction option: none, a fixed duration keyed
/// on write or on access, or a per-entry variable function that can
/// distinguish creation/update/access.
#[derive(Clone)]
pub enum Expiry<K, V> {
    Noop,
    FixedWrite(Duration),
    FixedAccess(Duration),
    Variable(Arc<dyn Fn(&K, &V, ExpireEvent) -> Option<Duration> + Send + Sync>),
}

impl<K, V> Expiry<K, V> {
    pub fn is_noop(&self) -> bool {
        matches!(self, Expiry::Noop)
    }

    /// Whether this calculator uses the fixed-duration queues (vs. the
    /// variable timer wheel).
    pub fn is_fixed(&self) -> bool {
        matches!(self, Expiry::FixedWrite(_) | Expiry::FixedAccess(_))
    }

    pub fn refreshes_on_access(&self) -> bool {
        matches!(self, Expiry::FixedAccess(_))
    }

    pub fn duration_for(&self, key: &K, value: &V, event: ExpireEvent) -> Option<Duration> {
        match self {
            Expiry::Noop => None,
            Expiry::FixedWrite(d) => match event {
                ExpireEvent::Access => None,
                _ => Some(*d),
            },
            Expiry::FixedAccess(d) => Some(*d),
            Expiry::Variable(f) => f(key, value, event),
        }
    }
}
