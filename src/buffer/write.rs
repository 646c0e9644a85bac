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

//! Bounded MPSC write buffer.
//!
//! Built on `flume`. When the channel is full, the producer is expected to
//! run an inline maintenance pass and retry rather than drop the task
//! (policy state, unlike a read-buffer record, is not optional): see
//! `Cache::push_task` in `cache.rs`, which owns both ends of the channel and
//! is the only place that can run maintenance.

use std::sync::Arc;

use crate::entry::EntryData;

/// A policy task: an explicit queue so that index mutation (fast, per-shard)
/// and policy mutation (single-writer, maintenance-only) can be decoupled.
pub enum Task<K, V> {
    Add(Arc<EntryData<K, V>>),
    /// An access strong enough to need policy-level bookkeeping beyond what
    /// the read buffer records (explicit `touch`, access-based expiry reset).
    Update(Arc<EntryData<K, V>>),
    Replace {
        old: Arc<EntryData<K, V>>,
        new: Arc<EntryData<K, V>>,
    },
    Invalidate(Arc<EntryData<K, V>>),
    /// A variable-expiry entry the wheel already reported as expired before
    /// maintenance got to it (e.g. discovered while the wheel was rescanned
    /// by a concurrent `clean_up()`); kept distinct from eviction so the
    /// deletion cause is never ambiguous.
    Expire(Arc<EntryData<K, V>>),
    /// Produced by `Cache::set_maximum`.
    Resize(u64),
}

/// Channel pair for the write buffer; `capacity` should comfortably exceed
/// per-maintenance-pass throughput so draining is cheap, but must stay bounded.
pub fn channel<K, V>(capacity: usize) -> (flume::Sender<Task<K, V>>, flume::Receiver<Task<K, V>>) {
    flume::bounded(capacity.max(1))
}
