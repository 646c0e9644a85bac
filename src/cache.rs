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

//! The public facade.
//!
//! `Cache<K, V>` is monomorphized to the S3-FIFO eviction policy and the
//! hash-table index rather than staying generic over eviction strategy —
//! this crate has one policy, not a pluggable set, so extra type parameters
//! for eviction/indexer strategy would be dead weight (see DESIGN.md).

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::buffer::{read::ReadBuffer, write};
use crate::buffer::Task;
use crate::clock::{Clock, SystemClock};
use crate::entry::{ComputeOp, DeletionCause, DeletionEvent, EntryData, ExpireEvent, Expiry};
use crate::error::ConfigError;
use crate::eviction::Policy;
use crate::executor::{Executor, ThreadExecutor};
use crate::expire::{fixed::FixedExpireQueue, wheel::TimerWheel, ExpireStructure};
use crate::index::{ComputeOutcome, Index};
use crate::metrics::{CounterStatsRecorder, NoopStatsRecorder, Stats, StatsRecorder};

/// Builds a [`Cache`] from its construction options.
pub struct CacheBuilder<K, V> {
    maximum_size: Option<u64>,
    maximum_weight: Option<u64>,
    weigher: Option<Arc<dyn Fn(&K, &V) -> u32 + Send + Sync>>,
    initial_capacity: usize,
    shard_count: usize,
    read_buffer_stripes: usize,
    write_buffer_capacity: usize,
    expiry: Expiry<K, V>,
    clock: Option<Arc<dyn Clock>>,
    executor: Option<Arc<dyn Executor>>,
    stats_recorder: Option<Arc<dyn StatsRecorder>>,
    stats_enabled: bool,
    on_deletion: Option<Arc<dyn Fn(DeletionEvent<K, V>) + Send + Sync>>,
    on_atomic_deletion: Option<Arc<dyn Fn(&DeletionEvent<K, V>) + Send + Sync>>,
    eviction_rng_seed: Option<u64>,
}

impl<K, V> CacheBuilder<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            maximum_size: None,
            maximum_weight: None,
            weigher: None,
            initial_capacity: 0,
            shard_count: 64,
            read_buffer_stripes: std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4),
            write_buffer_capacity: 2048,
            expiry: Expiry::Noop,
            clock: None,
            executor: None,
            stats_recorder: None,
            stats_enabled: false,
            on_deletion: None,
            on_atomic_deletion: None,
            eviction_rng_seed: None,
        }
    }

    pub fn maximum_size(mut self, n: u64) -> Self {
        self.maximum_size = Some(n);
        self
    }

    pub fn maximum_weight(mut self, n: u64) -> Self {
        self.maximum_weight = Some(n);
        self
    }

    pub fn weigher<F>(mut self, f: F) -> Self
    where
        F: Fn(&K, &V) -> u32 + Send + Sync + 'static,
    {
        self.weigher = Some(Arc::new(f));
        self
    }

    pub fn initial_capacity(mut self, n: usize) -> Self {
        self.initial_capacity = n;
        self
    }

    pub fn shard_count(mut self, n: usize) -> Self {
        self.shard_count = n;
        self
    }

    pub fn read_buffer_stripes(mut self, n: usize) -> Self {
        self.read_buffer_stripes = n;
        self
    }

    pub fn write_buffer_capacity(mut self, n: usize) -> Self {
        self.write_buffer_capacity = n;
        self
    }

    pub fn expire_after_write(mut self, d: Duration) -> Self {
        self.expiry = Expiry::FixedWrite(d);
        self
    }

    pub fn expire_after_access(mut self, d: Duration) -> Self {
        self.expiry = Expiry::FixedAccess(d);
        self
    }

    pub fn expire_variable<F>(mut self, f: F) -> Self
    where
        F: Fn(&K, &V, ExpireEvent) -> Option<Duration> + Send + Sync + 'static,
    {
        self.expiry = Expiry::Variable(Arc::new(f));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Enables the in-process atomic counters, mirrored to the `metrics`
    /// crate's global recorder.
    pub fn record_stats(mut self) -> Self {
        self.stats_recorder = Some(Arc::new(CounterStatsRecorder::default()));
        self.stats_enabled = true;
        self
    }

    pub fn stats_recorder(mut self, recorder: Arc<dyn StatsRecorder>) -> Self {
        self.stats_recorder = Some(recorder);
        self.stats_enabled = true;
        self
    }

    pub fn on_deletion<F>(mut self, f: F) -> Self
    where
        F: Fn(DeletionEvent<K, V>) + Send + Sync + 'static,
    {
        self.on_deletion = Some(Arc::new(f));
        self
    }

    pub fn on_atomic_deletion<F>(mut self, f: F) -> Self
    where
        F: Fn(&DeletionEvent<K, V>) + Send + Sync + 'static,
    {
        self.on_atomic_deletion = Some(Arc::new(f));
        self
    }

    pub fn eviction_rng_seed(mut self, seed: u64) -> Self {
        self.eviction_rng_seed = Some(seed);
        self
    }

    /// Fallible construction: validates the configuration and reports a
    /// [`ConfigError`] rather than panicking.
    pub fn try_build(self) -> Result<Cache<K, V>, ConfigError> {
        if self.maximum_size.is_some() && self.maximum_weight.is_some() {
            return Err(ConfigError::ConflictingCapacityBounds);
        }
        if self.maximum_weight.is_some() && self.weigher.is_none() {
            return Err(ConfigError::MissingWeigher);
        }
        if self.weigher.is_some() && self.maximum_size.is_none() && self.maximum_weight.is_none() {
            return Err(ConfigError::UnusedWeigher);
        }
        if self.maximum_size == Some(0) || self.maximum_weight == Some(0) {
            return Err(ConfigError::NonPositiveCapacity);
        }
        if self.shard_count == 0 || !self.shard_count.is_power_of_two() {
            return Err(ConfigError::InvalidShardCount);
        }

        let max_weight = self.maximum_weight.or(self.maximum_size).unwrap_or(u64::MAX);
        let seed = self.eviction_rng_seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0)
        });
        let expire_structure = if self.expiry.is_noop() {
            ExpireStructure::None
        } else if self.expiry.is_fixed() {
            ExpireStructure::Fixed(FixedExpireQueue::new())
        } else {
            ExpireStructure::Variable(TimerWheel::new())
        };
        let policy = Policy::new(max_weight, expire_structure, seed);
        let (write_tx, write_rx) = write::channel(self.write_buffer_capacity);

        Ok(Cache {
            index: Index::new(self.shard_count, self.initial_capacity),
            read_buffer: ReadBuffer::new(self.read_buffer_stripes),
            write_tx,
            write_rx,
            policy: Mutex::new(policy),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
            executor: self.executor.unwrap_or_else(|| Arc::new(ThreadExecutor)),
            stats: self.stats_recorder.unwrap_or_else(|| Arc::new(NoopStatsRecorder)),
            stats_enabled: self.stats_enabled,
            weigher: self.weigher,
            expiry: self.expiry,
            on_deletion: self.on_deletion,
            on_atomic_deletion: self.on_atomic_deletion,
            configured_max: AtomicU64::new(max_weight),
        })
    }

    /// Convenience over [`try_build`](Self::try_build) for call sites that
    /// would just panic on a `ConfigError` anyway (tests, fixed startup
    /// configuration).
    pub fn build(self) -> Cache<K, V> {
        self.try_build().expect("invalid vestibule cache configuration")
    }
}

impl<K, V> Default for CacheBuilder<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// The cache facade. Cloning is not supported; share via `Arc<Cache<K, V>>`.
pub struct Cache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    index: Index<K, V>,
    read_buffer: ReadBuffer<K, V>,
    write_tx: flume::Sender<Task<K, V>>,
    write_rx: flume::Receiver<Task<K, V>>,
    policy: Mutex<Policy<K, V>>,
    clock: Arc<dyn Clock>,
    executor: Arc<dyn Executor>,
    stats: Arc<dyn StatsRecorder>,
    stats_enabled: bool,
    weigher: Option<Arc<dyn Fn(&K, &V) -> u32 + Send + Sync>>,
    expiry: Expiry<K, V>,
    on_deletion: Option<Arc<dyn Fn(DeletionEvent<K, V>) + Send + Sync>>,
    on_atomic_deletion: Option<Arc<dyn Fn(&DeletionEvent<K, V>) + Send + Sync>>,
    configured_max: AtomicU64,
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn builder() -> CacheBuilder<K, V> {
        CacheBuilder::new()
    }

    /// Returns the live value for `key`, if any, recording a hit or miss.
    pub fn get_if_present(&self, key: &K) -> Option<V> {
        let fp = self.index.fingerprint(key);
        match self.index.get(key, fp) {
            Some(entry) => {
                self.stats.record_hits(1);
                self.read_buffer.push(entry.clone());
                if self.expiry.refreshes_on_access() {
                    if let Some(d) = self.expiry.duration_for(&entry.key, &entry.value, ExpireEvent::Access) {
                        entry.set_expire_at(self.clock.now().saturating_add(d.as_nanos() as i64));
                    }
                    self.push_task(Task::Update(entry.clone()));
                }
                self.maybe_maintain();
                Some(entry.value.clone())
            }
            None => {
                self.stats.record_misses(1);
                None
            }
        }
    }

    /// `set(k,v)` — unconditional insert; fires Replacement if one occurred.
    pub fn set(&self, key: K, value: V) -> Arc<EntryData<K, V>> {
        self.run_compute(key, move |_| ComputeOp::Write(value))
            .expect("a Write op always yields a live entry")
    }

    /// `set_if_absent(k,v)` — `None` if a live entry was already present.
    pub fn set_if_absent(&self, key: K, value: V) -> Option<Arc<EntryData<K, V>>> {
        self.run_compute(key, move |existing| match existing {
            Some(_) => ComputeOp::Cancel,
            None => ComputeOp::Write(value),
        })
    }

    /// `fn` runs at most once, under the shard lock, and a panic inside it
    /// leaves the cache state exactly as it was.
    pub fn compute<F>(&self, key: K, f: F) -> Option<Arc<EntryData<K, V>>>
    where
        F: FnOnce(Option<(&K, &V)>) -> ComputeOp<V>,
    {
        self.run_compute(key, |existing| f(existing.map(|e| (&e.key, &e.value))))
    }

    /// `fn` is never invoked when a live entry already exists.
    pub fn compute_if_absent<F>(&self, key: K, f: F) -> Option<Arc<EntryData<K, V>>>
    where
        F: FnOnce(&K) -> ComputeOp<V>,
    {
        let key_for_closure = key.clone();
        self.run_compute(key, move |existing| match existing {
            Some(_) => ComputeOp::Cancel,
            None => f(&key_for_closure),
        })
    }

    /// `compute_if_present(k, fn)` — `fn` is only invoked when a live entry
    /// exists.
    pub fn compute_if_present<F>(&self, key: K, f: F) -> Option<Arc<EntryData<K, V>>>
    where
        F: FnOnce(&K, &V) -> ComputeOp<V>,
    {
        self.run_compute(key, move |existing| match existing {
            Some(e) => f(&e.key, &e.value),
            None => ComputeOp::Cancel,
        })
    }

    /// `invalidate(k)`.
    pub fn invalidate(&self, key: &K) {
        let fp = self.index.fingerprint(key);
        if let Some(removed) = self.index.remove(key, fp) {
            self.push_task(Task::Invalidate(removed));
            self.maybe_maintain();
        }
    }

    /// `invalidate_all()`. The index is cleared synchronously, so
    /// `estimated_size()` reads `0` immediately; policy/timer bookkeeping
    /// for the removed entries drains on the next maintenance pass.
    pub fn invalidate_all(&self) {
        let drained = self.index.clear();
        for entry in drained {
            entry.retire();
            self.push_task(Task::Invalidate(entry));
        }
        self.maybe_maintain();
    }

    /// `clean_up()` — forces a synchronous maintenance pass.
    pub fn clean_up(&self) {
        let mut policy = self.policy.lock();
        self.run_maintenance(&mut policy);
    }

    /// A weakly-consistent, non-restartable snapshot. Taken shard-by-shard
    /// under each shard's lock, so no retired entry is ever included, though
    /// no single global instant is implied. Eagerly materialized rather than
    /// a true zero-copy lazy walk, to avoid holding a shard lock across
    /// iterator `next()` calls (which risks deadlock against a concurrent
    /// `compute` from the same thread).
    pub fn all(&self) -> impl Iterator<Item = (K, V)> + '_ {
        self.index.snapshot().into_iter().map(|e| (e.key.clone(), e.value.clone()))
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.index.snapshot().into_iter().map(|e| e.key.clone())
    }

    pub fn values(&self) -> impl Iterator<Item = V> + '_ {
        self.index.snapshot().into_iter().map(|e| e.value.clone())
    }

    pub fn estimated_size(&self) -> u64 {
        self.index.len() as u64
    }

    pub fn get_maximum(&self) -> Option<u64> {
        match self.configured_max.load(Ordering::SeqCst) {
            u64::MAX => None,
            n => Some(n),
        }
    }

    pub fn set_maximum(&self, n: u64) {
        self.configured_max.store(n, Ordering::SeqCst);
        self.push_task(Task::Resize(n));
        self.maybe_maintain();
    }

    pub fn is_weighted(&self) -> bool {
        self.weigher.is_some()
    }

    pub fn is_recording_stats(&self) -> bool {
        self.stats_enabled
    }

    pub fn stats(&self) -> Stats {
        self.stats.snapshot()
    }

    /// Shared by `set`/`set_if_absent`/`compute`/`compute_if_absent`/
    /// `compute_if_present`: drives the index's atomic compute, computes the
    /// resulting entry's expiry, and enqueues the write-buffer task.
    fn run_compute<F>(&self, key: K, f: F) -> Option<Arc<EntryData<K, V>>>
    where
        F: FnOnce(Option<&Arc<EntryData<K, V>>>) -> ComputeOp<V>,
    {
        let fp = self.index.fingerprint(&key);
        let weigher = &self.weigher;
        let weigh = |k: &K, v: &V| weigher.as_ref().map(|w| w(k, v)).unwrap_or(1);
        let on_atomic = &self.on_atomic_deletion;
        let atomic_fn = |e: &Arc<EntryData<K, V>>, cause: DeletionCause| {
            if let Some(cb) = on_atomic {
                let event = DeletionEvent {
                    key: e.key.clone(),
                    value: e.value.clone(),
                    weight: e.weight,
                    cause,
                };
                cb(&event);
            }
        };

        match self.index.compute(key, fp, &weigh, &atomic_fn, f) {
            ComputeOutcome::NoChange => None,
            ComputeOutcome::Inserted { new, old } => {
                let event = if old.is_some() { ExpireEvent::Update } else { ExpireEvent::Create };
                if let Some(d) = self.expiry.duration_for(&new.key, &new.value, event) {
                    new.set_expire_at(self.clock.now().saturating_add(d.as_nanos() as i64));
                }
                if let Some(old) = old {
                    self.push_task(Task::Replace { old, new: new.clone() });
                } else {
                    self.push_task(Task::Add(new.clone()));
                }
                self.maybe_maintain();
                Some(new)
            }
            ComputeOutcome::Removed(removed) => {
                self.push_task(Task::Invalidate(removed));
                self.maybe_maintain();
                None
            }
        }
    }

    /// Enqueues a policy task, running an inline maintenance pass and
    /// retrying once if the bounded write buffer is full.
    fn push_task(&self, task: Task<K, V>) {
        match self.write_tx.try_send(task) {
            Ok(()) => {}
            Err(flume::TrySendError::Full(task)) => {
                self.clean_up();
                let _ = self.write_tx.try_send(task);
            }
            Err(flume::TrySendError::Disconnected(_)) => {}
        }
    }

    /// Opportunistic, non-blocking maintenance trigger called after every
    /// write. Skips the pass entirely if another thread already holds the
    /// maintenance lock.
    fn maybe_maintain(&self) {
        if let Some(mut policy) = self.policy.try_lock() {
            self.run_maintenance(&mut policy);
        }
    }

    /// The maintenance pass: drain the read buffer, drain the write buffer,
    /// sweep expired entries, then enforce capacity. Executor rescheduling
    /// for deletion notifications is left to `dispatch_deletion` below
    /// rather than folded into this loop.
    fn run_maintenance(&self, policy: &mut Policy<K, V>) {
        tracing::trace!("maintenance pass start");

        let mut reads = Vec::new();
        self.read_buffer.drain(&mut reads);
        for entry in reads {
            if entry.is_alive() {
                policy.touch(&entry);
            }
        }

        while let Ok(task) = self.write_rx.try_recv() {
            match task {
                Task::Add(entry) => {
                    if entry.is_alive() {
                        if entry.has_expiry() {
                            policy.expire.add(entry.clone());
                        }
                        policy.insert(entry);
                    }
                }
                Task::Update(entry) => {
                    if entry.is_alive() {
                        policy.touch(&entry);
                        if self.expiry.is_fixed() {
                            policy.expire.touch(entry.fingerprint);
                        }
                    }
                }
                Task::Replace { old, new } => {
                    policy.remove(&old);
                    if new.is_alive() {
                        if new.has_expiry() {
                            policy.expire.add(new.clone());
                        }
                        policy.insert(new);
                    }
                    self.dispatch_deletion(old, DeletionCause::Replacement);
                }
                Task::Invalidate(entry) => {
                    policy.remove(&entry);
                    self.dispatch_deletion(entry, DeletionCause::Invalidation);
                }
                Task::Expire(entry) => {
                    policy.remove(&entry);
                    self.dispatch_deletion(entry, DeletionCause::Expiration);
                }
                Task::Resize(n) => policy.resize(n),
            }
        }

        let now = self.clock.now();
        for expired in policy.expire.delete_expired(now) {
            self.index.remove(&expired.key, expired.fingerprint);
            policy.remove(&expired);
            self.dispatch_deletion(expired, DeletionCause::Expiration);
        }

        for (entry, cause) in policy.enforce_capacity() {
            self.index.remove(&entry.key, entry.fingerprint);
            self.dispatch_deletion(entry, cause);
        }

        tracing::trace!("maintenance pass end");
    }

    /// Records stats and fires the async `on_deletion` callback on the
    /// configured executor. Fire-and-forget: the cache does not wait on or
    /// synchronize with the executor.
    fn dispatch_deletion(&self, entry: Arc<EntryData<K, V>>, cause: DeletionCause) {
        match cause {
            DeletionCause::Overflow => self.stats.record_eviction(entry.weight as u64),
            DeletionCause::Expiration => self.stats.record_expiration(entry.weight as u64),
            DeletionCause::Replacement => self.stats.record_replacement(),
            DeletionCause::Invalidation => self.stats.record_invalidation(),
        }
        if let Some(cb) = self.on_deletion.clone() {
            let key = entry.key.clone();
            let value = entry.value.clone();
            let weight = entry.weight;
            self.executor.execute(Box::new(move || {
                cb(DeletionEvent { key, value, weight, cause });
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::executor::InlineExecutor;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    #[test]
    fn set_then_get_hits() {
        let cache: Cache<u64, u64> = CacheBuilder::new().build();
        cache.set(1, 100);
        assert_eq!(cache.get_if_present(&1), Some(100));
        assert_eq!(cache.get_if_present(&2), None);
    }

    #[test]
    fn set_if_absent_rejects_when_present() {
        let cache: Cache<u64, u64> = CacheBuilder::new().build();
        assert!(cache.set_if_absent(1, 1).is_some());
        assert!(cache.set_if_absent(1, 2).is_none());
        assert_eq!(cache.get_if_present(&1), Some(1));
    }

    #[test]
    fn replacing_an_entry_fires_replacement_stat() {
        let cache: Cache<u64, u64> = CacheBuilder::new()
            .executor(Arc::new(InlineExecutor))
            .record_stats()
            .build();
        cache.set(1, 1);
        cache.set(1, 2);
        cache.clean_up();
        assert_eq!(cache.stats().replacements, 1);
        assert_eq!(cache.get_if_present(&1), Some(2));
    }

    #[test]
    fn invalidate_fires_invalidation_stat() {
        let cache: Cache<u64, u64> = CacheBuilder::new()
            .executor(Arc::new(InlineExecutor))
            .record_stats()
            .build();
        cache.set(1, 1);
        cache.invalidate(&1);
        cache.clean_up();
        assert_eq!(cache.stats().invalidations, 1);
        assert_eq!(cache.get_if_present(&1), None);
    }

    /// Unbounded fill followed by half-replace/half-invalidate: hit ratio
    /// and replacement/invalidation counts should land exactly where expected.
    #[test]
    fn scenario_unbounded_fill_then_half_replace_half_invalidate() {
        let cache: Cache<u64, u64> = CacheBuilder::new()
            .executor(Arc::new(InlineExecutor))
            .record_stats()
            .build();
        let n = 50u64;
        for i in 0..n {
            cache.set(i, i);
        }
        for i in 0..n {
            assert_eq!(cache.get_if_present(&i), Some(i));
        }
        for i in n..(2 * n) {
            assert_eq!(cache.get_if_present(&i), None);
        }
        for i in 0..(n / 2) {
            cache.set(i, i + 1000);
        }
        for i in (n / 2)..n {
            cache.invalidate(&i);
        }
        cache.clean_up();

        let stats = cache.stats();
        assert_eq!(stats.replacements, n / 2);
        assert_eq!(stats.invalidations, n / 2);
        assert!((stats.hit_ratio() - 0.5).abs() < 1e-9);
    }

    /// A zero-weight (pinned) entry must survive capacity eviction even
    /// while every other entry churns, and still expires on schedule.
    #[test]
    fn scenario_pinned_entry_survives_capacity_eviction() {
        let clock = Arc::new(FakeClock::new());
        let cache: Cache<u64, u64> = CacheBuilder::new()
            .maximum_weight(10)
            .weigher(|k: &u64, _: &u64| if *k == 4 { 0 } else { 1 })
            .expire_after_write(Duration::from_secs(2))
            .clock(clock.clone())
            .executor(Arc::new(InlineExecutor))
            .record_stats()
            .build();

        for i in 0..10u64 {
            cache.set(i, i);
        }
        cache.clean_up();
        for i in 10..20u64 {
            cache.set(i, i);
        }
        cache.clean_up();

        assert!(cache.get_if_present(&4).is_some(), "pinned entry must survive overflow eviction");

        clock.advance(Duration::from_secs(4).as_nanos() as i64);
        cache.clean_up();

        let stats = cache.stats();
        assert_eq!(stats.expirations, 11);
        assert_eq!(stats.evictions, 9);
    }

    /// `invalidate_all` called concurrently from many threads must leave
    /// the cache empty with no data race.
    #[test]
    fn scenario_concurrent_invalidate_all() {
        let cache: Arc<Cache<u64, u64>> = Arc::new(
            CacheBuilder::new()
                .executor(Arc::new(InlineExecutor))
                .build(),
        );
        for i in 0..1000u64 {
            cache.set(i, i);
        }
        cache.clean_up();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        cache.invalidate_all();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.estimated_size(), 0);
    }

    /// A panic inside a `compute` callback must leave the cache state
    /// untouched, and a subsequent call must succeed normally.
    #[test]
    fn scenario_compute_panic_leaves_state_untouched() {
        let cache: Cache<u64, u64> = CacheBuilder::new().build();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            cache.compute(0, move |_| {
                c.fetch_add(1, AtomicOrdering::SeqCst);
                panic!("callback failure")
            })
        }));
        assert!(result.is_err());
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(cache.get_if_present(&0), None);

        let entry = cache.compute(0, |_| ComputeOp::Write(42));
        assert_eq!(entry.unwrap().value, 42);
        assert_eq!(cache.get_if_present(&0), Some(42));
    }

    #[test]
    fn compute_if_absent_never_invoked_when_present() {
        let cache: Cache<u64, u64> = CacheBuilder::new().build();
        cache.set(1, 1);
        let invoked = Arc::new(AtomicUsize::new(0));
        let i = invoked.clone();
        cache.compute_if_absent(1, move |_| {
            i.fetch_add(1, AtomicOrdering::SeqCst);
            ComputeOp::Write(2)
        });
        assert_eq!(invoked.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(cache.get_if_present(&1), Some(1));
    }

    #[test]
    fn builder_rejects_conflicting_capacity_bounds() {
        let result: Result<Cache<u64, u64>, ConfigError> =
            CacheBuilder::new().maximum_size(10).maximum_weight(10).weigher(|_: &u64, _: &u64| 1).try_build();
        assert!(matches!(result, Err(ConfigError::ConflictingCapacityBounds)));
    }

    #[test]
    fn builder_rejects_maximum_weight_without_weigher() {
        let result: Result<Cache<u64, u64>, ConfigError> = CacheBuilder::new().maximum_weight(10).try_build();
        assert!(matches!(result, Err(ConfigError::MissingWeigher)));
    }

    #[test]
    fn builder_rejects_unused_weigher() {
        let result: Result<Cache<u64, u64>, ConfigError> =
            CacheBuilder::new().weigher(|_: &u64, _: &u64| 1).try_build();
        assert!(matches!(result, Err(ConfigError::UnusedWeigher)));
    }

    #[test]
    fn builder_rejects_non_power_of_two_shard_count() {
        let result: Result<Cache<u64, u64>, ConfigError> = CacheBuilder::new().shard_count(3).try_build();
        assert!(matches!(result, Err(ConfigError::InvalidShardCount)));
    }

    #[test]
    fn all_keys_values_reflect_live_entries_only() {
        let cache: Cache<u64, u64> = CacheBuilder::new().build();
        for i in 0..5u64 {
            cache.set(i, i * 10);
        }
        cache.invalidate(&2);
        cache.clean_up();

        let mut keys: Vec<_> = cache.keys().collect();
        keys.sort_unstable();
        assert_eq!(keys, vec![0, 1, 3, 4]);

        let mut values: Vec<_> = cache.values().collect();
        values.sort_unstable();
        assert_eq!(values, vec![0, 10, 30, 40]);

        assert!(cache.all().all(|(k, v)| v == k * 10));
    }
}
