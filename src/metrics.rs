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

//! Statistics recording: a pluggable `stats_recorder` construction option
//! with noop, in-process counter, and custom variants.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A point-in-time snapshot returned by [`Cache::stats`](crate::cache::Cache::stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub eviction_weight: u64,
    pub expirations: u64,
    pub replacements: u64,
    pub invalidations: u64,
    pub load_successes: u64,
    pub load_failures: u64,
}

impl Stats {
    /// `hits / (hits + misses)`, `0.0` if there have been no lookups.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Recording interface implemented by each stats-recorder variant.
///
/// Deletion causes map to eviction stats iff the cause is `Overflow` or
/// `Expiration`; callers of `record_eviction` are expected to already have
/// filtered on cause before calling it.
pub trait StatsRecorder: Send + Sync + 'static {
    fn record_hits(&self, n: u64);
    fn record_misses(&self, n: u64);
    fn record_eviction(&self, weight: u64);
    fn record_expiration(&self, weight: u64);
    fn record_replacement(&self);
    fn record_invalidation(&self);
    fn record_load_success(&self, duration: Duration);
    fn record_load_failure(&self, duration: Duration);
    fn snapshot(&self) -> Stats;
}

/// Discards everything. `Cache::is_recording_stats` is `false` for this
/// recorder.
#[derive(Debug, Default)]
pub struct NoopStatsRecorder;

impl StatsRecorder for NoopStatsRecorder {
    fn record_hits(&self, _n: u64) {}
    fn record_misses(&self, _n: u64) {}
    fn record_eviction(&self, _weight: u64) {}
    fn record_expiration(&self, _weight: u64) {}
    fn record_replacement(&self) {}
    fn record_invalidation(&self) {}
    fn record_load_success(&self, _duration: Duration) {}
    fn record_load_failure(&self, _duration: Duration) {}
    fn snapshot(&self) -> Stats {
        Stats::default()
    }
}

/// In-process atomic counters, additionally mirrored to the `metrics` crate's
/// global recorder so external scrapers see the same numbers.
#[derive(Debug, Default)]
pub struct CounterStatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    eviction_weight: AtomicU64,
    expirations: AtomicU64,
    replacements: AtomicU64,
    invalidations: AtomicU64,
    load_successes: AtomicU64,
    load_failures: AtomicU64,
}

impl StatsRecorder for CounterStatsRecorder {
    fn record_hits(&self, n: u64) {
        self.hits.fetch_add(n, Ordering::Relaxed);
        metrics::counter!("vestibule_hits").increment(n);
    }

    fn record_misses(&self, n: u64) {
        self.misses.fetch_add(n, Ordering::Relaxed);
        metrics::counter!("vestibule_misses").increment(n);
    }

    fn record_eviction(&self, weight: u64) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        self.eviction_weight.fetch_add(weight, Ordering::Relaxed);
        metrics::counter!("vestibule_evictions").increment(1);
    }

    fn record_expiration(&self, weight: u64) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
        self.eviction_weight.fetch_add(weight, Ordering::Relaxed);
        metrics::counter!("vestibule_expirations").increment(1);
    }

    fn record_replacement(&self) {
        self.replacements.fetch_add(1, Ordering::Relaxed);
    }

    fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    fn record_load_success(&self, duration: Duration) {
        self.load_successes.fetch_add(1, Ordering::Relaxed);
        metrics::histogram!("vestibule_load_duration_seconds").record(duration.as_secs_f64());
    }

    fn record_load_failure(&self, duration: Duration) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
        let _ = duration;
    }

    fn snapshot(&self) -> Stats {
        Stats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            eviction_weight: self.eviction_weight.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            replacements: self.replacements.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            load_successes: self.load_successes.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_ratio_of_empty_stats_is_zero() {
        assert_eq!(Stats::default().hit_ratio(), 0.0);
    }

    #[test]
    fn counter_recorder_accumulates() {
        let recorder = CounterStatsRecorder::default();
        recorder.record_hits(3);
        recorder.record_misses(1);
        let snap = recorder.snapshot();
        assert_eq!(snap.hits, 3);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.hit_ratio(), 0.75);
    }
}
