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

//! Injectable monotonic clock, the cache's `clock` construction option.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// A monotonic nanosecond clock.
///
/// Implementations must never go backwards within the lifetime of a single
/// cache instance; the timer wheel and fixed-expiration queues rely on it.
pub trait Clock: Send + Sync + 'static {
    /// Current time in nanoseconds, monotonic.
    fn now(&self) -> i64;
}

/// The default clock, backed by [`std::time::Instant`].
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        self.origin.elapsed().as_nanos() as i64
    }
}

/// A manually-advanced clock for deterministic tests that advance time
/// explicitly and then call `clean_up()`.
pub struct FakeClock {
    now: AtomicI64,
}

impl FakeClock {
    pub fn new() -> Self {
        Self { now: AtomicI64::new(0) }
    }

    pub fn advance(&self, nanos: i64) {
        self.now.fetch_add(nanos, Ordering::SeqCst);
    }

    pub fn set(&self, nanos: i64) {
        self.now.store(nanos, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_monotonically() {
        let clock = FakeClock::new();
        assert_eq!(clock.now(), 0);
        clock.advance(1_000);
        assert_eq!(clock.now(), 1_000);
        clock.set(5_000);
        assert_eq!(clock.now(), 5_000);
    }
}
