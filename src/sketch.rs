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

//! Count-min frequency sketch with aging, backed by `cmsketch`.

use cmsketch::CountMinSketch8;

/// Thin wrapper over `cmsketch::CountMinSketch8`: the 8-bit-counter,
/// self-aging count-min sketch the crate provides. `capacity` sizes the
/// sketch the same way it sizes the Small/Main/Ghost queues; the caller is
/// responsible for capping it to something finite before an unbounded cache
/// (`capacity == u64::MAX`) would otherwise ask for a sketch sized to match.
pub struct FrequencySketch {
    sketch: CountMinSketch8<u64>,
}

impl FrequencySketch {
    /// `capacity` is the cache's maximum size/weight (or a capped stand-in
    /// for it); the sketch scales its internal width from this value.
    pub fn new(capacity: u64) -> Self {
        Self { sketch: CountMinSketch8::new(capacity.max(1) as usize) }
    }

    /// Estimated access frequency, `0..=15` (the sketch itself tracks 8-bit
    /// counters; callers only ever compare against the low thresholds `1`
    /// and `2`, so the wider range costs nothing extra).
    pub fn frequency(&self, fingerprint: u64) -> u8 {
        self.sketch.estimate(&fingerprint)
    }

    /// Bumps `fingerprint`'s counters; aging is handled internally by the
    /// sketch once its sample threshold is reached.
    pub fn increment(&mut self, fingerprint: u64) {
        self.sketch.increment(&fingerprint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_starts_at_zero() {
        let sketch = FrequencySketch::new(1000);
        assert_eq!(sketch.frequency(42), 0);
    }

    #[test]
    fn increment_raises_frequency() {
        let mut sketch = FrequencySketch::new(1000);
        sketch.increment(42);
        assert!(sketch.frequency(42) >= 1);
    }

    #[test]
    fn frequency_does_not_grow_unboundedly() {
        let mut sketch = FrequencySketch::new(16);
        for _ in 0..10_000 {
            sketch.increment(7);
        }
        // Whatever the sketch's internal ceiling and aging schedule, a
        // heavily-hammered key's estimate must stay within counter range.
        assert!(sketch.frequency(7) <= u8::MAX);
    }

    #[test]
    fn distinct_keys_are_not_confused_by_a_fresh_sketch() {
        let mut sketch = FrequencySketch::new(1000);
        sketch.increment(1);
        assert!(sketch.frequency(1) >= sketch.frequency(2));
    }
}
