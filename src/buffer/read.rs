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

//! Striped, lossy read buffer.
//!
//! No unsafe, a short-held `parking_lot::Mutex` per stripe rather than a
//! hand-rolled lock-free ring. Overflow on a contended stripe is dropped
//! rather than blocked on, which is what makes the buffer "lossy": a
//! dropped access record costs the policy a little precision, not
//! correctness.

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::entry::EntryData;

const SLOTS_PER_STRIPE: usize = 16;

struct Stripe<K, V> {
    slots: Mutex<Vec<Arc<EntryData<K, V>>>>,
}

impl<K, V> Stripe<K, V> {
    fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::with_capacity(SLOTS_PER_STRIPE)),
        }
    }
}

/// `P` stripes, each holding up to `SLOTS_PER_STRIPE` pending access records.
pub struct ReadBuffer<K, V> {
    stripes: Vec<Stripe<K, V>>,
    mask: usize,
    next_stripe: AtomicUsize,
}

thread_local! {
    static STRIPE_HINT: Cell<Option<usize>> = const { Cell::new(None) };
}

impl<K, V> ReadBuffer<K, V> {
    /// `parallelism` is rounded up to a power of two stripe count.
    pub fn new(parallelism: usize) -> Self {
        let stripes = parallelism.max(1).next_power_of_two();
        Self {
            stripes: (0..stripes).map(|_| Stripe::new()).collect(),
            mask: stripes - 1,
            next_stripe: AtomicUsize::new(0),
        }
    }

    fn stripe_index(&self) -> usize {
        STRIPE_HINT.with(|hint| {
            if let Some(i) = hint.get() {
                return i & self.mask;
            }
            let i = self.next_stripe.fetch_add(1, Ordering::Relaxed);
            hint.set(Some(i));
            i & self.mask
        })
    }

    /// Records an access. Lossy: if the stripe's lock is contended or its
    /// slot vector is full, the record is silently dropped.
    pub fn push(&self, entry: Arc<EntryData<K, V>>) {
        let idx = self.stripe_index();
        if let Some(mut slots) = self.stripes[idx].slots.try_lock() {
            if slots.len() < SLOTS_PER_STRIPE {
                slots.push(entry);
            }
        }
    }

    /// Drains every stripe. Only the maintenance loop calls this, under the
    /// single policy lock.
    pub fn drain(&self, out: &mut Vec<Arc<EntryData<K, V>>>) {
        for stripe in &self.stripes {
            let mut slots = stripe.slots.lock();
            out.append(&mut slots);
        }
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stripe_count_rounds_up_to_power_of_two() {
        let buf: ReadBuffer<u64, u64> = ReadBuffer::new(6);
        assert_eq!(buf.stripe_count(), 8);
    }

    #[test]
    fn drain_collects_pushed_records() {
        let buf: ReadBuffer<u64, u64> = ReadBuffer::new(4);
        for i in 0..4u64 {
            buf.push(EntryData::new(i, i, i, 1));
        }
        let mut out = Vec::new();
        buf.drain(&mut out);
        assert_eq!(out.len(), 4);
        let mut drained = Vec::new();
        buf.drain(&mut drained);
        assert!(drained.is_empty());
    }

    #[test]
    fn overflow_beyond_slots_per_stripe_is_dropped() {
        let buf: ReadBuffer<u64, u64> = ReadBuffer::new(1);
        for i in 0..(SLOTS_PER_STRIPE as u64 * 2) {
            buf.push(EntryData::new(i, i, i, 1));
        }
        let mut out = Vec::new();
        buf.drain(&mut out);
        assert_eq!(out.len(), SLOTS_PER_STRIPE);
    }
}
