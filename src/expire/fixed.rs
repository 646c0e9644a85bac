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

//! Fixed-duration (write- or access-based) expiration queue: a single
//! queue ordered by insertion time, represented here as a `VecDeque` since
//! membership changes are always at an end except for the occasional
//! explicit `remove` on invalidate/replace.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::entry::EntryData;

pub struct FixedExpireQueue<K, V> {
    queue: VecDeque<Arc<EntryData<K, V>>>,
}

impl<K, V> FixedExpireQueue<K, V> {
    pub fn new() -> Self {
        Self { queue: VecDeque::new() }
    }

    /// Links at the tail. `Set` calls this; so does an access-based refresh.
    pub fn push_tail(&mut self, entry: Arc<EntryData<K, V>>) {
        self.queue.push_back(entry);
    }

    /// Moves the entry with this fingerprint to the tail, if present. Used
    /// by the maintenance pass to refresh access-based expiry.
    pub fn move_to_tail(&mut self, fingerprint: u64) {
        if let Some(pos) = self.queue.iter().position(|e| e.fingerprint == fingerprint) {
            let entry = self.queue.remove(pos).unwrap();
            self.queue.push_back(entry);
        }
    }

    pub fn remove(&mut self, fingerprint: u64) {
        if let Some(pos) = self.queue.iter().position(|e| e.fingerprint == fingerprint) {
            self.queue.remove(pos);
        }
    }

    /// Walks from the head while `expire_at <= now`, stopping at the first
    /// entry whose deadline is still in the future.
    pub fn scan_expired(&mut self, now: i64) -> Vec<Arc<EntryData<K, V>>> {
        let mut expired = Vec::new();
        while let Some(front) = self.queue.front() {
            if front.expire_at() <= now {
                expired.push(self.queue.pop_front().unwrap());
            } else {
                break;
            }
        }
        expired
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<K, V> Default for FixedExpireQueue<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(fp: u64, expire_at: i64) -> Arc<EntryData<u64, u64>> {
        let e = EntryData::new(fp, fp, fp, 1);
        e.set_expire_at(expire_at);
        e
    }

    #[test]
    fn scan_expired_stops_at_first_live_entry() {
        let mut q: FixedExpireQueue<u64, u64> = FixedExpireQueue::new();
        q.push_tail(entry(1, 10));
        q.push_tail(entry(2, 20));
        q.push_tail(entry(3, 30));

        let expired = q.scan_expired(20);
        assert_eq!(expired.iter().map(|e| e.fingerprint).collect::<Vec<_>>(), vec![1, 2]);
        assert!(!q.is_empty());
    }

    #[test]
    fn move_to_tail_reorders() {
        let mut q: FixedExpireQueue<u64, u64> = FixedExpireQueue::new();
        q.push_tail(entry(1, 10));
        q.push_tail(entry(2, 20));
        q.move_to_tail(1);
        let expired = q.scan_expired(10);
        assert!(expired.is_empty());
    }
}
