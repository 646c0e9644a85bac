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

//! Expiration structures. Exactly one of the two is active at a time,
//! selected by the cache's `Expiry` construction option.

pub mod fixed;
pub mod wheel;

use std::sync::Arc;

use crate::entry::EntryData;
use fixed::FixedExpireQueue;
use wheel::TimerWheel;

pub enum ExpireStructure<K, V> {
    None,
    Fixed(FixedExpireQueue<K, V>),
    Variable(TimerWheel<K, V>),
}

impl<K, V> ExpireStructure<K, V> {
    pub fn add(&mut self, entry: Arc<EntryData<K, V>>) {
        match self {
            ExpireStructure::None => {}
            ExpireStructure::Fixed(q) => q.push_tail(entry),
            ExpireStructure::Variable(w) => w.add(entry),
        }
    }

    pub fn remove(&mut self, fingerprint: u64) {
        match self {
            ExpireStructure::None => {}
            ExpireStructure::Fixed(q) => q.remove(fingerprint),
            ExpireStructure::Variable(w) => w.remove(fingerprint),
        }
    }

    pub fn touch(&mut self, fingerprint: u64) {
        if let ExpireStructure::Fixed(q) = self {
            q.move_to_tail(fingerprint);
        }
    }

    pub fn delete_expired(&mut self, now: i64) -> Vec<Arc<EntryData<K, V>>> {
        match self {
            ExpireStructure::None => Vec::new(),
            ExpireStructure::Fixed(q) => q.scan_expired(now),
            ExpireStructure::Variable(w) => w.delete_expired(now),
        }
    }
}
