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

use std::collections::HashMap;

use rand::distributions::Distribution;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use vestibule::{Cache, CacheBuilder};
use zipf::ZipfDistribution;

const ITEMS: u64 = 1000;
const ACCESSES: usize = 10_000;
const CAPACITY: u64 = 100;

/// Keys are 1-indexed by `ZipfDistribution`; kept as-is since the cache
/// doesn't care about the key space's origin.
fn zipf_trace() -> Vec<u64> {
    let mut rng = SmallRng::seed_from_u64(42);
    let dist = ZipfDistribution::new(ITEMS as usize, 1.0001).unwrap();
    (0..ACCESSES).map(|_| dist.sample(&mut rng) as u64).collect()
}

/// The offline-optimal (Belady) replacement hit count for a fixed trace and
/// capacity: at each step, if there's a capacity miss, evict whichever
/// resident key's next use is furthest in the future (or never reused).
fn optimal_offline_hits(trace: &[u64], capacity: usize) -> usize {
    let mut next_use: HashMap<u64, Vec<usize>> = HashMap::new();
    for (i, &k) in trace.iter().enumerate() {
        next_use.entry(k).or_default().push(i);
    }
    for uses in next_use.values_mut() {
        uses.reverse();
    }

    let mut resident: Vec<u64> = Vec::new();
    let mut hits = 0usize;
    for (i, &k) in trace.iter().enumerate() {
        if let Some(uses) = next_use.get_mut(&k) {
            if uses.last() == Some(&i) {
                uses.pop();
            }
        }

        if resident.contains(&k) {
            hits += 1;
            continue;
        }

        if resident.len() < capacity {
            resident.push(k);
            continue;
        }

        let victim = resident
            .iter()
            .enumerate()
            .max_by_key(|(_, key)| next_use.get(key).and_then(|u| u.last()).copied().unwrap_or(usize::MAX))
            .map(|(idx, _)| idx)
            .unwrap();
        resident[victim] = k;
    }
    hits
}

#[test]
fn zipf_workload_hit_ratio_is_competitive_with_optimal_offline() {
    let trace = zipf_trace();

    let cache: Cache<u64, u64> = CacheBuilder::new().maximum_size(CAPACITY).record_stats().build();
    for &k in &trace {
        if cache.get_if_present(&k).is_none() {
            cache.set(k, k);
        }
    }
    cache.clean_up();

    let stats = cache.stats();
    let observed = stats.hit_ratio();

    let optimal_hits = optimal_offline_hits(&trace, CAPACITY as usize);
    let optimal_ratio = optimal_hits as f64 / trace.len() as f64;

    assert!(observed >= 0.50, "observed hit ratio {observed} below the 0.50 floor");
    assert!(
        optimal_ratio - observed <= 0.15,
        "observed hit ratio {observed} trails optimal-offline {optimal_ratio} by more than 15 points"
    );
}
