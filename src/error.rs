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

//! Configuration errors raised at cache construction time.
//!
//! Everything else the cache can fail at (a panicking `compute` callback, a
//! panicking weigher) is not represented here: the callback's panic just
//! propagates to the caller per the strong-exception-safety contract in
//! `Cache::compute`.

use thiserror::Error;

/// Fails fast at [`CacheBuilder::build`](crate::cache::CacheBuilder::build) time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("maximum_size and maximum_weight are mutually exclusive")]
    ConflictingCapacityBounds,

    #[error("maximum_weight requires a weigher to be set")]
    MissingWeigher,

    #[error("a weigher was set but neither maximum_size nor maximum_weight is bounded")]
    UnusedWeigher,

    #[error("capacity must be greater than zero")]
    NonPositiveCapacity,

    #[error("shard count must be a power of two and greater than zero")]
    InvalidShardCount,
}

pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
