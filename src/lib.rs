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

//! A concurrent in-memory cache with bounded capacity, S3-FIFO admission and
//! eviction, optional weighing and expiration, and an atomic `compute`
//! primitive with strong exception safety.
//!
//! ```
//! use vestibule::{Cache, CacheBuilder};
//!
//! let cache: Cache<String, u64> = CacheBuilder::new().maximum_size(10_000).build();
//! cache.set("answer".to_string(), 42);
//! assert_eq!(cache.get_if_present(&"answer".to_string()), Some(42));
//! ```

pub mod buffer;
pub mod cache;
pub mod clock;
pub mod entry;
pub mod error;
pub mod eviction;
pub mod executor;
pub mod expire;
pub mod index;
pub mod metrics;
pub mod sketch;

pub use cache::{Cache, CacheBuilder};
pub use clock::{Clock, FakeClock, SystemClock};
pub use entry::{ComputeOp, DeletionCause, DeletionEvent, ExpireEvent, Expiry};
pub use error::ConfigError;
pub use executor::{Executor, InlineExecutor, ThreadExecutor};
pub use metrics::{CounterStatsRecorder, NoopStatsRecorder, Stats, StatsRecorder};
