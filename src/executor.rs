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

//! The user-supplied executor that runs deletion notifications: a construction
//! option, with an inline variant kept for deterministic tests.

use std::thread;

/// Runs a batch of deletion-notification jobs. The cache treats dispatch as
/// fire-and-forget: it does not synchronize with the executor, and a job
/// that panics must not be allowed to affect cache correctness (isolated by
/// whichever thread boundary the executor interposes).
pub trait Executor: Send + Sync + 'static {
    fn execute(&self, job: Box<dyn FnOnce() + Send>);
}

/// Default executor: spawns a detached thread per batch of deletion
/// notifications handed off by a single maintenance pass.
#[derive(Debug, Default)]
pub struct ThreadExecutor;

impl Executor for ThreadExecutor {
    fn execute(&self, job: Box<dyn FnOnce() + Send>) {
        let _ = thread::Builder::new()
            .name("vestibule-notify".into())
            .spawn(job);
    }
}

/// Runs jobs synchronously on the caller's thread. Required for deterministic
/// tests; never use this in production under a `compute`/shard-lock call
/// path, since the job itself is not reentrancy-safe for the same key.
#[derive(Debug, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, job: Box<dyn FnOnce() + Send>) {
        job();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn inline_executor_runs_synchronously() {
        let counter = Arc::new(AtomicUsize::new(0));
        let executor = InlineExecutor;
        let c = counter.clone();
        executor.execute(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
