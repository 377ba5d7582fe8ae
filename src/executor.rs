// Copyright 2016 Google Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A bounded thread pool that partitions a half-open integer range across
//! workers, giving each worker its own thread-local scratch state.

use std::ops::Range;

/// Schedules `0..n`-style work across a bounded number of worker threads.
///
/// Each worker gets its scratch state from `init` exactly once, then calls
/// `body` for every index assigned to it in increasing order, then calls
/// `finalize` exactly once. There is no ordering guarantee between workers.
/// If any worker panics the whole batch fails - `scoped_pool` propagates the
/// panic once every worker has joined.
pub struct ParallelExecutor {
    num_workers: usize,
}

impl ParallelExecutor {
    /// `max_workers` caps the worker count; `None` uses all available cores.
    pub fn new(max_workers: Option<usize>) -> Self {
        let cores = num_cpus::get();
        let num_workers = max_workers.map_or(cores, |m| m.min(cores)).max(1);
        ParallelExecutor { num_workers }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Runs `body` for every index in `range`, partitioned into contiguous
    /// chunks across workers so each worker processes its elements in
    /// increasing order.
    pub fn for_each<T, Init, Body, Finalize>(
        &self,
        range: Range<usize>,
        init: Init,
        body: Body,
        finalize: Finalize,
    ) where
        T: Send,
        Init: Fn() -> T + Sync,
        Body: Fn(&mut T, usize) + Sync,
        Finalize: Fn(T) + Sync,
    {
        let len = range.end.saturating_sub(range.start);
        if len == 0 {
            return;
        }
        let num_workers = self.num_workers.min(len);
        let chunk_size = (len + num_workers - 1) / num_workers;

        let pool = scoped_pool::Pool::new(num_workers);
        pool.scoped(|scope| {
            let init = &init;
            let body = &body;
            let finalize = &finalize;
            for worker in 0..num_workers {
                let start = range.start + worker * chunk_size;
                let end = (start + chunk_size).min(range.end);
                if start >= end {
                    continue;
                }
                scope.execute(move || {
                    let mut state = init();
                    for index in start..end {
                        body(&mut state, index);
                    }
                    finalize(state);
                });
            }
        });
    }
}
