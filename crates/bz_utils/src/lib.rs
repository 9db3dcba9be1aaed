// Copyright 2024
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub mod config;
pub mod jsonl;
pub mod stop_token;

pub use config::{Config, ConfigError, Device};
pub use stop_token::StopToken;

use std::sync::atomic::{AtomicUsize, Ordering};

lazy_static::lazy_static! {
    /// Number of OS threads to use for CPU-only backend work, pinned once
    /// at process start by `initialize`. Defaults to the number of logical
    /// cores until `initialize` runs.
    static ref NUM_CPU_THREADS: AtomicUsize = AtomicUsize::new(num_cpus());
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Pin the process-wide CPU thread count. Must be called by the supervisor
/// before any `VNet` is constructed -- observed to outperform letting each
/// CPU replica auto-thread on small batches.
pub fn initialize(num_cpu_threads: usize) {
    NUM_CPU_THREADS.store(num_cpu_threads.max(1), Ordering::Release);
}

pub fn cpu_threads() -> usize {
    NUM_CPU_THREADS.load(Ordering::Acquire)
}
