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

//! Batched, cached, cancellable value inference: callers push a request
//! and block on a reply channel; a small pool of worker threads drains up
//! to `batch_size` requests at a time, runs one forward pass, and wakes
//! every caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bz_utils::StopToken;
use crossbeam_channel::{bounded, Sender};

use crate::cache::InferenceCache;
use crate::device::DeviceManager;

/// How long a worker waits for a batch to fill before forwarding whatever
/// it has, so low-throughput phases do not stall.
const MAX_BATCH_WAIT: Duration = Duration::from_millis(20);

struct Request {
    observation: Vec<f32>,
    reply: Sender<Option<f32>>,
}

struct Shared {
    pending: Mutex<Vec<Request>>,
    not_empty: Condvar,
    cache: InferenceCache,
    stop: StopToken,
    batch_size: usize,
    batches_served: AtomicU64,
    observations_served: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

/// Batched, cached, multi-threaded value evaluation service. Owns one
/// `(batch_size, device)` replica loan from the `DeviceManager` and a
/// pool of `inference_threads` worker threads.
pub struct InferenceEvaluator {
    shared: Arc<Shared>,
    threads: Vec<JoinHandle<()>>,
}

impl InferenceEvaluator {
    pub fn new(devices: DeviceManager, batch_size: usize, device: bz_utils::config::Device, num_threads: usize, cache_capacity: usize, stop: StopToken) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(Vec::with_capacity(2 * batch_size)),
            not_empty: Condvar::new(),
            cache: InferenceCache::new(cache_capacity),
            stop,
            batch_size,
            batches_served: AtomicU64::new(0),
            observations_served: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        });

        let threads = (0..num_threads.max(1))
            .map(|i| {
                let shared = shared.clone();
                let devices = devices.clone();
                thread::Builder::new()
                    .name(format!("inference-{i}"))
                    .spawn(move || worker_loop(shared, devices, batch_size, device))
                    .expect("failed to spawn inference worker thread")
            })
            .collect();

        InferenceEvaluator { shared, threads }
    }

    /// Evaluates a single observation for player 0's perspective. Returns
    /// `None` if the stop token fired before (or while) waiting for a
    /// reply -- actors and the rating evaluator treat that as "terminate
    /// loop".
    pub fn evaluate(&self, observation: &[f32]) -> Option<f32> {
        if self.shared.stop.is_stopped() {
            return None;
        }

        if let Some(cached) = self.shared.cache.get(observation) {
            self.shared.cache_hits.fetch_add(1, Ordering::Relaxed);
            return cached.first().copied();
        }
        self.shared.cache_misses.fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = bounded(1);
        {
            let mut pending = self.shared.pending.lock().expect("pending queue lock poisoned");
            pending.push(Request { observation: observation.to_vec(), reply: tx });
            self.shared.not_empty.notify_one();
        }

        loop {
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(value) => return value,
                Err(_) if self.shared.stop.is_stopped() => return None,
                Err(_) => continue,
            }
        }
    }

    pub fn batch_stats(&self) -> (u64, u64) {
        (self.shared.batches_served.load(Ordering::Relaxed), self.shared.observations_served.load(Ordering::Relaxed))
    }

    /// `(hits, misses)`, fed into the learner's structured log record.
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        crate::cache::CacheStats {
            hits: self.shared.cache_hits.load(Ordering::Relaxed),
            misses: self.shared.cache_misses.load(Ordering::Relaxed),
        }
    }

    pub fn cache_len(&self) -> usize {
        self.shared.cache.len()
    }

    /// Drops every cache entry -- called by the learner after every step.
    pub fn clear_cache(&self) {
        self.shared.cache.clear();
    }

    /// Wakes every blocked worker and drains any still-queued callers with
    /// `None`. Idempotent.
    pub fn shutdown(self) {
        self.shared.not_empty.notify_all();
        for handle in self.threads {
            let _ = handle.join();
        }

        let mut pending = self.shared.pending.lock().expect("pending queue lock poisoned");
        for request in pending.drain(..) {
            let _ = request.reply.send(None);
        }
    }
}

fn worker_loop(shared: Arc<Shared>, devices: DeviceManager, batch_size: usize, device: bz_utils::config::Device) {
    let loan = match devices.get(batch_size, device) {
        Some(loan) => loan,
        None => return,
    };

    while !shared.stop.is_stopped() {
        let batch = drain_batch(&shared, batch_size);

        if batch.is_empty() {
            continue;
        }

        let observations: Vec<Vec<f32>> = batch.iter().map(|r| r.observation.clone()).collect();
        let values = {
            let model = loan.wait();
            model.forward(&observations)
        };

        shared.batches_served.fetch_add(1, Ordering::Relaxed);
        shared.observations_served.fetch_add(batch.len() as u64, Ordering::Relaxed);

        for (request, &value) in batch.iter().zip(values.iter()) {
            shared.cache.insert(&request.observation, vec![value]);
        }

        for (request, value) in batch.into_iter().zip(values.into_iter()) {
            let _ = request.reply.send(Some(value));
        }
    }

    // final drain so no caller is left waiting forever after the stop
    // token fires mid-batch.
    let mut pending = shared.pending.lock().expect("pending queue lock poisoned");
    for request in pending.drain(..) {
        let _ = request.reply.send(None);
    }
}

/// Waits (bounded by `MAX_BATCH_WAIT`) for at least one request, then
/// drains up to `batch_size` of whatever has accumulated.
fn drain_batch(shared: &Shared, batch_size: usize) -> Vec<Request> {
    let mut pending = shared.pending.lock().expect("pending queue lock poisoned");
    let deadline = Instant::now() + MAX_BATCH_WAIT;

    while pending.is_empty() && !shared.stop.is_stopped() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let (guard, _) = shared.not_empty.wait_timeout(pending, deadline - now).expect("pending queue lock poisoned");
        pending = guard;
    }

    let take = pending.len().min(batch_size);
    pending.drain(0..take).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bz_utils::config::{Device, NnModel};
    use bz_vnet::{ModelConfig, VNet};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn make_evaluator(num_threads: usize) -> InferenceEvaluator {
        let config = ModelConfig { channels: 1, height: 1, width: 4, nn_depth: 1, nn_width: 8, learning_rate: 0.01, weight_decay: 0.0, nn_model: NnModel::Mlp };
        let mut rng = SmallRng::seed_from_u64(0);
        let model = VNet::new(config, &mut rng);

        let devices = DeviceManager::new();
        devices.add_device(4, Device::Cpu, model);

        InferenceEvaluator::new(devices, 4, Device::Cpu, num_threads, 64, StopToken::new())
    }

    #[test]
    fn evaluates_a_single_observation() {
        let evaluator = make_evaluator(1);
        let value = evaluator.evaluate(&[0.1, 0.2, 0.3, 0.4]);
        assert!(value.is_some());
        evaluator.shutdown();
    }

    #[test]
    fn identical_observations_are_cached() {
        let evaluator = make_evaluator(1);
        let obs = vec![0.5, -0.5, 0.1, 0.2];

        let first = evaluator.evaluate(&obs).unwrap();
        let (_, served_after_first) = evaluator.batch_stats();

        let second = evaluator.evaluate(&obs).unwrap();
        let (_, served_after_second) = evaluator.batch_stats();

        assert_eq!(first, second);
        assert_eq!(served_after_first, served_after_second, "cache hit must not invoke the model again");
        evaluator.shutdown();
    }

    #[test]
    fn stop_token_unblocks_callers() {
        let config = ModelConfig { channels: 1, height: 1, width: 4, nn_depth: 1, nn_width: 8, learning_rate: 0.01, weight_decay: 0.0, nn_model: NnModel::Mlp };
        let mut rng = SmallRng::seed_from_u64(0);
        let model = VNet::new(config, &mut rng);
        let devices = DeviceManager::new();
        devices.add_device(4, Device::Cpu, model);

        let stop = StopToken::new();
        let evaluator = InferenceEvaluator::new(devices, 4, Device::Cpu, 1, 64, stop.clone());
        stop.stop();

        let value = evaluator.evaluate(&[0.0, 0.0, 0.0, 0.0]);
        assert!(value.is_none());
        evaluator.shutdown();
    }
}
