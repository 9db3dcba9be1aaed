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

//! The bounded FIFO replay buffer: a circular buffer of
//! `ReplaySample`, sampled uniformly with replacement, persisted to disk
//! each learner step so a crash-resume loses no training data.

use std::collections::VecDeque;
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::trajectory::ReplaySample;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("replay buffer deserialization failed: {0}")]
    Decode(#[from] bincode::Error),
}

#[derive(Serialize, Deserialize)]
struct Persisted {
    capacity: usize,
    total_added: u64,
    samples: Vec<ReplaySample>,
}

/// Bounded circular buffer of `ReplaySample`. Once full,
/// `add` overwrites the oldest sample -- a plain `VecDeque` with a
/// push-front/pop-back discipline gives this for free.
pub struct ReplayBuffer {
    capacity: usize,
    samples: VecDeque<ReplaySample>,
    total_added: u64,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        ReplayBuffer { capacity: capacity.max(1), samples: VecDeque::with_capacity(capacity.max(1)), total_added: 0 }
    }

    pub fn add(&mut self, sample: ReplaySample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.total_added += 1;
    }

    pub fn size(&self) -> usize {
        self.samples.len()
    }

    pub fn total_added(&self) -> u64 {
        self.total_added
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Uniform-with-replacement sample of `n` entries.
    pub fn sample(&self, rng: &mut impl Rng, n: usize) -> Vec<&ReplaySample> {
        if self.samples.is_empty() {
            return Vec::new();
        }

        (0..n).map(|_| &self.samples[rng.gen_range(0..self.samples.len())]).collect()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ReplayError> {
        let persisted = Persisted {
            capacity: self.capacity,
            total_added: self.total_added,
            samples: self.samples.iter().cloned().collect(),
        };
        let bytes = bincode::serialize(&persisted)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let bytes = std::fs::read(path)?;
        let persisted: Persisted = bincode::deserialize(&bytes)?;

        Ok(ReplayBuffer { capacity: persisted.capacity, samples: persisted.samples.into(), total_added: persisted.total_added })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(v: f32) -> ReplaySample {
        ReplaySample { observation: vec![v], scalar_value_target: v }
    }

    #[test]
    fn size_is_bounded_by_capacity() {
        let mut buffer = ReplayBuffer::new(4);
        for i in 0..10 {
            buffer.add(sample(i as f32));
        }

        assert_eq!(buffer.size(), 4);
        assert_eq!(buffer.total_added(), 10);
    }

    #[test]
    fn oldest_entries_are_evicted_first() {
        let mut buffer = ReplayBuffer::new(2);
        buffer.add(sample(1.0));
        buffer.add(sample(2.0));
        buffer.add(sample(3.0));

        let values: Vec<f32> = buffer.samples.iter().map(|s| s.scalar_value_target).collect();
        assert_eq!(values, vec![2.0, 3.0]);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = std::env::temp_dir().join(format!("bz_replay_buffer_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("replay_buffer.data");

        let mut buffer = ReplayBuffer::new(8);
        for i in 0..5 {
            buffer.add(sample(i as f32));
        }
        buffer.save(&path).unwrap();

        let reloaded = ReplayBuffer::load(&path).unwrap();
        assert_eq!(reloaded.size(), buffer.size());
        assert_eq!(reloaded.total_added(), buffer.total_added());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
