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

//! The device manager: a pool of model replicas indexed by
//! `(batch_size, device)`, with a per-replica `learning` flag that
//! excludes the designated learner replica from inference loans while
//! training is in progress. A shared `Vec` of workers, handed out
//! under a lock, with callers backing off when none are free.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bz_utils::config::Device;
use bz_vnet::VNet;
use crossbeam_utils::Backoff;

struct Replica {
    batch_size: usize,
    device: Device,
    model: Mutex<VNet>,
    learning: AtomicBool,
}

/// A pool of model replicas, one per `(batch_size, device)` pair that the
/// supervisor has registered.
#[derive(Clone, Default)]
pub struct DeviceManager {
    replicas: Arc<Mutex<Vec<Arc<Replica>>>>,
}

/// An exclusive loan of one replica's model. Dropping it releases the
/// underlying mutex; it does not clear the replica's `learning` flag --
/// that is the caller's responsibility via `DeviceManager::set_learning`,
/// set before training begins and cleared once it ends.
pub struct DeviceLoan<'a> {
    guard: MutexGuard<'a, VNet>,
}

impl<'a> std::ops::Deref for DeviceLoan<'a> {
    type Target = VNet;
    fn deref(&self) -> &VNet {
        &self.guard
    }
}

impl<'a> std::ops::DerefMut for DeviceLoan<'a> {
    fn deref_mut(&mut self) -> &mut VNet {
        &mut self.guard
    }
}

impl DeviceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&self, batch_size: usize, device: Device, model: VNet) {
        let replica = Arc::new(Replica { batch_size, device, model: Mutex::new(model), learning: AtomicBool::new(false) });
        self.replicas.lock().expect("device list lock poisoned").push(replica);
    }

    pub fn count(&self) -> usize {
        self.replicas.lock().expect("device list lock poisoned").len()
    }

    pub fn devices(&self) -> Vec<Device> {
        self.replicas.lock().expect("device list lock poisoned").iter().map(|r| r.device).collect()
    }

    fn find(&self, batch_size: usize, device: Device) -> Option<Arc<Replica>> {
        self.replicas
            .lock()
            .expect("device list lock poisoned")
            .iter()
            .find(|r| r.batch_size == batch_size && r.device == device)
            .cloned()
    }

    /// Acquires an exclusive loan on the replica for `(batch_size,
    /// device)`, blocking with a backoff spin while that replica is
    /// flagged `learning`.
    pub fn get(&self, batch_size: usize, device: Device) -> Option<LoanHandle> {
        let replica = self.find(batch_size, device)?;
        Some(LoanHandle { replica })
    }

    /// Marks the replica for `(batch_size, device)` as reserved for
    /// training, excluding it from inference loans until cleared.
    pub fn set_learning(&self, batch_size: usize, device: Device, learning: bool) {
        if let Some(replica) = self.find(batch_size, device) {
            replica.learning.store(learning, Ordering::Release);
        }
    }

    /// Instructs every replica except `skip` to reload the checkpoint at
    /// `path`, validated against that replica's own configured shape.
    pub fn reload_all_except(&self, skip: Device, path: &std::path::Path) -> Result<(), bz_vnet::VNetError> {
        let replicas = self.replicas.lock().expect("device list lock poisoned").clone();
        for replica in replicas {
            if replica.device == skip {
                continue;
            }
            let expected = replica.model.lock().expect("replica model lock poisoned").config();
            let reloaded = VNet::load_checkpoint_from_path(path, &expected)?;
            *replica.model.lock().expect("replica model lock poisoned") = reloaded;
        }
        Ok(())
    }
}

/// A handle to one replica; `wait` blocks until it is not flagged
/// `learning`, then returns an exclusive `DeviceLoan`.
pub struct LoanHandle {
    replica: Arc<Replica>,
}

impl LoanHandle {
    pub fn wait(&self) -> DeviceLoan<'_> {
        let backoff = Backoff::new();
        while self.replica.learning.load(Ordering::Acquire) {
            backoff.snooze();
        }
        DeviceLoan { guard: self.replica.model.lock().expect("replica model lock poisoned") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bz_utils::config::NnModel;
    use bz_vnet::ModelConfig;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn model() -> VNet {
        let config = ModelConfig { channels: 1, height: 1, width: 4, nn_depth: 1, nn_width: 8, learning_rate: 0.01, weight_decay: 0.0, nn_model: NnModel::Mlp };
        let mut rng = SmallRng::seed_from_u64(0);
        VNet::new(config, &mut rng)
    }

    #[test]
    fn learning_flag_blocks_inference_loans_until_cleared() {
        let manager = DeviceManager::new();
        manager.add_device(64, Device::Cpu, model());
        manager.set_learning(64, Device::Cpu, true);

        let loan = manager.get(64, Device::Cpu).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();

        let manager2 = manager.clone();
        let handle = std::thread::spawn(move || {
            let _guard = loan.wait();
            tx.send(()).unwrap();
        });

        assert!(rx.recv_timeout(std::time::Duration::from_millis(50)).is_err());
        manager2.set_learning(64, Device::Cpu, false);
        assert!(rx.recv_timeout(std::time::Duration::from_secs(1)).is_ok());
        handle.join().unwrap();
    }

    #[test]
    fn count_reflects_registered_replicas() {
        let manager = DeviceManager::new();
        assert_eq!(manager.count(), 0);
        manager.add_device(64, Device::Cpu, model());
        assert_eq!(manager.count(), 1);
    }
}
