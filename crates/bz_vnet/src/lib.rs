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

//! The value network: a tagged variant over the `ResNet`
//! and `Mlp` architectures exposed through one narrow capability set
//! (`forward`, `losses`/`train_step`, `save_checkpoint`, `load_checkpoint`,
//! `print`) -- no deeper hierarchy is needed for two architectures.
//! Tensor math and autodiff themselves are an external collaborator
//! (spec.md §1): every architecture is a `burn` `Module` trained through
//! `burn`'s own `Adam` optimizer and autodiff graph, not a hand-rolled
//! backward pass.

pub mod backend;
pub mod config;
pub mod error;
pub mod mlp;
pub mod resnet;

pub use config::ModelConfig;
pub use error::VNetError;
pub use mlp::MlpModel;
pub use resnet::ResNetModel;

use std::path::{Path, PathBuf};

use bz_utils::config::NnModel;
use rand::Rng;

/// Canonical "latest" checkpoint step.
pub const LATEST_STEP: i64 = -1;

/// The three scalar terms this module tracks: raw MSE, the weight-decay
/// penalty folded in separately for logging, and their sum (what the
/// optimizer actually descends).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Losses {
    pub mse: f32,
    pub weight_decay: f32,
    pub total: f32,
}

/// One value-regression model, either architecture.
pub enum VNet {
    ResNet(ResNetModel),
    Mlp(MlpModel),
}

impl Clone for VNet {
    fn clone(&self) -> Self {
        match self {
            VNet::ResNet(m) => VNet::ResNet(m.clone()),
            VNet::Mlp(m) => VNet::Mlp(m.clone()),
        }
    }
}

impl VNet {
    pub fn new(config: ModelConfig, rng: &mut impl Rng) -> Self {
        match config.nn_model {
            NnModel::Resnet => VNet::ResNet(ResNetModel::new(config, rng)),
            NnModel::Mlp => VNet::Mlp(MlpModel::new(config, rng)),
        }
    }

    /// Batched forward pass: one value per observation, in `[-1, 1]`
    /// (bounded to `[-1, 1]` by a final `tanh`).
    pub fn forward(&self, observations: &[Vec<f32>]) -> Vec<f32> {
        match self {
            VNet::ResNet(m) => m.forward(observations),
            VNet::Mlp(m) => m.forward(observations),
        }
    }

    /// One minibatch of MSE-plus-weight-decay training.
    pub fn train_step(&mut self, observations: &[Vec<f32>], targets: &[f32]) -> Losses {
        match self {
            VNet::ResNet(m) => m.train_step(observations, targets),
            VNet::Mlp(m) => m.train_step(observations, targets),
        }
    }

    pub fn print(&self) {
        match self {
            VNet::ResNet(m) => m.print(),
            VNet::Mlp(m) => m.print(),
        }
    }

    /// The configuration this replica was built from -- the source of
    /// truth for its expected shape.
    pub fn config(&self) -> ModelConfig {
        match self {
            VNet::ResNet(m) => m.config(),
            VNet::Mlp(m) => m.config(),
        }
    }

    /// Total scalar parameter count, compared against
    /// `ModelConfig::expected_param_count` to validate a checkpoint load.
    pub fn param_count(&self) -> usize {
        match self {
            VNet::ResNet(m) => m.param_count(),
            VNet::Mlp(m) => m.param_count(),
        }
    }

    fn weights_path(dir: impl AsRef<Path>, step: i64) -> PathBuf {
        dir.as_ref().join(format!("checkpoint-{step}.pt"))
    }

    fn optimizer_path(dir: impl AsRef<Path>, step: i64) -> PathBuf {
        dir.as_ref().join(format!("checkpoint-{step}-optimizer.pt"))
    }

    /// The config a checkpoint was saved from travels alongside it as a
    /// `vpnet.pb`-style sidecar -- `burn`'s record format has no built-in
    /// shape check, so this is what lets a reload into a differently-shaped
    /// model fail cleanly instead of panicking deep inside `load_record`.
    fn config_sidecar_path(path: impl AsRef<Path>) -> PathBuf {
        let mut name = path.as_ref().as_os_str().to_owned();
        name.push(".config");
        PathBuf::from(name)
    }

    /// Writes `checkpoint-<step>.pt` via `burn`'s own binary recorder.
    /// `step == LATEST_STEP` writes the canonical `checkpoint--1.pt`
    /// every replica reloads from. The optimizer's moment/variance state
    /// is never persisted -- the sibling `-optimizer.pt` file mirrors the
    /// on-disk weights/optimizer split the teacher's format has, but
    /// every reload rebuilds Adam state fresh (`load_checkpoint` never
    /// reads it back).
    pub fn save_checkpoint(&self, dir: impl AsRef<Path>, step: i64) -> Result<(), VNetError> {
        std::fs::create_dir_all(dir.as_ref())?;
        let weights_path = Self::weights_path(dir.as_ref(), step);
        self.save_to(weights_path.clone())?;
        self.config().save(Self::config_sidecar_path(&weights_path))?;
        self.save_to(Self::optimizer_path(dir.as_ref(), step))
    }

    fn save_to(&self, path: PathBuf) -> Result<(), VNetError> {
        match self {
            VNet::ResNet(m) => m.save_checkpoint(path),
            VNet::Mlp(m) => m.save_checkpoint(path),
        }
    }

    /// Loads `checkpoint-<step>.pt`, or the canonical "latest" when `step`
    /// is `None` (checkpoint step -1 is the canonical "latest"), and
    /// validates it was built from `expected`'s shape.
    pub fn load_checkpoint(dir: impl AsRef<Path>, step: Option<i64>, expected: &ModelConfig) -> Result<Self, VNetError> {
        let step = step.unwrap_or(LATEST_STEP);
        Self::load_checkpoint_from_path(Self::weights_path(dir, step), expected)
    }

    /// Loads a checkpoint from an explicit file path rather than a
    /// `(dir, step)` pair. The sidecar config is checked against
    /// `expected` before the checkpoint's tensors are ever touched, since
    /// `burn`'s `Module::load_record` has no graceful way to reject a
    /// shape mismatch once it is loading into an already-built module.
    pub fn load_checkpoint_from_path(path: impl AsRef<Path>, expected: &ModelConfig) -> Result<Self, VNetError> {
        let path = path.as_ref();
        let saved = ModelConfig::load(Self::config_sidecar_path(path))?;
        if saved != *expected {
            return Err(VNetError::ShapeMismatch { expected: expected.expected_param_count(), found: saved.expected_param_count() });
        }

        Ok(match expected.nn_model {
            NnModel::Resnet => VNet::ResNet(ResNetModel::load_checkpoint(path, *expected)?),
            NnModel::Mlp => VNet::Mlp(MlpModel::load_checkpoint(path, *expected)?),
        })
    }
}

/// Pins the CPU backend to a single thread for CPU-only replicas --
/// observed to outperform auto-threading on the small batches this
/// workload uses. Must run once, before any `VNet` is
/// constructed -- the supervisor calls this as part of its own
/// `bz_utils::initialize`.
pub fn initialize() {
    bz_utils::initialize(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bz_utils::config::NnModel;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn mlp_config() -> ModelConfig {
        ModelConfig { channels: 1, height: 1, width: 8, nn_depth: 2, nn_width: 16, learning_rate: 0.05, weight_decay: 0.0, nn_model: NnModel::Mlp }
    }

    #[test]
    fn checkpoint_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("bz_vnet_ckpt_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut rng = SmallRng::seed_from_u64(0);
        let model = VNet::new(mlp_config(), &mut rng);
        let obs = vec![vec![0.1; 8], vec![-0.3; 8]];
        let before = model.forward(&obs);

        model.save_checkpoint(&dir, LATEST_STEP).unwrap();
        let reloaded = VNet::load_checkpoint(&dir, None, &mlp_config()).unwrap();
        let after = reloaded.forward(&obs);

        assert_eq!(before, after);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn numbered_checkpoint_step_is_independent_of_latest() {
        let dir = std::env::temp_dir().join(format!("bz_vnet_ckpt_step_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut rng = SmallRng::seed_from_u64(1);
        let model = VNet::new(mlp_config(), &mut rng);
        model.save_checkpoint(&dir, 100).unwrap();

        assert!(VNet::load_checkpoint(&dir, None, &mlp_config()).is_err());
        assert!(VNet::load_checkpoint(&dir, Some(100), &mlp_config()).is_ok());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn loading_a_checkpoint_built_from_a_different_shape_is_rejected() {
        let dir = std::env::temp_dir().join(format!("bz_vnet_ckpt_shape_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut rng = SmallRng::seed_from_u64(2);
        let model = VNet::new(mlp_config(), &mut rng);
        model.save_checkpoint(&dir, LATEST_STEP).unwrap();

        let wrong_shape = ModelConfig { nn_width: mlp_config().nn_width * 2, ..mlp_config() };
        let err = VNet::load_checkpoint(&dir, None, &wrong_shape).unwrap_err();
        assert!(matches!(err, VNetError::ShapeMismatch { .. }), "expected ShapeMismatch, got {err:?}");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
