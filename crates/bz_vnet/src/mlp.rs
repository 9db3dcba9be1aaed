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

//! The MLP value-regression architecture: `nn_depth`
//! leaky-ReLU linear layers of width `nn_width`, then a linear layer down
//! to a scalar, squashed through `tanh`.

use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::activation::{leaky_relu, tanh};
use burn::tensor::backend::Backend;
use burn::tensor::{Data, ElementConversion, Shape, Tensor};
use rand::Rng;
use std::path::Path;

use crate::backend::{VAutodiffBackend, VDevice};
use crate::config::ModelConfig;
use crate::error::VNetError;
use crate::Losses;

const LEAKY_SLOPE: f64 = 0.01;

#[derive(Module, Debug)]
struct MlpNet<B: Backend> {
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
}

impl<B: Backend> MlpNet<B> {
    fn new(config: &ModelConfig, device: &B::Device) -> Self {
        let mut hidden = Vec::with_capacity(config.nn_depth);
        let mut in_dim = config.flat_input_size();
        for _ in 0..config.nn_depth {
            hidden.push(LinearConfig::new(in_dim, config.nn_width).init(device));
            in_dim = config.nn_width;
        }
        let output = LinearConfig::new(in_dim, 1).init(device);
        MlpNet { hidden, output }
    }

    fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut current = x;
        for layer in &self.hidden {
            current = leaky_relu(layer.forward(current), LEAKY_SLOPE);
        }
        self.output.forward(current)
    }

    fn weight_sum_of_squares(&self) -> f32 {
        let sq = |t: Tensor<B, 2>| (t.clone() * t).sum().into_scalar().elem::<f32>();
        let hidden_sum: f32 = self.hidden.iter().map(|l| sq(l.weight.val())).sum();
        hidden_sum + sq(self.output.weight.val())
    }
}

/// One optimizer step's worth of state for `MlpNet`'s parameter tree.
type MlpOptimizer = burn::optim::adaptor::OptimizerAdaptor<burn::optim::Adam, MlpNet<VAutodiffBackend>, VAutodiffBackend>;

fn adam_for(config: &ModelConfig) -> MlpOptimizer {
    let mut builder = AdamConfig::new();
    if config.weight_decay > 0.0 {
        builder = builder.with_weight_decay(Some(burn::optim::decay::WeightDecayConfig::new(config.weight_decay as f64)));
    }
    builder.init()
}

pub struct MlpModel {
    pub(crate) config: ModelConfig,
    model: Option<MlpNet<VAutodiffBackend>>,
    optimizer: MlpOptimizer,
    device: VDevice,
}

impl MlpModel {
    pub fn new(config: ModelConfig, rng: &mut impl Rng) -> Self {
        let seed: u64 = rng.gen();
        VAutodiffBackend::seed(seed);
        let device = VDevice::default();
        let model = MlpNet::new(&config, &device);
        MlpModel { optimizer: adam_for(&config), config, model: Some(model), device }
    }

    fn to_input_tensor(&self, observations: &[Vec<f32>]) -> Tensor<VAutodiffBackend, 2> {
        let batch = observations.len();
        let dim = self.config.flat_input_size();
        let mut flat = Vec::with_capacity(batch * dim);
        for obs in observations {
            debug_assert_eq!(obs.len(), dim, "observation does not match configured flat input size");
            flat.extend_from_slice(obs);
        }
        Tensor::from_data(Data::new(flat, Shape::new([batch, dim])).convert(), &self.device)
    }

    fn to_target_tensor(&self, targets: &[f32]) -> Tensor<VAutodiffBackend, 2> {
        Tensor::from_data(Data::new(targets.to_vec(), Shape::new([targets.len(), 1])).convert(), &self.device)
    }

    pub fn forward(&self, observations: &[Vec<f32>]) -> Vec<f32> {
        let model = self.model.as_ref().expect("model present outside of train_step");
        let input = self.to_input_tensor(observations);
        let values = tanh(model.forward(input));
        values.into_data().convert::<f32>().value
    }

    pub fn train_step(&mut self, observations: &[Vec<f32>], targets: &[f32]) -> Losses {
        assert_eq!(observations.len(), targets.len());
        let input = self.to_input_tensor(observations);
        let target = self.to_target_tensor(targets);

        let model = self.model.take().expect("model present outside of train_step");
        let values = tanh(model.forward(input));
        let diff = values - target;
        let mse_tensor = (diff.clone() * diff).mean();
        let mse = mse_tensor.clone().into_scalar().elem::<f32>();

        let wd = self.config.weight_decay;
        let weight_penalty = model.weight_sum_of_squares();
        let weight_decay = 0.5 * wd * weight_penalty;

        let grads = mse_tensor.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        self.model = Some(self.optimizer.step(self.config.learning_rate as f64, model, grads));

        Losses { mse, weight_decay, total: mse + weight_decay }
    }

    pub fn config(&self) -> ModelConfig {
        self.config
    }

    /// Total scalar parameter count, analytically derived from the
    /// config rather than walking the live module tree.
    pub fn param_count(&self) -> usize {
        self.config.expected_param_count()
    }

    pub fn print(&self) {
        println!("MlpModel {{ depth: {}, width: {}, input: {} }}", self.config.nn_depth, self.config.nn_width, self.config.flat_input_size());
    }

    pub fn save_checkpoint(&self, path: impl AsRef<Path>) -> Result<(), VNetError> {
        let model = self.model.as_ref().expect("model present outside of train_step");
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        recorder.record(model.clone().into_record(), path.as_ref().to_path_buf()).map_err(|e| VNetError::Record(e.to_string()))
    }

    pub fn load_checkpoint(path: impl AsRef<Path>, config: ModelConfig) -> Result<Self, VNetError> {
        let device = VDevice::default();
        let fresh = MlpNet::new(&config, &device);
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let record = recorder.load(path.as_ref().to_path_buf(), &device).map_err(|e| VNetError::Record(e.to_string()))?;
        let model = fresh.load_record(record);
        Ok(MlpModel { optimizer: adam_for(&config), config, model: Some(model), device })
    }
}

impl Clone for MlpModel {
    /// The optimizer's moment/variance state is rebuilt fresh rather
    /// than cloned -- every replica that receives a cloned `VNet` is
    /// either inference-only or about to be reloaded from a checkpoint
    /// before its first `train_step`.
    fn clone(&self) -> Self {
        let model = self.model.as_ref().expect("model present outside of train_step").clone();
        MlpModel { config: self.config, optimizer: adam_for(&self.config), model: Some(model), device: self.device.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bz_utils::config::NnModel;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn config() -> ModelConfig {
        ModelConfig { channels: 1, height: 1, width: 8, nn_depth: 2, nn_width: 16, learning_rate: 0.05, weight_decay: 0.0, nn_model: NnModel::Mlp }
    }

    #[test]
    fn forward_output_is_bounded_by_tanh() {
        let mut rng = SmallRng::seed_from_u64(42);
        let model = MlpModel::new(config(), &mut rng);
        let obs = vec![vec![0.3; 8], vec![-0.2; 8]];

        let values = model.forward(&obs);
        assert_eq!(values.len(), 2);
        for v in values {
            assert!((-1.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn training_reduces_mse_toward_a_fixed_target() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut model = MlpModel::new(config(), &mut rng);
        let obs = vec![vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]; 4];
        let targets = vec![0.7; 4];

        let first = model.train_step(&obs, &targets).mse;
        let mut last = first;
        for _ in 0..200 {
            last = model.train_step(&obs, &targets).mse;
        }

        assert!(last < first);
    }
}
