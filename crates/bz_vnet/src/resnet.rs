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

//! The ResNet value-regression architecture: an input
//! block, a stack of `nn_depth` residual blocks, and an output block
//! ending in a `tanh` scalar. Backgammon's ResNet view is `[16, 24, 1]`
//! -- a single row of 24 points -- so the convolutions below run over a
//! `[height, 1]` spatial grid rather than a square board.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::activation::{leaky_relu, relu, tanh};
use burn::tensor::backend::Backend;
use burn::tensor::{Data, ElementConversion, Shape, Tensor};
use rand::Rng;
use std::path::Path;

use crate::backend::{VAutodiffBackend, VDevice};
use crate::config::ModelConfig;
use crate::error::VNetError;
use crate::Losses;

/// spec.md §4.2's batchnorm hyperparameters, carried over verbatim
/// regardless of which tensor backend the layer is built on.
pub const BN_EPS: f64 = 1e-3;
pub const BN_MOMENTUM: f64 = 1e-2;

const LEAKY_SLOPE: f64 = 0.01;

fn batch_norm<B: Backend>(channels: usize, device: &B::Device) -> BatchNorm<B, 2> {
    BatchNormConfig::new(channels).with_epsilon(BN_EPS).with_momentum(BN_MOMENTUM).init(device)
}

fn conv3<B: Backend>(in_c: usize, out_c: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_c, out_c], [3, 1]).with_padding(PaddingConfig2d::Same).init(device)
}

#[derive(Module, Debug)]
struct ResidualBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
}

impl<B: Backend> ResidualBlock<B> {
    fn new(width: usize, device: &B::Device) -> Self {
        ResidualBlock { conv1: conv3(width, width, device), bn1: batch_norm(width, device), conv2: conv3(width, width, device), bn2: batch_norm(width, device) }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let a1 = relu(self.bn1.forward(self.conv1.forward(x.clone())));
        let z2 = self.bn2.forward(self.conv2.forward(a1));
        relu(z2 + x)
    }

    fn weight_sum_of_squares(&self) -> f32 {
        let sq = |t: Tensor<B, 4>| (t.clone() * t).sum().into_scalar().elem::<f32>();
        sq(self.conv1.weight.val()) + sq(self.conv2.weight.val())
    }
}

#[derive(Module, Debug)]
struct ResNetNet<B: Backend> {
    input_conv: Conv2d<B>,
    input_bn: BatchNorm<B, 2>,
    blocks: Vec<ResidualBlock<B>>,
    out_conv: Conv2d<B>,
    out_bn: BatchNorm<B, 2>,
    out_linear1: Linear<B>,
    out_linear2: Linear<B>,
}

impl<B: Backend> ResNetNet<B> {
    fn new(config: &ModelConfig, device: &B::Device) -> Self {
        let width = config.nn_width;
        let points = config.height * config.width;

        let mut blocks = Vec::with_capacity(config.nn_depth);
        for _ in 0..config.nn_depth {
            blocks.push(ResidualBlock::new(width, device));
        }

        ResNetNet {
            input_conv: conv3(config.channels, width, device),
            input_bn: batch_norm(width, device),
            blocks,
            out_conv: Conv2dConfig::new([width, width], [1, 1]).init(device),
            out_bn: batch_norm(width, device),
            out_linear1: LinearConfig::new(width * points, width).init(device),
            out_linear2: LinearConfig::new(width, 1).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut tower = relu(self.input_bn.forward(self.input_conv.forward(x)));
        for block in &self.blocks {
            tower = block.forward(tower);
        }

        let out = relu(self.out_bn.forward(self.out_conv.forward(tower)));
        let [batch, c, h, w] = out.dims();
        let flat = out.reshape([batch, c * h * w]);

        let hidden = leaky_relu(self.out_linear1.forward(flat), LEAKY_SLOPE);
        self.out_linear2.forward(hidden)
    }

    fn weight_sum_of_squares(&self) -> f32 {
        let sq4 = |t: Tensor<B, 4>| (t.clone() * t).sum().into_scalar().elem::<f32>();
        let sq2 = |t: Tensor<B, 2>| (t.clone() * t).sum().into_scalar().elem::<f32>();

        let mut total = sq4(self.input_conv.weight.val());
        for block in &self.blocks {
            total += block.weight_sum_of_squares();
        }
        total += sq4(self.out_conv.weight.val());
        total += sq2(self.out_linear1.weight.val());
        total += sq2(self.out_linear2.weight.val());
        total
    }
}

type ResNetOptimizer = burn::optim::adaptor::OptimizerAdaptor<burn::optim::Adam, ResNetNet<VAutodiffBackend>, VAutodiffBackend>;

fn adam_for(config: &ModelConfig) -> ResNetOptimizer {
    let mut builder = AdamConfig::new();
    if config.weight_decay > 0.0 {
        builder = builder.with_weight_decay(Some(burn::optim::decay::WeightDecayConfig::new(config.weight_decay as f64)));
    }
    builder.init()
}

pub struct ResNetModel {
    config: ModelConfig,
    model: Option<ResNetNet<VAutodiffBackend>>,
    optimizer: ResNetOptimizer,
    device: VDevice,
}

impl ResNetModel {
    pub fn new(config: ModelConfig, rng: &mut impl Rng) -> Self {
        let seed: u64 = rng.gen();
        VAutodiffBackend::seed(seed);
        let device = VDevice::default();
        let model = ResNetNet::new(&config, &device);
        ResNetModel { optimizer: adam_for(&config), config, model: Some(model), device }
    }

    fn to_input_tensor(&self, observations: &[Vec<f32>]) -> Tensor<VAutodiffBackend, 4> {
        let batch = observations.len();
        let (c, h, w) = (self.config.channels, self.config.height, self.config.width);
        let mut flat = Vec::with_capacity(batch * c * h * w);
        for obs in observations {
            debug_assert_eq!(obs.len(), c * h * w, "observation does not match configured [C,H,W]");
            flat.extend_from_slice(obs);
        }
        Tensor::from_data(Data::new(flat, Shape::new([batch, c, h, w])).convert(), &self.device)
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
        println!(
            "ResNetModel {{ depth: {}, width: {}, points: {} }}",
            self.config.nn_depth,
            self.config.nn_width,
            self.config.height * self.config.width
        );
    }

    pub fn save_checkpoint(&self, path: impl AsRef<Path>) -> Result<(), VNetError> {
        let model = self.model.as_ref().expect("model present outside of train_step");
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        recorder.record(model.clone().into_record(), path.as_ref().to_path_buf()).map_err(|e| VNetError::Record(e.to_string()))
    }

    pub fn load_checkpoint(path: impl AsRef<Path>, config: ModelConfig) -> Result<Self, VNetError> {
        let device = VDevice::default();
        let fresh = ResNetNet::new(&config, &device);
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let record = recorder.load(path.as_ref().to_path_buf(), &device).map_err(|e| VNetError::Record(e.to_string()))?;
        let model = fresh.load_record(record);
        Ok(ResNetModel { optimizer: adam_for(&config), config, model: Some(model), device })
    }
}

impl Clone for ResNetModel {
    /// See `MlpModel`'s `Clone` impl -- optimizer state is rebuilt
    /// fresh, never carried across a clone.
    fn clone(&self) -> Self {
        let model = self.model.as_ref().expect("model present outside of train_step").clone();
        ResNetModel { config: self.config, optimizer: adam_for(&self.config), model: Some(model), device: self.device.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bz_utils::config::NnModel;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn config() -> ModelConfig {
        ModelConfig { channels: 2, height: 6, width: 1, nn_depth: 1, nn_width: 4, learning_rate: 0.02, weight_decay: 0.0, nn_model: NnModel::Resnet }
    }

    #[test]
    fn forward_output_is_bounded() {
        let mut rng = SmallRng::seed_from_u64(3);
        let model = ResNetModel::new(config(), &mut rng);
        let obs = vec![vec![0.1; 2 * 6]; 2];

        let values = model.forward(&obs);
        assert_eq!(values.len(), 2);
        for v in values {
            assert!((-1.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn training_reduces_mse_toward_a_fixed_target() {
        let mut rng = SmallRng::seed_from_u64(11);
        let mut model = ResNetModel::new(config(), &mut rng);
        let obs = vec![vec![0.2; 2 * 6]; 3];
        let targets = vec![0.5; 3];

        let first = model.train_step(&obs, &targets).mse;
        let mut last = first;
        for _ in 0..30 {
            last = model.train_step(&obs, &targets).mse;
        }

        assert!(last <= first);
    }
}
