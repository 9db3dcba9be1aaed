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

//! `ModelConfig` and its on-disk form: a whitespace
//! separated scalar line persisted as `vpnet.pb` so every process that
//! reloads a checkpoint -- learner, inference replicas, evaluators --
//! agrees on the network's shape without re-reading `config.json`.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use bz_utils::config::NnModel;
use serde::{Deserialize, Serialize};

use crate::error::VNetError;

/// The network's fixed shape and training hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub nn_depth: usize,
    pub nn_width: usize,
    pub learning_rate: f32,
    pub weight_decay: f32,
    pub nn_model: NnModel,
}

impl ModelConfig {
    /// The flattened input size a feed-forward layer (the MLP's first
    /// layer, or the ResNet's 1x1-conv output block) consumes.
    pub fn flat_input_size(&self) -> usize {
        self.channels * self.height * self.width
    }

    /// The scalar parameter count a freshly built `VNet` for this config
    /// would have, computed analytically (no RNG, no model construction)
    /// from the same layer shapes `MlpModel::new`/`ResNetModel::new` use.
    /// Compared against a checkpoint's actual `VNet::param_count()` to
    /// catch a reload from a differently-shaped config before it panics
    /// deep inside a mismatched tensor op.
    pub fn expected_param_count(&self) -> usize {
        let linear = |in_dim: usize, out_dim: usize| in_dim * out_dim + out_dim;

        match self.nn_model {
            NnModel::Mlp => {
                let flat = self.flat_input_size();
                let mut total = 0;
                let mut in_dim = flat;
                for _ in 0..self.nn_depth {
                    total += linear(in_dim, self.nn_width);
                    in_dim = self.nn_width;
                }
                total += linear(in_dim, 1);
                total
            }
            NnModel::Resnet => {
                let width = self.nn_width;
                let points = self.height * self.width;
                let conv = |in_c: usize, out_c: usize, kernel: usize| out_c * in_c * kernel + out_c;
                let batch_norm = |channels: usize| 2 * channels;

                let mut total = conv(self.channels, width, 3) + batch_norm(width);
                let block = 2 * conv(width, width, 3) + 2 * batch_norm(width);
                total += self.nn_depth * block;
                total += conv(width, width, 1) + batch_norm(width);
                total += linear(width * points, width);
                total += linear(width, 1);
                total
            }
        }
    }
}

fn model_name(model: NnModel) -> &'static str {
    match model {
        NnModel::Resnet => "resnet",
        NnModel::Mlp => "mlp",
    }
}

impl fmt::Display for ModelConfig {
    /// `channels height width depth width lr wd model_name`, matching
    /// the `vpnet.pb` on-disk layout exactly.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {} {}",
            self.channels,
            self.height,
            self.width,
            self.nn_depth,
            self.nn_width,
            self.learning_rate,
            self.weight_decay,
            model_name(self.nn_model)
        )
    }
}

impl FromStr for ModelConfig {
    type Err = VNetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        if fields.len() != 8 {
            return Err(VNetError::MalformedModelConfig(s.to_string()));
        }

        let parse_usize = |v: &str| v.parse::<usize>().map_err(|_| VNetError::MalformedModelConfig(s.to_string()));
        let parse_f32 = |v: &str| v.parse::<f32>().map_err(|_| VNetError::MalformedModelConfig(s.to_string()));

        Ok(ModelConfig {
            channels: parse_usize(fields[0])?,
            height: parse_usize(fields[1])?,
            width: parse_usize(fields[2])?,
            nn_depth: parse_usize(fields[3])?,
            nn_width: parse_usize(fields[4])?,
            learning_rate: parse_f32(fields[5])?,
            weight_decay: parse_f32(fields[6])?,
            nn_model: match fields[7] {
                "resnet" => NnModel::Resnet,
                "mlp" => NnModel::Mlp,
                other => return Err(VNetError::UnknownModel(other.to_string())),
            },
        })
    }
}

impl ModelConfig {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), VNetError> {
        std::fs::write(path, self.to_string())?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, VNetError> {
        std::fs::read_to_string(path)?.trim().parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ModelConfig {
        ModelConfig {
            channels: 16,
            height: 24,
            width: 1,
            nn_depth: 4,
            nn_width: 128,
            learning_rate: 1e-3,
            weight_decay: 1e-4,
            nn_model: NnModel::Resnet,
        }
    }

    #[test]
    fn round_trips_through_the_whitespace_format() {
        let config = sample();
        let parsed: ModelConfig = config.to_string().parse().unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn rejects_unknown_model_name() {
        let result: Result<ModelConfig, _> = "16 24 1 4 128 0.001 0.0001 cnn".parse();
        assert!(matches!(result, Err(VNetError::UnknownModel(_))));
    }

    #[test]
    fn expected_param_count_matches_a_freshly_built_resnet() {
        use crate::ResNetModel;
        use rand::rngs::SmallRng;
        use rand::SeedableRng;

        let config = ModelConfig { nn_depth: 2, nn_width: 8, ..sample() };
        let mut rng = SmallRng::seed_from_u64(0);
        let model = ResNetModel::new(config, &mut rng);

        assert_eq!(config.expected_param_count(), model.param_count());
    }

    #[test]
    fn expected_param_count_matches_a_freshly_built_mlp() {
        use crate::MlpModel;
        use rand::rngs::SmallRng;
        use rand::SeedableRng;

        let config = ModelConfig { channels: 1, height: 1, width: 191, nn_depth: 3, nn_width: 32, nn_model: NnModel::Mlp, ..sample() };
        let mut rng = SmallRng::seed_from_u64(0);
        let model = MlpModel::new(config, &mut rng);

        assert_eq!(config.expected_param_count(), model.param_count());
    }
}
