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

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single compute device a model replica can be placed on. Parsed from
/// the comma-separated `devices` config key, e.g. `"gpu:0,gpu:1,cpu"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    Cpu,
    Gpu(usize),
}

impl FromStr for Device {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("cpu") {
            Ok(Device::Cpu)
        } else if let Some(rest) = s.strip_prefix("gpu:") {
            rest.parse::<usize>()
                .map(Device::Gpu)
                .map_err(|_| ConfigError::InvalidDevice(s.to_string()))
        } else {
            Err(ConfigError::InvalidDevice(s.to_string()))
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Gpu(i) => write!(f, "gpu:{i}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown game `{0}`")]
    UnknownGame(String),
    #[error("unknown nn_model `{0}`, expected `resnet` or `mlp`")]
    UnknownModel(String),
    #[error("invalid device spec `{0}`, expected `cpu` or `gpu:<index>`")]
    InvalidDevice(String),
    #[error("devices list must not be empty")]
    NoDevices,
    #[error("explicit_learning requires at least 2 devices, found {0}")]
    ExplicitLearningNeedsTwoDevices(usize),
    #[error("game must be two-player, zero-sum, sequential, with terminal rewards")]
    NotTwoPlayerZeroSum,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NnModel {
    Resnet,
    Mlp,
}

impl FromStr for NnModel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resnet" => Ok(NnModel::Resnet),
            "mlp" => Ok(NnModel::Mlp),
            other => Err(ConfigError::UnknownModel(other.to_string())),
        }
    }
}

/// The complete set of run configuration keys, deserialized
/// from `config.json` (or built up by the caller before `validate`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub game: String,
    pub path: PathBuf,

    pub nn_model: NnModel,
    pub nn_width: usize,
    pub nn_depth: usize,
    pub learning_rate: f32,
    pub weight_decay: f32,

    pub devices: Vec<Device>,
    pub explicit_learning: bool,

    pub actors: usize,
    pub evaluators: usize,

    pub uct_c: f32,
    pub min_simulations: usize,
    pub max_simulations: usize,
    pub max_memory_mb: usize,
    pub policy_alpha: f32,
    pub policy_epsilon: f32,
    pub temperature: f32,
    pub temperature_drop: usize,
    pub cutoff_value: f32,
    pub cutoff_probability: f32,

    pub replay_buffer_size: usize,
    pub replay_buffer_reuse: usize,
    pub train_batch_size: usize,

    pub inference_batch_size: usize,
    pub inference_threads: usize,
    pub inference_cache: usize,

    pub td_lambda: f32,
    pub td_n_steps: usize,

    pub checkpoint_freq: usize,
    pub eval_levels: usize,
    pub evaluation_window: usize,
    pub max_steps: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            game: "backgammon".to_string(),
            path: PathBuf::from("./az-backgammon"),
            nn_model: NnModel::Mlp,
            nn_width: 256,
            nn_depth: 4,
            learning_rate: 1e-3,
            weight_decay: 1e-4,
            devices: vec![Device::Cpu],
            explicit_learning: false,
            actors: 4,
            evaluators: 1,
            uct_c: 1.4,
            min_simulations: 100,
            max_simulations: 800,
            max_memory_mb: 1000,
            policy_alpha: 0.3,
            policy_epsilon: 0.25,
            temperature: 1.0,
            temperature_drop: 8,
            cutoff_value: 0.95,
            cutoff_probability: 0.8,
            replay_buffer_size: 1 << 16,
            replay_buffer_reuse: 3,
            train_batch_size: 512,
            inference_batch_size: 64,
            inference_threads: 2,
            inference_cache: 1 << 20,
            td_lambda: 0.9,
            td_n_steps: 0,
            checkpoint_freq: 100,
            eval_levels: 7,
            evaluation_window: 200,
            max_steps: 0,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// The device the learner trains on; always `devices[0]`.
    pub fn learner_device(&self) -> Option<Device> {
        self.devices.first().copied()
    }

    pub fn learn_rate(&self) -> usize {
        if self.replay_buffer_reuse == 0 {
            self.replay_buffer_size
        } else {
            self.replay_buffer_size / self.replay_buffer_reuse
        }
    }

    /// Validates configuration errors that must be fatal *before* any
    /// thread is spawned.
    pub fn validate(&self, known_games: &[&str]) -> Result<(), ConfigError> {
        if !known_games.contains(&self.game.as_str()) {
            return Err(ConfigError::UnknownGame(self.game.clone()));
        }
        if self.devices.is_empty() {
            return Err(ConfigError::NoDevices);
        }
        if self.explicit_learning && self.devices.len() < 2 {
            return Err(ConfigError::ExplicitLearningNeedsTwoDevices(self.devices.len()));
        }
        Ok(())
    }

    /// CPU-only inference is faster than unbatched GPU inference, so the
    /// supervisor prefers the CPU replica whenever batches would be tiny
    /// and the learner itself already claims the lone GPU.
    pub fn prefer_cpu_inference(&self) -> bool {
        self.inference_batch_size <= 1
            && matches!(self.learner_device(), Some(Device::Gpu(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_list() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("gpu:0".parse::<Device>().unwrap(), Device::Gpu(0));
        assert!("tpu:0".parse::<Device>().is_err());
    }

    #[test]
    fn explicit_learning_requires_two_devices() {
        let mut config = Config::default();
        config.explicit_learning = true;
        config.devices = vec![Device::Cpu];

        assert!(matches!(
            config.validate(&["backgammon"]),
            Err(ConfigError::ExplicitLearningNeedsTwoDevices(1))
        ));
    }

    #[test]
    fn unknown_game_is_fatal() {
        let config = Config { game: "chess".to_string(), ..Config::default() };
        assert!(matches!(config.validate(&["backgammon"]), Err(ConfigError::UnknownGame(_))));
    }

    #[test]
    fn learn_rate_divides_buffer_by_reuse() {
        let config = Config { replay_buffer_size: 100, replay_buffer_reuse: 4, ..Config::default() };
        assert_eq!(config.learn_rate(), 25);
    }
}
