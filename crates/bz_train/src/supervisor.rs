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

//! The supervisor: resolves configuration, builds every
//! device replica, optionally resumes from `learner.jsonl`, spawns the
//! actor and rating-evaluator threads, runs the learner inline on the
//! calling thread, and tears everything down on exit.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rand::rngs::SmallRng;
use rand::SeedableRng;

use bz_infer::{DeviceManager, InferenceEvaluator};
use bz_replay::TrajectoryQueue;
use bz_utils::config::Device;
use bz_utils::jsonl::last_record;
use bz_utils::{Config, StopToken};
use bz_vnet::{ModelConfig, VNet};

use crate::error::TrainError;
use crate::learner::{self, LearnerContext};
use crate::rating::EvalResults;
use crate::{actor, rating};

/// Games this binary can supervise (every game must be two-player
/// zero-sum sequential terminal-reward). Backgammon is the
/// only one wired up; `bz_game::GameState`'s contract already enforces
/// that shape structurally, so the only runtime check left is the name
/// lookup `Config::validate` performs against this list.
const KNOWN_GAMES: &[&str] = &["backgammon"];

struct Resume {
    start_step: usize,
    start_time_offset: f64,
    total_trajectories: u64,
}

/// Reads the last line of `learner.jsonl`, if any, and recovers resume
/// state by reading the last non-empty line.
fn resume_state(config: &Config) -> Resume {
    let path = config.path.join("learner.jsonl");
    match last_record(&path) {
        Ok(Some(value)) => {
            let start_step = value.get("step").and_then(|v| v.as_u64()).map(|v| v as usize + 1).unwrap_or(0);
            let start_time_offset = value.get("time_rel").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let total_trajectories = value.get("total_trajectories").and_then(|v| v.as_u64()).unwrap_or(0);
            Resume { start_step, start_time_offset, total_trajectories }
        }
        _ => Resume { start_step: 0, start_time_offset: 0.0, total_trajectories: 0 },
    }
}

fn model_config(config: &Config) -> ModelConfig {
    use bz_game::observation::{RESNET_PLANES, STATE_ENCODING_SIZE};
    use bz_game::board::NUM_POINTS;

    match config.nn_model {
        bz_utils::config::NnModel::Resnet => ModelConfig {
            channels: RESNET_PLANES,
            height: NUM_POINTS,
            width: 1,
            nn_depth: config.nn_depth,
            nn_width: config.nn_width,
            learning_rate: config.learning_rate,
            weight_decay: config.weight_decay,
            nn_model: config.nn_model,
        },
        bz_utils::config::NnModel::Mlp => ModelConfig {
            channels: 1,
            height: 1,
            width: STATE_ENCODING_SIZE,
            nn_depth: config.nn_depth,
            nn_width: config.nn_width,
            learning_rate: config.learning_rate,
            weight_decay: config.weight_decay,
            nn_model: config.nn_model,
        },
    }
}

fn load_or_init_model(config: &Config, rng: &mut impl rand::Rng) -> Result<VNet, TrainError> {
    let expected = model_config(config);
    match VNet::load_checkpoint(&config.path, None, &expected) {
        Ok(model) => Ok(model),
        Err(_) => Ok(VNet::new(expected, rng)),
    }
}

/// Runs the whole supervised process to completion.
/// Returns the step the learner stopped at.
pub fn run(config: Config) -> Result<usize, TrainError> {
    config.validate(KNOWN_GAMES)?;

    bz_vnet::initialize();
    std::fs::create_dir_all(&config.path)?;
    config.save(config.path.join("config.json"))?;
    model_config(&config).save(config.path.join("vpnet.pb"))?;

    let config = Arc::new(config);
    let mut rng = SmallRng::from_entropy();
    let initial_model = load_or_init_model(&config, &mut rng)?;
    initial_model.save_checkpoint(&config.path, bz_vnet::LATEST_STEP)?;

    let devices = DeviceManager::new();
    for &device in &config.devices {
        devices.add_device(config.inference_batch_size, device, initial_model.clone());
    }
    if !config.devices.contains(&Device::Cpu) {
        devices.add_device(config.inference_batch_size, Device::Cpu, initial_model.clone());
    }

    let learner_device = config.learner_device().expect("validated non-empty devices");
    if config.explicit_learning {
        devices.add_device(config.train_batch_size, learner_device, initial_model.clone());
    }

    let inference_device = if config.prefer_cpu_inference() {
        Device::Cpu
    } else if config.explicit_learning && config.devices.len() > 1 {
        config.devices[1]
    } else {
        learner_device
    };

    let stop = StopToken::new();
    let evaluator = Arc::new(InferenceEvaluator::new(
        devices.clone(),
        config.inference_batch_size,
        inference_device,
        config.inference_threads,
        config.inference_cache,
        stop.clone(),
    ));

    let queue = Arc::new(TrajectoryQueue::new(config.actors.max(1) * 4));
    let eval_results = Arc::new(EvalResults::load_or_new(config.path.join("eval_results.data"), config.eval_levels, config.evaluation_window));

    let mut handles: Vec<JoinHandle<()>> = Vec::new();
    for i in 0..config.actors {
        let config = config.clone();
        let evaluator = evaluator.clone();
        let queue = queue.clone();
        let stop = stop.clone();
        handles.push(thread::Builder::new().name(format!("actor-{i}")).spawn(move || actor::run(i, config, evaluator, queue, stop)).expect("failed to spawn actor thread"));
    }
    for i in 0..config.evaluators {
        let config = config.clone();
        let evaluator = evaluator.clone();
        let eval_results = eval_results.clone();
        let stop = stop.clone();
        handles.push(
            thread::Builder::new()
                .name(format!("evaluator-{i}"))
                .spawn(move || rating::run(i, config, evaluator, eval_results, stop))
                .expect("failed to spawn evaluator thread"),
        );
    }

    let resume = resume_state(&config);
    let ctx = LearnerContext {
        config: config.clone(),
        queue: queue.clone(),
        devices,
        evaluator: evaluator.clone(),
        eval_results,
        stop: stop.clone(),
        start_step: resume.start_step,
        start_time_offset: resume.start_time_offset,
        total_trajectories: resume.total_trajectories,
    };

    let final_step = learner::run(ctx);

    stop.stop();
    queue.block_new_values();
    queue.clear();
    for handle in handles {
        let _ = handle.join();
    }
    Arc::try_unwrap(evaluator).map(InferenceEvaluator::shutdown).unwrap_or(());

    final_step
}

/// Sanity hook only used by tests -- confirms `Backgammon` satisfies the
/// two-player zero-sum sequential terminal-reward shape the supervisor
/// assumes.
#[cfg(test)]
fn assert_game_state_contract<G: bz_game::GameState>() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backgammon_satisfies_the_game_state_contract() {
        assert_game_state_contract::<bz_game::Backgammon>();
    }

    #[test]
    fn unknown_game_is_rejected_before_any_thread_spawns() {
        let config = Config { game: "chess".to_string(), ..Config::default() };
        assert!(config.validate(KNOWN_GAMES).is_err());
    }
}
