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

//! The learner thread: drains trajectories, folds them
//! into TD(λ) replay samples, trains the network, rolls checkpoints
//! forward, and tells every other device to pick the new weights up.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::Serialize;

use bz_infer::{DeviceManager, InferenceEvaluator};
use bz_replay::{ReplayBuffer, Trajectory, TrajectoryQueue};
use bz_utils::config::Device;
use bz_utils::jsonl::JsonlWriter;
use bz_utils::{Config, StopToken};
use bz_vnet::{Losses, LATEST_STEP};

use crate::error::TrainError;
use crate::rating::EvalResults;

/// Where the learner trains: a dedicated replica when `explicit_learning`
/// frees up other devices for uncontended inference, otherwise the same
/// replica the shared inference evaluator itself uses (`explicit_learning`
/// requires at least 2 configured devices).
pub fn training_replica_key(config: &Config) -> (usize, Device) {
    let learner_device = config.learner_device().expect("config validated to have >= 1 device");
    if config.explicit_learning {
        (config.train_batch_size, learner_device)
    } else {
        (config.inference_batch_size, learner_device)
    }
}

/// Recent-window game statistics, plus value-prediction accuracy sampled
/// at 7 equally spaced stages of the game.
struct RollingStats {
    games: u64,
    total_length: u64,
    player_zero_wins: u64,
    stage_prediction_sum: [f64; 7],
    stage_error_sum: [f64; 7],
    stage_count: [u64; 7],
}

impl RollingStats {
    fn new() -> Self {
        RollingStats { games: 0, total_length: 0, player_zero_wins: 0, stage_prediction_sum: [0.0; 7], stage_error_sum: [0.0; 7], stage_count: [0; 7] }
    }

    fn record(&mut self, trajectory: &Trajectory) {
        self.games += 1;
        self.total_length += trajectory.states.len() as u64;
        if trajectory.returns[0] > trajectory.returns[1] {
            self.player_zero_wins += 1;
        }

        let len = trajectory.states.len().max(1);
        for (i, state) in trajectory.states.iter().enumerate() {
            let stage = ((i * 7) / len).min(6);
            let realized = trajectory.returns[state.current_player.index()];
            self.stage_prediction_sum[stage] += state.value_after_action as f64;
            self.stage_error_sum[stage] += (state.value_after_action - realized).abs() as f64;
            self.stage_count[stage] += 1;
        }
    }

    fn avg_game_length(&self) -> f64 {
        if self.games == 0 { 0.0 } else { self.total_length as f64 / self.games as f64 }
    }

    fn player_zero_win_rate(&self) -> f64 {
        if self.games == 0 { 0.0 } else { self.player_zero_wins as f64 / self.games as f64 }
    }

    fn stage_predictions(&self) -> [f64; 7] {
        let mut out = [0.0; 7];
        for i in 0..7 {
            out[i] = if self.stage_count[i] == 0 { 0.0 } else { self.stage_prediction_sum[i] / self.stage_count[i] as f64 };
        }
        out
    }

    fn stage_value_accuracy(&self) -> [f64; 7] {
        let mut out = [0.0; 7];
        for i in 0..7 {
            out[i] = if self.stage_count[i] == 0 { 0.0 } else { self.stage_error_sum[i] / self.stage_count[i] as f64 };
        }
        out
    }
}

#[derive(Serialize)]
struct LearnerRecord {
    time_rel: f64,
    step: usize,
    total_trajectories: u64,
    states_per_step: usize,
    buffer_size: usize,
    mse_loss: f32,
    weight_decay_loss: f32,
    total_loss: f32,
    eval_means: Vec<Option<f32>>,
    cache_hits: u64,
    cache_misses: u64,
    avg_game_length: f64,
    player_zero_win_rate: f64,
    stage_value_predictions: [f64; 7],
    stage_value_accuracy: [f64; 7],
}

/// Everything the learner needs that the supervisor owns and hands down.
pub struct LearnerContext {
    pub config: Arc<Config>,
    pub queue: Arc<TrajectoryQueue>,
    pub devices: DeviceManager,
    pub evaluator: Arc<InferenceEvaluator>,
    pub eval_results: Arc<EvalResults>,
    pub stop: StopToken,
    pub start_step: usize,
    pub start_time_offset: f64,
    pub total_trajectories: u64,
}

/// Runs the learner loop until the stop token fires or `max_steps` is
/// reached (0 = unbounded), returning the final step reached.
pub fn run(mut ctx: LearnerContext) -> Result<usize, TrainError> {
    let started_at = Instant::now();
    let (batch_size, learner_device) = training_replica_key(&ctx.config);
    let loan = ctx.devices.get(batch_size, learner_device).expect("learner device must be registered");

    let replay_path = ctx.config.path.join("replay_buffer.data");
    let mut buffer = ReplayBuffer::load(&replay_path).unwrap_or_else(|_| ReplayBuffer::new(ctx.config.replay_buffer_size));
    let eval_results_path = ctx.config.path.join("eval_results.data");

    let mut log = JsonlWriter::create_or_append(ctx.config.path.join("learner.jsonl"))?;
    let mut rng = SmallRng::from_entropy();
    let learn_rate = ctx.config.learn_rate().max(1);

    let mut step = ctx.start_step;
    loop {
        if ctx.stop.is_stopped() {
            break;
        }
        if ctx.config.max_steps != 0 && step >= ctx.config.max_steps {
            ctx.stop.stop();
            break;
        }

        let mut stats = RollingStats::new();
        let mut states_consumed = 0usize;

        while states_consumed < learn_rate {
            if ctx.stop.is_stopped() {
                return Ok(step);
            }

            let Some(trajectory) = ctx.queue.pop_timeout(Duration::from_millis(200)) else { continue };
            ctx.total_trajectories += 1;
            states_consumed += trajectory.states.len();

            stats.record(&trajectory);
            for sample in trajectory.replay_samples(ctx.config.td_lambda, ctx.config.td_n_steps) {
                buffer.add(sample);
            }
        }

        buffer.save(&replay_path)?;
        ctx.eval_results.save(&eval_results_path)?;

        if ctx.config.explicit_learning {
            ctx.devices.set_learning(batch_size, learner_device, true);
        }
        let losses = train_minibatches(&loan, &mut buffer, &ctx.config, &mut rng);
        if ctx.config.explicit_learning {
            ctx.devices.set_learning(batch_size, learner_device, false);
        }

        let checkpoint_dir = &ctx.config.path;
        save_model(&loan, checkpoint_dir, step, ctx.config.checkpoint_freq)?;

        let latest_path = latest_checkpoint_path(checkpoint_dir);
        ctx.devices.reload_all_except(learner_device, &latest_path)?;

        let cache_stats = ctx.evaluator.cache_stats();
        let record = LearnerRecord {
            time_rel: ctx.start_time_offset + started_at.elapsed().as_secs_f64(),
            step,
            total_trajectories: ctx.total_trajectories,
            states_per_step: states_consumed,
            buffer_size: buffer.size(),
            mse_loss: losses.mse,
            weight_decay_loss: losses.weight_decay,
            total_loss: losses.total,
            eval_means: ctx.eval_results.means(),
            cache_hits: cache_stats.hits,
            cache_misses: cache_stats.misses,
            avg_game_length: stats.avg_game_length(),
            player_zero_win_rate: stats.player_zero_win_rate(),
            stage_value_predictions: stats.stage_predictions(),
            stage_value_accuracy: stats.stage_value_accuracy(),
        };
        log.write_record(&record)?;

        ctx.evaluator.clear_cache();
        step += 1;
    }

    Ok(step)
}

fn train_minibatches(loan: &bz_infer::LoanHandle, buffer: &mut ReplayBuffer, config: &Config, rng: &mut impl rand::Rng) -> Losses {
    let num_batches = buffer.size() / config.train_batch_size.max(1);
    let mut last = Losses { mse: 0.0, weight_decay: 0.0, total: 0.0 };

    if buffer.is_empty() || num_batches == 0 {
        return last;
    }

    for _ in 0..num_batches {
        let samples = buffer.sample(rng, config.train_batch_size);
        let observations: Vec<Vec<f32>> = samples.iter().map(|s| s.observation.clone()).collect();
        let targets: Vec<f32> = samples.iter().map(|s| s.scalar_value_target).collect();

        let mut model = loan.wait();
        last = model.train_step(&observations, &targets);
    }

    last
}

fn latest_checkpoint_path(dir: &Path) -> PathBuf {
    dir.join(format!("checkpoint-{LATEST_STEP}.pt"))
}

fn save_model(loan: &bz_infer::LoanHandle, dir: &Path, step: usize, checkpoint_freq: usize) -> Result<(), TrainError> {
    let model = loan.wait();
    model.save_checkpoint(dir, LATEST_STEP)?;
    if checkpoint_freq != 0 && step % checkpoint_freq == 0 {
        model.save_checkpoint(dir, step as i64)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bz_game::Player;
    use bz_replay::TrajState;
    use bz_utils::config::{Device, NnModel};
    use bz_vnet::ModelConfig;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn state(player: Player, value: f32) -> TrajState {
        TrajState { observation: vec![0.0; 4], current_player: player, chosen_action: 0, value_after_action: value, accumulated_luck_for_player_0: 0.0 }
    }

    #[test]
    fn training_replica_key_uses_the_train_batch_size_only_when_explicit() {
        let mut config = Config { devices: vec![Device::Gpu(0), Device::Cpu], explicit_learning: true, train_batch_size: 512, inference_batch_size: 64, ..Config::default() };
        assert_eq!(training_replica_key(&config), (512, Device::Gpu(0)));

        config.explicit_learning = false;
        assert_eq!(training_replica_key(&config), (64, Device::Gpu(0)));
    }

    #[test]
    fn rolling_stats_tracks_win_rate_and_average_length() {
        let mut stats = RollingStats::new();
        let mut a = Trajectory::new([1.0, -1.0]);
        a.states = vec![state(Player::Zero, 0.5), state(Player::One, -0.5)];
        let mut b = Trajectory::new([-1.0, 1.0]);
        b.states = vec![state(Player::Zero, -0.3)];

        stats.record(&a);
        stats.record(&b);

        assert_eq!(stats.avg_game_length(), 1.5);
        assert_eq!(stats.player_zero_win_rate(), 0.5);
    }

    #[test]
    fn rolling_stats_buckets_decisions_into_seven_stages() {
        let mut stats = RollingStats::new();
        let mut traj = Trajectory::new([1.0, -1.0]);
        traj.states = (0..7).map(|i| state(Player::Zero, i as f32 * 0.1)).collect();
        stats.record(&traj);

        assert_eq!(stats.stage_predictions().len(), 7);
        for count in stats.stage_count {
            assert_eq!(count, 1);
        }
    }

    #[test]
    fn latest_checkpoint_path_points_at_the_canonical_step() {
        let dir = Path::new("/tmp/bz-learner-test");
        assert_eq!(latest_checkpoint_path(dir), dir.join(format!("checkpoint-{LATEST_STEP}.pt")));
    }

    #[test]
    fn train_minibatches_is_a_noop_on_an_empty_buffer() {
        let config = ModelConfig { channels: 1, height: 1, width: 4, nn_depth: 1, nn_width: 8, learning_rate: 0.01, weight_decay: 0.0, nn_model: NnModel::Mlp };
        let mut rng = SmallRng::seed_from_u64(0);
        let model = bz_vnet::VNet::new(config, &mut rng);

        let devices = bz_infer::DeviceManager::new();
        devices.add_device(4, Device::Cpu, model);
        let loan = devices.get(4, Device::Cpu).unwrap();

        let mut buffer = ReplayBuffer::new(16);
        let train_config = Config { train_batch_size: 4, replay_buffer_size: 16, ..Config::default() };

        let losses = train_minibatches(&loan, &mut buffer, &train_config, &mut rng);
        assert_eq!(losses.total, 0.0);
    }
}
