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

//! The self-play actor thread: plays backgammon games with
//! two identically-configured AlphaZero bots sharing one inference
//! evaluator, recording a `Trajectory` per game and handing it to the
//! learner through the bounded `TrajectoryQueue`.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use bz_game::{Backgammon, BackgammonVariant, GameState, Player, Turn};
use bz_infer::InferenceEvaluator;
use bz_mcts::{select_action, Mcts, NetworkLeafEvaluator, SearchConfig, TemperatureSchedule};
use bz_replay::{evaluate_luck, PushOutcome, TrajState, Trajectory, TrajectoryQueue};
use bz_utils::jsonl::JsonlWriter;
use bz_utils::{Config, StopToken};

use crate::game_loop::sample_chance_outcome;

#[derive(Serialize)]
struct ActorLogRecord {
    game_length: usize,
    returns: [f32; 2],
    cutoff: bool,
}

/// Runs forever (until the stop token fires), each iteration playing one
/// self-play game and pushing its trajectory.
pub fn run(index: usize, config: Arc<Config>, evaluator: Arc<InferenceEvaluator>, queue: Arc<TrajectoryQueue>, stop: StopToken) {
    let mut rng = SmallRng::from_entropy();
    let leaf = NetworkLeafEvaluator::new(evaluator.as_ref());
    let search_config = SearchConfig::alpha_zero(
        config.uct_c,
        config.min_simulations,
        config.max_simulations,
        config.max_memory_mb,
        config.policy_alpha,
        config.policy_epsilon,
    );
    // Two bots, same search configuration and evaluator -- one network
    // plays both sides of the game.
    let bot0 = Mcts::new(search_config, &leaf);
    let bot1 = Mcts::new(search_config, &leaf);
    let schedule = TemperatureSchedule { temperature: config.temperature, drop_after: config.temperature_drop };

    let mut log = JsonlWriter::create_or_append(config.path.join(format!("actor-{index}"))).expect("failed to open actor log");

    while !stop.is_stopped() {
        let cutoff_enabled = rng.gen_bool(config.cutoff_probability as f64);

        let Some((trajectory, cutoff_fired)) = play_one_game(&bot0, &bot1, schedule, evaluator.as_ref(), cutoff_enabled, config.cutoff_value, &stop, &mut rng) else {
            break;
        };

        let record = ActorLogRecord { game_length: trajectory.states.len(), returns: trajectory.returns, cutoff: cutoff_fired };
        let _ = log.write_record(&record);

        push_with_retry(&queue, trajectory, index, &mut log, &stop);
    }
}

/// Plays one game, recording every decision state. Returns `None` iff the
/// stop token fired mid-search. The second element of the tuple records
/// whether the per-game cutoff actually terminated the game early.
fn play_one_game(
    bot0: &Mcts<'_, Backgammon, NetworkLeafEvaluator<'_, InferenceEvaluator>>,
    bot1: &Mcts<'_, Backgammon, NetworkLeafEvaluator<'_, InferenceEvaluator>>,
    schedule: TemperatureSchedule,
    values: &InferenceEvaluator,
    cutoff_enabled: bool,
    cutoff_value: f32,
    stop: &StopToken,
    rng: &mut impl Rng,
) -> Option<(Trajectory, bool)> {
    let mut state = Backgammon::new_initial_state(BackgammonVariant::Default);
    let mut accumulated_luck = 0.0f32;
    let mut states = Vec::new();
    let mut move_number = 0usize;

    loop {
        if stop.is_stopped() {
            return None;
        }

        match state.turn() {
            Turn::Terminal => {
                let returns = state.returns();
                let mut trajectory = Trajectory::new(returns);
                trajectory.states = states;
                return Some((trajectory, false));
            }
            Turn::Chance => {
                let outcomes = state.chance_outcomes();
                let candidate_values: Vec<(f64, f32)> = outcomes
                    .iter()
                    .map(|(action, p)| {
                        let next = state.apply_action(*action);
                        let v = values.evaluate(&next.observation_tensor(Player::Zero)).unwrap_or(0.0);
                        (*p, v)
                    })
                    .collect();

                let chosen = sample_chance_outcome(&state, rng);
                let chosen_value = candidate_values[outcomes.iter().position(|(a, _)| *a == chosen).unwrap_or(0)].1;
                accumulated_luck += evaluate_luck(chosen_value, &candidate_values);

                state = state.apply_action(chosen);
            }
            Turn::Player(mover) => {
                let result = match mover {
                    Player::Zero => bot0.run(&state, true, rng)?,
                    Player::One => bot1.run(&state, true, rng)?,
                };
                let index = select_action(&result.root, move_number, schedule, rng);
                let chosen_action = result.root.children[index].action;
                let value_after_action = result.root.children[index]
                    .node
                    .as_ref()
                    .map_or(0.0, |n| n.recorded_value(mover));

                states.push(TrajState {
                    observation: state.observation_tensor(mover),
                    current_player: mover,
                    chosen_action,
                    value_after_action,
                    accumulated_luck_for_player_0: accumulated_luck,
                });

                if cutoff_enabled && value_after_action.abs() > cutoff_value {
                    let mut trajectory = Trajectory::new(returns_from(mover, value_after_action));
                    trajectory.states = states;
                    return Some((trajectory, true));
                }

                state = state.apply_action(chosen_action);
                move_number += 1;
            }
        }
    }
}

/// Builds a terminal `[f32; 2]` return pair from a cutoff value recorded
/// in `mover`'s own perspective.
fn returns_from(mover: Player, value: f32) -> [f32; 2] {
    let mut returns = [0.0; 2];
    returns[mover.index()] = value;
    returns[mover.other().index()] = -value;
    returns
}

fn push_with_retry(queue: &TrajectoryQueue, mut trajectory: Trajectory, index: usize, log: &mut JsonlWriter, stop: &StopToken) {
    loop {
        match queue.push(trajectory) {
            PushOutcome::Delivered => return,
            PushOutcome::Closed(_) => return,
            PushOutcome::TimedOut(returned) => {
                let _ = log.write_line(&format!("{{\"warning\":\"trajectory queue full, retrying\",\"actor\":{index}}}"));
                if stop.is_stopped() {
                    return;
                }
                trajectory = returned;
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bz_infer::InferenceEvaluator;
    use bz_mcts::SearchConfig;
    use bz_utils::config::{Device, NnModel};
    use bz_vnet::ModelConfig;

    fn evaluator() -> InferenceEvaluator {
        let config = ModelConfig { channels: 1, height: 1, width: bz_game::observation::STATE_ENCODING_SIZE, nn_depth: 1, nn_width: 8, learning_rate: 0.01, weight_decay: 0.0, nn_model: NnModel::Mlp };
        let mut rng = rand::rngs::SmallRng::seed_from_u64(0);
        let model = bz_vnet::VNet::new(config, &mut rng);

        let devices = bz_infer::DeviceManager::new();
        devices.add_device(4, Device::Cpu, model);
        InferenceEvaluator::new(devices, 4, Device::Cpu, 1, 64, StopToken::new())
    }

    #[test]
    fn a_played_game_records_one_traj_state_per_decision_and_zero_sum_returns() {
        let evaluator = evaluator();
        let leaf = NetworkLeafEvaluator::new(&evaluator);
        let search_config = SearchConfig::alpha_zero(1.4, 4, 8, 1000, 0.3, 0.25);
        let bot0 = Mcts::new(search_config, &leaf);
        let bot1 = Mcts::new(search_config, &leaf);
        let schedule = TemperatureSchedule { temperature: 1.0, drop_after: 4 };
        let stop = StopToken::new();
        let mut rng = SmallRng::seed_from_u64(0);

        let (trajectory, cutoff_fired) = play_one_game(&bot0, &bot1, schedule, &evaluator, false, 0.95, &stop, &mut rng).unwrap();

        assert!(!cutoff_fired);
        assert!(!trajectory.states.is_empty());
        assert!((trajectory.returns[0] + trajectory.returns[1]).abs() < 1e-6);

        evaluator.shutdown();
    }

    #[test]
    fn stopped_token_aborts_the_game_with_no_trajectory() {
        let evaluator = evaluator();
        let leaf = NetworkLeafEvaluator::new(&evaluator);
        let search_config = SearchConfig::alpha_zero(1.4, 4, 8, 1000, 0.3, 0.25);
        let bot0 = Mcts::new(search_config, &leaf);
        let bot1 = Mcts::new(search_config, &leaf);
        let schedule = TemperatureSchedule { temperature: 1.0, drop_after: 4 };
        let stop = StopToken::new();
        stop.stop();
        let mut rng = SmallRng::seed_from_u64(0);

        assert!(play_one_game(&bot0, &bot1, schedule, &evaluator, false, 0.95, &stop, &mut rng).is_none());
        evaluator.shutdown();
    }

    #[test]
    fn returns_from_puts_the_mover_on_their_own_side() {
        assert_eq!(returns_from(Player::Zero, 0.4), [0.4, -0.4]);
        assert_eq!(returns_from(Player::One, 0.4), [-0.4, 0.4]);
    }
}
