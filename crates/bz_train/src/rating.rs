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

//! The rating evaluator thread: plays the AlphaZero bot
//! against a rollout-MCTS reference bot whose simulation budget scales
//! with difficulty, recording a recent-window mean return per difficulty
//! level in a registry shared with every other evaluator thread.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bz_game::{Backgammon, BackgammonVariant};
use bz_infer::InferenceEvaluator;
use bz_mcts::{Mcts, NetworkLeafEvaluator, RolloutLeafEvaluator, SearchConfig, TemperatureSchedule};
use bz_utils::jsonl::JsonlWriter;
use bz_utils::{Config, StopToken};

use crate::game_loop::play_rated_game;

#[derive(Debug, Error)]
pub enum EvalResultsError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("eval results deserialization failed: {0}")]
    Decode(#[from] bincode::Error),
}

#[derive(Serialize, Deserialize)]
struct PersistedEvalResults {
    window_size: usize,
    windows: Vec<VecDeque<f32>>,
}

/// Per-difficulty recent-window mean AZ return, shared
/// across every rating evaluator thread under one mutex. Persisted next
/// to `learner.jsonl`/`replay_buffer.data` so a resumed run does not lose
/// rating history.
pub struct EvalResults {
    windows: Mutex<Vec<VecDeque<f32>>>,
    window_size: usize,
}

impl EvalResults {
    pub fn new(levels: usize, window_size: usize) -> Self {
        EvalResults { windows: Mutex::new(vec![VecDeque::new(); levels.max(1)]), window_size: window_size.max(1) }
    }

    pub fn record(&self, level: usize, value: f32) {
        let mut windows = self.windows.lock().expect("eval results lock poisoned");
        if let Some(window) = windows.get_mut(level) {
            if window.len() == self.window_size {
                window.pop_front();
            }
            window.push_back(value);
        }
    }

    /// Mean return per difficulty level, `None` where no game has
    /// finished yet -- fed into the learner's structured log record
    /// for the run.
    pub fn means(&self) -> Vec<Option<f32>> {
        let windows = self.windows.lock().expect("eval results lock poisoned");
        windows.iter().map(|w| if w.is_empty() { None } else { Some(w.iter().sum::<f32>() / w.len() as f32) }).collect()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), EvalResultsError> {
        let windows = self.windows.lock().expect("eval results lock poisoned");
        let persisted = PersistedEvalResults { window_size: self.window_size, windows: windows.clone() };
        let bytes = bincode::serialize(&persisted)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Loads a previously saved registry, re-keyed to `levels` windows --
    /// `eval_levels` may have changed across a resume, in which case
    /// levels beyond the saved count start empty and saved levels beyond
    /// the new count are dropped.
    pub fn load(path: impl AsRef<Path>, levels: usize) -> Result<Self, EvalResultsError> {
        let bytes = std::fs::read(path)?;
        let persisted: PersistedEvalResults = bincode::deserialize(&bytes)?;

        let mut windows = vec![VecDeque::new(); levels.max(1)];
        for (level, window) in persisted.windows.into_iter().enumerate().take(windows.len()) {
            windows[level] = window;
        }

        Ok(EvalResults { windows: Mutex::new(windows), window_size: persisted.window_size.max(1) })
    }

    /// Loads `path` if present, otherwise starts a fresh empty registry.
    pub fn load_or_new(path: impl AsRef<Path>, levels: usize, window_size: usize) -> Self {
        Self::load(path, levels).unwrap_or_else(|_| Self::new(levels, window_size))
    }
}

#[derive(Serialize)]
struct EvaluatorLogRecord {
    difficulty: usize,
    simulations: usize,
    az_plays: &'static str,
    az_return: f32,
}

/// Simulation budget at `difficulty`: `max_simulations * 10^(difficulty/2)`.
fn scaled_simulations(max_simulations: usize, difficulty: usize) -> usize {
    let scaled = max_simulations as f64 * 10f64.powf(difficulty as f64 / 2.0);
    scaled.round().max(1.0) as usize
}

pub fn run(index: usize, config: Arc<Config>, evaluator: Arc<InferenceEvaluator>, results: Arc<EvalResults>, stop: StopToken) {
    let mut rng = SmallRng::from_entropy();
    let leaf = NetworkLeafEvaluator::new(evaluator.as_ref());
    let az_config = SearchConfig::alpha_zero(
        config.uct_c,
        config.min_simulations,
        config.max_simulations,
        config.max_memory_mb,
        config.policy_alpha,
        config.policy_epsilon,
    )
    .without_noise();
    // Deterministic play for rating games: temperature 0 always takes the
    // max-visits child -- head-to-head play, not exploration.
    let schedule = TemperatureSchedule { temperature: 0.0, drop_after: 0 };

    let mut log = JsonlWriter::create_or_append(config.path.join(format!("evaluator-{index}"))).expect("failed to open evaluator log");

    let mut round = 0usize;
    while !stop.is_stopped() {
        let difficulty = round % config.eval_levels.max(1);
        let az_plays_zero = round % 2 == 0;

        let simulations = scaled_simulations(config.max_simulations, difficulty);
        let rollout = RolloutLeafEvaluator { num_rollouts: 1 };
        let uct_config = SearchConfig::reference_uct(config.uct_c, simulations, config.max_memory_mb);

        let az_bot = Mcts::new(az_config, &leaf);
        let uct_bot = Mcts::new(uct_config, &rollout);

        let initial = Backgammon::new_initial_state(BackgammonVariant::Default);
        let returns = if az_plays_zero {
            play_rated_game(initial, &az_bot, schedule, &uct_bot, schedule, &mut rng)
        } else {
            play_rated_game(initial, &uct_bot, schedule, &az_bot, schedule, &mut rng)
        };

        let Some(returns) = returns else { break };

        let az_return = if az_plays_zero { returns[0] } else { returns[1] };
        results.record(difficulty, az_return);

        let record = EvaluatorLogRecord { difficulty, simulations, az_plays: if az_plays_zero { "zero" } else { "one" }, az_return };
        let _ = log.write_record(&record);

        round += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_simulations_grows_by_a_power_of_ten_per_two_levels() {
        assert_eq!(scaled_simulations(100, 0), 100);
        assert_eq!(scaled_simulations(100, 2), 1000);
        assert_eq!(scaled_simulations(100, 4), 10000);
    }

    #[test]
    fn scaled_simulations_never_rounds_down_to_zero() {
        assert_eq!(scaled_simulations(0, 0), 1);
    }

    #[test]
    fn means_are_none_until_a_game_records_at_that_level() {
        let results = EvalResults::new(3, 4);
        assert_eq!(results.means(), vec![None, None, None]);

        results.record(1, 0.5);
        assert_eq!(results.means(), vec![None, Some(0.5), None]);
    }

    #[test]
    fn window_drops_the_oldest_value_once_full() {
        let results = EvalResults::new(1, 2);
        results.record(0, 1.0);
        results.record(0, 1.0);
        results.record(0, -1.0);

        assert_eq!(results.means(), vec![Some(0.0)]);
    }

    #[test]
    fn save_then_load_preserves_every_window() {
        let path = std::env::temp_dir().join(format!("bz_eval_results_{}", std::process::id()));

        let results = EvalResults::new(2, 4);
        results.record(0, 0.5);
        results.record(1, -0.25);
        results.save(&path).unwrap();

        let reloaded = EvalResults::load(&path, 2).unwrap();
        assert_eq!(reloaded.means(), results.means());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn load_or_new_starts_empty_when_no_file_exists_yet() {
        let path = std::env::temp_dir().join(format!("bz_eval_results_missing_{}", std::process::id()));
        let results = EvalResults::load_or_new(&path, 3, 4);
        assert_eq!(results.means(), vec![None, None, None]);
    }

    #[test]
    fn load_re_keys_to_a_changed_level_count() {
        let path = std::env::temp_dir().join(format!("bz_eval_results_rekey_{}", std::process::id()));

        let results = EvalResults::new(2, 4);
        results.record(0, 1.0);
        results.record(1, -1.0);
        results.save(&path).unwrap();

        let grown = EvalResults::load(&path, 4).unwrap();
        assert_eq!(grown.means(), vec![Some(1.0), Some(-1.0), None, None]);

        let shrunk = EvalResults::load(&path, 1).unwrap();
        assert_eq!(shrunk.means(), vec![Some(1.0)]);

        std::fs::remove_file(&path).unwrap();
    }
}
