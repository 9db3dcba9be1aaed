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

//! Search configuration: the selection rule and its
//! exploration constant, simulation budgeting, and root-noise weights.
//! Kept separate from `bz_utils::config::Config` so `bz_mcts` does not
//! depend on the full orchestration config -- only the slice it actually
//! needs.

/// Which child-selection rule a search uses: PUCT for the
/// AlphaZero bot, UCT for the reference rollout bot.
#[derive(Clone, Copy, Debug)]
pub enum SelectRule {
    Puct { c: f32 },
    Uct { c: f32 },
}

/// Simulation budget and root-exploration parameters for one `Mcts::run`
/// call.
#[derive(Clone, Copy, Debug)]
pub struct SearchConfig {
    pub select: SelectRule,
    pub min_simulations: usize,
    pub max_simulations: usize,
    pub max_memory_mb: usize,
    /// `<= 0` disables Dirichlet root noise.
    pub policy_alpha: f32,
    pub policy_epsilon: f32,
}

impl SearchConfig {
    /// An AlphaZero search configuration with root noise enabled, for
    /// self-play.
    pub fn alpha_zero(uct_c: f32, min_simulations: usize, max_simulations: usize, max_memory_mb: usize, policy_alpha: f32, policy_epsilon: f32) -> Self {
        SearchConfig {
            select: SelectRule::Puct { c: uct_c },
            min_simulations,
            max_simulations,
            max_memory_mb,
            policy_alpha,
            policy_epsilon,
        }
    }

    /// The same search, with root noise disabled: used by the rating
    /// evaluator when it plays the AZ side.
    pub fn without_noise(self) -> Self {
        SearchConfig { policy_alpha: 0.0, ..self }
    }

    /// A reference UCT search at a given rollout-scaled simulation budget
    /// (`max_simulations * 10^(difficulty/2)`).
    pub fn reference_uct(uct_c: f32, simulations: usize, max_memory_mb: usize) -> Self {
        SearchConfig {
            select: SelectRule::Uct { c: uct_c },
            min_simulations: simulations,
            max_simulations: simulations,
            max_memory_mb,
            policy_alpha: 0.0,
            policy_epsilon: 0.0,
        }
    }
}

/// Move-selection temperature schedule: sample proportional to
/// `visits^(1/temperature)` before `drop_after` moves into the game,
/// then always take the max.
#[derive(Clone, Copy, Debug)]
pub struct TemperatureSchedule {
    pub temperature: f32,
    pub drop_after: usize,
}

impl TemperatureSchedule {
    pub fn is_sampling(self, move_number: usize) -> bool {
        move_number < self.drop_after && self.temperature > 0.0
    }
}
