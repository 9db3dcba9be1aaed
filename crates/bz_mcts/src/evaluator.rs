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

//! Leaf evaluation: the AZ bot bootstraps a freshly
//! expanded decision node from the shared inference evaluator; the
//! reference bot bootstraps it by random rollout to a terminal state.
//! Both are exposed through one `LeafEvaluator` so `search.rs` never
//! needs to know which kind of bot is running.

use rand::seq::SliceRandom;

use bz_game::{GameState, Player};

/// A value source keyed by observation bytes. Implemented
/// directly by `bz_infer::InferenceEvaluator`.
pub trait ValueEvaluator: Send + Sync {
    /// Value of `observation` from the player-centric perspective it was
    /// encoded for. `None` iff the shared stop token fired while waiting
    /// for a reply.
    fn evaluate(&self, observation: &[f32]) -> Option<f32>;
}

impl ValueEvaluator for bz_infer::InferenceEvaluator {
    fn evaluate(&self, observation: &[f32]) -> Option<f32> {
        bz_infer::InferenceEvaluator::evaluate(self, observation)
    }
}

/// Bootstraps the value of a not-yet-terminal state from `acting_player`'s
/// own perspective (positive == good for `acting_player`). `search.rs`
/// flips this into the tree's player-0 convention by multiplying with
/// `acting_player.sign()`.
pub trait LeafEvaluator<G: GameState>: Send + Sync {
    fn evaluate(&self, state: &G, acting_player: Player) -> Option<f32>;
}

/// The AlphaZero leaf evaluator: one inference call against `state`'s
/// player-centric observation for `acting_player`.
pub struct NetworkLeafEvaluator<'a, V: ValueEvaluator> {
    pub values: &'a V,
}

impl<'a, V: ValueEvaluator> NetworkLeafEvaluator<'a, V> {
    pub fn new(values: &'a V) -> Self {
        NetworkLeafEvaluator { values }
    }
}

impl<'a, G: GameState, V: ValueEvaluator> LeafEvaluator<G> for NetworkLeafEvaluator<'a, V> {
    fn evaluate(&self, state: &G, acting_player: Player) -> Option<f32> {
        let observation = state.observation_tensor(acting_player);
        self.values.evaluate(&observation)
    }
}

/// The reference bot's leaf evaluator (rollout-MCTS): plays
/// `num_rollouts` independent random games to terminal from `state` and
/// averages the realized return for `acting_player`. Random both at
/// decision and chance nodes -- this is a policy-free rollout, not a
/// second MCTS.
pub struct RolloutLeafEvaluator {
    pub num_rollouts: usize,
}

impl<G: GameState> LeafEvaluator<G> for RolloutLeafEvaluator {
    fn evaluate(&self, state: &G, acting_player: Player) -> Option<f32> {
        let mut rng = rand::thread_rng();
        let mut total = 0.0f32;

        for _ in 0..self.num_rollouts.max(1) {
            let mut rollout = state.clone();
            while !rollout.is_terminal() {
                let action = if rollout.is_chance() {
                    let outcomes = rollout.chance_outcomes();
                    weighted_choice(&outcomes, &mut rng)
                } else {
                    let actions = rollout.legal_actions();
                    *actions.choose(&mut rng).expect("decision node must have a legal action")
                };
                rollout = rollout.apply_action(action);
            }

            total += rollout.returns()[acting_player.index()];
        }

        Some(total / self.num_rollouts.max(1) as f32)
    }
}

fn weighted_choice(outcomes: &[(bz_game::ActionId, f64)], rng: &mut impl rand::Rng) -> bz_game::ActionId {
    let total: f64 = outcomes.iter().map(|(_, p)| p).sum();
    let mut x: f64 = rng.gen_range(0.0..total.max(f64::EPSILON));

    for (action, p) in outcomes {
        x -= p;
        if x <= 0.0 {
            return *action;
        }
    }

    outcomes.last().expect("chance node must have at least one outcome").0
}

#[cfg(test)]
mod tests {
    use super::*;
    use bz_game::{Backgammon, BackgammonVariant};

    #[test]
    fn rollout_returns_are_within_bounds() {
        let state = Backgammon::new_initial_state(BackgammonVariant::Hyper);
        let evaluator = RolloutLeafEvaluator { num_rollouts: 2 };
        let value = evaluator.evaluate(&state, Player::Zero).unwrap();
        assert!((-1.0..=1.0).contains(&value));
    }
}
