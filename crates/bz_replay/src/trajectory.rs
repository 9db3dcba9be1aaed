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

//! `Trajectory`/`ReplaySample` and luck-adjusted TD(λ)
//! valuation. The value function `V` needed for chance-node
//! luck is passed in as a closure so this module never depends on
//! `bz_infer`/`bz_mcts` directly -- actors own the inference evaluator
//! and MCTS search, this module only knows the arithmetic.

use bz_game::{ActionId, Player};
use serde::{Deserialize, Serialize};

/// One recorded *decision* within a self-play game. Chance
/// transitions never produce a `TrajState` -- only the luck they
/// introduce is folded into `accumulated_luck_for_player_0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajState {
    pub observation: Vec<f32>,
    pub current_player: Player,
    pub chosen_action: ActionId,
    /// The chosen child's search-derived value, evaluated from
    /// `current_player`'s own (the acting player's) perspective.
    pub value_after_action: f32,
    /// Running sum of chance-node luck up to and including this state,
    /// always in player-0's perspective.
    pub accumulated_luck_for_player_0: f32,
}

/// A complete self-play game: its decision states plus the
/// final per-player terminal returns (or the early-cutoff return).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    pub states: Vec<TrajState>,
    pub returns: [f32; 2],
}

/// `{observation, scalar_value_target}`: one training example
/// for the value network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaySample {
    pub observation: Vec<f32>,
    pub scalar_value_target: f32,
}

impl Trajectory {
    pub fn new(returns: [f32; 2]) -> Self {
        Trajectory { states: Vec::new(), returns }
    }

    pub fn push(&mut self, state: TrajState) {
        self.states.push(state);
    }

    /// `value_after_action` converted into player-0's perspective:
    /// `v_i = value_after_action * (player 0 ? +1 : -1)`.
    fn v(&self, i: usize) -> f32 {
        let state = &self.states[i];
        state.value_after_action * state.current_player.sign()
    }

    fn luck(&self, i: usize) -> f32 {
        self.states[i].accumulated_luck_for_player_0
    }

    /// The luck-adjusted TD(λ, n) return at state `s`,
    /// still in player-0's perspective; `to_replay_sample` applies the
    /// observation-relative sign flip on top of this.
    pub fn td_lambda_return(&self, s: usize, lambda: f32, n: usize) -> f32 {
        let len = self.states.len();
        debug_assert!(s < len);

        let accum_s = self.luck(s);
        let bootstrap = |end_luck: f32| -> f32 { (self.returns[0] - (end_luck - accum_s)).clamp(-1.0, 1.0) };

        if lambda >= 1.0 {
            if n == 0 || s + n >= len {
                bootstrap(self.luck(len - 1))
            } else {
                self.v(s + n) - (self.luck(s + n) - accum_s)
            }
        } else if lambda <= 0.0 {
            self.v(s)
        } else {
            let reaches_n_cutoff = n > 0 && s + n < len;
            let m = if reaches_n_cutoff { n } else { len - 1 - s };

            let mut target = (1.0 - lambda) * self.v(s);
            let sum_upper = if reaches_n_cutoff { m - 1 } else { m };

            for k in 1..=sum_upper {
                target += (1.0 - lambda) * lambda.powi(k as i32) * (self.v(s + k) - (self.luck(s + k) - accum_s));
            }

            if reaches_n_cutoff {
                target += lambda.powi(m as i32) * (self.v(s + m) - (self.luck(s + m) - accum_s));
            } else {
                target += lambda.powi((m + 1) as i32) * bootstrap(self.luck(len - 1));
            }

            target
        }
    }

    /// Converts decision state `s` into a `ReplaySample`: the TD(λ)
    /// target is computed in player-0's perspective, then flipped to the
    /// acting player's perspective to match the player-centric observation
    /// it is paired with.
    pub fn to_replay_sample(&self, s: usize, lambda: f32, n: usize) -> ReplaySample {
        let target_p0 = self.td_lambda_return(s, lambda, n);
        let state = &self.states[s];

        ReplaySample {
            observation: state.observation.clone(),
            scalar_value_target: target_p0 * state.current_player.sign(),
        }
    }

    pub fn replay_samples(&self, lambda: f32, n: usize) -> Vec<ReplaySample> {
        (0..self.states.len()).map(|s| self.to_replay_sample(s, lambda, n)).collect()
    }
}

/// The chance-node luck term: `V(s·a*) - Σ p_i·V(s·a_i)`. The caller
/// (the actor) has already evaluated every candidate
/// post-chance state from player 0's perspective via the shared inference
/// evaluator; this is pure arithmetic over those values so it carries no
/// dependency on `bz_infer`.
pub fn evaluate_luck(chosen_value: f32, outcome_values: &[(f64, f32)]) -> f32 {
    let expectation: f32 = outcome_values.iter().map(|(p, v)| *p as f32 * v).sum();
    chosen_value - expectation
}

#[cfg(test)]
mod tests {
    use super::*;

    fn traj(values: &[f32], lucks: &[f32], returns: [f32; 2]) -> Trajectory {
        let mut t = Trajectory::new(returns);
        for (v, l) in values.iter().zip(lucks) {
            t.push(TrajState {
                observation: vec![0.0],
                current_player: Player::Zero,
                chosen_action: 0,
                value_after_action: *v,
                accumulated_luck_for_player_0: *l,
            });
        }
        t
    }

    #[test]
    fn td_lambda_matches_worked_example() {
        let t = traj(&[0.2, 0.4, -0.1], &[0.0, 0.1, 0.1], [1.0, -1.0]);
        let target = t.td_lambda_return(0, 0.5, 0);
        assert!((target - 0.2625).abs() < 1e-6, "got {target}");
    }

    #[test]
    fn lambda_zero_is_raw_value() {
        let t = traj(&[0.2, 0.4, -0.1], &[0.0, 0.1, 0.1], [1.0, -1.0]);
        assert_eq!(t.td_lambda_return(1, 0.0, 0), 0.4);
    }

    #[test]
    fn lambda_one_unbounded_uses_clipped_bootstrap() {
        let t = traj(&[0.2, 0.4, -0.1], &[0.0, 0.1, 0.1], [1.0, -1.0]);
        // bootstrap at s=0: 1 - (0.1 - 0) = 0.9
        assert!((t.td_lambda_return(0, 1.0, 0) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn lambda_one_n_step_uses_unbootstrapped_tail() {
        let t = traj(&[0.2, 0.4, -0.1], &[0.0, 0.1, 0.1], [1.0, -1.0]);
        // n=1 from s=0: v_1 - (l_1 - l_0) = 0.4 - 0.1 = 0.3
        assert!((t.td_lambda_return(0, 1.0, 1) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn evaluate_luck_matches_worked_example() {
        let luck = evaluate_luck(0.4, &[(0.5, 0.4), (0.5, -0.4)]);
        assert!((luck - 0.4).abs() < 1e-6);
    }

    #[test]
    fn targets_stay_within_clipped_bounds() {
        let t = traj(&[0.9, -0.9, 0.95], &[0.0, 0.5, -0.7], [1.0, -1.0]);
        for s in 0..t.states.len() {
            for lambda in [0.0, 0.3, 0.7, 1.0] {
                let target = t.td_lambda_return(s, lambda, 0);
                assert!(target.abs() <= 1.0 + 1e-5, "target {target} out of bounds at s={s}, lambda={lambda}");
            }
        }
    }
}
