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

//! The bit of plumbing shared by the actor and rating-evaluator threads:
//! resolving a chance node by direct sampling (MCTS is never run at a
//! chance node) and playing a complete two-bot game to a
//! terminal state.

use rand::Rng;

use bz_game::{ActionId, GameState, Player, Turn};
use bz_mcts::{select_action, LeafEvaluator, Mcts, SearchConfig, TemperatureSchedule};

/// Samples one outcome of a chance node proportional to its declared
/// distribution (`chance_outcomes`).
pub fn sample_chance_outcome<G: GameState>(state: &G, rng: &mut impl Rng) -> ActionId {
    let outcomes = state.chance_outcomes();
    let total: f64 = outcomes.iter().map(|(_, p)| p).sum();
    let mut x: f64 = rng.gen_range(0.0..total.max(f64::EPSILON));

    for (action, p) in &outcomes {
        x -= p;
        if x <= 0.0 {
            return *action;
        }
    }

    outcomes.last().expect("chance node must have at least one outcome").0
}

/// Plays one complete game between two bots, one per `Player`, each
/// driven by its own `Mcts` search and temperature schedule. Used by the
/// rating evaluator, which never records a trajectory --
/// only the final per-player returns matter.
pub fn play_rated_game<G, L0, L1>(
    initial: G,
    bot0: &Mcts<'_, G, L0>,
    schedule0: TemperatureSchedule,
    bot1: &Mcts<'_, G, L1>,
    schedule1: TemperatureSchedule,
    rng: &mut impl Rng,
) -> Option<[f32; 2]>
where
    G: GameState,
    L0: LeafEvaluator<G>,
    L1: LeafEvaluator<G>,
{
    let mut state = initial;
    let mut move_number = 0usize;

    loop {
        match state.turn() {
            Turn::Terminal => return Some(state.returns()),
            Turn::Chance => {
                let action = sample_chance_outcome(&state, rng);
                state = state.apply_action(action);
            }
            Turn::Player(mover) => {
                let result = match mover {
                    Player::Zero => bot0.run(&state, false, rng)?,
                    Player::One => bot1.run(&state, false, rng)?,
                };
                let schedule = match mover {
                    Player::Zero => schedule0,
                    Player::One => schedule1,
                };
                let index = select_action(&result.root, move_number, schedule, rng);
                let action = result.root.children[index].action;
                state = state.apply_action(action);
                move_number += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bz_game::{Backgammon, BackgammonVariant};
    use bz_mcts::RolloutLeafEvaluator;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn sample_chance_outcome_only_ever_returns_a_declared_outcome() {
        let state = Backgammon::new_initial_state(BackgammonVariant::Default);
        let mut rng = SmallRng::seed_from_u64(0);
        let declared: Vec<ActionId> = state.chance_outcomes().into_iter().map(|(a, _)| a).collect();

        for _ in 0..50 {
            let chosen = sample_chance_outcome(&state, &mut rng);
            assert!(declared.contains(&chosen));
        }
    }

    #[test]
    fn play_rated_game_reaches_a_terminal_state_with_zero_sum_returns() {
        let evaluator = RolloutLeafEvaluator { num_rollouts: 1 };
        let config = SearchConfig::reference_uct(1.4, 4, 1000);
        let bot0 = Mcts::new(config, &evaluator);
        let bot1 = Mcts::new(config, &evaluator);
        let schedule = TemperatureSchedule { temperature: 1.0, drop_after: 2 };

        let initial = Backgammon::new_initial_state(BackgammonVariant::Hyper);
        let mut rng = SmallRng::seed_from_u64(1);

        let returns = play_rated_game(initial, &bot0, schedule, &bot1, schedule, &mut rng).unwrap();
        assert!((returns[0] + returns[1]).abs() < 1e-6);
    }
}
