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

use std::collections::HashSet;

use rand::Rng;

use crate::action::{
    self, checker_moves_to_action, ACTION_DOUBLE, ACTION_DROP, ACTION_END_TURN, ACTION_ROLL, ACTION_TAKE, ActionId,
};
use crate::board::{BackgammonVariant, Board};
use crate::dice::{self, Roll};
use crate::legal::{self, LegalLevel};
use crate::observation::{self, RESNET_TENSOR_SIZE};
use crate::{GameState, Player, Turn};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Phase {
    /// Jointly samples the starting player and their opening dice.
    InitialRoll,
    /// `to_move` must play `ACTION_ROLL` before anything else.
    AwaitingRoll,
    /// A roll has been requested; the dice themselves are a chance node.
    RollingChance,
    /// Dice are known; `to_move` must play a full checker-move sequence
    /// (or `ACTION_END_TURN` if none is legal).
    Moving,
}

/// Backgammon: the illustrative stochastic, two-player, zero-sum,
/// perfect-information game for the core.
///
/// "Roll" is modeled as an explicit decision action of the player about to
/// move: applying it transitions to a chance
/// node, and resolving that chance node hands control *back* to the same
/// player -- `to_move` never changes on a chance transition, only on
/// `ACTION_END_TURN`.
#[derive(Clone, Debug)]
pub struct Backgammon {
    board: Board,
    to_move: Player,
    phase: Phase,
    dice: Vec<u8>,
}

impl Backgammon {
    pub fn new_initial_state(variant: BackgammonVariant) -> Self {
        Self::new_initial_state_with_randomization(variant, false, &mut rand::thread_rng())
    }

    /// `SetupInitialBoard`'s 5% chance of a degenerate single-pile or
    /// bar-only board looks like a curriculum experiment rather than a
    /// rule, so it is preserved only behind `randomize` (default off).
    pub fn new_initial_state_with_randomization(
        variant: BackgammonVariant,
        randomize: bool,
        rng: &mut impl Rng,
    ) -> Self {
        let mut board = Board::new(variant);

        if randomize && rng.gen_bool(0.05) {
            board = degenerate_board(variant, rng);
        }

        Backgammon { board, to_move: Player::Zero, phase: Phase::InitialRoll, dice: Vec::new() }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    fn is_terminal_state(&self) -> bool {
        self.board.off[0] == self.board.checkers_per_player || self.board.off[1] == self.board.checkers_per_player
    }

    fn legal_level(&self) -> LegalLevel {
        legal::determine_legal_level(&self.board, self.to_move, &self.dice)
    }
}

/// A degenerate initial position: all of one player's checkers piled on a
/// single point, or all of them still on the bar.
fn degenerate_board(variant: BackgammonVariant, rng: &mut impl Rng) -> Board {
    let mut board = Board::new(variant);
    let victim = if rng.gen_bool(0.5) { Player::Zero } else { Player::One };

    for i in 0..crate::board::NUM_POINTS {
        board.points[i] = match victim {
            Player::Zero if board.points[i] > 0 => 0,
            Player::One if board.points[i] < 0 => 0,
            _ => board.points[i],
        };
    }

    if rng.gen_bool(0.5) {
        let pile = if victim == Player::Zero { 0usize } else { crate::board::NUM_POINTS - 1 };
        board.points[pile] += variant.checkers_per_player() as i8 * victim.sign() as i8;
    } else {
        board.bar[victim.index()] = variant.checkers_per_player();
    }

    board
}

impl GameState for Backgammon {
    fn turn(&self) -> Turn {
        if self.is_terminal_state() {
            return Turn::Terminal;
        }

        match self.phase {
            Phase::InitialRoll | Phase::RollingChance => Turn::Chance,
            Phase::AwaitingRoll | Phase::Moving => Turn::Player(self.to_move),
        }
    }

    fn legal_actions(&self) -> Vec<ActionId> {
        match self.phase {
            Phase::InitialRoll | Phase::RollingChance => Vec::new(),
            Phase::AwaitingRoll => vec![ACTION_ROLL],
            Phase::Moving => {
                let level = self.legal_level();

                if level == LegalLevel::None {
                    vec![ACTION_END_TURN]
                } else {
                    let sequences = legal::enumerate_sequences(&self.board, self.to_move, &self.dice, level);
                    let mut seen: HashSet<ActionId> = HashSet::new();

                    sequences
                        .into_iter()
                        .map(|seq| checker_moves_to_action(&seq))
                        .filter(|action| seen.insert(*action))
                        .collect()
                }
            }
        }
    }

    fn chance_outcomes(&self) -> Vec<(ActionId, f64)> {
        match self.phase {
            Phase::InitialRoll => dice::opening_outcomes()
                .into_iter()
                .enumerate()
                .map(|(i, (_, p))| (dice::encode_opening(i), p))
                .collect(),
            Phase::RollingChance => dice::ordinary_outcomes()
                .into_iter()
                .enumerate()
                .map(|(i, (_, p))| (dice::encode_ordinary(i), p))
                .collect(),
            Phase::AwaitingRoll | Phase::Moving => Vec::new(),
        }
    }

    fn apply_action(&self, action: ActionId) -> Self {
        let mut next = self.clone();

        match next.phase {
            Phase::InitialRoll => {
                let index = dice::decode_opening(action).expect("invalid opening chance action");
                let ((player, roll), _) = dice::opening_outcomes()[index];

                next.to_move = player;
                next.dice = roll.dice();
                next.phase = Phase::Moving;
            }
            Phase::RollingChance => {
                let index = dice::decode_ordinary(action).expect("invalid chance action");
                let (roll, _): (Roll, f64) = dice::ordinary_outcomes()[index];

                next.dice = roll.dice();
                next.phase = Phase::Moving;
                // to_move is intentionally left unchanged: per design note
                // (b), rolling is the acting player's own action.
            }
            Phase::AwaitingRoll => {
                debug_assert_eq!(action, ACTION_ROLL);
                next.phase = Phase::RollingChance;
            }
            Phase::Moving => {
                if action == ACTION_END_TURN {
                    next.to_move = next.to_move.other();
                    next.phase = Phase::AwaitingRoll;
                    next.dice.clear();
                } else if matches!(action, ACTION_DOUBLE | ACTION_TAKE | ACTION_DROP) {
                    unreachable!("doubling cube actions are never legal (no doubling cube implementation)");
                } else {
                    for mv in action::action_to_checker_moves(action) {
                        next.board = next
                            .board
                            .apply_single(next.to_move, mv)
                            .expect("action_to_string should only be called on legal actions");
                    }
                    debug_assert!(next.board.checker_count_invariant());

                    next.to_move = next.to_move.other();
                    next.phase = Phase::AwaitingRoll;
                    next.dice.clear();
                }
            }
        }

        next
    }

    fn returns(&self) -> [f32; 2] {
        debug_assert!(self.is_terminal_state());

        if self.board.off[Player::Zero.index()] == self.board.checkers_per_player {
            [1.0, -1.0]
        } else {
            [-1.0, 1.0]
        }
    }

    fn observation_tensor(&self, player: Player) -> Vec<f32> {
        observation::mlp_observation_tensor(&self.board, player, &self.dice)
    }

    fn action_to_string(&self, action: ActionId) -> String {
        if action::is_sentinel(action) {
            return action::sentinel_name(action).to_string();
        }

        if action::is_dice_outcome(action) {
            if let Some(i) = dice::decode_ordinary(action) {
                let (roll, _) = dice::ordinary_outcomes()[i];
                return format!("roll {}-{}", roll.faces.0, roll.faces.1);
            }
            if let Some(i) = dice::decode_opening(action) {
                let ((player, roll), _) = dice::opening_outcomes()[i];
                return format!("opening {:?} rolls {}-{}", player, roll.faces.0, roll.faces.1);
            }
            return "unknown chance action".to_string();
        }

        action::action_to_checker_moves(action)
            .into_iter()
            .map(|mv| {
                if mv.from == action::CheckerMove::BAR {
                    format!("bar/{}", mv.die)
                } else {
                    format!("{}/{}", mv.from, mv.die)
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Backgammon {
    /// The optional 16-plane ResNet view.
    pub fn resnet_observation_tensor(&self, player: Player) -> [f32; RESNET_TENSOR_SIZE] {
        let planes = observation::resnet_observation_tensor(&self.board, player);
        let mut out = [0.0; RESNET_TENSOR_SIZE];
        out.copy_from_slice(&planes);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roll_opening_until(mut state: Backgammon, faces: (u8, u8), player: Player) -> Backgammon {
        loop {
            let outcomes = state.chance_outcomes();
            for (action, _) in &outcomes {
                let index = dice::decode_opening(*action).unwrap();
                let ((p, roll), _) = dice::opening_outcomes()[index];
                if p == player && (roll.faces == faces || roll.faces == (faces.1, faces.0)) {
                    return state.apply_action(*action);
                }
            }
            state = state.apply_action(outcomes[0].0);
        }
    }

    #[test]
    fn opening_3_1_is_two_dice() {
        let state = Backgammon::new_initial_state(BackgammonVariant::Default);
        let state = roll_opening_until(state, (3, 1), Player::Zero);

        assert_eq!(state.turn(), Turn::Player(Player::Zero));
        let level = state.legal_level();
        assert_eq!(level, LegalLevel::TwoDice);

        for action in state.legal_actions() {
            let moves = action::action_to_checker_moves(action);
            assert_eq!(moves.len(), 2);
            let dice_used: Vec<u8> = moves.iter().map(|m| m.die).collect();
            assert!(dice_used.contains(&3) && dice_used.contains(&1));
        }
    }

    #[test]
    fn end_turn_switches_player_and_returns_to_awaiting_roll() {
        let state = Backgammon::new_initial_state(BackgammonVariant::Default);
        let state = roll_opening_until(state, (3, 1), Player::Zero);

        let action = state.legal_actions()[0];
        let next = state.apply_action(action);

        assert_eq!(next.to_move, Player::One);
        assert_eq!(next.phase, Phase::AwaitingRoll);
        assert_eq!(next.legal_actions(), vec![ACTION_ROLL]);
    }

    #[test]
    fn roll_action_keeps_same_player_per_design_note_b() {
        let state = Backgammon::new_initial_state(BackgammonVariant::Default);
        let state = roll_opening_until(state, (3, 1), Player::Zero);
        let after_move = state.apply_action(state.legal_actions()[0]);

        assert_eq!(after_move.to_move, Player::One);
        let after_roll_request = after_move.apply_action(ACTION_ROLL);
        assert_eq!(after_roll_request.turn(), Turn::Chance);

        let (chance_action, _) = after_roll_request.chance_outcomes()[0];
        let after_roll = after_roll_request.apply_action(chance_action);
        assert_eq!(after_roll.to_move, Player::One);
    }
}
