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

//! Legal-move generation: a bounded DFS determines the
//! maximum number of dice a player is obligated to play, then only
//! sequences consuming exactly that many dice are emitted.

use crate::action::CheckerMove;
use crate::board::Board;
use crate::Player;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LegalLevel {
    None,
    LowDie,
    HighDie,
    TwoDice,
    ThreeDice,
    FourDice,
}

impl LegalLevel {
    pub fn dice_count(self) -> usize {
        match self {
            LegalLevel::None => 0,
            LegalLevel::LowDie | LegalLevel::HighDie => 1,
            LegalLevel::TwoDice => 2,
            LegalLevel::ThreeDice => 3,
            LegalLevel::FourDice => 4,
        }
    }
}

/// Every way to play `die` as a single checker move from the current
/// board, as `(from, resulting board)` pairs.
fn single_die_moves(board: &Board, player: Player, die: u8) -> Vec<(u8, Board)> {
    board
        .candidate_froms(player)
        .into_iter()
        .filter_map(|from| {
            board
                .apply_single(player, CheckerMove { from, die })
                .map(|next| (from, next))
        })
        .collect()
}

/// Bounded DFS: the maximum number of dice from `remaining` that can be
/// played in some order, trying every distinct remaining die value at
/// each step (branching factor is bounded by at most 4 distinct die
/// values and at most `checkers_per_player` origins).
fn max_dice_playable(board: &Board, player: Player, remaining: &[u8]) -> usize {
    if remaining.is_empty() {
        return 0;
    }

    let mut best = 0;
    let mut tried_faces = Vec::new();

    for i in 0..remaining.len() {
        let die = remaining[i];
        if tried_faces.contains(&die) {
            continue; // identical die value already explored from this position
        }
        tried_faces.push(die);

        let mut rest = remaining.to_vec();
        rest.remove(i);

        for (_, next_board) in single_die_moves(board, player, die) {
            let depth = 1 + max_dice_playable(&next_board, player, &rest);
            best = best.max(depth);
        }
    }

    best
}

/// Determines `LegalLevel` for the given roll.
pub fn determine_legal_level(board: &Board, player: Player, dice: &[u8]) -> LegalLevel {
    let best = max_dice_playable(board, player, dice);
    let is_double = dice.len() == 4;

    match (is_double, best) {
        (_, 0) => LegalLevel::None,
        (true, 1) => LegalLevel::HighDie, // all four faces identical
        (true, 2) => LegalLevel::TwoDice,
        (true, 3) => LegalLevel::ThreeDice,
        (true, _) => LegalLevel::FourDice,
        (false, 1) => {
            let hi = dice[0].max(dice[1]);
            let lo = dice[0].min(dice[1]);

            if max_dice_playable(board, player, &[hi]) >= 1 {
                LegalLevel::HighDie
            } else {
                debug_assert!(max_dice_playable(board, player, &[lo]) >= 1);
                LegalLevel::LowDie
            }
        }
        (false, _) => LegalLevel::TwoDice,
    }
}

/// All checker-move sequences that play exactly `level.dice_count()` dice,
/// honoring which die is mandatory when `level` is `LowDie`/`HighDie`.
pub fn enumerate_sequences(board: &Board, player: Player, dice: &[u8], level: LegalLevel) -> Vec<Vec<CheckerMove>> {
    let target = level.dice_count();
    if target == 0 {
        return Vec::new();
    }

    let is_double = dice.len() == 4;
    let remaining: Vec<u8> = if !is_double && target == 1 {
        match level {
            LegalLevel::HighDie => vec![dice[0].max(dice[1])],
            LegalLevel::LowDie => vec![dice[0].min(dice[1])],
            _ => unreachable!(),
        }
    } else {
        dice.to_vec()
    };

    let mut sequences = Vec::new();
    let mut prefix = Vec::new();
    enumerate_rec(board, player, &remaining, target, &mut prefix, &mut sequences);
    sequences
}

fn enumerate_rec(
    board: &Board,
    player: Player,
    remaining: &[u8],
    target: usize,
    prefix: &mut Vec<CheckerMove>,
    out: &mut Vec<Vec<CheckerMove>>,
) {
    if prefix.len() == target {
        out.push(prefix.clone());
        return;
    }

    let mut tried_faces = Vec::new();

    for i in 0..remaining.len() {
        let die = remaining[i];
        if tried_faces.contains(&die) {
            continue;
        }
        tried_faces.push(die);

        let mut rest = remaining.to_vec();
        rest.remove(i);

        for (from, next_board) in single_die_moves(board, player, die) {
            prefix.push(CheckerMove { from, die });
            enumerate_rec(&next_board, player, &rest, target, prefix, out);
            prefix.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::BackgammonVariant;

    #[test]
    fn opening_roll_3_1_requires_two_dice() {
        let board = Board::new(BackgammonVariant::Default);
        let level = determine_legal_level(&board, Player::Zero, &[3, 1]);
        assert_eq!(level, LegalLevel::TwoDice);

        let sequences = enumerate_sequences(&board, Player::Zero, &[3, 1], level);
        assert!(!sequences.is_empty());
        for seq in &sequences {
            assert_eq!(seq.len(), 2);
            let dice_used: Vec<u8> = seq.iter().map(|m| m.die).collect();
            assert!(dice_used.contains(&3));
            assert!(dice_used.contains(&1));
        }
    }

    #[test]
    fn only_the_larger_die_is_played_when_one_die_fits() {
        // contrive a board where only the high die (6) has a legal move,
        // and the low die (2) does not.
        let mut board = Board::new(BackgammonVariant::Default);
        board.points = [0; crate::board::NUM_POINTS];
        board.points[0] = 1; // a single Zero checker at the far point
        // die=2 directly from point 0 lands on a made opponent point.
        board.points[2] = -2;
        // die=6 first (0 -> 6) is open, but the follow-up die=2 from
        // there (6 -> 8) is also blocked, so only the single die=6 move
        // is ever playable, not a two-die sequence.
        board.points[8] = -2;

        let level = determine_legal_level(&board, Player::Zero, &[6, 2]);
        assert_eq!(level, LegalLevel::HighDie);

        let sequences = enumerate_sequences(&board, Player::Zero, &[6, 2], level);
        assert!(!sequences.is_empty());
        for seq in &sequences {
            assert_eq!(seq.len(), 1);
            assert_eq!(seq[0].die, 6);
        }
    }
}
