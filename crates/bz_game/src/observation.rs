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

//! Observation-tensor encoding. The MLP view is built from
//! four categories: per-player bar/point/borne-off counts, turn flags,
//! remaining-die counts, and a few constant match/cube slots kept at zero
//! since there is no doubling cube implementation.
//! An optional 16-plane ResNet view is also provided.

use crate::board::{Board, NUM_POINTS};
use crate::Player;

const BAR_WIDTH: usize = 6;
const POINT_WIDTH: usize = 6;
const OFF_WIDTH: usize = 16;
const NUM_TURN_FLAGS: usize = 2;
const DIE_FACES: usize = 6;
const DIE_COUNT_WIDTH: usize = 5;
const NUM_MATCH_SLOTS: usize = 4;

const PER_PLAYER_WIDTH: usize = BAR_WIDTH + POINT_WIDTH * NUM_POINTS + OFF_WIDTH;

/// Total length of `mlp_observation_tensor`'s output.
pub const STATE_ENCODING_SIZE: usize =
    2 * PER_PLAYER_WIDTH + NUM_TURN_FLAGS + DIE_FACES * DIE_COUNT_WIDTH + NUM_MATCH_SLOTS;

/// `ResNet` view: 16 planes over the 24 points ([C, H, W] = [16, 24, 1]).
pub const RESNET_PLANES: usize = 16;
pub const RESNET_TENSOR_SIZE: usize = RESNET_PLANES * NUM_POINTS;

/// Unary count up to `width - 1`, with the final slot carrying the
/// overage past that point -- the classic "one-hot-plus-overage" unit used
/// for TD-style backgammon encodings.
fn push_count_feature(out: &mut Vec<f32>, count: u8, width: usize) {
    let capped = (count as usize).min(width - 1);
    for i in 0..width {
        out.push(if i < capped { 1.0 } else { 0.0 });
    }
    if count as usize > width - 1 {
        *out.last_mut().unwrap() = (count as usize - (width - 1)) as f32;
    }
}

fn push_one_hot(out: &mut Vec<f32>, index: usize, width: usize) {
    let index = index.min(width - 1);
    for i in 0..width {
        out.push(if i == index { 1.0 } else { 0.0 });
    }
}

fn points_from(board: &Board, player: Player) -> [u8; NUM_POINTS] {
    let mut counts = [0u8; NUM_POINTS];
    for i in 0..NUM_POINTS {
        counts[i] = match player {
            Player::Zero => board.points[i].max(0) as u8,
            Player::One => (-board.points[i]).max(0) as u8,
        };
    }
    counts
}

/// Re-orders point indices so that `player`'s home board always occupies
/// the same slots regardless of which seat they hold -- the
/// "player-centric observation" from the glossary.
fn canonical_index(player: Player, index: usize) -> usize {
    match player {
        Player::Zero => index,
        Player::One => NUM_POINTS - 1 - index,
    }
}

/// The flattened MLP observation for `player`, always in player-centric
/// orientation.
pub fn mlp_observation_tensor(board: &Board, player: Player, remaining_dice: &[u8]) -> Vec<f32> {
    let mut out = Vec::with_capacity(STATE_ENCODING_SIZE);

    for viewer in [player, player.other()] {
        push_count_feature(&mut out, board.bar[viewer.index()], BAR_WIDTH);

        let counts = points_from(board, viewer);
        let mut canonical = [0u8; NUM_POINTS];
        for i in 0..NUM_POINTS {
            canonical[canonical_index(player, i)] = counts[i];
        }
        for count in canonical {
            push_count_feature(&mut out, count, POINT_WIDTH);
        }

        push_one_hot(&mut out, board.off[viewer.index()] as usize, OFF_WIDTH);
    }

    // turn flags: absolute seat identity, since the board itself has been
    // re-oriented and would otherwise hide which seat is acting.
    out.push(if player == Player::Zero { 1.0 } else { 0.0 });
    out.push(if player == Player::One { 1.0 } else { 0.0 });

    for face in 1..=DIE_FACES as u8 {
        let count = remaining_dice.iter().filter(|&&d| d == face).count();
        push_one_hot(&mut out, count, DIE_COUNT_WIDTH);
    }

    // cube/match-state placeholders: kept at zero since the doubling cube
    // is out of scope, but the slots stay so the tensor shape is stable if
    // that ever changes.
    out.extend(std::iter::repeat(0.0).take(NUM_MATCH_SLOTS));

    debug_assert_eq!(out.len(), STATE_ENCODING_SIZE);
    out
}

/// The optional 16-plane ResNet view over the 24 points, also
/// player-centric.
pub fn resnet_observation_tensor(board: &Board, player: Player) -> Vec<f32> {
    let mut planes = vec![0.0f32; RESNET_TENSOR_SIZE];
    let max_checkers = board.checkers_per_player.max(1) as f32;

    let mine = points_from(board, player);
    let theirs = points_from(board, player.other());

    for i in 0..NUM_POINTS {
        let ci = canonical_index(player, i);

        planes[0 * NUM_POINTS + ci] = mine[i] as f32 / max_checkers;
        planes[1 * NUM_POINTS + ci] = theirs[i] as f32 / max_checkers;

        for t in 0..6 {
            planes[(2 + t) * NUM_POINTS + ci] = if mine[i] as usize > t { 1.0 } else { 0.0 };
            planes[(8 + t) * NUM_POINTS + ci] = if theirs[i] as usize > t { 1.0 } else { 0.0 };
        }
    }

    let my_bar = board.bar[player.index()] as f32 / max_checkers;
    let their_bar = board.bar[player.other().index()] as f32 / max_checkers;
    for i in 0..NUM_POINTS {
        planes[14 * NUM_POINTS + i] = my_bar;
        planes[15 * NUM_POINTS + i] = their_bar;
    }

    planes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::BackgammonVariant;

    #[test]
    fn mlp_tensor_has_the_declared_size() {
        let board = Board::new(BackgammonVariant::Default);
        let tensor = mlp_observation_tensor(&board, Player::Zero, &[3, 1]);
        assert_eq!(tensor.len(), STATE_ENCODING_SIZE);
    }

    #[test]
    fn resnet_tensor_has_the_declared_size() {
        let board = Board::new(BackgammonVariant::Default);
        let tensor = resnet_observation_tensor(&board, Player::One);
        assert_eq!(tensor.len(), RESNET_TENSOR_SIZE);
    }

    #[test]
    fn die_count_one_hot_reflects_remaining_dice() {
        let board = Board::new(BackgammonVariant::Default);
        let tensor = mlp_observation_tensor(&board, Player::Zero, &[4, 4, 4, 4]);
        // the remaining-dice block starts right after the two per-player
        // blocks and the two turn flags
        let dice_block_start = 2 * PER_PLAYER_WIDTH + NUM_TURN_FLAGS;
        let face_4_block = &tensor[dice_block_start + 3 * DIE_COUNT_WIDTH..dice_block_start + 4 * DIE_COUNT_WIDTH];
        assert_eq!(face_4_block, &[1.0, 1.0, 1.0, 1.0, 0.0]);
    }
}
