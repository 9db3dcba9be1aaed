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

use crate::action::CheckerMove;
use crate::Player;

pub const NUM_POINTS: usize = 24;

/// `Default` is the standard 15-checker game; `Hyper` is the 3-checker
/// speed variant, handled here as a constructor-time choice rather than
/// a module of its own.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BackgammonVariant {
    Default,
    Hyper,
}

impl BackgammonVariant {
    pub fn checkers_per_player(self) -> u8 {
        match self {
            BackgammonVariant::Default => 15,
            BackgammonVariant::Hyper => 3,
        }
    }
}

/// `points[i] > 0` holds that many of player `Zero`'s checkers; `< 0` holds
/// that many of player `One`'s. Player `Zero` moves from index 0 toward 23
/// and bears off past 23; player `One` moves the opposite way and bears
/// off past 0. A checker that is hit returns to the bar and must re-enter
/// through the *opponent's* home board, exactly mirroring the real game.
#[derive(Clone, Debug, PartialEq)]
pub struct Board {
    pub points: [i8; NUM_POINTS],
    pub bar: [u8; 2],
    pub off: [u8; 2],
    pub checkers_per_player: u8,
}

impl Board {
    pub fn new(variant: BackgammonVariant) -> Self {
        let mut points = [0i8; NUM_POINTS];

        match variant {
            BackgammonVariant::Default => {
                points[0] = 2;
                points[11] = 5;
                points[16] = 3;
                points[18] = 5;

                points[23] = -2;
                points[12] = -5;
                points[7] = -3;
                points[5] = -5;
            }
            BackgammonVariant::Hyper => {
                points[0] = 1;
                points[1] = 1;
                points[2] = 1;

                points[23] = -1;
                points[22] = -1;
                points[21] = -1;
            }
        }

        Board { points, bar: [0, 0], off: [0, 0], checkers_per_player: variant.checkers_per_player() }
    }

    fn count_of(&self, player: Player, index: usize) -> i8 {
        match player {
            Player::Zero => self.points[index].max(0),
            Player::One => (-self.points[index]).max(0),
        }
    }

    fn opponent_count(&self, player: Player, index: usize) -> i8 {
        self.count_of(player.other(), index)
    }

    fn add_checker(&mut self, player: Player, index: usize) {
        match player {
            Player::Zero => self.points[index] += 1,
            Player::One => self.points[index] -= 1,
        }
    }

    fn remove_checker(&mut self, player: Player, index: usize) {
        match player {
            Player::Zero => self.points[index] -= 1,
            Player::One => self.points[index] += 1,
        }
    }

    /// `true` iff `player` may legally bear off (every checker is in their
    /// own home board and none are on the bar).
    pub fn all_in_home(&self, player: Player) -> bool {
        if self.bar[player.index()] > 0 {
            return false;
        }

        let outside_home: std::ops::Range<usize> = match player {
            Player::Zero => 0..18,
            Player::One => 6..24,
        };

        outside_home.clone().all(|i| self.count_of(player, i) == 0)
    }

    fn is_home(player: Player, index: usize) -> bool {
        match player {
            Player::Zero => (18..24).contains(&index),
            Player::One => (0..6).contains(&index),
        }
    }

    /// The point a re-entering checker lands on for the given die, or
    /// `None` if the die does not apply (out of range).
    fn entry_point(player: Player, die: u8) -> usize {
        match player {
            Player::Zero => (die - 1) as usize,
            Player::One => 24 - die as usize,
        }
    }

    /// The destination index for a non-bar, non-bear-off move.
    fn destination(player: Player, from: usize, die: u8) -> i64 {
        match player {
            Player::Zero => from as i64 + die as i64,
            Player::One => from as i64 - die as i64,
        }
    }

    /// Whether `player` has any checker on a point strictly farther from
    /// bearing off than `index` (used for the bear-off overage rule).
    fn has_checker_behind(&self, player: Player, index: usize) -> bool {
        match player {
            Player::Zero => (18..index).any(|i| self.count_of(player, i) > 0),
            Player::One => (index + 1..24).any(|i| self.count_of(player, i) > 0),
        }
    }

    /// Applies one single-checker move, returning the resulting board, or
    /// `None` if it is illegal (blocked point, wrong bear-off timing, or
    /// no checker at `from`).
    pub fn apply_single(&self, player: Player, mv: CheckerMove) -> Option<Board> {
        let mut board = self.clone();

        if mv.from == CheckerMove::BAR {
            if board.bar[player.index()] == 0 {
                return None;
            }

            let to = Self::entry_point(player, mv.die);
            if board.opponent_count(player, to) >= 2 {
                return None;
            }

            board.bar[player.index()] -= 1;

            if board.opponent_count(player, to) == 1 {
                board.remove_checker(player.other(), to);
                board.bar[player.other().index()] += 1;
            }

            board.add_checker(player, to);
            return Some(board);
        }

        // Mandatory bar-first rule: no other checker may move while one
        // is still on the bar.
        if board.bar[player.index()] > 0 {
            return None;
        }

        let from = mv.from as usize;
        if board.count_of(player, from) == 0 {
            return None;
        }

        let to = Self::destination(player, from, mv.die);
        let off_board = match player {
            Player::Zero => to >= 24,
            Player::One => to < 0,
        };

        if off_board {
            if !board.all_in_home(player) || !Self::is_home(player, from) {
                return None;
            }

            let exact = match player {
                Player::Zero => to == 24,
                Player::One => to == -1,
            };

            if !exact && board.has_checker_behind(player, from) {
                return None;
            }

            board.remove_checker(player, from);
            board.off[player.index()] += 1;
            return Some(board);
        }

        let to = to as usize;
        if board.opponent_count(player, to) >= 2 {
            return None;
        }

        board.remove_checker(player, from);

        if board.opponent_count(player, to) == 1 {
            board.remove_checker(player.other(), to);
            board.bar[player.other().index()] += 1;
        }

        board.add_checker(player, to);
        Some(board)
    }

    /// Every `from` candidate (`0..=23`, or `24` for the bar) that has at
    /// least one of `player`'s checkers available to move, respecting the
    /// mandatory bar-first rule.
    pub fn candidate_froms(&self, player: Player) -> Vec<u8> {
        if self.bar[player.index()] > 0 {
            return vec![CheckerMove::BAR];
        }

        (0..NUM_POINTS as u8).filter(|&i| self.count_of(player, i as usize) > 0).collect()
    }

    /// Checker-count conservation invariant:
    /// `bar[p] + off[p] + sum(points[p]) == checkers_per_player` for every
    /// player.
    pub fn checker_count_invariant(&self) -> bool {
        for player in [Player::Zero, Player::One] {
            let on_points: i32 = (0..NUM_POINTS).map(|i| self.count_of(player, i) as i32).sum();
            let total = on_points + self.bar[player.index()] as i32 + self.off[player.index()] as i32;

            if total != self.checkers_per_player as i32 {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_board_conserves_checkers() {
        let board = Board::new(BackgammonVariant::Default);
        assert!(board.checker_count_invariant());
    }

    #[test]
    fn hyper_board_conserves_checkers() {
        let board = Board::new(BackgammonVariant::Hyper);
        assert!(board.checker_count_invariant());
        assert_eq!(board.checkers_per_player, 3);
    }

    #[test]
    fn cannot_move_with_checker_on_bar() {
        let mut board = Board::new(BackgammonVariant::Default);
        board.bar[Player::Zero.index()] = 1;

        let result = board.apply_single(Player::Zero, CheckerMove { from: 0, die: 3 });
        assert!(result.is_none());
    }

    #[test]
    fn hit_sends_single_checker_to_bar() {
        let mut board = Board::new(BackgammonVariant::Default);
        // place a lone white blot where a black checker can land
        board.points[3] = -1;

        let next = board.apply_single(Player::Zero, CheckerMove { from: 0, die: 3 }).unwrap();
        assert_eq!(next.points[3], 1);
        assert_eq!(next.bar[Player::One.index()], 1);
        assert!(next.checker_count_invariant());
    }

    #[test]
    fn blocked_point_rejects_move() {
        let mut board = Board::new(BackgammonVariant::Default);
        board.points[3] = -2;

        let result = board.apply_single(Player::Zero, CheckerMove { from: 0, die: 3 });
        assert!(result.is_none());
    }
}
