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

//! Action-space encoding: a sequence of up to
//! `NUM_CHECKER_SLOTS` single-checker moves packed as a base-`DIGIT_BASE`
//! number, plus a handful of distinguished sentinel actions.

pub type ActionId = u64;

/// 24 points plus the bar.
pub const NUM_FROM: usize = 25;
/// `from` (25) * `die` (6) single-checker actions.
pub const NUM_SINGLE_ACTIONS: usize = NUM_FROM * 6;
/// One extra digit value means "no move in this slot".
pub const DIGIT_BASE: u64 = (NUM_SINGLE_ACTIONS + 1) as u64;
/// Up to 4 submoves to accommodate doubles.
pub const NUM_CHECKER_SLOTS: usize = 4;

const NONE_DIGIT: u64 = NUM_SINGLE_ACTIONS as u64;

/// The start of the ID range reserved for sentinel and chance-outcome
/// actions, placed just past every possible checker-move sequence so the
/// two ranges never collide.
pub const SENTINEL_BASE: ActionId = {
    let mut base: u64 = 1;
    let mut i = 0;
    while i < NUM_CHECKER_SLOTS {
        base *= DIGIT_BASE;
        i += 1;
    }
    base
};

pub const ACTION_END_TURN: ActionId = SENTINEL_BASE;
pub const ACTION_ROLL: ActionId = SENTINEL_BASE + 1;
pub const ACTION_DOUBLE: ActionId = SENTINEL_BASE + 2;
pub const ACTION_TAKE: ActionId = SENTINEL_BASE + 3;
pub const ACTION_DROP: ActionId = SENTINEL_BASE + 4;

/// Chance-outcome actions (dice rolls) live in their own sub-range so they
/// never alias a checker-move sequence or a sentinel.
pub const ACTION_DICE_BASE: ActionId = SENTINEL_BASE + 16;

/// `from` is `0..=23` for a point, or `24` for the bar.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CheckerMove {
    pub from: u8,
    pub die: u8,
}

impl CheckerMove {
    pub const BAR: u8 = 24;

    fn to_digit(self) -> u64 {
        (self.from as u64) * 6 + (self.die as u64 - 1)
    }

    fn from_digit(digit: u64) -> Self {
        CheckerMove { from: (digit / 6) as u8, die: (digit % 6) as u8 + 1 }
    }
}

/// Packs up to `NUM_CHECKER_SLOTS` single-checker moves into one action id.
/// `moves.len() > NUM_CHECKER_SLOTS` silently drops the tail; legal
/// sequences never produce more than `NUM_CHECKER_SLOTS` moves (doubles).
pub fn checker_moves_to_action(moves: &[CheckerMove]) -> ActionId {
    let mut action: ActionId = 0;

    for i in (0..NUM_CHECKER_SLOTS).rev() {
        let digit = moves.get(i).map(|m| m.to_digit()).unwrap_or(NONE_DIGIT);
        action = action * DIGIT_BASE + digit;
    }

    action
}

/// Unpacks an action id produced by `checker_moves_to_action` back into its
/// (possibly empty) sequence of single-checker moves. Digits equal to
/// `NONE_DIGIT` are dropped, so the round trip holds for any sequence of
/// length `<= NUM_CHECKER_SLOTS`.
pub fn action_to_checker_moves(action: ActionId) -> Vec<CheckerMove> {
    let mut remaining = action;
    let mut digits = [0u64; NUM_CHECKER_SLOTS];

    for digit in digits.iter_mut() {
        *digit = remaining % DIGIT_BASE;
        remaining /= DIGIT_BASE;
    }

    digits
        .into_iter()
        .filter(|&d| d != NONE_DIGIT)
        .map(CheckerMove::from_digit)
        .collect()
}

pub fn is_checker_sequence(action: ActionId) -> bool {
    action < SENTINEL_BASE
}

pub fn is_sentinel(action: ActionId) -> bool {
    (SENTINEL_BASE..ACTION_DICE_BASE).contains(&action)
}

pub fn is_dice_outcome(action: ActionId) -> bool {
    action >= ACTION_DICE_BASE
}

pub fn sentinel_name(action: ActionId) -> &'static str {
    match action {
        ACTION_END_TURN => "EndTurn",
        ACTION_ROLL => "Roll",
        ACTION_DOUBLE => "Double",
        ACTION_TAKE => "Take",
        ACTION_DROP => "Drop",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_length() {
        let candidates: [&[CheckerMove]; 5] = [
            &[],
            &[CheckerMove { from: 0, die: 3 }],
            &[CheckerMove { from: 0, die: 3 }, CheckerMove { from: 3, die: 1 }],
            &[
                CheckerMove { from: CheckerMove::BAR, die: 6 },
                CheckerMove { from: 5, die: 6 },
                CheckerMove { from: 11, die: 6 },
                CheckerMove { from: 17, die: 6 },
            ],
            &[CheckerMove { from: 23, die: 1 }],
        ];

        for moves in candidates {
            let action = checker_moves_to_action(moves);
            assert_eq!(action_to_checker_moves(action), moves);
            assert!(is_checker_sequence(action));
        }
    }

    #[test]
    fn sentinel_and_dice_ranges_do_not_collide_with_checker_moves() {
        assert!(!is_checker_sequence(ACTION_END_TURN));
        assert!(!is_checker_sequence(ACTION_ROLL));
        assert!(!is_checker_sequence(ACTION_DICE_BASE));
        assert!(is_sentinel(ACTION_END_TURN));
        assert!(!is_sentinel(ACTION_DICE_BASE));
        assert!(is_dice_outcome(ACTION_DICE_BASE + 20));
    }
}
