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

//! Chance-node dice distributions: 21 non-ordered pairs for
//! an ordinary roll, and a distinct 30-outcome distribution for the
//! opening roll that jointly samples the starting player and the dice.

use crate::action::ACTION_DICE_BASE;
use crate::Player;

/// An ordinary roll: either a double (`faces.0 == faces.1`, played four
/// times) or a pair of distinct dice.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Roll {
    pub faces: (u8, u8),
}

impl Roll {
    pub fn is_double(self) -> bool {
        self.faces.0 == self.faces.1
    }

    /// The dice actually available to play: `[d,d,d,d]` for a double,
    /// `[hi, lo]` otherwise.
    pub fn dice(self) -> Vec<u8> {
        if self.is_double() {
            vec![self.faces.0; 4]
        } else {
            vec![self.faces.0.max(self.faces.1), self.faces.0.min(self.faces.1)]
        }
    }
}

/// The 21 distinct (non-ordered) outcomes of rolling two dice: 6 doubles
/// at probability `1/36` each, 15 non-doubles at `2/36` each.
pub fn ordinary_outcomes() -> Vec<(Roll, f64)> {
    let mut out = Vec::with_capacity(21);

    for a in 1..=6u8 {
        for b in a..=6u8 {
            let probability = if a == b { 1.0 / 36.0 } else { 2.0 / 36.0 };
            out.push((Roll { faces: (a, b) }, probability));
        }
    }

    out
}

/// The opening roll jointly samples who moves first and their dice: 30
/// ordered, non-double pairs at `1/30` each. The first 15 (the pair's
/// larger die listed first) favor player `Zero`; the second 15 favor
/// player `One`.
pub fn opening_outcomes() -> Vec<((Player, Roll), f64)> {
    let mut out = Vec::with_capacity(30);
    let probability = 1.0 / 30.0;

    for a in 1..=6u8 {
        for b in (a + 1)..=6u8 {
            out.push(((Player::Zero, Roll { faces: (b, a) }), probability));
        }
    }

    for a in 1..=6u8 {
        for b in (a + 1)..=6u8 {
            out.push(((Player::One, Roll { faces: (b, a) }), probability));
        }
    }

    out
}

pub fn encode_ordinary(index: usize) -> u64 {
    ACTION_DICE_BASE + index as u64
}

pub fn encode_opening(index: usize) -> u64 {
    ACTION_DICE_BASE + 21 + index as u64
}

pub fn decode_ordinary(action: u64) -> Option<usize> {
    let relative = action.checked_sub(ACTION_DICE_BASE)?;
    if relative < 21 {
        Some(relative as usize)
    } else {
        None
    }
}

pub fn decode_opening(action: u64) -> Option<usize> {
    let relative = action.checked_sub(ACTION_DICE_BASE + 21)?;
    if relative < 30 {
        Some(relative as usize)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinary_outcomes_sum_to_one() {
        let outcomes = ordinary_outcomes();
        assert_eq!(outcomes.len(), 21);

        let total: f64 = outcomes.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn opening_outcomes_split_evenly() {
        let outcomes = opening_outcomes();
        assert_eq!(outcomes.len(), 30);

        let total: f64 = outcomes.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-9);

        let zero_count = outcomes.iter().filter(|((p, _), _)| *p == Player::Zero).count();
        assert_eq!(zero_count, 15);
    }

    #[test]
    fn doubles_play_four_times() {
        let roll = Roll { faces: (4, 4) };
        assert_eq!(roll.dice(), vec![4, 4, 4, 4]);
    }
}
