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

//! The game-rules-engine contract plus the backgammon implementation that
//! illustrates it.

pub mod action;
pub mod backgammon;
pub mod board;
pub mod dice;
pub mod legal;
pub mod observation;

pub use action::{ActionId, CheckerMove};
pub use backgammon::Backgammon;
pub use board::{Board, BackgammonVariant};

use serde::{Deserialize, Serialize};

/// One of the two seats at the table. Chance and terminal "players" are
/// modeled separately by `Turn` rather than as reserved sentinel values
/// of this type.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub enum Player {
    Zero,
    One,
}

impl Player {
    pub fn other(self) -> Player {
        match self {
            Player::Zero => Player::One,
            Player::One => Player::Zero,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Player::Zero => 0,
            Player::One => 1,
        }
    }

    /// +1 for player 0, -1 for player 1 -- used to flip values into the
    /// player-0 perspective required by the TD(λ) valuation.
    pub fn sign(self) -> f32 {
        match self {
            Player::Zero => 1.0,
            Player::One => -1.0,
        }
    }
}

/// Who (or what) acts next.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Turn {
    Player(Player),
    Chance,
    Terminal,
}

/// The capability set every game in the core must provide.
/// Implemented here only by `Backgammon`, but kept generic so the MCTS and
/// actor/evaluator layers never depend on backgammon directly.
pub trait GameState: Clone + Send + Sync {
    /// Returns who acts next: a player, the chance player, or nobody
    /// (terminal).
    fn turn(&self) -> Turn;

    fn is_terminal(&self) -> bool {
        matches!(self.turn(), Turn::Terminal)
    }

    fn is_chance(&self) -> bool {
        matches!(self.turn(), Turn::Chance)
    }

    /// Current player to move; only meaningful when `turn()` is
    /// `Turn::Player(_)`.
    fn current_player(&self) -> Option<Player> {
        match self.turn() {
            Turn::Player(p) => Some(p),
            _ => None,
        }
    }

    /// Legal actions at a decision node. Empty at chance or terminal nodes.
    fn legal_actions(&self) -> Vec<ActionId>;

    /// `(action, probability)` pairs at a chance node; probabilities sum to
    /// 1. Empty away from a chance node.
    fn chance_outcomes(&self) -> Vec<(ActionId, f64)>;

    /// Applies `action`, consuming `self` and producing the next state.
    /// The caller is expected to `clone()` beforehand if it still needs
    /// the prior state.
    fn apply_action(&self, action: ActionId) -> Self;

    /// Per-player terminal returns; only meaningful once `is_terminal()`.
    fn returns(&self) -> [f32; 2];

    /// Fixed-shape float observation for `player`, encoded player-centric
    /// (a compile-time flag selects this) so the acting player's home
    /// is always oriented the same way.
    fn observation_tensor(&self, player: Player) -> Vec<f32>;

    fn action_to_string(&self, action: ActionId) -> String;
}
