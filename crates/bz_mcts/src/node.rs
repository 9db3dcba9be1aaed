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

//! The search tree: parent-owns-children, no back-edges, dropped
//! recursively by the tree's owner when it falls out of scope.

use bz_game::{ActionId, GameState, Player, Turn};

/// One edge out of a node, plus its (possibly not-yet-expanded) child.
pub struct Child {
    pub action: ActionId,
    /// Decision-node priors are uniform over legal actions (policy-head
    /// training is out of scope, so there is no policy network to prior
    /// from) mixed with Dirichlet noise at the root. Chance-node
    /// "priors" are transition probabilities.
    pub prior: f32,
    pub node: Option<Box<Node>>,
}

/// A node in the search tree. All values are carried in
/// player-0's perspective throughout the tree, exactly like
/// `Trajectory`'s `accumulated_luck` and `value_after_action`, so backup
/// never needs to know who is "us" versus "them" --
/// `select.rs` flips the sign only at the moment it reads a child's mean
/// for PUCT.
pub struct Node {
    pub turn: Turn,
    pub children: Vec<Child>,
    pub visits: u32,
    /// Sum of backed-up values (player-0 perspective) across every visit.
    pub total_value: f64,
    /// The network's bootstrap evaluation at expansion time (player-0
    /// perspective).
    pub eval: f32,
    /// Once every child is solved, the resolved per-player terminal
    /// outcome propagates here (the MCTS-Solver extension).
    pub outcome: Option<[f32; 2]>,
}

impl Node {
    pub fn leaf(turn: Turn, eval: f32) -> Self {
        Node { turn, children: Vec::new(), visits: 0, total_value: 0.0, eval, outcome: None }
    }

    pub fn terminal(returns: [f32; 2]) -> Self {
        Node { turn: Turn::Terminal, children: Vec::new(), visits: 0, total_value: 0.0, eval: returns[0], outcome: Some(returns) }
    }

    pub fn is_expanded(&self) -> bool {
        !self.children.is_empty() || self.turn == Turn::Terminal
    }

    /// Mean backed-up value (player-0 perspective); `eval` before the
    /// first visit.
    pub fn mean_value(&self) -> f32 {
        if self.visits == 0 {
            self.eval
        } else {
            (self.total_value / self.visits as f64) as f32
        }
    }

    /// The value to use as the recorded `value_after_action` for a
    /// self-play state choosing this node as the chosen child: the
    /// resolved outcome if solved, else the bootstrap `eval` --
    /// never the visit-averaged mean, which exploration distorts.
    pub fn recorded_value(&self, for_player: Player) -> f32 {
        match self.outcome {
            Some(returns) => returns[for_player.index()],
            None => self.eval * for_player.sign(),
        }
    }

    /// Populates `children` for a not-yet-expanded node, either from the
    /// legal actions at a decision node (uniform priors) or the chance
    /// outcomes at a chance node (probability priors).
    pub fn expand<G: GameState>(&mut self, state: &G) {
        debug_assert!(self.children.is_empty());

        match self.turn {
            Turn::Player(_) => {
                let actions = state.legal_actions();
                let prior = 1.0 / actions.len().max(1) as f32;
                self.children = actions.into_iter().map(|action| Child { action, prior, node: None }).collect();
            }
            Turn::Chance => {
                self.children = state
                    .chance_outcomes()
                    .into_iter()
                    .map(|(action, p)| Child { action, prior: p as f32, node: None })
                    .collect();
            }
            Turn::Terminal => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_value_before_first_visit_is_eval() {
        let node = Node::leaf(Turn::Player(Player::Zero), 0.4);
        assert_eq!(node.mean_value(), 0.4);
    }

    #[test]
    fn recorded_value_prefers_resolved_outcome_over_eval() {
        let mut node = Node::leaf(Turn::Player(Player::Zero), 0.9);
        node.outcome = Some([1.0, -1.0]);

        assert_eq!(node.recorded_value(Player::Zero), 1.0);
        assert_eq!(node.recorded_value(Player::One), -1.0);
    }
}
