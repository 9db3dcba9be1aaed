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

//! Child-selection formulas: PUCT for the AlphaZero bot,
//! UCT for the reference rollout bot, and probability-weighted sampling
//! at chance nodes. Argmax selection uses `ordered_float`'s total
//! ordering over `f32` scores.

use ordered_float::OrderedFloat;
use rand::Rng;

use bz_game::Player;

use crate::node::Node;

/// PUCT score for one child of a decision node owned by `mover`:
/// `sign(mover) * Q + c * prior * sqrt(N_parent) / (1 + N_child)`, where
/// `Q` is the child's mean value flipped into `mover`'s perspective
/// (the PUCT formula).
fn puct_score(node: &Node, child_index: usize, mover: Player, c: f32) -> f32 {
    let child = &node.children[child_index];
    let parent_visits = node.visits.max(1) as f32;

    let (q, visits) = match &child.node {
        Some(n) => (n.mean_value() * mover.sign(), n.visits),
        None => (0.0, 0),
    };

    q + c * child.prior * parent_visits.sqrt() / (1.0 + visits as f32)
}

/// UCT score (reference bot): `sign(mover) * Q + c * sqrt(ln(N_parent) /
/// N_child)`, with unvisited children forced to `+inf` so every child is
/// tried at least once before any is revisited.
fn uct_score(node: &Node, child_index: usize, mover: Player, c: f32) -> f32 {
    let child = &node.children[child_index];
    let parent_visits = node.visits.max(1) as f32;

    match &child.node {
        Some(n) if n.visits > 0 => n.mean_value() * mover.sign() + c * (parent_visits.ln() / n.visits as f32).sqrt(),
        _ => f32::INFINITY,
    }
}

/// Index of the best child at a decision node, by PUCT.
pub fn select_puct(node: &Node, mover: Player, c: f32) -> usize {
    (0..node.children.len())
        .max_by_key(|&i| OrderedFloat(puct_score(node, i, mover, c)))
        .expect("decision node must have at least one child")
}

/// Index of the best child at a decision node, by UCT.
pub fn select_uct(node: &Node, mover: Player, c: f32) -> usize {
    (0..node.children.len())
        .max_by_key(|&i| OrderedFloat(uct_score(node, i, mover, c)))
        .expect("decision node must have at least one child")
}

/// Samples a chance-node child proportional to its prior -- transition
/// probability, not visit count; selection at chance nodes never
/// consults UCT/PUCT.
pub fn sample_chance_child(node: &Node, rng: &mut impl Rng) -> usize {
    let total: f32 = node.children.iter().map(|c| c.prior).sum();
    let mut x = rng.gen_range(0.0..total.max(f32::EPSILON));

    for (i, child) in node.children.iter().enumerate() {
        x -= child.prior;
        if x <= 0.0 {
            return i;
        }
    }

    node.children.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use bz_game::Turn;

    fn node_with_children(priors: &[f32]) -> Node {
        let mut node = Node::leaf(Turn::Player(Player::Zero), 0.0);
        node.children = priors
            .iter()
            .map(|&prior| crate::node::Child { action: 0, prior, node: None })
            .collect();
        node
    }

    #[test]
    fn unvisited_children_favor_higher_prior() {
        let node = node_with_children(&[0.1, 0.9]);
        assert_eq!(select_puct(&node, Player::Zero, 1.4), 1);
    }

    #[test]
    fn uct_prefers_unvisited_children_first() {
        let mut node = node_with_children(&[0.5, 0.5]);
        node.visits = 5;
        node.children[0].node = Some(Box::new(Node::leaf(Turn::Player(Player::One), 0.2)));
        node.children[0].node.as_mut().unwrap().visits = 5;
        // child 1 has never been visited -> +inf score, always picked.
        assert_eq!(select_uct(&node, Player::Zero, 1.4), 1);
    }

    #[test]
    fn chance_sampling_respects_priors() {
        use rand::SeedableRng;

        let node = node_with_children(&[1.0, 0.0]);
        let mut rng = rand::rngs::SmallRng::seed_from_u64(0);
        for _ in 0..20 {
            assert_eq!(sample_chance_child(&node, &mut rng), 0);
        }
    }
}
