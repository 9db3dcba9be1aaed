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

//! Dirichlet root-exploration noise: mixed into root
//! priors with weight `policy_epsilon` when `policy_alpha > 0`; disabled
//! for evaluation passes (the rating evaluator and, in general, any
//! search not meant to be explorative).

use rand_distr::{Distribution, Gamma};

use crate::node::Node;

/// Mixes `Dirichlet(alpha)` noise into `node`'s child priors in place:
/// `prior_i <- (1 - epsilon) * prior_i + epsilon * noise_i`. A no-op on a
/// node with no children or `alpha <= 0`.
pub fn add_dirichlet_noise(node: &mut Node, alpha: f32, epsilon: f32, rng: &mut impl rand::Rng) {
    if alpha <= 0.0 || node.children.is_empty() {
        return;
    }

    let gamma = Gamma::new(alpha, 1.0).expect("dirichlet alpha must be positive");
    let samples: Vec<f32> = (0..node.children.len()).map(|_| gamma.sample(rng)).collect();
    let total: f32 = samples.iter().sum();

    if total <= 0.0 {
        return;
    }

    for (child, sample) in node.children.iter_mut().zip(samples) {
        let noise = sample / total;
        child.prior = (1.0 - epsilon) * child.prior + epsilon * noise;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bz_game::{Player, Turn};
    use rand::SeedableRng;

    #[test]
    fn noise_preserves_normalization() {
        let mut node = Node::leaf(Turn::Player(Player::Zero), 0.0);
        node.children = (0..5)
            .map(|_| crate::node::Child { action: 0, prior: 0.2, node: None })
            .collect();

        let mut rng = rand::rngs::SmallRng::seed_from_u64(7);
        add_dirichlet_noise(&mut node, 0.3, 0.25, &mut rng);

        let total: f32 = node.children.iter().map(|c| c.prior).sum();
        assert!((total - 1.0).abs() < 1e-4);
    }

    #[test]
    fn zero_alpha_is_a_no_op() {
        let mut node = Node::leaf(Turn::Player(Player::Zero), 0.0);
        node.children = vec![crate::node::Child { action: 0, prior: 0.5, node: None }, crate::node::Child { action: 1, prior: 0.5, node: None }];

        let mut rng = rand::rngs::SmallRng::seed_from_u64(1);
        add_dirichlet_noise(&mut node, 0.0, 0.25, &mut rng);

        assert_eq!(node.children[0].prior, 0.5);
    }
}
