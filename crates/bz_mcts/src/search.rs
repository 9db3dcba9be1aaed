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

//! Selection-expansion-evaluation-backup search. One
//! `Mcts::run` call grows a fresh tree rooted at a decision state and
//! returns it to the caller, who reads off the chosen action, its
//! recorded value, and (for self-play) the root's visit distribution.
//! Each simulation here is a single recursive call performing a
//! synchronous network round-trip rather than an async probe (the
//! coalescing happens one level down, inside `bz_infer`'s batcher, across
//! the many actor threads calling `Mcts::run` concurrently).

use ordered_float::OrderedFloat;
use rand::Rng;

use bz_game::{GameState, Player, Turn};

use crate::config::{SearchConfig, SelectRule, TemperatureSchedule};
use crate::evaluator::LeafEvaluator;
use crate::node::Node;
use crate::noise;
use crate::select;

/// Rough per-node heap footprint used for the `max_memory_mb` cutoff,
/// which cuts a search short when exceeded.
/// Deliberately conservative (a `Node` plus its `Vec<Child>` backing
/// storage runs well under this for backgammon's branching factor).
const APPROX_BYTES_PER_NODE: usize = 256;

/// PUCT/UCT search over `G`, parameterized by a `LeafEvaluator`.
pub struct Mcts<'a, G: GameState, L: LeafEvaluator<G>> {
    config: SearchConfig,
    evaluator: &'a L,
    _marker: std::marker::PhantomData<G>,
}

/// What one `run` produced: the grown root plus how many simulations it
/// actually took (always between the configured min and max, so callers
/// that log throughput want this number).
pub struct SearchResult {
    pub root: Node,
    pub simulations: usize,
}

impl<'a, G: GameState, L: LeafEvaluator<G>> Mcts<'a, G, L> {
    pub fn new(config: SearchConfig, evaluator: &'a L) -> Self {
        Mcts { config, evaluator, _marker: std::marker::PhantomData }
    }

    /// Grows a tree rooted at `state` (which must be a decision node --
    /// actors resolve chance nodes by direct sampling before ever calling
    /// this). Returns `None` iff the evaluator's underlying stop token
    /// fired mid-search.
    pub fn run(&self, state: &G, add_root_noise: bool, rng: &mut impl Rng) -> Option<SearchResult> {
        debug_assert!(matches!(state.turn(), Turn::Player(_)), "search must be rooted at a decision state");

        let mut root = Node::leaf(state.turn(), 0.0);
        let mut node_count = 1usize;

        // Root always gets its first expand+evaluate eagerly so noise can
        // be mixed into its priors before any simulation selects through
        // it.
        self.expand_and_evaluate(&mut root, state, &mut node_count)?;
        if add_root_noise {
            noise::add_dirichlet_noise(&mut root, self.config.policy_alpha, self.config.policy_epsilon, rng);
        }

        let mut simulations = 0;
        while simulations < self.config.max_simulations {
            if simulations >= self.config.min_simulations && self.over_memory_budget(node_count) {
                break;
            }

            self.simulate(&mut root, state.clone(), rng, &mut node_count)?;
            simulations += 1;
        }

        Some(SearchResult { root, simulations })
    }

    fn over_memory_budget(&self, node_count: usize) -> bool {
        node_count.saturating_mul(APPROX_BYTES_PER_NODE) > self.config.max_memory_mb.saturating_mul(1_000_000)
    }

    /// One full selection -> (expansion+evaluation on first visit) ->
    /// backup pass, starting at `node`/`state`.
    fn simulate(&self, node: &mut Node, state: G, rng: &mut impl Rng, node_count: &mut usize) -> Option<f32> {
        if !node.is_expanded() {
            return self.expand_and_evaluate(node, &state, node_count);
        }

        match node.turn {
            Turn::Terminal => {
                node.visits += 1;
                Some(node.eval)
            }
            Turn::Chance => {
                let index = select::sample_chance_child(node, rng);
                let action = node.children[index].action;
                let child_state = state.apply_action(action);
                let value = self.descend(&mut node.children[index].node, child_state, rng, node_count)?;

                node.visits += 1;
                node.total_value += value as f64;
                Some(value)
            }
            Turn::Player(mover) => {
                let index = match self.config.select {
                    SelectRule::Puct { c } => select::select_puct(node, mover, c),
                    SelectRule::Uct { c } => select::select_uct(node, mover, c),
                };
                let action = node.children[index].action;
                let child_state = state.apply_action(action);
                let value = self.descend(&mut node.children[index].node, child_state, rng, node_count)?;

                node.visits += 1;
                node.total_value += value as f64;
                self.maybe_resolve(node, mover);
                Some(value)
            }
        }
    }

    /// Descends into `slot`, creating a fresh placeholder node first if
    /// this is the slot's first visit.
    fn descend(&self, slot: &mut Option<Box<Node>>, child_state: G, rng: &mut impl Rng, node_count: &mut usize) -> Option<f32> {
        if slot.is_none() {
            *slot = Some(Box::new(Node::leaf(child_state.turn(), 0.0)));
            *node_count += 1;
        }

        self.simulate(slot.as_mut().unwrap(), child_state, rng, node_count)
    }

    /// Expands `node`'s children from `state` and, for decision and
    /// terminal nodes, evaluates it for the first time (the network
    /// cannot directly value chance nodes -- a freshly
    /// created chance node is expanded but left at `eval = 0.0` and
    /// `visits = 0`; its first visit always falls through
    /// `Turn::Chance` in `simulate`, sampling a child and descending into
    /// it in the very same call, so it is never backed up against its
    /// own un-evaluated `eval`).
    fn expand_and_evaluate(&self, node: &mut Node, state: &G, node_count: &mut usize) -> Option<f32> {
        node.expand(state);

        match node.turn {
            Turn::Terminal => {
                let returns = state.returns();
                node.outcome = Some(returns);
                node.eval = returns[0];
                node.visits = 1;
                node.total_value = node.eval as f64;
                Some(node.eval)
            }
            Turn::Player(mover) => {
                let value_for_mover = self.evaluator.evaluate(state, mover)?;
                node.eval = value_for_mover * mover.sign();
                node.visits = 1;
                node.total_value = node.eval as f64;
                Some(node.eval)
            }
            Turn::Chance => {
                // Expanded but not evaluated (see doc comment above): the
                // very first `simulate` call on this node will sample a
                // child and recurse immediately, so `node.visits` stays 0
                // until that backup returns.
                let mut rng = rand::thread_rng();
                let index = select::sample_chance_child(node, &mut rng);
                let action = node.children[index].action;
                let child_state = state.apply_action(action);
                let value = self.descend(&mut node.children[index].node, child_state, &mut rng, node_count)?;

                node.visits = 1;
                node.total_value = value as f64;
                Some(value)
            }
        }
    }

    /// MCTS-Solver (optional): once every child of a
    /// decision node is a resolved leaf, the node itself resolves to the
    /// mover's best (or, if all are losses, any) child outcome.
    fn maybe_resolve(&self, node: &mut Node, mover: Player) {
        if node.outcome.is_some() {
            return;
        }

        let mut resolved = Vec::with_capacity(node.children.len());
        for child in &node.children {
            match &child.node {
                Some(n) => match n.outcome {
                    Some(outcome) => resolved.push(outcome),
                    None => return,
                },
                None => return,
            }
        }

        if resolved.is_empty() {
            return;
        }

        let best = resolved
            .into_iter()
            .max_by_key(|outcome| OrderedFloat(outcome[mover.index()]))
            .expect("checked non-empty above");

        node.outcome = Some(best);
    }
}

/// Picks the acting child *index* at `root` for a self-play trajectory:
/// visit-count^(1/temp) sampling before `schedule.drop_after` moves,
/// max-visits afterward.
/// Callers read `root.children[index].action` for the action id and
/// `root.children[index].node`'s `recorded_value` for the trajectory's
/// `value_after_action`.
pub fn select_action(root: &Node, move_number: usize, schedule: TemperatureSchedule, rng: &mut impl Rng) -> usize {
    if schedule.is_sampling(move_number) {
        sample_by_visit_temperature(root, schedule.temperature, rng)
    } else {
        argmax_visits(root)
    }
}

fn argmax_visits(root: &Node) -> usize {
    (0..root.children.len())
        .max_by_key(|&i| root.children[i].node.as_ref().map_or(0, |n| n.visits))
        .expect("root must have at least one child")
}

fn sample_by_visit_temperature(root: &Node, temperature: f32, rng: &mut impl Rng) -> usize {
    let weights: Vec<f64> = root
        .children
        .iter()
        .map(|c| {
            let visits = c.node.as_ref().map_or(0, |n| n.visits) as f64;
            visits.powf(1.0 / temperature as f64)
        })
        .collect();

    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return argmax_visits(root);
    }

    let mut x = rng.gen_range(0.0..total);
    for (i, w) in weights.iter().enumerate() {
        x -= w;
        if x <= 0.0 {
            return i;
        }
    }

    weights.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use bz_game::{Backgammon, BackgammonVariant};
    use rand::SeedableRng;

    use crate::evaluator::RolloutLeafEvaluator;

    fn decision_state() -> Backgammon {
        let mut state = Backgammon::new_initial_state(BackgammonVariant::Hyper);
        while !matches!(state.turn(), Turn::Player(_)) {
            let actions = if state.is_chance() { state.chance_outcomes().into_iter().map(|(a, _)| a).collect() } else { state.legal_actions() };
            state = state.apply_action(actions[0]);
        }
        state
    }

    #[test]
    fn run_respects_simulation_budget() {
        let state = decision_state();
        let evaluator = RolloutLeafEvaluator { num_rollouts: 1 };
        let config = SearchConfig::reference_uct(1.4, 16, 1000);
        let mcts = Mcts::new(config, &evaluator);
        let mut rng = rand::rngs::SmallRng::seed_from_u64(0);

        let result = mcts.run(&state, false, &mut rng).unwrap();
        assert_eq!(result.simulations, 16);
        assert!(result.root.visits >= 16);
    }

    #[test]
    fn root_children_match_legal_actions() {
        let state = decision_state();
        let evaluator = RolloutLeafEvaluator { num_rollouts: 1 };
        let config = SearchConfig::reference_uct(1.4, 8, 1000);
        let mcts = Mcts::new(config, &evaluator);
        let mut rng = rand::rngs::SmallRng::seed_from_u64(1);

        let result = mcts.run(&state, false, &mut rng).unwrap();
        assert_eq!(result.root.children.len(), state.legal_actions().len());
    }

    #[test]
    fn select_action_after_drop_is_argmax() {
        let mut root = Node::leaf(Turn::Player(Player::Zero), 0.0);
        root.children = vec![
            crate::node::Child { action: 0, prior: 0.5, node: Some(Box::new(Node::leaf(Turn::Player(Player::One), 0.1))) },
            crate::node::Child { action: 1, prior: 0.5, node: Some(Box::new(Node::leaf(Turn::Player(Player::One), 0.1))) },
        ];
        root.children[0].node.as_mut().unwrap().visits = 3;
        root.children[1].node.as_mut().unwrap().visits = 9;

        let schedule = TemperatureSchedule { temperature: 1.0, drop_after: 0 };
        let mut rng = rand::rngs::SmallRng::seed_from_u64(2);
        assert_eq!(select_action(&root, 5, schedule, &mut rng), 1);
    }
}
