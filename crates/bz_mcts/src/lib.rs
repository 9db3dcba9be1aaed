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

//! PUCT/UCT search with chance-node handling, Dirichlet root noise, and
//! an optional MCTS-Solver. A single recursive synchronous search, since
//! batching/coalescing already lives one layer down in `bz_infer`.

pub mod config;
pub mod evaluator;
pub mod node;
pub mod noise;
pub mod search;
pub mod select;

pub use config::{SearchConfig, SelectRule, TemperatureSchedule};
pub use evaluator::{LeafEvaluator, NetworkLeafEvaluator, RolloutLeafEvaluator, ValueEvaluator};
pub use node::{Child, Node};
pub use search::{select_action, Mcts, SearchResult};
