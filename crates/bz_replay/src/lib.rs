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

//! Trajectories, luck-adjusted TD(λ) valuation, the replay buffer, and the
//! actor-to-learner queue.

pub mod buffer;
pub mod queue;
pub mod trajectory;

pub use buffer::{ReplayBuffer, ReplayError};
pub use queue::{PushOutcome, TrajectoryQueue};
pub use trajectory::{evaluate_luck, ReplaySample, TrajState, Trajectory};
