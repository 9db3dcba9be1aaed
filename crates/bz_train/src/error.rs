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

//! Error taxonomy for the orchestration binary:
//! configuration errors are fatal before any thread spawns, resource
//! errors are fatal inside the learner.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Config(#[from] bz_utils::ConfigError),
    #[error(transparent)]
    Model(#[from] bz_vnet::VNetError),
    #[error(transparent)]
    Replay(#[from] bz_replay::ReplayError),
    #[error(transparent)]
    EvalResults(#[from] crate::rating::EvalResultsError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
