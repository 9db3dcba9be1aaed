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

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VNetError {
    #[error("malformed vpnet.pb line `{0}`")]
    MalformedModelConfig(String),
    #[error("unknown nn_model `{0}`, expected `resnet` or `mlp`")]
    UnknownModel(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("checkpoint record error: {0}")]
    Record(String),
    #[error("checkpoint shape mismatch: expected {expected} parameters, found {found}")]
    ShapeMismatch { expected: usize, found: usize },
}
