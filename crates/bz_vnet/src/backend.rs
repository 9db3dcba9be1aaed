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

//! The concrete `burn` backend every replica is built on. A single
//! CPU backend is enough for this workload's small batches -- the
//! device split that matters here is the replica pool in `bz_infer`,
//! not which tensor backend runs underneath each replica.

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};

pub type VBackend = NdArray<f32>;
pub type VAutodiffBackend = Autodiff<VBackend>;
pub type VDevice = NdArrayDevice;
