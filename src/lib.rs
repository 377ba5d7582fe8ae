// Copyright 2016 Google Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![recursion_limit = "1024"]

//! Fuses overlapping point clouds - e.g. stereo captures of the same patch
//! of terrain from different rover positions - into a single deduplicated
//! cloud. The clouds are partitioned over a spatial grid and each cell is
//! resolved independently (origin-distance pruning, then nearest-neighbor
//! MSE pruning, then a per-cell population cap), so the work scales across
//! a bounded thread pool.
//!
//! [`combiner::combine`] is the entry point; everything else is a
//! supporting primitive it is built from.

#[macro_use]
extern crate error_chain;

pub mod cloud;
pub mod combiner;
pub mod errors;
pub mod executor;
pub mod grid;
pub mod logging;
pub mod math;
pub mod rng;
pub mod spatial_index;

pub use crate::cloud::{PointCloud, Vertex};
pub use crate::combiner::{combine, CombinerConfig};
