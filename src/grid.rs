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

//! The 3D lattice of cells the combiner dispatches work over.
//!
//! Cell bounds are computed from the union bounds plus an *integer* cell
//! index, `min + index * step`, rather than by repeatedly stepping a
//! floating-point cell center. That is deliberate: it is the only way to
//! guarantee that adjacent cells share an exact boundary coordinate, so a
//! point can never be assigned to two cells (or to none) through rounding.

use crate::math::{Aabb, IncludeMax, Vec3};

/// A cell address. Linearized Z-slowest, then Y, then X (see [`Grid::ijk_to_linear`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellIndex {
    pub i: usize,
    pub j: usize,
    pub k: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Grid {
    origin: Vec3,
    cell_size: f64,
    /// Effective Z/XY cell-size ratio. When the configured aspect is
    /// non-positive this is derived so a single Z layer spans the whole
    /// vertical extent (recommended default - it avoids the striation
    /// artifacts a fixed cubic aspect produces on gently sloped terrain).
    z_aspect: f64,
    /// (gx, gy, gz): number of cells along X, Y, Z.
    dims: (usize, usize, usize),
}

impl Grid {
    pub fn new(union_bounds: Aabb, cell_size: f64, cell_aspect: f64) -> Self {
        assert!(cell_size > 0.0, "cell_size must be positive");
        let extent = union_bounds.extent();
        let gx = ceil_cells(extent.x, cell_size);
        let gy = ceil_cells(extent.y, cell_size);

        let (z_aspect, gz) = if cell_aspect > 0.0 {
            (cell_aspect, ceil_cells(extent.z, cell_size * cell_aspect))
        } else {
            let z_aspect = if extent.z > 0.0 {
                extent.z / cell_size
            } else {
                0.0
            };
            (z_aspect, 1)
        };

        Grid {
            origin: union_bounds.min(),
            cell_size,
            z_aspect,
            dims: (gx, gy, gz),
        }
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        self.dims
    }

    pub fn total_cells(&self) -> usize {
        self.dims.0 * self.dims.1 * self.dims.2
    }

    pub fn linear_to_ijk(&self, n: usize) -> CellIndex {
        let (gx, gy, _gz) = self.dims;
        let plane = gx * gy;
        let k = n / plane;
        let rem = n % plane;
        let i = rem / gx;
        let j = rem % gx;
        CellIndex { i, j, k }
    }

    pub fn ijk_to_linear(&self, cell: CellIndex) -> usize {
        let (gx, gy, _gz) = self.dims;
        cell.k * gx * gy + cell.i * gx + cell.j
    }

    /// The exact axis-aligned bounds of cell `(i, j, k)`.
    pub fn cell_bounds(&self, cell: CellIndex) -> Aabb {
        let s = self.cell_size;
        let min = Vec3::new(
            self.origin.x + cell.j as f64 * s,
            self.origin.y + cell.i as f64 * s,
            self.origin.z + cell.k as f64 * self.z_aspect * s,
        );
        let max = Vec3::new(
            self.origin.x + (cell.j + 1) as f64 * s,
            self.origin.y + (cell.i + 1) as f64 * s,
            self.origin.z + (cell.k + 1) as f64 * self.z_aspect * s,
        );
        Aabb::new(min, max)
    }

    /// The cell bounds scaled 3x about the cell center; widens the
    /// candidate set used for nearest-neighbor MSE computation.
    pub fn neighborhood_bounds(&self, cell: CellIndex) -> Aabb {
        self.cell_bounds(cell).scaled_about_center(3.0)
    }

    /// Whether `point` lies in `cell`, closed on the min side on every axis
    /// and closed on the max side only along axes where `cell` is the last
    /// cell - this is what makes the partition into cells exhaustive and
    /// non-overlapping.
    pub fn contains(&self, cell: CellIndex, point: Vec3) -> bool {
        let (gx, gy, gz) = self.dims;
        let include_max = IncludeMax {
            x: cell.j + 1 == gx,
            y: cell.i + 1 == gy,
            z: cell.k + 1 == gz,
        };
        self.cell_bounds(cell).contains(point, include_max)
    }
}

fn ceil_cells(extent: f64, step: f64) -> usize {
    if extent <= 0.0 {
        return 1;
    }
    ((extent / step).ceil() as usize).max(1)
}
