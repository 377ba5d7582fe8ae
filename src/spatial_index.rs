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

//! A bulk-built spatial index over a single cloud's point positions.
//!
//! The combiner only ever needs "give me every point inside this box", so
//! any structure with sub-linear queries and expected-O(N log N) construction
//! satisfies it. A uniform voxel grid, sized so each voxel holds a handful
//! of points, is a simple choice that meets both bounds without the
//! rebalancing a tree needs, and is what we build below.

use crate::math::{Aabb, Vec3};
use fnv::FnvHashMap;

pub trait SpatialIndex {
    /// Bulk-builds an index over `points`, where the index of each point in
    /// the slice is the vertex index later returned by `query_rect`.
    fn build(points: &[Vec3]) -> Self;

    /// Returns every index whose point lies inside `rect`, closed intervals
    /// on every axis. No duplicates; no ordering guarantee; indices exactly
    /// on the boundary may or may not be returned.
    fn query_rect(&self, rect: &Aabb) -> Vec<u32>;
}

/// A uniform grid of voxels, sized so each voxel holds a handful of points
/// on average. Construction buckets every point once (`O(N)`); queries only
/// visit the voxels overlapping the query rectangle.
pub struct VoxelGridIndex {
    voxel_size: f64,
    origin: Vec3,
    buckets: FnvHashMap<(i64, i64, i64), Vec<u32>>,
    positions: Vec<Vec3>,
}

/// Points per voxel to aim for; keeps both construction and queries cheap
/// without needing a tree.
const TARGET_POINTS_PER_VOXEL: f64 = 4.0;

impl VoxelGridIndex {
    fn voxel_key(&self, p: Vec3) -> (i64, i64, i64) {
        (
            ((p.x - self.origin.x) / self.voxel_size).floor() as i64,
            ((p.y - self.origin.y) / self.voxel_size).floor() as i64,
            ((p.z - self.origin.z) / self.voxel_size).floor() as i64,
        )
    }

    fn key_range(&self, rect: &Aabb) -> ((i64, i64, i64), (i64, i64, i64)) {
        (self.voxel_key(rect.min()), self.voxel_key(rect.max()))
    }
}

impl SpatialIndex for VoxelGridIndex {
    fn build(points: &[Vec3]) -> Self {
        let origin = points.iter().copied().fold(
            Vec3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            |acc, p| Vec3::new(acc.x.min(p.x), acc.y.min(p.y), acc.z.min(p.z)),
        );
        let origin = if points.is_empty() {
            Vec3::new(0., 0., 0.)
        } else {
            origin
        };

        let mut bounds = Aabb::new(origin, origin);
        for &p in points {
            bounds.grow(p);
        }
        let extent = bounds.extent();
        let diagonal = (extent.x * extent.x + extent.y * extent.y + extent.z * extent.z).sqrt();
        let n = points.len().max(1) as f64;
        let voxel_size = if diagonal > 0.0 {
            (diagonal / (n / TARGET_POINTS_PER_VOXEL).cbrt().max(1.0)).max(1e-9)
        } else {
            1.0
        };

        let mut buckets: FnvHashMap<(i64, i64, i64), Vec<u32>> = FnvHashMap::default();
        let index = VoxelGridIndex {
            voxel_size,
            origin,
            buckets: FnvHashMap::default(),
            positions: points.to_vec(),
        };
        for (i, &p) in points.iter().enumerate() {
            buckets
                .entry(index.voxel_key(p))
                .or_insert_with(Vec::new)
                .push(i as u32);
        }
        VoxelGridIndex { buckets, ..index }
    }

    fn query_rect(&self, rect: &Aabb) -> Vec<u32> {
        if self.positions.is_empty() {
            return Vec::new();
        }
        let (min_key, max_key) = self.key_range(rect);
        let mut result = Vec::new();
        for kx in min_key.0..=max_key.0 {
            for ky in min_key.1..=max_key.1 {
                for kz in min_key.2..=max_key.2 {
                    if let Some(bucket) = self.buckets.get(&(kx, ky, kz)) {
                        for &idx in bucket {
                            if rect.contains_closed(self.positions[idx as usize]) {
                                result.push(idx);
                            }
                        }
                    }
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_finds_points_in_rect() {
        let points = vec![
            Vec3::new(0., 0., 0.),
            Vec3::new(0.5, 0.5, 0.5),
            Vec3::new(5., 5., 5.),
        ];
        let index = VoxelGridIndex::build(&points);
        let rect = Aabb::new(Vec3::new(-1., -1., -1.), Vec3::new(1., 1., 1.));
        let mut found = index.query_rect(&rect);
        found.sort_unstable();
        assert_eq!(found, vec![0, 1]);
    }

    #[test]
    fn query_on_empty_index_is_empty() {
        let index = VoxelGridIndex::build(&[]);
        let rect = Aabb::new(Vec3::new(-1., -1., -1.), Vec3::new(1., 1., 1.));
        assert!(index.query_rect(&rect).is_empty());
    }

    #[test]
    fn boundary_points_are_included() {
        let points = vec![Vec3::new(1., 0., 0.)];
        let index = VoxelGridIndex::build(&points);
        let rect = Aabb::new(Vec3::new(0., 0., 0.), Vec3::new(1., 1., 1.));
        assert_eq!(index.query_rect(&rect), vec![0]);
    }

    #[test]
    fn no_duplicates_across_overlapping_voxels() {
        let points: Vec<Vec3> = (0..200)
            .map(|i| Vec3::new(i as f64 * 0.01, 0., 0.))
            .collect();
        let index = VoxelGridIndex::build(&points);
        let rect = Aabb::new(Vec3::new(0., -1., -1.), Vec3::new(2., 1., 1.));
        let found = index.query_rect(&rect);
        let mut unique = found.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(found.len(), unique.len());
        assert_eq!(found.len(), 200);
    }
}
