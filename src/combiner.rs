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

//! The deduplicating multi-cloud combiner. This is the core of the crate:
//! everything else (the grid, the spatial index, the executor) exists to
//! make [`combine`] run in parallel across a spatial lattice.

use crate::cloud::{PointCloud, Vertex};
use crate::errors::*;
use crate::executor::ParallelExecutor;
use crate::grid::{CellIndex, Grid};
use crate::logging::LogSink;
use crate::math::{distance_squared, xy_distance_squared, Aabb, Vec3};
use crate::rng::{CombinerRng, SeededRng};
use crate::spatial_index::{SpatialIndex, VoxelGridIndex};
use fnv::FnvHashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// How far (as a multiplier on the nearest origin distance) a cloud's origin
/// may be from a cell's center before that cloud is pruned from the cell.
const MIN_DIST_RANGE: f64 = 1.2;
/// Cap on how many points of a cloud are sampled per cell for MSE pruning.
const MAX_MSE_SAMPLES: usize = 30;
/// Nearest-neighbor search stops early once it finds a distance below this.
const SMALLEST_NN_DISTANCE: f64 = 0.001;
/// A cloud is dropped from a cell once its sampled MSE against the other
/// surviving clouds exceeds this.
const MAX_RMSE: f64 = 0.02;

const MIN_DIST_RANGE_SQ: f64 = MIN_DIST_RANGE * MIN_DIST_RANGE;
const SMALLEST_NN_DISTANCE_SQ: f64 = SMALLEST_NN_DISTANCE * SMALLEST_NN_DISTANCE;
const MAX_RMSE_SQ: f64 = MAX_RMSE * MAX_RMSE;

#[derive(Debug, Clone, Copy)]
pub struct CombinerConfig {
    /// XY cell edge, in meters. Grid density is the inverse square of this.
    pub cell_size: f64,
    /// Ratio of Z cell size to XY cell size. Non-positive means "use a
    /// single Z layer spanning the full vertical extent" - the recommended
    /// default, since it avoids striation on gently sloped terrain.
    pub cell_aspect: f64,
    /// Positive caps the number of kept points per cell; non-positive means
    /// no cap.
    pub max_points_per_cell: i64,
    /// Seeds the combiner's RNG. Fixed seed + fixed thread schedule gives
    /// reproducible output; either changing invalidates that guarantee.
    pub seed: u64,
    /// Caps the worker count; `None` uses all available cores.
    pub max_workers: Option<usize>,
}

impl Default for CombinerConfig {
    fn default() -> Self {
        CombinerConfig {
            cell_size: 0.025,
            cell_aspect: -1.0,
            max_points_per_cell: 6,
            seed: 0,
            max_workers: None,
        }
    }
}

/// Per-worker scratch reused across cells, as required by the algorithm:
/// allocate once per worker, clear (not reallocate) between cells.
struct WorkerScratch {
    keepers: Vec<Vertex>,
    nbhd: FnvHashMap<usize, Vec<u32>>,
    in_cell: FnvHashMap<usize, Vec<u32>>,
    cap_scratch: Vec<Vertex>,
}

impl WorkerScratch {
    fn new() -> Self {
        WorkerScratch {
            keepers: Vec::new(),
            nbhd: FnvHashMap::default(),
            in_cell: FnvHashMap::default(),
            cap_scratch: Vec::new(),
        }
    }
}

/// Process-wide telemetry only; not part of the output contract.
#[derive(Default)]
struct CellPopulationStats {
    smallest: AtomicUsize,
    largest: AtomicUsize,
}

impl CellPopulationStats {
    fn new() -> Self {
        CellPopulationStats {
            smallest: AtomicUsize::new(usize::max_value()),
            largest: AtomicUsize::new(0),
        }
    }

    fn record(&self, population: usize) {
        let mut current = self.smallest.load(Ordering::Relaxed);
        while population < current {
            match self.smallest.compare_exchange_weak(
                current,
                population,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
        let mut current = self.largest.load(Ordering::Relaxed);
        while population > current {
            match self.largest.compare_exchange_weak(
                current,
                population,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }
}

/// Fuses `clouds` (and, optionally, their per-cloud acquisition origins)
/// into a single deduplicated point cloud.
///
/// `clouds` and `origins` are read-only; the returned cloud is newly
/// allocated and never aliases their storage. `origins` may be shorter than
/// `clouds` - clouds beyond its length are treated as having no origin - but
/// never longer.
pub fn combine(
    clouds: &[&PointCloud],
    origins: Option<&[Vec3]>,
    config: &CombinerConfig,
    logger: Option<&dyn LogSink>,
) -> Result<PointCloud> {
    if config.cell_size <= 0.0 {
        return Err(ErrorKind::InvalidCellSize(config.cell_size).into());
    }
    if let Some(origins) = origins {
        if origins.len() > clouds.len() {
            return Err(ErrorKind::TooManyOrigins(origins.len(), clouds.len()).into());
        }
    }
    for (cloud_index, cloud) in clouds.iter().enumerate() {
        if !cloud.all_positions_finite() {
            let vertex_index = cloud
                .vertices()
                .iter()
                .position(|v| {
                    !(v.position.x.is_finite() && v.position.y.is_finite() && v.position.z.is_finite())
                })
                .unwrap_or(0);
            return Err(ErrorKind::NonFinitePosition(cloud_index, vertex_index).into());
        }
    }

    if clouds.is_empty() {
        return Ok(PointCloud::new(false, false, false));
    }
    if clouds.len() == 1 && config.max_points_per_cell <= 0 {
        return Ok(clouds[0].clone());
    }

    let log = |msg: String| {
        if let Some(logger) = logger {
            logger.log(&msg);
        }
    };

    log(format!("building {} indices", clouds.len()));

    let cloud_bounds: Vec<Aabb> = clouds.iter().map(|c| c.bounds_uncached()).collect();
    let union_bounds = cloud_bounds
        .iter()
        .skip(1)
        .fold(cloud_bounds[0], |acc, b| acc.union(b));

    let spatial_indices = build_spatial_indices(clouds);
    let grid = Grid::new(union_bounds, config.cell_size, config.cell_aspect);

    log(format!("pruning {} cells", grid.total_cells()));

    let total_len: usize = clouds.iter().map(|c| c.len()).sum();
    let has_normals = clouds.iter().any(|c| c.has_normals());
    let has_uvs = clouds.iter().any(|c| c.has_uvs());
    let has_colors = clouds.iter().any(|c| c.has_colors());
    let output = Mutex::new(PointCloud::with_capacity(
        total_len, has_normals, has_uvs, has_colors,
    ));

    let rng = Mutex::new(SeededRng::from_seed(config.seed));
    let stats = CellPopulationStats::new();
    let executor = ParallelExecutor::new(config.max_workers);

    executor.for_each(
        0..grid.total_cells(),
        WorkerScratch::new,
        |scratch, cell_n| {
            process_cell(
                clouds,
                origins,
                &cloud_bounds,
                &spatial_indices,
                &grid,
                config,
                &rng,
                &stats,
                grid.linear_to_ijk(cell_n),
                scratch,
            );
        },
        |scratch| {
            if !scratch.keepers.is_empty() {
                output.lock().unwrap().extend(scratch.keepers);
            }
        },
    );

    let output = output.into_inner().unwrap();
    log(format!("kept {} vertices", output.len()));
    Ok(output)
}

fn build_spatial_indices(clouds: &[&PointCloud]) -> Vec<VoxelGridIndex> {
    let slots: Vec<Mutex<Option<VoxelGridIndex>>> = (0..clouds.len()).map(|_| Mutex::new(None)).collect();
    let num_workers = num_cpus::get().min(clouds.len()).max(1);
    let pool = scoped_pool::Pool::new(num_workers);
    pool.scoped(|scope| {
        for (cloud_index, cloud) in clouds.iter().enumerate() {
            let slot = &slots[cloud_index];
            scope.execute(move || {
                let positions: Vec<Vec3> = cloud.vertices().iter().map(|v| v.position).collect();
                *slot.lock().unwrap() = Some(VoxelGridIndex::build(&positions));
            });
        }
    });
    slots
        .into_iter()
        .map(|slot| slot.into_inner().unwrap().unwrap())
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn process_cell(
    clouds: &[&PointCloud],
    origins: Option<&[Vec3]>,
    cloud_bounds: &[Aabb],
    spatial_indices: &[VoxelGridIndex],
    grid: &Grid,
    config: &CombinerConfig,
    rng: &Mutex<SeededRng>,
    stats: &CellPopulationStats,
    cell: CellIndex,
    scratch: &mut WorkerScratch,
) {
    let cell_bounds = grid.cell_bounds(cell);
    let neighborhood_bounds = grid.neighborhood_bounds(cell);

    scratch.nbhd.clear();
    scratch.in_cell.clear();

    // A. Candidate collection.
    for (cloud_index, cloud) in clouds.iter().enumerate() {
        if !cloud_bounds[cloud_index].intersects(&neighborhood_bounds) {
            continue;
        }
        let nbhd_indices = spatial_indices[cloud_index].query_rect(&neighborhood_bounds);
        if nbhd_indices.is_empty() {
            continue;
        }
        let in_cell_indices: Vec<u32> = nbhd_indices
            .iter()
            .copied()
            .filter(|&idx| grid.contains(cell, cloud.vertex(idx as usize).position))
            .collect();
        scratch.nbhd.insert(cloud_index, nbhd_indices);
        if !in_cell_indices.is_empty() {
            scratch.in_cell.insert(cloud_index, in_cell_indices);
        }
    }

    if scratch.in_cell.is_empty() {
        return;
    }

    // B. Origin-distance pruning.
    if let Some(origins) = origins {
        if scratch.in_cell.len() > 1 {
            let center = cell_bounds.center();
            let distances: FnvHashMap<usize, f64> = scratch
                .in_cell
                .keys()
                .copied()
                .filter_map(|c| origins.get(c).map(|&origin| (c, xy_distance_squared(origin, center))))
                .collect();
            if let Some(&min_d2) = distances
                .values()
                .fold(None, |acc: Option<&f64>, d| match acc {
                    Some(a) if *a <= *d => Some(a),
                    _ => Some(d),
                })
            {
                let threshold = min_d2 * MIN_DIST_RANGE_SQ;
                let to_remove: Vec<usize> = distances
                    .iter()
                    .filter(|&(_, &d2)| d2 > threshold)
                    .map(|(&c, _)| c)
                    .collect();
                for c in to_remove {
                    scratch.in_cell.remove(&c);
                }
            }
        }
    }

    // C. Nearest-neighbor RMSE pruning.
    if scratch.in_cell.len() > 1 {
        {
            let mut rng = rng.lock().unwrap();
            for indices in scratch.in_cell.values_mut() {
                rng.shuffle(indices);
            }
        }

        loop {
            if scratch.in_cell.len() <= 1 {
                break;
            }
            let mut order: Vec<usize> = scratch.in_cell.keys().copied().collect();
            order.sort_by_key(|&c| scratch.in_cell[&c].len());
            let two_cloud_case = order.len() == 2;

            let mut max_mse = f64::NEG_INFINITY;
            let mut worst = order[0];
            for &c in &order {
                let mse = cell_mse(clouds, &scratch.nbhd, &scratch.in_cell, c);
                if mse > max_mse {
                    max_mse = mse;
                    worst = c;
                }
                if two_cloud_case {
                    break;
                }
            }

            if max_mse > MAX_RMSE_SQ {
                scratch.in_cell.remove(&worst);
            } else {
                break;
            }
        }
    }

    // D. Population cap.
    scratch.cap_scratch.clear();
    for (&cloud_index, indices) in &scratch.in_cell {
        for &idx in indices {
            scratch
                .cap_scratch
                .push(*clouds[cloud_index].vertex(idx as usize));
        }
    }

    let kept_count = scratch.cap_scratch.len();
    stats.record(kept_count);

    if config.max_points_per_cell > 0 && kept_count > config.max_points_per_cell as usize {
        rng.lock().unwrap().shuffle(&mut scratch.cap_scratch);
        scratch
            .keepers
            .extend(scratch.cap_scratch.drain(..config.max_points_per_cell as usize));
    } else {
        scratch.keepers.append(&mut scratch.cap_scratch);
    }
}

/// Sampled mean squared nearest-neighbor distance of cloud `cloud_index`'s
/// in-cell points against every *other* cloud present in the cell's
/// neighborhood (including clouds origin-pruning already removed from
/// `in_cell`, as long as they had any neighborhood points at all).
fn cell_mse(
    clouds: &[&PointCloud],
    nbhd: &FnvHashMap<usize, Vec<u32>>,
    in_cell: &FnvHashMap<usize, Vec<u32>>,
    cloud_index: usize,
) -> f64 {
    let indices = &in_cell[&cloud_index];
    let sample_count = indices.len().min(MAX_MSE_SAMPLES);
    let samples = &indices[..sample_count];

    let mut sum = 0.0;
    let mut count = 0u32;
    for &sample_idx in samples {
        let p = clouds[cloud_index].vertex(sample_idx as usize).position;
        for (&other_index, other_indices) in nbhd {
            if other_index == cloud_index {
                continue;
            }
            let mut best = f64::INFINITY;
            for &other_idx in other_indices {
                let q = clouds[other_index].vertex(other_idx as usize).position;
                let d2 = distance_squared(p, q);
                if d2 < best {
                    best = d2;
                }
                if best < SMALLEST_NN_DISTANCE_SQ {
                    break;
                }
            }
            sum += best;
            count += 1;
        }
    }

    if count == 0 {
        0.0
    } else {
        sum / f64::from(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::Vertex;

    fn plane_cloud(n: usize, z: f64) -> PointCloud {
        let mut cloud = PointCloud::new(false, false, false);
        let side = (n as f64).sqrt().ceil() as usize;
        'outer: for i in 0..side {
            for j in 0..side {
                if cloud.len() == n {
                    break 'outer;
                }
                let x = i as f64 / side as f64;
                let y = j as f64 / side as f64;
                cloud.push(Vertex::new(Vec3::new(x, y, z)));
            }
        }
        cloud
    }

    #[test]
    fn s1_empty_input_yields_empty_output() {
        let clouds: Vec<&PointCloud> = Vec::new();
        let out = combine(&clouds, None, &CombinerConfig::default(), None).unwrap();
        assert_eq!(out.len(), 0);
    }

    #[test]
    fn s2_single_cloud_unlimited_cap_passes_through() {
        let cloud = plane_cloud(10, 0.0);
        let config = CombinerConfig {
            max_points_per_cell: 0,
            ..CombinerConfig::default()
        };
        let out = combine(&[&cloud], None, &config, None).unwrap();
        assert_eq!(out.len(), 10);
        let mut expected: Vec<Vec3> = cloud.vertices().iter().map(|v| v.position).collect();
        let mut actual: Vec<Vec3> = out.vertices().iter().map(|v| v.position).collect();
        expected.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap().then(a.y.partial_cmp(&b.y).unwrap()));
        actual.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap().then(a.y.partial_cmp(&b.y).unwrap()));
        assert_eq!(expected, actual);
    }

    #[test]
    fn rejects_non_positive_cell_size() {
        let cloud = plane_cloud(4, 0.0);
        let config = CombinerConfig {
            cell_size: 0.0,
            ..CombinerConfig::default()
        };
        let err = combine(&[&cloud], None, &config, None).unwrap_err();
        match err.0 {
            ErrorKind::InvalidCellSize(_) => {}
            other => panic!("expected InvalidCellSize, got {:?}", other),
        }
    }

    #[test]
    fn rejects_origins_longer_than_clouds() {
        let cloud = plane_cloud(4, 0.0);
        let origins = [Vec3::new(0., 0., 0.), Vec3::new(1., 1., 1.)];
        let err = combine(&[&cloud], Some(&origins), &CombinerConfig::default(), None).unwrap_err();
        match err.0 {
            ErrorKind::TooManyOrigins(2, 1) => {}
            other => panic!("expected TooManyOrigins(2, 1), got {:?}", other),
        }
    }

    #[test]
    fn rejects_non_finite_positions() {
        let mut cloud = PointCloud::new(false, false, false);
        cloud.push(Vertex::new(Vec3::new(f64::NAN, 0., 0.)));
        let err = combine(&[&cloud], None, &CombinerConfig::default(), None).unwrap_err();
        match err.0 {
            ErrorKind::NonFinitePosition(0, 0) => {}
            other => panic!("expected NonFinitePosition(0, 0), got {:?}", other),
        }
    }

    #[test]
    fn s3_identical_duplicates_survive_and_are_capped() {
        let cloud_a = plane_cloud(100, 0.0);
        let cloud_b = cloud_a.clone();
        let origin = Vec3::new(0., 0., 0.);
        let config = CombinerConfig {
            cell_size: 0.1,
            max_points_per_cell: 6,
            ..CombinerConfig::default()
        };
        let out = combine(
            &[&cloud_a, &cloud_b],
            Some(&[origin, origin]),
            &config,
            None,
        )
        .unwrap();
        let grid = Grid::new(cloud_a.bounds_uncached(), config.cell_size, config.cell_aspect);
        let occupied_cells = grid.total_cells();
        assert!(out.len() <= 6 * occupied_cells);
        assert!(!out.is_empty());
    }

    #[test]
    fn s4_origin_pruning_keeps_the_near_cloud() {
        let mut rng = SeededRng::from_seed(1);
        let mut cloud_a = PointCloud::new(false, false, false);
        let mut points = Vec::new();
        for _ in 0..1000 {
            let p = Vec3::new(rng.next_f64(), rng.next_f64(), rng.next_f64());
            points.push(p);
            cloud_a.push(Vertex::new(p));
        }
        let mut cloud_b = PointCloud::new(false, false, false);
        for &p in &points {
            cloud_b.push(Vertex::new(p));
        }

        let origin_a = Vec3::new(0., 0., 0.);
        let origin_b = Vec3::new(100., 0., 0.);
        let config = CombinerConfig {
            cell_size: 0.1,
            max_points_per_cell: 0,
            ..CombinerConfig::default()
        };
        let out = combine(
            &[&cloud_a, &cloud_b],
            Some(&[origin_a, origin_b]),
            &config,
            None,
        )
        .unwrap();

        // Every output point must be position-equal to one of cloud_a's points.
        let a_positions: std::collections::HashSet<(i64, i64, i64)> = cloud_a
            .vertices()
            .iter()
            .map(|v| quantize(v.position))
            .collect();
        for v in out.vertices() {
            assert!(a_positions.contains(&quantize(v.position)));
        }
    }

    fn quantize(p: Vec3) -> (i64, i64, i64) {
        let scale = 1e6;
        (
            (p.x * scale).round() as i64,
            (p.y * scale).round() as i64,
            (p.z * scale).round() as i64,
        )
    }

    #[test]
    fn p6_partition_sums_to_kept_count() {
        let cloud = plane_cloud(50, 0.0);
        let config = CombinerConfig {
            cell_size: 0.05,
            max_points_per_cell: 0,
            ..CombinerConfig::default()
        };
        let out = combine(&[&cloud], None, &config, None).unwrap();
        let grid = Grid::new(cloud.bounds_uncached(), config.cell_size, config.cell_aspect);
        let mut total = 0;
        for n in 0..grid.total_cells() {
            let cell = grid.linear_to_ijk(n);
            total += out
                .vertices()
                .iter()
                .filter(|v| grid.contains(cell, v.position))
                .count();
        }
        assert_eq!(total, out.len());
    }
}
