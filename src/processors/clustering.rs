//! Density-maximum clustering of localizations.
//!
//! Every point counts its neighbors within the search radius. Points whose
//! count is not exceeded by any neighbor are local maxima; each maximum, in
//! index order, seeds a cluster and hands its id to its unassigned
//! neighbors. A newly seeded maximum also takes over point 0 when it reaches
//! it. Small clusters are dropped, the rest are compacted and finally
//! validated against the frame axis, since genuine binding sites blink
//! throughout the acquisition.
//!
//! Three backends implement the same pipeline:
//! - **dense**: all-pairs adjacency matrix, for small or pre-grouped inputs
//! - **bucketed**: uniform box grid, only 3x3 boxes are searched per point
//! - **device**: data-parallel kernels with explicit synchronization
//!
//! All of them evaluate the same f64 neighbor test and the same
//! ordered propagation rule, so they return identical labels.
//!
//! # Example
//!
//! ```
//! use paint_cluster::processors::clustering::cluster_bucketed;
//!
//! let x = vec![0.0, 0.01, 0.02, 5.0];
//! let y = vec![0.0, 0.01, 0.0, 5.0];
//! let frame = vec![100, 500, 900, 1000];
//! let labels = cluster_bucketed(&x, &y, &frame, 0.05, 2).unwrap();
//! assert_eq!(labels, vec![0, 0, 0, -1]);
//! ```

use std::time::Instant;

use thiserror::Error;

use super::device::{Device, DeviceError};
use super::filtering::{cluster_sizes, filter_and_relabel, filter_small_clusters, RankTable};
use super::neighbors::{
    count_neighbors, is_local_maximum, local_maxima, within_radius, BucketedNeighborhood,
    DenseNeighborhood, Neighborhood,
};
use super::propagation::{assign_to_clusters, propagate_to, seed_id};
use super::spatial_index::BoxIndex;
use super::temporal::{
    cluster_properties, final_labels, label_table, validate_clusters, ClusterAccumulator,
    ClusterStats, TemporalWindows,
};
use crate::config::{Backend, ClusteringConfig};
use crate::core::loaders::Localizations;

/// Label of points outside any accepted cluster.
pub const NOISE: i32 = -1;

/// Errors that can occur while clustering.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("length mismatch: x has {x} values, y has {y}, frame has {frame}")]
    LengthMismatch { x: usize, y: usize, frame: usize },

    #[error("radius must be finite and > 0, got {0}")]
    InvalidRadius(f64),

    #[error("non-finite coordinate at point {index}")]
    NonFiniteCoordinate { index: usize },

    #[error("invalid parameter {name}: {message}")]
    InvalidParameter { name: &'static str, message: String },

    #[error("box grid of {boxes_x} x {boxes_y} exceeds the limit of {limit} boxes")]
    GridTooLarge { boxes_x: f64, boxes_y: f64, limit: usize },

    #[error("point {point} maps to box {box_id}, outside 0..{n_boxes}")]
    BoxOutOfRange {
        point: usize,
        box_id: usize,
        n_boxes: usize,
    },

    #[error("device error: {0}")]
    Device(#[from] DeviceError),
}

/// Result type for clustering operations.
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Validated, borrowed input columns.
#[derive(Debug, Clone, Copy)]
struct Points<'a> {
    x: &'a [f64],
    y: &'a [f64],
    frame: &'a [u32],
}

impl<'a> Points<'a> {
    fn new(x: &'a [f64], y: &'a [f64], frame: &'a [u32], radius: f64) -> Result<Self> {
        if x.len() != y.len() || x.len() != frame.len() {
            return Err(ClusterError::LengthMismatch {
                x: x.len(),
                y: y.len(),
                frame: frame.len(),
            });
        }
        if !(radius.is_finite() && radius > 0.0) {
            return Err(ClusterError::InvalidRadius(radius));
        }
        if let Some(index) = x
            .iter()
            .zip(y)
            .position(|(a, b)| !a.is_finite() || !b.is_finite())
        {
            return Err(ClusterError::NonFiniteCoordinate { index });
        }
        Ok(Self { x, y, frame })
    }

    #[inline]
    fn len(&self) -> usize {
        self.x.len()
    }

    fn max_frame(&self) -> u32 {
        self.frame.iter().copied().max().unwrap_or(0)
    }
}

/// Full result of one clustering call.
#[derive(Debug, Clone)]
pub struct ClusterOutcome {
    /// One label per input point: `0..n_clusters` or [`NOISE`].
    pub labels: Vec<i32>,
    /// Number of accepted clusters.
    pub n_clusters: usize,
    /// Every cluster that survived the size filter, accepted or not.
    pub clusters: Vec<ClusterStats>,
    pub n_local_maxima: usize,
    /// Backend that actually ran.
    pub backend: Backend,
}

impl ClusterOutcome {
    fn empty(backend: Backend) -> Self {
        Self {
            labels: Vec::new(),
            n_clusters: 0,
            clusters: Vec::new(),
            n_local_maxima: 0,
            backend,
        }
    }

    /// Number of points labeled as noise.
    pub fn n_noise(&self) -> usize {
        self.labels.iter().filter(|&&l| l == NOISE).count()
    }

    /// Accepted clusters, in label order.
    pub fn accepted(&self) -> impl Iterator<Item = &ClusterStats> {
        self.clusters.iter().filter(|c| c.accepted)
    }
}

/// A concrete backend, after `Backend::Auto` has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Engine {
    Dense,
    Bucketed,
    Device,
}

impl From<Engine> for Backend {
    fn from(engine: Engine) -> Self {
        match engine {
            Engine::Dense => Backend::Dense,
            Engine::Bucketed => Backend::Bucketed,
            Engine::Device => Backend::Device,
        }
    }
}

/// Runs the clustering pipeline with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct Clusterer {
    config: ClusteringConfig,
}

impl Clusterer {
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    fn engine(&self, n_points: usize) -> Engine {
        match self.config.backend {
            Backend::Auto if n_points <= self.config.dense_max_points => Engine::Dense,
            Backend::Auto | Backend::Bucketed => Engine::Bucketed,
            Backend::Dense => Engine::Dense,
            Backend::Device => Engine::Device,
        }
    }

    /// Backend used for `n_points` points; never `Backend::Auto`.
    pub fn resolve_backend(&self, n_points: usize) -> Backend {
        self.engine(n_points).into()
    }

    /// Clusters a localization table.
    pub fn run(&self, locs: &Localizations) -> Result<ClusterOutcome> {
        self.run_columns(&locs.x, &locs.y, &locs.frame)
    }

    /// Clusters parallel `x`, `y`, `frame` columns.
    ///
    /// # Errors
    ///
    /// Invalid input is rejected before any work is done. The bucketed
    /// backend fails on grids beyond `bucketing.max_boxes`; the device
    /// backend fails when its memory budget is exhausted. No labels are
    /// returned on failure.
    pub fn run_columns(&self, x: &[f64], y: &[f64], frame: &[u32]) -> Result<ClusterOutcome> {
        let points = Points::new(x, y, frame, self.config.radius)?;
        let engine = self.engine(points.len());
        if points.len() == 0 {
            return Ok(ClusterOutcome::empty(engine.into()));
        }

        let start = Instant::now();
        let outcome = match engine {
            Engine::Dense => {
                let nb = DenseNeighborhood::new(points.x, points.y, self.config.radius);
                run_host(&nb, &points, &self.config, Backend::Dense)
            }
            Engine::Bucketed => {
                let box_scale = self.config.bucketing.box_scale;
                if !(box_scale.is_finite() && box_scale >= 1.0) {
                    return Err(ClusterError::InvalidParameter {
                        name: "box_scale",
                        message: format!("must be finite and >= 1, got {}", box_scale),
                    });
                }
                let index = BoxIndex::build(
                    points.x,
                    points.y,
                    self.config.radius * box_scale,
                    self.config.bucketing.max_boxes,
                )?;
                let nb = BucketedNeighborhood::new(points.x, points.y, self.config.radius, index);
                run_host(&nb, &points, &self.config, Backend::Bucketed)
            }
            Engine::Device => run_device(&points, &self.config)?,
        };

        log::debug!(
            "{} backend: {} points, {} local maxima, {} of {} clusters accepted in {:.2?}",
            outcome.backend,
            points.len(),
            outcome.n_local_maxima,
            outcome.n_clusters,
            outcome.clusters.len(),
            start.elapsed()
        );

        Ok(outcome)
    }
}

/// Shared tail of the host backends: size filter, relabel, validation.
fn run_host<N: Neighborhood>(
    nb: &N,
    points: &Points<'_>,
    config: &ClusteringConfig,
    backend: Backend,
) -> ClusterOutcome {
    let nn = count_neighbors(nb);
    let lm = local_maxima(nb, &nn);
    let n_local_maxima = lm.iter().filter(|&&is_max| is_max).count();
    let mut cluster_id = assign_to_clusters(nb, &lm);

    let n_sized = filter_and_relabel(&mut cluster_id, config.min_locs);

    let max_frame = points.max_frame();
    let windows = TemporalWindows::new(max_frame, config.temporal.n_windows);
    let mut clusters = cluster_properties(
        &cluster_id,
        n_sized,
        points.x,
        points.y,
        points.frame,
        &windows,
    );
    let n_clusters = validate_clusters(&mut clusters, max_frame, &config.temporal);
    let labels = final_labels(&cluster_id, &label_table(&clusters));

    ClusterOutcome {
        labels,
        n_clusters,
        clusters,
        n_local_maxima,
        backend,
    }
}

/// Device pipeline: one synchronized stage per kernel.
///
/// Propagation is launched once per local maximum, in index order, each
/// launch reading the previous id buffer and writing the other one, so the
/// first-wins assignment matches the host backends exactly.
fn run_device(points: &Points<'_>, config: &ClusteringConfig) -> Result<ClusterOutcome> {
    let n = points.len();
    let r2 = config.radius * config.radius;
    let device = Device::new(&config.device)?;
    let mut stream = device.stream();

    let d_x = device.to_device(points.x)?;
    let d_y = device.to_device(points.y)?;
    let (x, y) = (d_x.view(), d_y.view());

    // number of neighbors
    let mut d_nn = device.alloc_zeros::<u32>(n)?;
    stream.launch("count_neighbors", n, &mut d_nn, |i| {
        (0..n)
            .filter(|&j| j != i && within_radius(x, y, i, j, r2))
            .count() as u32
    })?;
    stream.synchronize()?;

    // local maxima
    let mut d_lm = device.alloc_zeros::<u8>(n)?;
    let nn = d_nn.view();
    stream.launch("local_maxima", n, &mut d_lm, |i| {
        let neighbors = (0..n).filter(move |&j| j != i && within_radius(x, y, i, j, r2));
        u8::from(is_local_maximum(i, nn, neighbors))
    })?;
    stream.synchronize()?;
    let lm = stream.copy_to_host(&d_lm)?;
    drop(d_lm);
    drop(d_nn);

    // assign clusters
    let mut d_prev = device.alloc_zeros::<u32>(n)?;
    let mut d_next = device.alloc_zeros::<u32>(n)?;
    let mut n_local_maxima = 0;
    for i in lm
        .iter()
        .enumerate()
        .filter(|&(_, &flag)| flag != 0)
        .map(|(i, _)| i)
    {
        n_local_maxima += 1;
        let prev = d_prev.view();
        let seeding = prev[i] == 0;
        let id_i = if seeding { seed_id(i) } else { prev[i] };
        stream.launch("assign_to_cluster", n, &mut d_next, |j| {
            propagate_to(j, prev[j], id_i, seeding, j == i || within_radius(x, y, i, j, r2))
        })?;
        stream.synchronize()?;
        std::mem::swap(&mut d_prev, &mut d_next);
    }
    let mut cluster_id = stream.copy_to_host(&d_prev)?;
    drop(d_next);
    drop(d_prev);

    // check cluster size
    let sizes = cluster_sizes(&cluster_id);
    filter_small_clusters(&mut cluster_id, &sizes, config.min_locs);
    let table = RankTable::from_ids(&cluster_id);
    let n_sized = table.n_clusters();

    // rename clusters
    let d_ranks = device.to_device(table.as_slice())?;
    let d_filtered = device.to_device(&cluster_id)?;
    let mut d_dense = device.alloc_zeros::<u32>(n)?;
    let (ranks, filtered) = (d_ranks.view(), d_filtered.view());
    stream.launch("rename_clusters", n, &mut d_dense, |i| {
        ranks[filtered[i] as usize]
    })?;
    stream.synchronize()?;
    drop(d_filtered);

    // cluster properties, one thread per cluster
    let max_frame = points.max_frame();
    let windows = TemporalWindows::new(max_frame, config.temporal.n_windows);
    let slots = windows.n_slots();
    let d_frame = device.to_device(points.frame)?;
    let (dense, frame) = (d_dense.view(), d_frame.view());

    let mut d_totals = device.alloc_zeros::<ClusterAccumulator>(n_sized)?;
    stream.launch("cluster_totals", n_sized, &mut d_totals, |k| {
        let id = k as u32 + 1;
        let mut acc = ClusterAccumulator::default();
        for i in (0..n).filter(|&i| dense[i] == id) {
            acc.n_locs += 1;
            acc.frame_sum += frame[i] as u64;
            acc.x_sum += x[i];
            acc.y_sum += y[i];
        }
        acc
    })?;

    let mut d_windows = device.alloc_zeros::<u32>(n_sized * slots)?;
    stream.launch_rows("locs_in_window", n_sized, slots, &mut d_windows, |k, row| {
        let id = k as u32 + 1;
        for i in (0..n).filter(|&i| dense[i] == id) {
            row[windows.window(frame[i])] += 1;
        }
    })?;
    stream.synchronize()?;

    let totals = stream.copy_to_host(&d_totals)?;
    let locs_in_window = stream.copy_to_host(&d_windows)?;
    let mut clusters: Vec<ClusterStats> = totals
        .into_iter()
        .enumerate()
        .map(|(k, mut acc)| {
            acc.window_counts = locs_in_window[k * slots..(k + 1) * slots].to_vec();
            acc.finish(k as u32 + 1)
        })
        .collect();

    // check for true clusters
    let n_clusters = validate_clusters(&mut clusters, max_frame, &config.temporal);
    let d_table = device.to_device(&label_table(&clusters))?;
    let mut d_labels = device.alloc_zeros::<i32>(n)?;
    let table_view = d_table.view();
    stream.launch("final_labels", n, &mut d_labels, |i| {
        table_view[dense[i] as usize]
    })?;
    stream.synchronize()?;
    let labels = stream.copy_to_host(&d_labels)?;

    log::trace!("device run: {} kernel launches", stream.launches());

    Ok(ClusterOutcome {
        labels,
        n_clusters,
        clusters,
        n_local_maxima,
        backend: Backend::Device,
    })
}

fn cluster_with(
    backend: Backend,
    x: &[f64],
    y: &[f64],
    frame: &[u32],
    radius: f64,
    min_locs: usize,
) -> Result<Vec<i32>> {
    let config = ClusteringConfig::new(radius, min_locs).with_backend(backend);
    Clusterer::new(config)
        .run_columns(x, y, frame)
        .map(|outcome| outcome.labels)
}

/// Clusters small or pre-grouped point sets with an all-pairs adjacency.
///
/// Neighbor tests run over every pair, so memory and time grow as `N^2`.
///
/// # Arguments
///
/// * `x`, `y` - Coordinates per localization
/// * `frame` - Acquisition frame per localization
/// * `radius` - Neighborhood radius (inclusive)
/// * `min_locs` - Clusters with this many points or fewer are discarded
///
/// # Returns
///
/// One label per input point: `0..K-1` for accepted clusters, `-1` for noise.
///
/// # Errors
///
/// `LengthMismatch`, `InvalidRadius` or `NonFiniteCoordinate` for invalid input.
pub fn cluster_dense(
    x: &[f64],
    y: &[f64],
    frame: &[u32],
    radius: f64,
    min_locs: usize,
) -> Result<Vec<i32>> {
    cluster_with(Backend::Dense, x, y, frame, radius, min_locs)
}

/// Clusters large point sets using a box grid sized to the radius.
///
/// Labels are identical to [`cluster_dense`] for the same input.
///
/// # Arguments
///
/// * `x`, `y` - Coordinates per localization
/// * `frame` - Acquisition frame per localization
/// * `radius` - Neighborhood radius (inclusive)
/// * `min_locs` - Clusters with this many points or fewer are discarded
///
/// # Returns
///
/// One label per input point: `0..K-1` for accepted clusters, `-1` for noise.
///
/// # Errors
///
/// Invalid input as for [`cluster_dense`], plus `GridTooLarge` when the
/// coordinate span needs more than the default box limit.
pub fn cluster_bucketed(
    x: &[f64],
    y: &[f64],
    frame: &[u32],
    radius: f64,
    min_locs: usize,
) -> Result<Vec<i32>> {
    cluster_with(Backend::Bucketed, x, y, frame, radius, min_locs)
}

/// Clusters very large point sets with data-parallel device kernels.
///
/// Uses the default [`DeviceConfig`](crate::config::DeviceConfig). Labels are
/// identical to [`cluster_dense`] for the same input.
///
/// # Arguments
///
/// * `x`, `y` - Coordinates per localization
/// * `frame` - Acquisition frame per localization
/// * `radius` - Neighborhood radius (inclusive)
/// * `min_locs` - Clusters with this many points or fewer are discarded
///
/// # Returns
///
/// One label per input point: `0..K-1` for accepted clusters, `-1` for noise.
///
/// # Errors
///
/// Invalid input as for [`cluster_dense`], plus `ClusterError::Device` when a
/// buffer exceeds the memory budget. No partial labels are returned.
pub fn cluster_device(
    x: &[f64],
    y: &[f64],
    frame: &[u32],
    radius: f64,
    min_locs: usize,
) -> Result<Vec<i32>> {
    cluster_with(Backend::Device, x, y, frame, radius, min_locs)
}
