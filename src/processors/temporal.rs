//! Per-cluster statistics and temporal validation.
//!
//! Real binding sites blink throughout an acquisition, while sticking events
//! and optical artifacts produce bursts confined to a short stretch of frames.
//! Clusters are rejected when most of their localizations fall into one
//! frame window, or when their mean frame sits near either end of the
//! acquisition.

use crate::config::TemporalConfig;

/// Equal-width frame windows over `0..=max_frame`.
///
/// There is one more slot than windows so that `frame == max_frame` gets a
/// slot of its own instead of overflowing.
#[derive(Debug, Clone, Copy)]
pub struct TemporalWindows {
    width: f64,
    n_slots: usize,
}

impl TemporalWindows {
    pub fn new(max_frame: u32, n_windows: usize) -> Self {
        let n_windows = n_windows.max(1);
        Self {
            width: max_frame as f64 / n_windows as f64,
            n_slots: n_windows + 1,
        }
    }

    /// Slot of a frame; everything lands in slot 0 when `max_frame == 0`.
    #[inline]
    pub fn window(&self, frame: u32) -> usize {
        if self.width > 0.0 {
            ((frame as f64 / self.width) as usize).min(self.n_slots - 1)
        } else {
            0
        }
    }

    #[inline]
    pub fn n_slots(&self) -> usize {
        self.n_slots
    }
}

/// Running sums for one cluster.
#[derive(Debug, Clone, Default)]
pub struct ClusterAccumulator {
    pub n_locs: usize,
    pub frame_sum: u64,
    pub x_sum: f64,
    pub y_sum: f64,
    pub window_counts: Vec<u32>,
}

impl ClusterAccumulator {
    pub fn new(n_slots: usize) -> Self {
        Self {
            window_counts: vec![0; n_slots],
            ..Self::default()
        }
    }

    #[inline]
    pub fn add(&mut self, x: f64, y: f64, frame: u32, windows: &TemporalWindows) {
        self.n_locs += 1;
        self.frame_sum += frame as u64;
        self.x_sum += x;
        self.y_sum += y;
        self.window_counts[windows.window(frame)] += 1;
    }

    /// Finalizes the sums into statistics for cluster `id`.
    pub fn finish(&self, id: u32) -> ClusterStats {
        let n = self.n_locs.max(1) as f64;
        let max_window = self.window_counts.iter().copied().max().unwrap_or(0);
        ClusterStats {
            id,
            n_locs: self.n_locs,
            mean_frame: self.frame_sum as f64 / n,
            max_window_fraction: max_window as f64 / n,
            center_x: self.x_sum / n,
            center_y: self.y_sum / n,
            accepted: false,
            label: None,
        }
    }
}

/// Summary of one cluster that survived the size filter.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterStats {
    /// Dense id after size filtering, `1..=n_clusters`.
    pub id: u32,
    pub n_locs: usize,
    pub mean_frame: f64,
    /// Share of the cluster's localizations in its busiest frame window.
    pub max_window_fraction: f64,
    pub center_x: f64,
    pub center_y: f64,
    /// Passed temporal validation.
    pub accepted: bool,
    /// Output label, set for accepted clusters.
    pub label: Option<i32>,
}

/// Statistics for clusters `1..=n_clusters` in a single pass over the points.
pub fn cluster_properties(
    cluster_id: &[u32],
    n_clusters: usize,
    x: &[f64],
    y: &[f64],
    frame: &[u32],
    windows: &TemporalWindows,
) -> Vec<ClusterStats> {
    let mut acc: Vec<ClusterAccumulator> = (0..n_clusters)
        .map(|_| ClusterAccumulator::new(windows.n_slots()))
        .collect();
    for (i, &id) in cluster_id.iter().enumerate() {
        if id != 0 {
            acc[id as usize - 1].add(x[i], y[i], frame[i], windows);
        }
    }
    acc.iter()
        .enumerate()
        .map(|(k, a)| a.finish(k as u32 + 1))
        .collect()
}

/// Whether a cluster passes the temporal criteria.
#[inline]
pub fn is_true_cluster(stats: &ClusterStats, max_frame: u32, config: &TemporalConfig) -> bool {
    let n_frame = max_frame as f64;
    stats.max_window_fraction < config.max_window_fraction
        && stats.mean_frame < n_frame * config.max_mean_fraction
        && stats.mean_frame > n_frame * config.min_mean_fraction
}

/// Marks accepted clusters and assigns them labels `0..K-1` in id order.
///
/// With frame analysis disabled, or when every frame is 0 (no time axis to
/// judge), all clusters are accepted. Returns K.
pub fn validate_clusters(stats: &mut [ClusterStats], max_frame: u32, config: &TemporalConfig) -> usize {
    let skip = !config.frame_analysis || max_frame == 0;
    if config.frame_analysis && max_frame == 0 && !stats.is_empty() {
        log::warn!(
            "all frames are 0; skipping temporal validation of {} clusters",
            stats.len()
        );
    }

    let mut next_label = 0i32;
    for s in stats.iter_mut() {
        s.accepted = skip || is_true_cluster(s, max_frame, config);
        s.label = if s.accepted {
            next_label += 1;
            Some(next_label - 1)
        } else {
            None
        };
    }

    log::debug!(
        "temporal validation: {} of {} clusters accepted",
        next_label,
        stats.len()
    );
    next_label as usize
}

/// Lookup from dense id to output label; index 0 and rejected ids give -1.
pub fn label_table(stats: &[ClusterStats]) -> Vec<i32> {
    let mut table = vec![-1i32; stats.len() + 1];
    for s in stats {
        if let Some(label) = s.label {
            table[s.id as usize] = label;
        }
    }
    table
}

/// Per-point labels from dense ids.
pub fn final_labels(cluster_id: &[u32], table: &[i32]) -> Vec<i32> {
    cluster_id.iter().map(|&id| table[id as usize]).collect()
}
