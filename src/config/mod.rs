//! Configuration types for the clustering pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Execution strategy used to cluster a point set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Dense for small inputs, bucketed otherwise.
    #[default]
    Auto,
    /// All-pairs adjacency, for small or pre-grouped point sets.
    Dense,
    /// Uniform box grid, for large point sets on the CPU.
    Bucketed,
    /// Data-parallel kernels with explicit synchronization.
    Device,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Backend::Auto => "auto",
            Backend::Dense => "dense",
            Backend::Bucketed => "bucketed",
            Backend::Device => "device",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Backend::Auto),
            "dense" | "picked" => Ok(Backend::Dense),
            "bucketed" | "cpu" => Ok(Backend::Bucketed),
            "device" | "gpu" => Ok(Backend::Device),
            other => Err(format!(
                "unknown backend '{}', expected auto, dense, bucketed or device",
                other
            )),
        }
    }
}

/// Core clustering parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Neighborhood radius, in the same unit as the coordinates
    #[serde(default = "default_radius")]
    pub radius: f64,

    /// Clusters with this many points or fewer are discarded
    #[serde(default = "default_min_locs")]
    pub min_locs: usize,

    /// Backend selection
    #[serde(default)]
    pub backend: Backend,

    /// Largest point set that `Backend::Auto` sends to the dense backend
    #[serde(default = "default_dense_max_points")]
    pub dense_max_points: usize,

    #[serde(default)]
    pub temporal: TemporalConfig,

    #[serde(default)]
    pub bucketing: BucketConfig,

    #[serde(default)]
    pub device: DeviceConfig,
}

fn default_radius() -> f64 {
    0.1
}

fn default_min_locs() -> usize {
    10
}

fn default_dense_max_points() -> usize {
    2_000
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            radius: default_radius(),
            min_locs: default_min_locs(),
            backend: Backend::default(),
            dense_max_points: default_dense_max_points(),
            temporal: TemporalConfig::default(),
            bucketing: BucketConfig::default(),
            device: DeviceConfig::default(),
        }
    }
}

impl ClusteringConfig {
    /// Config with the given radius and size threshold, defaults elsewhere.
    pub fn new(radius: f64, min_locs: usize) -> Self {
        Self {
            radius,
            min_locs,
            ..Self::default()
        }
    }

    /// Returns a copy using the given backend.
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }
}

/// Temporal validation of clusters.
///
/// The frame range `0..=max_frame` is split into `n_windows` equal windows. A
/// cluster is kept when no window holds `max_window_fraction` of its points or
/// more, and its mean frame lies strictly inside
/// `(min_mean_fraction, max_mean_fraction) * max_frame`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalConfig {
    /// Disable to accept every cluster that survives the size filter
    #[serde(default = "default_frame_analysis")]
    pub frame_analysis: bool,

    #[serde(default = "default_n_windows")]
    pub n_windows: usize,

    #[serde(default = "default_max_window_fraction")]
    pub max_window_fraction: f64,

    #[serde(default = "default_min_mean_fraction")]
    pub min_mean_fraction: f64,

    #[serde(default = "default_max_mean_fraction")]
    pub max_mean_fraction: f64,
}

fn default_frame_analysis() -> bool {
    true
}

fn default_n_windows() -> usize {
    20
}

fn default_max_window_fraction() -> f64 {
    0.8
}

fn default_min_mean_fraction() -> f64 {
    0.2
}

fn default_max_mean_fraction() -> f64 {
    0.8
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            frame_analysis: default_frame_analysis(),
            n_windows: default_n_windows(),
            max_window_fraction: default_max_window_fraction(),
            min_mean_fraction: default_min_mean_fraction(),
            max_mean_fraction: default_max_mean_fraction(),
        }
    }
}

/// Box grid used by the bucketed backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Box edge as a multiple of the radius; must be >= 1
    #[serde(default = "default_box_scale")]
    pub box_scale: f64,

    /// Upper bound on the number of boxes in the grid
    #[serde(default = "default_max_boxes")]
    pub max_boxes: usize,
}

fn default_box_scale() -> f64 {
    1.05
}

fn default_max_boxes() -> usize {
    1 << 24
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            box_scale: default_box_scale(),
            max_boxes: default_max_boxes(),
        }
    }
}

/// Resources of the device backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device memory budget in bytes
    #[serde(default = "default_memory_limit")]
    pub memory_limit_bytes: usize,

    /// Worker threads; 0 lets rayon decide
    #[serde(default)]
    pub threads: usize,

    /// Indices handled per work item
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

fn default_memory_limit() -> usize {
    1 << 30
}

fn default_block_size() -> usize {
    32
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            memory_limit_bytes: default_memory_limit(),
            threads: 0,
            block_size: default_block_size(),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub clustering: ClusteringConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_clustering_config() {
        let config = ClusteringConfig::default();
        assert_eq!(config.min_locs, 10);
        assert_eq!(config.backend, Backend::Auto);
        assert_eq!(config.temporal.n_windows, 20);
        assert!((config.bucketing.box_scale - 1.05).abs() < 1e-12);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "clustering:\n  radius: 0.05\n  backend: bucketed\n  temporal:\n    frame_analysis: false\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.clustering.radius, 0.05);
        assert_eq!(config.clustering.backend, Backend::Bucketed);
        assert_eq!(config.clustering.min_locs, 10);
        assert!(!config.clustering.temporal.frame_analysis);
        assert_eq!(config.clustering.temporal.max_window_fraction, 0.8);
    }

    #[test]
    fn test_yaml_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut config = PipelineConfig::default();
        config.clustering.min_locs = 3;
        config.clustering.backend = Backend::Device;
        config.to_yaml(&path).unwrap();

        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded.clustering.min_locs, 3);
        assert_eq!(loaded.clustering.backend, Backend::Device);
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("dense".parse::<Backend>(), Ok(Backend::Dense));
        assert_eq!("GPU".parse::<Backend>(), Ok(Backend::Device));
        assert_eq!("cpu".parse::<Backend>(), Ok(Backend::Bucketed));
        assert!("quantum".parse::<Backend>().is_err());
        assert_eq!(Backend::Bucketed.to_string(), "bucketed");
    }
}
