//! Density-maximum clustering of 2D single-molecule localizations.
//!
//! This crate provides tools for:
//! - Loading localization tables (`x`, `y`, `frame`) from CSV
//! - Clustering them around local density maxima with dense, bucketed and
//!   device backends that produce identical labels
//! - Rejecting clusters whose localizations are bursts in time rather than
//!   repeated binding events
//! - Writing labels and per-cluster summaries back to CSV
//!
//! # Example
//!
//! ```no_run
//! use paint_cluster::{core::loaders::load_locs_csv, ClusteringConfig, Clusterer};
//!
//! let locs = load_locs_csv("locs.csv").unwrap();
//! let outcome = Clusterer::new(ClusteringConfig::new(0.05, 10)).run(&locs).unwrap();
//! println!("{} clusters", outcome.n_clusters);
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{Backend, ClusteringConfig, PipelineConfig};
pub use core::loaders::Localizations;
pub use processors::clustering::{ClusterError, ClusterOutcome, Clusterer};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
