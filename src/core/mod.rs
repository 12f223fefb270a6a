//! Core data types and I/O operations.

pub mod loaders;
pub mod writers;

pub use loaders::{load_locs_csv, LoaderError, Localizations};
pub use writers::{write_cluster_stats_csv, write_labels_csv, WriteError};
