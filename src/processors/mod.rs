//! Clustering pipeline stages and backends.

pub mod clustering;
pub mod device;
pub mod filtering;
pub mod neighbors;
pub mod propagation;
pub mod spatial_index;
pub mod temporal;

// Re-export key types for convenience
pub use clustering::{
    cluster_bucketed, cluster_dense, cluster_device, ClusterError, ClusterOutcome, Clusterer,
    NOISE,
};
pub use device::{Device, DeviceBuffer, DeviceError, Stream};
pub use neighbors::{BucketedNeighborhood, DenseNeighborhood, Neighborhood};
pub use spatial_index::BoxIndex;
pub use temporal::{ClusterStats, TemporalWindows};
