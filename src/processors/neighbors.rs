//! Neighbor relation, neighbor counting and local-maximum detection.
//!
//! The CPU backends differ only in how they enumerate candidate neighbors.
//! Both implement [`Neighborhood`] on top of the same exact distance test, so
//! every stage built on it produces identical integer output.

use super::spatial_index::BoxIndex;

/// Exact neighbor test shared by every backend.
///
/// Squared Euclidean distance in f64 against the squared radius.
#[inline]
pub fn within_radius(x: &[f64], y: &[f64], i: usize, j: usize, r2: f64) -> bool {
    let dx = x[i] - x[j];
    let dy = y[i] - y[j];
    dx * dx + dy * dy <= r2
}

/// A symmetric neighbor relation over `0..len()`.
pub trait Neighborhood {
    /// Number of points.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Neighbors of `i` (never `i` itself) in ascending index order.
    fn neighbors(&self, i: usize) -> impl Iterator<Item = usize> + '_;
}

/// All-pairs adjacency matrix, for small point sets.
pub struct DenseNeighborhood {
    n: usize,
    adjacency: Vec<bool>,
}

impl DenseNeighborhood {
    /// Evaluates the neighbor test for every pair.
    pub fn new(x: &[f64], y: &[f64], radius: f64) -> Self {
        let n = x.len();
        let r2 = radius * radius;
        let mut adjacency = vec![false; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                if within_radius(x, y, i, j, r2) {
                    adjacency[i * n + j] = true;
                    adjacency[j * n + i] = true;
                }
            }
        }
        Self { n, adjacency }
    }

    #[inline]
    pub fn is_neighbor(&self, i: usize, j: usize) -> bool {
        self.adjacency[i * self.n + j]
    }
}

impl Neighborhood for DenseNeighborhood {
    fn len(&self) -> usize {
        self.n
    }

    fn neighbors(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        let row = &self.adjacency[i * self.n..(i + 1) * self.n];
        row.iter()
            .enumerate()
            .filter_map(|(j, &adjacent)| adjacent.then_some(j))
    }
}

/// Neighbors found through a [`BoxIndex`], re-checked by exact distance.
pub struct BucketedNeighborhood<'a> {
    x: &'a [f64],
    y: &'a [f64],
    r2: f64,
    index: BoxIndex,
}

impl<'a> BucketedNeighborhood<'a> {
    pub fn new(x: &'a [f64], y: &'a [f64], radius: f64, index: BoxIndex) -> Self {
        Self {
            x,
            y,
            r2: radius * radius,
            index,
        }
    }

    pub fn index(&self) -> &BoxIndex {
        &self.index
    }
}

impl Neighborhood for BucketedNeighborhood<'_> {
    fn len(&self) -> usize {
        self.x.len()
    }

    fn neighbors(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        self.index
            .candidates(i)
            .iter()
            .map(|&j| j as usize)
            .filter(move |&j| j != i && within_radius(self.x, self.y, i, j, self.r2))
    }
}

/// Number of neighbors of every point.
pub fn count_neighbors<N: Neighborhood>(nb: &N) -> Vec<u32> {
    (0..nb.len()).map(|i| nb.neighbors(i).count() as u32).collect()
}

/// Local-maximum flag of a single point.
///
/// A point is a maximum when it has at least one neighbor and none of its
/// neighbors has a strictly larger count. The scan stops at the first
/// neighbor that disqualifies it.
#[inline]
pub fn is_local_maximum<I>(i: usize, nn: &[u32], neighbors: I) -> bool
where
    I: Iterator<Item = usize>,
{
    let mut has_neighbor = false;
    for j in neighbors {
        if nn[i] < nn[j] {
            return false;
        }
        has_neighbor = true;
    }
    has_neighbor
}

/// Local-maximum flags for all points.
pub fn local_maxima<N: Neighborhood>(nb: &N, nn: &[u32]) -> Vec<bool> {
    (0..nb.len())
        .map(|i| is_local_maximum(i, nn, nb.neighbors(i)))
        .collect()
}
