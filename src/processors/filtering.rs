//! Cluster size filtering and id compaction.
//!
//! Provisional ids are seed indices plus one, so they are sparse. After
//! dropping small clusters the surviving ids are replaced by their rank in
//! the sorted set of survivors, with 0 ("no cluster") always at rank 0.

/// Points per provisional id, indexed `0..=max_id`.
pub fn cluster_sizes(cluster_id: &[u32]) -> Vec<usize> {
    let max_id = cluster_id.iter().copied().max().unwrap_or(0) as usize;
    let mut sizes = vec![0usize; max_id + 1];
    for &id in cluster_id {
        sizes[id as usize] += 1;
    }
    sizes
}

/// Resets every id whose cluster has `min_locs` points or fewer to 0.
///
/// Returns the number of clusters dropped.
pub fn filter_small_clusters(cluster_id: &mut [u32], sizes: &[usize], min_locs: usize) -> usize {
    for id in cluster_id.iter_mut() {
        if sizes[*id as usize] <= min_locs {
            *id = 0;
        }
    }
    sizes
        .iter()
        .skip(1)
        .filter(|&&size| size > 0 && size <= min_locs)
        .count()
}

/// Lookup table from provisional id to dense rank.
///
/// Ranks follow ascending provisional id, i.e. seed index order. Id 0 maps
/// to 0; ids that did not survive also map to 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankTable {
    ranks: Vec<u32>,
    n_clusters: usize,
}

impl RankTable {
    /// Builds the table from the ids present after size filtering.
    pub fn from_ids(cluster_id: &[u32]) -> Self {
        let max_id = cluster_id.iter().copied().max().unwrap_or(0) as usize;
        let mut present = vec![false; max_id + 1];
        for &id in cluster_id {
            present[id as usize] = true;
        }
        let mut ranks = vec![0u32; max_id + 1];
        let mut next = 0u32;
        for (id, rank) in ranks.iter_mut().enumerate().skip(1) {
            if present[id] {
                next += 1;
                *rank = next;
            }
        }
        Self {
            ranks,
            n_clusters: next as usize,
        }
    }

    /// Dense rank of a provisional id.
    #[inline]
    pub fn rank(&self, id: u32) -> u32 {
        self.ranks[id as usize]
    }

    /// Raw table, indexed by provisional id.
    pub fn as_slice(&self) -> &[u32] {
        &self.ranks
    }

    /// Number of surviving clusters (rank 0 excluded).
    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }
}

/// Replaces every id by its rank.
pub fn relabel(cluster_id: &mut [u32], table: &RankTable) {
    for id in cluster_id.iter_mut() {
        *id = table.rank(*id);
    }
}

/// Size filter followed by compaction.
///
/// Returns the number of surviving clusters; ids in `cluster_id` are then
/// `0` (none) or `1..=n`.
pub fn filter_and_relabel(cluster_id: &mut [u32], min_locs: usize) -> usize {
    let sizes = cluster_sizes(cluster_id);
    let dropped = filter_small_clusters(cluster_id, &sizes, min_locs);
    let table = RankTable::from_ids(cluster_id);
    relabel(cluster_id, &table);
    log::debug!(
        "size filter: {} clusters kept, {} dropped (min_locs = {})",
        table.n_clusters(),
        dropped,
        min_locs
    );
    table.n_clusters()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_sizes() {
        assert_eq!(cluster_sizes(&[0, 2, 2, 5]), vec![1, 0, 2, 0, 0, 1]);
        assert_eq!(cluster_sizes(&[]), vec![0]);
    }

    #[test]
    fn test_filter_is_strict() {
        // Cluster 3 has exactly 4 points, cluster 9 has 5
        let mut ids = vec![3, 3, 3, 3, 9, 9, 9, 9, 9, 0];
        let sizes = cluster_sizes(&ids);
        let dropped = filter_small_clusters(&mut ids, &sizes, 4);
        assert_eq!(dropped, 1);
        assert_eq!(ids, vec![0, 0, 0, 0, 9, 9, 9, 9, 9, 0]);
    }

    #[test]
    fn test_rank_table_preserves_order() {
        let table = RankTable::from_ids(&[7, 0, 2, 7, 4]);
        assert_eq!(table.n_clusters(), 3);
        assert_eq!(table.rank(0), 0);
        assert_eq!(table.rank(2), 1);
        assert_eq!(table.rank(4), 2);
        assert_eq!(table.rank(7), 3);
    }

    #[test]
    fn test_rank_table_without_noise() {
        // Every point clustered: 0 still reserved for "none"
        let table = RankTable::from_ids(&[5, 5, 8]);
        assert_eq!(table.n_clusters(), 2);
        assert_eq!(table.rank(5), 1);
        assert_eq!(table.rank(8), 2);
    }

    #[test]
    fn test_filter_and_relabel() {
        let mut ids = vec![2, 2, 2, 6, 6, 0, 11, 11, 11];
        let n = filter_and_relabel(&mut ids, 2);
        assert_eq!(n, 2);
        assert_eq!(ids, vec![1, 1, 1, 0, 0, 0, 2, 2, 2]);
    }

    #[test]
    fn test_min_locs_above_everything() {
        let mut ids = vec![1, 1, 1];
        assert_eq!(filter_and_relabel(&mut ids, 3), 0);
        assert_eq!(ids, vec![0, 0, 0]);
    }
}
