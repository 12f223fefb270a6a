//! Seeding and one-hop propagation of provisional cluster ids.

use super::neighbors::Neighborhood;

/// Provisional id seeded by local maximum `i`.
#[inline]
pub fn seed_id(i: usize) -> u32 {
    i as u32 + 1
}

/// New id of point `j` after a local maximum holding `id_i` propagates.
///
/// Unassigned neighbors take the maximum's id; assigned points keep theirs.
/// The one exception is point 0: a maximum that had no id before this pass
/// (`seeding`) claims point 0 even if another cluster already holds it.
#[inline]
pub fn propagate_to(j: usize, id_j: u32, id_i: u32, seeding: bool, is_neighbor: bool) -> u32 {
    if is_neighbor && (id_j == 0 || (seeding && j == 0)) {
        id_i
    } else {
        id_j
    }
}

/// Assigns provisional cluster ids from the local maxima.
///
/// Maxima are visited in ascending index. A maximum without an id seeds
/// `i + 1`, then hands its id to every unassigned neighbor, so the first
/// maximum to reach a point wins. 0 means "none". Point 0 is the exception
/// described in [`propagate_to`].
pub fn assign_to_clusters<N: Neighborhood>(nb: &N, lm: &[bool]) -> Vec<u32> {
    let mut cluster_id = vec![0u32; nb.len()];
    for (i, _) in lm.iter().enumerate().filter(|&(_, &is_max)| is_max) {
        let seeding = cluster_id[i] == 0;
        if seeding {
            cluster_id[i] = seed_id(i);
        }
        let id_i = cluster_id[i];
        for j in nb.neighbors(i) {
            cluster_id[j] = propagate_to(j, cluster_id[j], id_i, seeding, true);
        }
    }
    cluster_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::neighbors::{count_neighbors, local_maxima, DenseNeighborhood};

    fn run(x: &[f64], y: &[f64], radius: f64) -> Vec<u32> {
        let nb = DenseNeighborhood::new(x, y, radius);
        let nn = count_neighbors(&nb);
        let lm = local_maxima(&nb, &nn);
        assign_to_clusters(&nb, &lm)
    }

    #[test]
    fn test_two_separate_groups() {
        let x = [0.0, 0.1, 0.2, 10.0, 10.1, 10.2];
        let y = [0.0; 6];
        let ids = run(&x, &y, 0.15);
        // Middle points are the maxima and seed index + 1
        assert_eq!(ids, vec![2, 2, 2, 5, 5, 5]);
    }

    #[test]
    fn test_first_maximum_wins() {
        // 0 - 1 - 2 - 3 on a line: maxima 1 and 2 tie, 1 is visited first.
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [0.0; 4];
        let ids = run(&x, &y, 1.0);
        // 1 claims 0 and 2. Maximum 2 already holds id 2 and only reaches 3.
        assert_eq!(ids, vec![2, 2, 2, 2]);
    }

    #[test]
    fn test_point_zero_receives_seed() {
        // Point 0 is an unassigned neighbor of the maximum at index 1 and
        // takes its seed id.
        let x = [0.0, 0.5, 1.0];
        let y = [0.0; 3];
        let ids = run(&x, &y, 0.6);
        assert_eq!(ids, vec![2, 2, 2]);
    }

    /// Point 0 bridges two maxima; each has 4 members of its own.
    fn bridge() -> (Vec<f64>, Vec<f64>) {
        let mut x = vec![0.0];
        let mut y = vec![0.0];
        for side in [1.0, -1.0] {
            x.push(0.95 * side);
            y.push(0.0);
            for (mx, my) in [(1.5, 0.3), (1.5, -0.3), (1.7, 0.0), (1.4, 0.0)] {
                x.push(mx * side);
                y.push(my);
            }
        }
        (x, y)
    }

    #[test]
    fn test_seeding_maximum_claims_point_zero() {
        let (x, y) = bridge();
        let nb = DenseNeighborhood::new(&x, &y, 1.0);
        let nn = count_neighbors(&nb);
        let lm = local_maxima(&nb, &nn);
        assert_eq!(nn[0], 2);
        assert_eq!(nn[1], 5);
        assert!(lm[1] && lm[6]);
        assert!(!lm[0]);

        // 1 seeds 2 and reaches point 0 first, then 6 seeds 7 and takes it over
        let ids = assign_to_clusters(&nb, &lm);
        assert_eq!(ids, vec![7, 2, 2, 2, 2, 2, 7, 7, 7, 7, 7]);
    }

    #[test]
    fn test_assigned_maximum_does_not_claim_point_zero() {
        // Line -1 (max 1), 0 (point 0), 1 (max 3), 2 (max 2), radius 1.
        // Maximum 1 claims point 0. Maximum 2 seeds 3 and reaches 3, so
        // maximum 3 is not seeding and leaves point 0 with cluster 2.
        let x = [0.0, -1.0, 2.0, 1.0];
        let y = [0.0; 4];
        let lm = [false, true, true, true];
        let nb = DenseNeighborhood::new(&x, &y, 1.0);
        let ids = assign_to_clusters(&nb, &lm);
        assert_eq!(ids, vec![2, 2, 3, 3]);
    }

    #[test]
    fn test_maximum_with_existing_id_keeps_it() {
        let lm = [true, false, true, false];
        // 0-1, 1-2, 2-3 adjacency; 2 is not a neighbor of 0
        let x = [0.0, 1.0, 1.9, 2.8];
        let y = [0.0; 4];
        let nb = DenseNeighborhood::new(&x, &y, 1.0);
        let ids = assign_to_clusters(&nb, &lm);
        assert_eq!(ids, vec![1, 1, 3, 3]);
    }

    #[test]
    fn test_propagate_to() {
        assert_eq!(propagate_to(3, 0, 4, true, true), 4);
        assert_eq!(propagate_to(3, 2, 4, true, true), 2);
        assert_eq!(propagate_to(3, 0, 4, true, false), 0);
        // point 0 is only taken over by a seeding maximum
        assert_eq!(propagate_to(0, 2, 4, true, true), 4);
        assert_eq!(propagate_to(0, 2, 4, false, true), 2);
        assert_eq!(propagate_to(0, 2, 4, true, false), 2);
    }
}
