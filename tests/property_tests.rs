use std::collections::BTreeSet;

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use paint_cluster::processors::neighbors::{count_neighbors, BucketedNeighborhood, DenseNeighborhood};
use paint_cluster::processors::spatial_index::BoxIndex;
use paint_cluster::{Backend, ClusterOutcome, Clusterer, ClusteringConfig, Localizations};
use proptest::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Points on a coarse lattice so that ties, duplicates and exact-radius
/// distances show up often.
fn lattice_locs() -> impl Strategy<Value = Localizations> {
    prop::collection::vec((0u32..40, 0u32..40, 0u32..200), 0..120).prop_map(|pts| {
        let mut locs = Localizations::with_capacity(pts.len());
        for (ix, iy, frame) in pts {
            locs.push(ix as f64 * 0.05, iy as f64 * 0.05, frame);
        }
        locs
    })
}

fn run(locs: &Localizations, radius: f64, min_locs: usize, backend: Backend) -> ClusterOutcome {
    let config = ClusteringConfig::new(radius, min_locs).with_backend(backend);
    Clusterer::new(config).run(locs).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_backends_agree(
        locs in lattice_locs(),
        radius in prop::sample::select(vec![0.05, 0.1, 0.17, 0.3]),
        min_locs in 0usize..6
    ) {
        let dense = run(&locs, radius, min_locs, Backend::Dense);
        let bucketed = run(&locs, radius, min_locs, Backend::Bucketed);
        let device = run(&locs, radius, min_locs, Backend::Device);

        prop_assert_eq!(&dense.labels, &bucketed.labels);
        prop_assert_eq!(&dense.labels, &device.labels);
        prop_assert_eq!(dense.n_clusters, device.n_clusters);
        prop_assert_eq!(dense.n_local_maxima, bucketed.n_local_maxima);
    }

    #[test]
    fn prop_labels_are_compact(
        locs in lattice_locs(),
        radius in prop::sample::select(vec![0.05, 0.1, 0.17, 0.3]),
        min_locs in 0usize..6
    ) {
        let outcome = run(&locs, radius, min_locs, Backend::Bucketed);
        prop_assert_eq!(outcome.labels.len(), locs.len());

        let k = outcome.n_clusters as i32;
        let distinct: BTreeSet<i32> = outcome.labels.iter().copied().filter(|&l| l >= 0).collect();
        prop_assert_eq!(distinct.len(), outcome.n_clusters);
        for &l in &outcome.labels {
            prop_assert!(l == -1 || (0..k).contains(&l));
        }
        for label in distinct {
            let size = outcome.labels.iter().filter(|&&l| l == label).count();
            prop_assert!(size > min_locs);
        }
    }

    #[test]
    fn prop_min_locs_at_least_n_is_all_noise(locs in lattice_locs(), extra in 0usize..3) {
        let outcome = run(&locs, 0.17, locs.len() + extra, Backend::Dense);
        prop_assert!(outcome.labels.iter().all(|&l| l == -1));
    }

    #[test]
    fn prop_bucketed_neighbors_match_dense(locs in lattice_locs(), radius in 0.01f64..0.5) {
        let dense = DenseNeighborhood::new(&locs.x, &locs.y, radius);
        let index = BoxIndex::build(&locs.x, &locs.y, radius * 1.05, 1 << 24).unwrap();
        let bucketed = BucketedNeighborhood::new(&locs.x, &locs.y, radius, index);
        prop_assert_eq!(count_neighbors(&dense), count_neighbors(&bucketed));
    }
}

/// Neighbor counts against an independent KD-tree range query.
#[test]
fn test_neighbor_counts_match_kdtree() {
    let mut rng = StdRng::seed_from_u64(2024);
    let n = 3_000;
    let radius = 0.08;
    let mut locs = Localizations::with_capacity(n);
    for _ in 0..n {
        locs.push(
            rng.random_range(0.0..4.0),
            rng.random_range(0.0..4.0),
            rng.random_range(0..10_000),
        );
    }

    let coords: Vec<[f64; 2]> = (0..n).map(|i| [locs.x[i], locs.y[i]]).collect();
    let tree: ImmutableKdTree<f64, 2> = ImmutableKdTree::new_from_slice(&coords);

    let index = BoxIndex::build(&locs.x, &locs.y, radius * 1.05, 1 << 24).unwrap();
    let nn = count_neighbors(&BucketedNeighborhood::new(&locs.x, &locs.y, radius, index));

    for i in 0..n {
        let found = tree.within::<SquaredEuclidean>(&coords[i], radius * radius);
        let expected = found.iter().filter(|hit| hit.item != i as u64).count();
        assert_eq!(nn[i] as usize, expected, "point {}", i);
    }
}
