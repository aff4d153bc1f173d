//! Property-based tests using proptest

use std::collections::HashSet;

use proptest::prelude::*;
use rapid_mapper::*;

fn run(
    values: &[f64],
    cover: CoverConfig,
    clusterer: impl Clusterer,
    n_jobs: usize,
) -> MapperGraph {
    let config = MapperConfig::new().with_cover(cover).with_n_jobs(n_jobs);
    MapperPipeline::new(Projection::default(), clusterer, config)
        .unwrap()
        .fit_transform(&PointCloud::from_column(values))
        .unwrap()
}

/// Random per-region cluster lists with disjoint clusters inside each region.
fn region_clusters() -> impl Strategy<Value = Vec<RegionClusters>> {
    prop::collection::vec(prop::collection::vec(0usize..40, 1..15), 0..12).prop_map(|regions| {
        regions
            .into_iter()
            .enumerate()
            .map(|(label, mut points)| {
                points.sort_unstable();
                points.dedup();
                // Split the region's points into clusters of up to three.
                let clusters = points.chunks(3).map(|c| c.to_vec()).collect();
                RegionClusters {
                    region_label: label,
                    clusters,
                }
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn test_every_point_is_covered(
        values in prop::collection::vec(-100.0f64..100.0, 1..60),
        n_intervals in 1usize..12,
        overlap in 0.0f64..0.9,
    ) {
        let graph = run(&values, CoverConfig::uniform(n_intervals, overlap), SingleCluster, 1);
        for p in 0..values.len() {
            prop_assert!(
                !graph.node_ids_containing(p).is_empty(),
                "point {} (value {}) is in no node", p, values[p]
            );
        }
        prop_assert_eq!(graph.stats().uncovered_points, 0);
    }

    #[test]
    fn test_balanced_cover_covers_every_point(
        values in prop::collection::vec(-10.0f64..10.0, 1..60),
        n_intervals in 1usize..8,
        overlap in 0.0f64..0.5,
    ) {
        let graph = run(&values, CoverConfig::balanced(n_intervals, overlap), SingleCluster, 1);
        prop_assert_eq!(graph.stats().uncovered_points, 0);
    }

    #[test]
    fn test_bounded_uniform_cover_reaches_range_ends(
        values in prop::collection::vec(-1.0e6f64..1.0e6, 1..80),
        n_intervals in 1usize..40,
        overlap in 0.0f64..0.9,
    ) {
        let cover = CoverConfig::uniform(n_intervals, overlap).with_extend_outer(false);
        let graph = run(&values, cover, SingleCluster, 1);
        prop_assert_eq!(graph.stats().uncovered_points, 0);
    }

    #[test]
    fn test_bounded_covers_with_tied_values(
        values in prop::collection::vec((0u8..6).prop_map(|v| f64::from(v) * 0.25), 1..80),
        n_intervals in 1usize..40,
        overlap in 0.0f64..0.9,
    ) {
        for cover in [
            CoverConfig::uniform(n_intervals, overlap),
            CoverConfig::balanced(n_intervals, overlap),
        ] {
            let graph = run(&values, cover.with_extend_outer(false), SingleCluster, 1);
            prop_assert_eq!(graph.stats().uncovered_points, 0);
            for p in 0..values.len() {
                prop_assert!(!graph.node_ids_containing(p).is_empty(), "point {} uncovered", p);
            }
        }
    }

    #[test]
    fn test_bounded_balanced_cover_reaches_range_ends(
        values in prop::collection::vec(-1.0e6f64..1.0e6, 1..80),
        n_intervals in 1usize..40,
        overlap in 0.0f64..0.9,
    ) {
        let cover = CoverConfig::balanced(n_intervals, overlap).with_extend_outer(false);
        let graph = run(&values, cover, SingleCluster, 1);
        prop_assert_eq!(graph.stats().uncovered_points, 0);
    }

    #[test]
    fn test_clusters_disjoint_within_region(
        values in prop::collection::vec(0.0f64..20.0, 1..60),
        eps in 0.1f64..2.0,
    ) {
        let graph = run(&values, CoverConfig::uniform(4, 0.3), Dbscan::new(eps, 2), 1);
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        for node in graph.nodes() {
            prop_assert!(!node.node_elements.is_empty());
            prop_assert!(node.node_elements.windows(2).all(|w| w[0] < w[1]));
            for &p in &node.node_elements {
                prop_assert!(
                    seen.insert((node.pullback_set_label, p)),
                    "point {} in two clusters of region {}", p, node.pullback_set_label
                );
            }
        }
    }

    #[test]
    fn test_graph_is_simple(
        values in prop::collection::vec(-5.0f64..5.0, 1..60),
        n_intervals in 1usize..10,
    ) {
        let graph = run(&values, CoverConfig::uniform(n_intervals, 0.5), Dbscan::new(0.5, 1), 1);
        let mut pairs = HashSet::new();
        for edge in graph.edges() {
            prop_assert!(edge.source < edge.target);
            prop_assert!(edge.target < graph.node_count());
            prop_assert!(pairs.insert((edge.source, edge.target)), "duplicate edge");

            let a: HashSet<usize> = graph.node(edge.source).unwrap().node_elements.iter().copied().collect();
            let shared = graph.node(edge.target).unwrap().node_elements.iter().filter(|p| a.contains(p)).count();
            prop_assert_eq!(shared, edge.intersection_size);
        }
        for (id, node) in graph.nodes().iter().enumerate() {
            prop_assert_eq!(node.node_id, id);
        }
    }

    #[test]
    fn test_n_jobs_invariance(
        values in prop::collection::vec(0.0f64..10.0, 1..80),
        n_jobs in 2usize..6,
    ) {
        let cover = CoverConfig::uniform(6, 0.25);
        let sequential = run(&values, cover.clone(), Dbscan::new(0.4, 2), 1);
        let parallel = run(&values, cover, Dbscan::new(0.4, 2), n_jobs);
        prop_assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_edge_strategies_agree(
        regions in region_clusters(),
        min_intersection in 1usize..4,
        store in any::<bool>(),
    ) {
        let assemble = |strategy| {
            GraphAssembler::new()
                .with_strategy(strategy)
                .with_min_intersection(min_intersection)
                .with_edge_elements(store)
                .assemble(regions.clone())
                .unwrap()
        };
        let pairwise = assemble(EdgeStrategy::Pairwise);
        let inverted = assemble(EdgeStrategy::InvertedIndex);
        prop_assert_eq!(pairwise.edges(), inverted.edges());
        prop_assert_eq!(pairwise.nodes(), inverted.nodes());
        for edge in pairwise.edges() {
            prop_assert!(edge.intersection_size >= min_intersection);
        }
    }

    #[test]
    fn test_region_order_does_not_matter(regions in region_clusters()) {
        let forward = GraphAssembler::new().assemble(regions.clone()).unwrap();
        let mut reversed = regions;
        reversed.reverse();
        let backward = GraphAssembler::new().assemble(reversed).unwrap();
        prop_assert_eq!(forward, backward);
    }
}
