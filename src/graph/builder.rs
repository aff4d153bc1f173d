//! Graph assembly from per-region clusters
//!
//! Node ids follow `(region label, cluster index)` order. Edges are found
//! either by comparing every node pair or through an inverted index
//! point → owning nodes; both produce the same sorted edge list.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::errors::{MapperError, Result};
use crate::graph::{Edge, EdgeStrategy, MapperGraph, NodeMetadata, RegionClusters};

/// Builds a [`MapperGraph`] from clustered regions.
#[derive(Debug, Clone)]
pub struct GraphAssembler {
    min_intersection: usize,
    strategy: EdgeStrategy,
    store_edge_elements: bool,
}

impl Default for GraphAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphAssembler {
    pub fn new() -> Self {
        Self {
            min_intersection: 1,
            strategy: EdgeStrategy::Auto,
            store_edge_elements: false,
        }
    }

    /// Require at least `min` shared points per edge (clamped to 1)
    pub fn with_min_intersection(mut self, min: usize) -> Self {
        self.min_intersection = min.max(1);
        self
    }

    pub fn with_strategy(mut self, strategy: EdgeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Keep shared point ids on every edge
    pub fn with_edge_elements(mut self, store: bool) -> Self {
        self.store_edge_elements = store;
        self
    }

    /// Assemble the graph.
    ///
    /// Input may arrive in any region order; it is reassembled by region
    /// label before ids are assigned. Duplicate region labels, empty
    /// clusters, and points repeated within a region are internal errors.
    pub fn assemble(&self, mut regions: Vec<RegionClusters>) -> Result<MapperGraph> {
        regions.sort_by_key(|r| r.region_label);
        let nodes = build_nodes(regions)?;

        let edges = match self.strategy.resolve(nodes.len()) {
            EdgeStrategy::InvertedIndex => {
                inverted_index_edges(&nodes, self.min_intersection, self.store_edge_elements)
            }
            _ => pairwise_edges(&nodes, self.min_intersection, self.store_edge_elements),
        };

        Ok(MapperGraph::from_parts(nodes, edges))
    }
}

fn build_nodes(regions: Vec<RegionClusters>) -> Result<Vec<NodeMetadata>> {
    let mut nodes = Vec::new();
    let mut previous_label = None;

    for region in regions {
        if previous_label == Some(region.region_label) {
            return Err(MapperError::internal(format!(
                "region {} delivered twice to the graph assembler",
                region.region_label
            )));
        }
        previous_label = Some(region.region_label);

        let mut seen: FxHashSet<usize> = FxHashSet::default();
        for (cluster_idx, mut elements) in region.clusters.into_iter().enumerate() {
            if elements.is_empty() {
                return Err(MapperError::internal(format!(
                    "region {} cluster {} is empty",
                    region.region_label, cluster_idx
                )));
            }
            elements.sort_unstable();
            for &p in &elements {
                if !seen.insert(p) {
                    return Err(MapperError::internal(format!(
                        "point {} appears twice in region {}",
                        p, region.region_label
                    )));
                }
            }
            nodes.push(NodeMetadata {
                node_id: nodes.len(),
                pullback_set_label: region.region_label,
                partial_cluster_label: cluster_idx,
                node_elements: elements,
            });
        }
    }
    Ok(nodes)
}

/// Sorted-merge intersection of two ascending slices.
fn intersect_sorted(a: &[usize], b: &[usize]) -> Vec<usize> {
    let (mut i, mut j) = (0, 0);
    let mut out = Vec::new();
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Compare every node pair. O(nodes²) intersections.
pub fn pairwise_edges(nodes: &[NodeMetadata], min_intersection: usize, store: bool) -> Vec<Edge> {
    let mut edges = Vec::new();
    for i in 0..nodes.len() {
        for j in (i + 1)..nodes.len() {
            let shared = intersect_sorted(&nodes[i].node_elements, &nodes[j].node_elements);
            if !shared.is_empty() && shared.len() >= min_intersection {
                edges.push(Edge {
                    source: i,
                    target: j,
                    intersection_size: shared.len(),
                    elements: store.then_some(shared),
                });
            }
        }
    }
    edges
}

/// Derive edges from an inverted index point → owning nodes.
///
/// Each point contributes one shared element to every pair of nodes that own
/// it; pairs are collapsed so each unordered pair yields at most one edge.
pub fn inverted_index_edges(
    nodes: &[NodeMetadata],
    min_intersection: usize,
    store: bool,
) -> Vec<Edge> {
    let mut owners: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
    for node in nodes {
        for &p in &node.node_elements {
            owners.entry(p).or_default().push(node.node_id);
        }
    }

    let mut points: Vec<usize> = owners.keys().copied().collect();
    points.sort_unstable();

    let mut shared: FxHashMap<(usize, usize), Vec<usize>> = FxHashMap::default();
    for p in points {
        let ids = &owners[&p];
        for a in 0..ids.len() {
            for b in (a + 1)..ids.len() {
                // ids are ascending because nodes are visited in id order.
                shared.entry((ids[a], ids[b])).or_default().push(p);
            }
        }
    }

    let mut edges: Vec<Edge> = shared
        .into_iter()
        .filter(|(_, elements)| elements.len() >= min_intersection)
        .map(|((source, target), elements)| Edge {
            source,
            target,
            intersection_size: elements.len(),
            elements: store.then_some(elements),
        })
        .collect();
    edges.sort_by_key(|e| (e.source, e.target));
    edges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(label: usize, clusters: Vec<Vec<usize>>) -> RegionClusters {
        RegionClusters {
            region_label: label,
            clusters,
        }
    }

    #[test]
    fn test_two_overlapping_regions_one_edge() {
        let g = GraphAssembler::new()
            .assemble(vec![
                region(0, vec![vec![0, 1, 2, 3]]),
                region(1, vec![vec![2, 3, 4, 5]]),
            ])
            .unwrap();
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_list(), vec![(0, 1)]);
        assert_eq!(g.edges()[0].intersection_size, 2);
    }

    #[test]
    fn test_node_ids_follow_region_then_cluster_order() {
        let g = GraphAssembler::new()
            .assemble(vec![
                region(2, vec![vec![9]]),
                region(0, vec![vec![3, 1], vec![0]]),
            ])
            .unwrap();
        let keys: Vec<(usize, usize, usize)> = g
            .nodes()
            .iter()
            .map(|n| (n.node_id, n.pullback_set_label, n.partial_cluster_label))
            .collect();
        assert_eq!(keys, vec![(0, 0, 0), (1, 0, 1), (2, 2, 0)]);
        // Elements are sorted.
        assert_eq!(g.node(0).unwrap().node_elements, vec![1, 3]);
    }

    #[test]
    fn test_no_multi_edges_for_large_intersection() {
        let g = GraphAssembler::new()
            .assemble(vec![
                region(0, vec![vec![0, 1, 2, 3, 4]]),
                region(1, vec![vec![0, 1, 2, 3, 4]]),
            ])
            .unwrap();
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.edges()[0].intersection_size, 5);
    }

    #[test]
    fn test_min_intersection() {
        let input = vec![
            region(0, vec![vec![0, 1, 2]]),
            region(1, vec![vec![2, 3]]),
            region(2, vec![vec![0, 1, 5]]),
        ];
        let g = GraphAssembler::new()
            .with_min_intersection(2)
            .assemble(input)
            .unwrap();
        assert_eq!(g.edge_list(), vec![(0, 2)]);
    }

    #[test]
    fn test_edge_elements_stored() {
        let g = GraphAssembler::new()
            .with_edge_elements(true)
            .assemble(vec![region(0, vec![vec![0, 1, 2]]), region(1, vec![vec![1, 2, 3]])])
            .unwrap();
        assert_eq!(g.edges()[0].elements, Some(vec![1, 2]));
    }

    #[test]
    fn test_strategies_agree() {
        let input = vec![
            region(0, vec![vec![0, 1, 2], vec![7, 8]]),
            region(1, vec![vec![2, 3, 4], vec![8, 9]]),
            region(2, vec![vec![4, 5, 0], vec![9, 7]]),
            region(3, vec![vec![10]]),
        ];
        for store in [false, true] {
            let pairwise = GraphAssembler::new()
                .with_strategy(EdgeStrategy::Pairwise)
                .with_edge_elements(store)
                .assemble(input.clone())
                .unwrap();
            let inverted = GraphAssembler::new()
                .with_strategy(EdgeStrategy::InvertedIndex)
                .with_edge_elements(store)
                .assemble(input.clone())
                .unwrap();
            assert_eq!(pairwise, inverted);
        }
    }

    #[test]
    fn test_empty_input_empty_graph() {
        let g = GraphAssembler::new().assemble(Vec::new()).unwrap();
        assert!(g.is_empty());
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn test_malformed_input_is_internal_error() {
        use crate::pipeline::error_code::ErrorCode;

        let dup_region = vec![region(0, vec![vec![0]]), region(0, vec![vec![1]])];
        let empty_cluster = vec![region(0, vec![vec![]])];
        let overlapping = vec![region(0, vec![vec![0, 1], vec![1, 2]])];
        for input in [dup_region, empty_cluster, overlapping] {
            let err = GraphAssembler::new().assemble(input).unwrap_err();
            assert_eq!(err.code(), ErrorCode::Internal);
        }
    }

    #[test]
    fn test_intersect_sorted() {
        assert_eq!(intersect_sorted(&[1, 3, 5, 7], &[2, 3, 7, 9]), vec![3, 7]);
        assert!(intersect_sorted(&[], &[1]).is_empty());
    }
}
