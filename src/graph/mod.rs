//! The Mapper graph and its assembly.
//!
//! Nodes are non-empty clusters, one per `(pullback set, partial cluster)`
//! pair; an undirected edge joins two nodes whose point sets intersect.

pub mod builder;

use serde::{Deserialize, Serialize};

use crate::errors::{MapperError, Result};

/// Clusters produced for one region, in cluster-index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionClusters {
    pub region_label: usize,
    pub clusters: Vec<Vec<usize>>,
}

/// Per-node metadata consumed by visualization layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub node_id: usize,
    pub pullback_set_label: usize,
    pub partial_cluster_label: usize,
    /// Original point ids in ascending order.
    pub node_elements: Vec<usize>,
}

impl NodeMetadata {
    pub fn size(&self) -> usize {
        self.node_elements.len()
    }
}

/// An undirected edge with `source < target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
    /// Number of points shared by the two nodes.
    pub intersection_size: usize,
    /// Shared point ids, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elements: Option<Vec<usize>>,
}

/// How edges are computed. All strategies yield the same edge list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStrategy {
    /// Compare every pair of nodes.
    Pairwise,
    /// Index point → nodes and count shared points per node pair.
    InvertedIndex,
    /// Pairwise for small graphs, inverted index above
    /// [`EdgeStrategy::AUTO_THRESHOLD`] nodes.
    #[default]
    Auto,
}

impl EdgeStrategy {
    pub const AUTO_THRESHOLD: usize = 256;

    /// Concrete strategy for a graph with `n_nodes` nodes.
    pub fn resolve(self, n_nodes: usize) -> Self {
        match self {
            EdgeStrategy::Auto if n_nodes > Self::AUTO_THRESHOLD => EdgeStrategy::InvertedIndex,
            EdgeStrategy::Auto => EdgeStrategy::Pairwise,
            other => other,
        }
    }
}

/// Run statistics attached to the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub n_points: usize,
    pub n_regions: usize,
    pub n_empty_regions: usize,
    /// Regions excluded because clustering failed under the skip policy.
    pub skipped_regions: Vec<usize>,
    /// Points in no region's preimage.
    pub uncovered_points: usize,
}

/// A simple undirected graph with node metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapperGraph {
    nodes: Vec<NodeMetadata>,
    edges: Vec<Edge>,
    #[serde(default)]
    stats: GraphStats,
}

impl MapperGraph {
    pub(crate) fn from_parts(nodes: Vec<NodeMetadata>, edges: Vec<Edge>) -> Self {
        Self {
            nodes,
            edges,
            stats: GraphStats::default(),
        }
    }

    pub(crate) fn set_stats(&mut self, stats: GraphStats) {
        self.stats = stats;
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Edges sorted by `(source, target)`.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// `(source, target)` pairs.
    pub fn edge_list(&self) -> Vec<(usize, usize)> {
        self.edges.iter().map(|e| (e.source, e.target)).collect()
    }

    /// Metadata of node `id`.
    pub fn node(&self, id: usize) -> Option<&NodeMetadata> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> &[NodeMetadata] {
        &self.nodes
    }

    /// Metadata table indexed by node id, as serialized JSON rows.
    pub fn metadata(&self) -> Result<Vec<serde_json::Value>> {
        self.nodes
            .iter()
            .map(|n| serde_json::to_value(n).map_err(MapperError::from))
            .collect()
    }

    pub fn stats(&self) -> &GraphStats {
        &self.stats
    }

    /// Nodes adjacent to `id`, ascending.
    pub fn neighbors(&self, id: usize) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .edges
            .iter()
            .filter_map(|e| {
                if e.source == id {
                    Some(e.target)
                } else if e.target == id {
                    Some(e.source)
                } else {
                    None
                }
            })
            .collect();
        out.sort_unstable();
        out
    }

    /// Nodes whose elements include point `point`, ascending.
    pub fn node_ids_containing(&self, point: usize) -> Vec<usize> {
        self.nodes
            .iter()
            .filter(|n| n.node_elements.binary_search(&point).is_ok())
            .map(|n| n.node_id)
            .collect()
    }

    /// Serialize to JSON for downstream consumers.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
