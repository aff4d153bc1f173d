//! # rapid_mapper
//!
//! A Mapper implementation for topological data analysis.
//!
//! Mapper summarizes a point cloud as a graph: a filter function maps every
//! point to a low-dimensional value, an overlapping cover splits the filter
//! range into regions, each region's preimage is clustered, and clusters that
//! share points are joined by an edge.
//!
//! ## Features
//!
//! - **Deterministic**: node ids and edges do not depend on `n_jobs`
//! - **Parallel**: per-region clustering runs on a Rayon pool
//! - **Pluggable**: any [`FilterFunction`] and any [`Clusterer`]
//! - **Declarative**: pipelines can be described as JSON ([`MapperSpec`])
//!
//! ```
//! use rapid_mapper::{CoverConfig, MapperConfig, MapperPipeline, PointCloud, Projection, SingleCluster};
//!
//! let points = PointCloud::from_column(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
//! let config = MapperConfig::new().with_cover(CoverConfig::uniform(2, 0.5));
//! let mut mapper = MapperPipeline::new(Projection::default(), SingleCluster, config).unwrap();
//! let graph = mapper.fit_transform(&points).unwrap();
//! assert_eq!(graph.node_count(), 2);
//! assert_eq!(graph.edge_list(), vec![(0, 1)]);
//! ```

pub mod clustering;
pub mod cover;
pub mod errors;
pub mod filter;
pub mod graph;
pub mod partition;
pub mod pipeline;
pub mod types;

// Re-export commonly used types
pub use errors::{ClusterExecutionError, ClusterFailureKind, MapperError, Result};
pub use types::{FilterValues, MapperConfig, PointCloud, PointSubset};

// Re-export main functionality
pub use clustering::{
    ClusterFailurePolicy, Clusterer, Dbscan, FirstSimpleGap, FnClusterer, Metric, NoisePolicy,
    Partition, SingleCluster,
};
pub use cover::{Cover, CoverBuilder, CoverConfig, CoverPolicy, Interval, Region};
pub use filter::{apply_filter, Entropy, FilterFn, FilterFunction, Norm, Projection};
pub use graph::{
    builder::GraphAssembler, Edge, EdgeStrategy, GraphStats, MapperGraph, NodeMetadata,
    RegionClusters,
};
pub use partition::Preimages;
pub use pipeline::error_code::ErrorCode;
pub use pipeline::{
    DynMapperPipeline, MapperObserver, MapperPipeline, MapperSpec, NoopObserver,
    SpecPipelineBuilder, StageTimingObserver, StandardMapperPipeline,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
