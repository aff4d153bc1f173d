//! Spec-driven pipeline builder: maps a [`MapperSpec`] to a runnable
//! [`DynMapperPipeline`] using trait-object dispatch.
//!
//! # Usage
//!
//! ```
//! use rapid_mapper::pipeline::spec::MapperSpec;
//! use rapid_mapper::pipeline::spec_builder::SpecPipelineBuilder;
//! use rapid_mapper::PointCloud;
//!
//! let spec = MapperSpec::from_json(r#"{
//!     "v": 1,
//!     "cover": { "type": "uniform", "n_intervals": 2, "overlap_frac": 0.5 },
//!     "clusterer": { "type": "single_cluster" }
//! }"#).unwrap();
//! let mut pipeline = SpecPipelineBuilder::new().build(&spec).unwrap();
//! let points = PointCloud::from_column(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
//! let graph = pipeline.fit_transform(&points).unwrap();
//! assert_eq!(graph.node_count(), 2);
//! ```

use crate::clustering::{Clusterer, Dbscan, FirstSimpleGap, SingleCluster};
use crate::errors::{MapperError, Result};
use crate::filter::{Entropy, FilterFunction, Norm, Projection};
use crate::pipeline::runner::{DynMapperPipeline, MapperPipeline};
use crate::pipeline::spec::{ClustererSpec, FilterSpec, MapperSpec};
use crate::pipeline::validation::ValidationEngine;

/// Builds a [`DynMapperPipeline`] from a [`MapperSpec`].
///
/// The spec is validated first; the first error is returned and warnings are
/// logged. Custom filters and clusterers can stand in for the spec's
/// selections via [`with_filter`](Self::with_filter) and
/// [`with_clusterer`](Self::with_clusterer).
pub struct SpecPipelineBuilder {
    engine: ValidationEngine,
    filter: Option<Box<dyn FilterFunction>>,
    clusterer: Option<Box<dyn Clusterer>>,
}

impl SpecPipelineBuilder {
    pub fn new() -> Self {
        Self {
            engine: ValidationEngine::with_defaults(),
            filter: None,
            clusterer: None,
        }
    }

    /// Validate with a custom engine instead of the default rules.
    pub fn with_engine(mut self, engine: ValidationEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Use `filter` regardless of the spec's `filter` section.
    pub fn with_filter(mut self, filter: Box<dyn FilterFunction>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Use `clusterer` regardless of the spec's `clusterer` section.
    pub fn with_clusterer(mut self, clusterer: Box<dyn Clusterer>) -> Self {
        self.clusterer = Some(clusterer);
        self
    }

    /// Parse `json` and build.
    pub fn build_from_json(self, json: &str) -> Result<DynMapperPipeline> {
        let spec = MapperSpec::from_json(json)?;
        self.build(&spec)
    }

    pub fn build(self, spec: &MapperSpec) -> Result<DynMapperPipeline> {
        let report = self.engine.validate(spec);
        for warning in report.warnings() {
            tracing::warn!(path = %warning.path, "{}", warning.message);
        }
        if let Some(err) = report.errors().next() {
            return Err(MapperError::from(err.clone()));
        }

        let filter = self
            .filter
            .unwrap_or_else(|| make_filter(spec.filter_spec()));
        let clusterer = self
            .clusterer
            .unwrap_or_else(|| make_clusterer(spec.clusterer_spec()));

        tracing::debug!(
            filter = spec.filter_spec().map_or("projection", FilterSpec::as_str),
            clusterer = spec.clusterer_spec().map_or("dbscan", ClustererSpec::as_str),
            "building pipeline from spec"
        );
        MapperPipeline::new(filter, clusterer, spec.to_config())
    }
}

impl Default for SpecPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn make_filter(spec: Option<&FilterSpec>) -> Box<dyn FilterFunction> {
    match spec {
        None => Box::new(Projection::default()),
        Some(FilterSpec::Projection { columns }) => Box::new(Projection::new(columns.clone())),
        Some(FilterSpec::Entropy) => Box::new(Entropy),
        Some(FilterSpec::Norm { p }) => Box::new(Norm::new(*p)),
    }
}

fn make_clusterer(spec: Option<&ClustererSpec>) -> Box<dyn Clusterer> {
    match spec {
        None => Box::new(Dbscan::default()),
        Some(ClustererSpec::SingleCluster) => Box::new(SingleCluster),
        Some(ClustererSpec::Dbscan {
            eps,
            min_samples,
            metric,
        }) => Box::new(Dbscan::new(*eps, *min_samples).with_metric(*metric)),
        Some(ClustererSpec::FirstSimpleGap {
            relative_gap,
            max_fraction,
            metric,
        }) => Box::new(FirstSimpleGap::new(*relative_gap, *max_fraction).with_metric(*metric)),
    }
}
