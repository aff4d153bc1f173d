//! Pipeline runner: orchestrates the Mapper stages.
//!
//! [`MapperPipeline`] owns a filter, a clusterer, and an immutable
//! [`MapperConfig`]. [`fit`](MapperPipeline::fit) evaluates the filter on a
//! reference set and fixes the cover; [`transform`](MapperPipeline::transform)
//! reuses that cover on any dataset with the same shape and returns the graph.
//! An optional [`MapperObserver`] is notified at every stage boundary.
//!
//! # Static dispatch
//!
//! `MapperPipeline` is generic over its filter and clusterer, so the common
//! case compiles to concrete calls. [`DynMapperPipeline`] boxes both stages
//! for runtime composition (see
//! [`SpecPipelineBuilder`](super::spec_builder::SpecPipelineBuilder)).
//!
//! # Parallelism
//!
//! Only the clustering stage runs in parallel. Regions are dispatched with
//! `par_iter().map().collect()`, which keeps results in region order, so the
//! graph is identical for every `n_jobs`.

use rayon::prelude::*;

use crate::clustering::{cluster_region, ClusterFailurePolicy, Clusterer, Dbscan};
use crate::cover::{Cover, CoverBuilder};
use crate::errors::{ClusterExecutionError, MapperError, Result};
use crate::filter::{apply_filter, FilterFunction, Projection};
use crate::graph::builder::GraphAssembler;
use crate::graph::{GraphStats, MapperGraph, RegionClusters};
use crate::partition::Preimages;
use crate::pipeline::observer::{
    MapperObserver, NoopObserver, StageClock, StageReport, StageReportBuilder, STAGE_CLUSTER,
    STAGE_COVER, STAGE_FILTER, STAGE_GRAPH, STAGE_PARTITION,
};
use crate::types::{FilterValues, MapperConfig, PointCloud};

// ---------------------------------------------------------------------------
// Tracing helpers
// ---------------------------------------------------------------------------

/// Enter a tracing span for a pipeline stage until the end of the scope.
macro_rules! trace_stage {
    ($name:expr) => {
        let _span = tracing::info_span!("mapper_stage", stage = $name).entered();
    };
}

/// Stage summary event: `info` when verbose, `debug` otherwise.
macro_rules! stage_summary {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

// ============================================================================
// MapperPipeline
// ============================================================================

/// Cover fixed by [`MapperPipeline::fit`], plus the shape it was fitted on.
#[derive(Debug, Clone)]
struct FittedCover {
    cover: Cover,
    n_features: usize,
}

/// A Mapper pipeline over a concrete filter and clusterer.
pub struct MapperPipeline<F, C> {
    filter: F,
    clusterer: C,
    config: MapperConfig,
    fitted: Option<FittedCover>,
}

/// Pipeline whose stages are trait objects.
pub type DynMapperPipeline = MapperPipeline<Box<dyn FilterFunction>, Box<dyn Clusterer>>;

/// Projection onto column 0 clustered with default DBSCAN.
pub type StandardMapperPipeline = MapperPipeline<Projection, Dbscan>;

impl StandardMapperPipeline {
    pub fn standard(config: MapperConfig) -> Result<Self> {
        Self::new(Projection::default(), Dbscan::default(), config)
    }
}

impl<F, C> std::fmt::Debug for MapperPipeline<F, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperPipeline")
            .field("config", &self.config)
            .field("fitted", &self.fitted.is_some())
            .finish_non_exhaustive()
    }
}

impl<F: FilterFunction, C: Clusterer> MapperPipeline<F, C> {
    /// Build a pipeline. The configuration is validated here and never
    /// changes afterwards.
    pub fn new(filter: F, clusterer: C, config: MapperConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            filter,
            clusterer,
            config,
            fitted: None,
        })
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn filter(&self) -> &F {
        &self.filter
    }

    pub fn clusterer(&self) -> &C {
        &self.clusterer
    }

    /// The cover from the last [`fit`](Self::fit), if any.
    pub fn cover(&self) -> Option<&Cover> {
        self.fitted.as_ref().map(|f| &f.cover)
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    // ─── Public entry points ────────────────────────────────────────────

    /// Evaluate the filter on `points` and fix the cover.
    pub fn fit(&mut self, points: &PointCloud) -> Result<&Cover> {
        self.fit_with_observer(points, &mut NoopObserver)
    }

    pub fn fit_with_observer(
        &mut self,
        points: &PointCloud,
        observer: &mut impl MapperObserver,
    ) -> Result<&Cover> {
        let values = self.run_filter(points, observer)?;
        let fitted = self.run_cover(points, &values, observer)?;
        Ok(&self.fitted.insert(fitted).cover)
    }

    /// Build the graph of `points` over the fitted cover.
    pub fn transform(&self, points: &PointCloud) -> Result<MapperGraph> {
        self.transform_with_observer(points, &mut NoopObserver)
    }

    pub fn transform_with_observer(
        &self,
        points: &PointCloud,
        observer: &mut impl MapperObserver,
    ) -> Result<MapperGraph> {
        let fitted = self.fitted()?;
        let values = self.run_filter(points, observer)?;
        if values.dim() != fitted.cover.dim() {
            return Err(MapperError::configuration(format!(
                "filter dimensionality changed between fit ({}) and transform ({})",
                fitted.cover.dim(),
                values.dim()
            )));
        }
        if points.n_features() != fitted.n_features {
            return Err(MapperError::configuration(format!(
                "pipeline was fitted on {} features but transform got {}",
                fitted.n_features,
                points.n_features()
            )));
        }
        self.run_graph_stages(fitted, points, &values, observer)
    }

    /// Fit on `points` and build their graph, evaluating the filter once.
    pub fn fit_transform(&mut self, points: &PointCloud) -> Result<MapperGraph> {
        self.fit_transform_with_observer(points, &mut NoopObserver)
    }

    pub fn fit_transform_with_observer(
        &mut self,
        points: &PointCloud,
        observer: &mut impl MapperObserver,
    ) -> Result<MapperGraph> {
        let values = self.run_filter(points, observer)?;
        let fitted = self.run_cover(points, &values, observer)?;
        let graph = self.run_graph_stages(&fitted, points, &values, observer);
        // The cover stays fitted even if a later stage failed.
        self.fitted = Some(fitted);
        graph
    }

    // ─── Stages ─────────────────────────────────────────────────────────

    fn fitted(&self) -> Result<&FittedCover> {
        self.fitted.as_ref().ok_or_else(|| {
            MapperError::configuration("pipeline is not fitted; call fit before transform")
        })
    }

    fn run_filter(
        &self,
        points: &PointCloud,
        observer: &mut impl MapperObserver,
    ) -> Result<FilterValues> {
        trace_stage!(STAGE_FILTER);
        observer.on_stage_start(STAGE_FILTER);
        let clock = StageClock::start();
        let values = apply_filter(&self.filter, points)?;
        let report = StageReport::new(clock.elapsed());
        observer.on_stage_end(STAGE_FILTER, &report);
        observer.on_filter_values(&values);
        stage_summary!(
            self.config.verbose,
            n_points = values.n_points(),
            dim = values.dim(),
            elapsed_ms = report.elapsed_ms(),
            "filter evaluated"
        );
        Ok(values)
    }

    fn run_cover(
        &self,
        points: &PointCloud,
        values: &FilterValues,
        observer: &mut impl MapperObserver,
    ) -> Result<FittedCover> {
        trace_stage!(STAGE_COVER);
        observer.on_stage_start(STAGE_COVER);
        let clock = StageClock::start();
        let cover = CoverBuilder::new(self.config.cover.clone()).fit(values)?;
        let report = StageReportBuilder::new(clock.elapsed())
            .regions(cover.len())
            .build();
        observer.on_stage_end(STAGE_COVER, &report);
        observer.on_cover(&cover);
        stage_summary!(
            self.config.verbose,
            policy = self.config.cover.policy.as_str(),
            regions = cover.len(),
            elapsed_ms = report.elapsed_ms(),
            "cover fitted"
        );
        Ok(FittedCover {
            cover,
            n_features: points.n_features(),
        })
    }

    /// Partition, cluster, and assemble over an already fitted cover.
    fn run_graph_stages(
        &self,
        fitted: &FittedCover,
        points: &PointCloud,
        values: &FilterValues,
        observer: &mut impl MapperObserver,
    ) -> Result<MapperGraph> {
        let preimages = self.run_partition(&fitted.cover, values, observer)?;
        let (regions, skipped) = self.run_cluster(points, &preimages, observer)?;
        let mut graph = self.run_graph(regions, observer)?;

        graph.set_stats(GraphStats {
            n_points: points.n_points(),
            n_regions: preimages.len(),
            n_empty_regions: preimages.n_empty(),
            skipped_regions: skipped,
            uncovered_points: preimages.uncovered_points().len(),
        });
        observer.on_graph(&graph);
        Ok(graph)
    }

    fn run_partition(
        &self,
        cover: &Cover,
        values: &FilterValues,
        observer: &mut impl MapperObserver,
    ) -> Result<Preimages> {
        trace_stage!(STAGE_PARTITION);
        observer.on_stage_start(STAGE_PARTITION);
        let clock = StageClock::start();
        let preimages = Preimages::compute(cover, values)?;
        let report = StageReportBuilder::new(clock.elapsed())
            .regions(preimages.len())
            .build();
        observer.on_stage_end(STAGE_PARTITION, &report);
        observer.on_preimages(&preimages);

        let uncovered = preimages.uncovered_points();
        if !uncovered.is_empty() {
            tracing::warn!(
                count = uncovered.len(),
                first = uncovered[0],
                "points fall outside every region and will not appear in the graph"
            );
        }
        stage_summary!(
            self.config.verbose,
            regions = preimages.len(),
            empty = preimages.n_empty(),
            elapsed_ms = report.elapsed_ms(),
            "preimages computed"
        );
        Ok(preimages)
    }

    /// Cluster every non-empty region. Returns the clusters in region order
    /// and the labels of regions skipped under [`ClusterFailurePolicy::Skip`].
    fn run_cluster(
        &self,
        points: &PointCloud,
        preimages: &Preimages,
        observer: &mut impl MapperObserver,
    ) -> Result<(Vec<RegionClusters>, Vec<usize>)> {
        trace_stage!(STAGE_CLUSTER);
        observer.on_stage_start(STAGE_CLUSTER);
        let clock = StageClock::start();

        let work: Vec<(usize, &[usize])> = preimages.non_empty().collect();
        let noise = self.config.noise_policy;
        let budget = self.config.max_region_runtime;
        let clusterer = &self.clusterer;

        let cluster_one = |&(label, ids): &(usize, &[usize])| {
            let outcome = cluster_region(clusterer, label, &points.subset(ids), noise, budget);
            if let Ok(clusters) = &outcome {
                tracing::debug!(
                    region = label,
                    n_points = ids.len(),
                    n_clusters = clusters.len(),
                    "region clustered"
                );
            }
            (label, outcome)
        };

        let outcomes: Vec<(usize, std::result::Result<Vec<Vec<usize>>, ClusterExecutionError>)> =
            match self.config.effective_threads() {
                Some(1) => work.iter().map(cluster_one).collect(),
                Some(n) => build_thread_pool(n)?
                    .install(|| work.par_iter().map(cluster_one).collect()),
                None => work.par_iter().map(cluster_one).collect(),
            };

        let mut regions = Vec::with_capacity(outcomes.len());
        let mut skipped = Vec::new();
        for (label, outcome) in outcomes {
            match outcome {
                Ok(clusters) => regions.push(RegionClusters {
                    region_label: label,
                    clusters,
                }),
                Err(err) => match self.config.failure_policy {
                    ClusterFailurePolicy::Fatal => return Err(err.into()),
                    ClusterFailurePolicy::Skip => {
                        tracing::warn!(
                            region = err.region_label,
                            n_points = err.n_points,
                            kind = err.kind.as_str(),
                            "skipping region: {}",
                            err.message
                        );
                        skipped.push(label);
                    }
                },
            }
        }

        let report = StageReportBuilder::new(clock.elapsed())
            .regions(work.len())
            .skipped(skipped.len())
            .build();
        observer.on_stage_end(STAGE_CLUSTER, &report);
        stage_summary!(
            self.config.verbose,
            regions = work.len(),
            skipped = skipped.len(),
            n_jobs = self.config.n_jobs,
            elapsed_ms = report.elapsed_ms(),
            "regions clustered"
        );
        Ok((regions, skipped))
    }

    fn run_graph(
        &self,
        regions: Vec<RegionClusters>,
        observer: &mut impl MapperObserver,
    ) -> Result<MapperGraph> {
        trace_stage!(STAGE_GRAPH);
        observer.on_stage_start(STAGE_GRAPH);
        let clock = StageClock::start();
        let graph = GraphAssembler::new()
            .with_min_intersection(self.config.min_intersection)
            .with_strategy(self.config.edge_strategy)
            .with_edge_elements(self.config.store_edge_elements)
            .assemble(regions)?;
        let report = StageReportBuilder::new(clock.elapsed())
            .nodes(graph.node_count())
            .edges(graph.edge_count())
            .build();
        observer.on_stage_end(STAGE_GRAPH, &report);
        stage_summary!(
            self.config.verbose,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            elapsed_ms = report.elapsed_ms(),
            "graph assembled"
        );
        Ok(graph)
    }
}

/// A dedicated pool for one clustering stage.
fn build_thread_pool(n_threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build()
        .map_err(|e| MapperError::configuration(format!("failed to build thread pool: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::{FnClusterer, NoisePolicy, Partition, SingleCluster};
    use crate::cover::CoverConfig;
    use crate::filter::FilterFn;
    use crate::pipeline::error_code::ErrorCode;
    use crate::pipeline::observer::{StageTimingObserver, ALL_STAGES};
    use std::time::Duration;

    fn line(n: usize) -> PointCloud {
        let values: Vec<f64> = (0..n).map(|i| i as f64).collect();
        PointCloud::from_column(&values)
    }

    fn two_interval_config() -> MapperConfig {
        MapperConfig::new().with_cover(CoverConfig::uniform(2, 0.5))
    }

    #[test]
    fn test_two_overlapping_intervals() {
        let mut pipeline =
            MapperPipeline::new(Projection::default(), SingleCluster, two_interval_config())
                .unwrap();
        let graph = pipeline.fit_transform(&line(6)).unwrap();

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_list(), vec![(0, 1)]);
        assert_eq!(graph.node(0).unwrap().node_elements, vec![0, 1, 2, 3]);
        assert_eq!(graph.node(1).unwrap().node_elements, vec![2, 3, 4, 5]);
        assert_eq!(graph.stats().n_points, 6);
        assert_eq!(graph.stats().n_regions, 2);
    }

    #[test]
    fn test_transform_requires_fit() {
        let pipeline =
            MapperPipeline::new(Projection::default(), SingleCluster, MapperConfig::new())
                .unwrap();
        let err = pipeline.transform(&line(3)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Configuration);
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let cfg = MapperConfig::new().with_cover(CoverConfig::uniform(0, 0.1));
        let err = MapperPipeline::new(Projection::default(), SingleCluster, cfg).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidCoverConfig);
    }

    #[test]
    fn test_transform_reuses_fitted_cover() {
        let mut pipeline =
            MapperPipeline::new(Projection::default(), SingleCluster, two_interval_config())
                .unwrap();
        pipeline.fit(&line(6)).unwrap();
        let before = pipeline.cover().unwrap().clone();

        // Values far outside the fitted range land in the outer regions.
        let shifted = PointCloud::from_column(&[-100.0, 100.0]);
        let graph = pipeline.transform(&shifted).unwrap();
        assert_eq!(pipeline.cover(), Some(&before));
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_filter_dimension_mismatch() {
        // One output per input feature.
        struct Identity;
        impl FilterFunction for Identity {
            fn output_dim(&self, n_features: usize) -> usize {
                n_features
            }
            fn evaluate(&self, row: &[f64]) -> std::result::Result<Vec<f64>, String> {
                Ok(row.to_vec())
            }
        }

        let mut pipeline =
            MapperPipeline::new(Identity, SingleCluster, two_interval_config()).unwrap();
        pipeline.fit(&line(4)).unwrap();
        let wide = PointCloud::from_rows(vec![vec![0.0, 1.0], vec![1.0, 2.0]]).unwrap();
        let err = pipeline.transform(&wide).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Configuration);
        assert!(err.to_string().contains("dimensionality"));
    }

    #[test]
    fn test_feature_count_mismatch() {
        let mut pipeline =
            MapperPipeline::new(Projection::default(), SingleCluster, two_interval_config())
                .unwrap();
        pipeline
            .fit(&PointCloud::from_rows(vec![vec![0.0, 1.0], vec![2.0, 3.0]]).unwrap())
            .unwrap();
        let err = pipeline.transform(&line(3)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Configuration);
        assert!(err.to_string().contains("features"));
    }

    #[test]
    fn test_filter_error_is_fatal() {
        let filter = FilterFn::new(1, |row: &[f64]| {
            if row[0] > 2.5 {
                Err("too large".to_string())
            } else {
                Ok(vec![row[0]])
            }
        });
        let mut pipeline = MapperPipeline::new(filter, SingleCluster, MapperConfig::new()).unwrap();
        let err = pipeline.fit_transform(&line(5)).unwrap_err();
        assert_eq!(err, MapperError::filter_evaluation(3, "too large"));
        assert!(!pipeline.is_fitted());
    }

    fn failing_on_high_values() -> impl Clusterer {
        FnClusterer::new(|points| {
            if points.rows().any(|r| r[0] >= 4.5) {
                Err("refusing high values".to_string())
            } else {
                Ok(Partition::single(points.len()))
            }
        })
    }

    #[test]
    fn test_cluster_failure_fatal_by_default() {
        let mut pipeline = MapperPipeline::new(
            Projection::default(),
            failing_on_high_values(),
            two_interval_config(),
        )
        .unwrap();
        let err = pipeline.fit_transform(&line(6)).unwrap_err();
        match err {
            MapperError::ClusterExecution(e) => {
                assert_eq!(e.region_label, 1);
                assert_eq!(e.n_points, 4);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_cluster_failure_skip_policy() {
        let cfg = two_interval_config().with_failure_policy(ClusterFailurePolicy::Skip);
        let mut pipeline =
            MapperPipeline::new(Projection::default(), failing_on_high_values(), cfg).unwrap();
        let graph = pipeline.fit_transform(&line(6)).unwrap();
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.node(0).unwrap().pullback_set_label, 0);
        assert_eq!(graph.stats().skipped_regions, vec![1]);
    }

    #[test]
    fn test_region_budget_timeout() {
        let slow = FnClusterer::new(|points| {
            std::thread::sleep(Duration::from_millis(20));
            Ok(Partition::single(points.len()))
        });
        let cfg = two_interval_config()
            .with_max_region_runtime(Duration::from_millis(1))
            .with_failure_policy(ClusterFailurePolicy::Skip);
        let mut pipeline = MapperPipeline::new(Projection::default(), slow, cfg).unwrap();
        let graph = pipeline.fit_transform(&line(6)).unwrap();
        assert!(graph.is_empty());
        assert_eq!(graph.stats().skipped_regions, vec![0, 1]);
    }

    #[test]
    fn test_noise_singletons() {
        // Every point is noise.
        let all_noise = FnClusterer::new(|points| Ok(Partition::from_labels(vec![None; points.len()])));
        let cfg = MapperConfig::new()
            .with_cover(CoverConfig::uniform(1, 0.0))
            .with_noise_policy(NoisePolicy::Singletons);
        let mut pipeline = MapperPipeline::new(Projection::default(), all_noise, cfg).unwrap();
        let graph = pipeline.fit_transform(&line(3)).unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let points = PointCloud::from_column(&[0.0, 0.1, 0.2, 1.0, 1.1, 3.0, 3.05, 3.1, 5.0, 5.2]);
        let cover = CoverConfig::uniform(4, 0.4);
        let run = |n_jobs| {
            let cfg = MapperConfig::new().with_cover(cover.clone()).with_n_jobs(n_jobs);
            MapperPipeline::new(Projection::default(), Dbscan::new(0.3, 1), cfg)
                .unwrap()
                .fit_transform(&points)
                .unwrap()
        };
        let sequential = run(1);
        assert_eq!(run(4), sequential);
        assert_eq!(run(0), sequential);
    }

    #[test]
    fn test_observer_sees_every_stage() {
        let mut pipeline =
            MapperPipeline::new(Projection::default(), SingleCluster, two_interval_config())
                .unwrap();
        let mut obs = StageTimingObserver::new();
        pipeline
            .fit_transform_with_observer(&line(6), &mut obs)
            .unwrap();
        let stages: Vec<&str> = obs.timings().iter().map(|(s, _)| *s).collect();
        assert_eq!(stages, ALL_STAGES.to_vec());
    }

    #[test]
    fn test_dyn_pipeline() {
        let mut pipeline: DynMapperPipeline = MapperPipeline::new(
            Box::new(Projection::default()) as Box<dyn FilterFunction>,
            Box::new(SingleCluster) as Box<dyn Clusterer>,
            two_interval_config(),
        )
        .unwrap();
        assert_eq!(pipeline.fit_transform(&line(6)).unwrap().node_count(), 2);
    }

    #[test]
    fn test_standard_pipeline_defaults() {
        let pipeline = StandardMapperPipeline::standard(MapperConfig::new()).unwrap();
        assert_eq!(pipeline.filter().columns(), &[0]);
        assert_eq!(*pipeline.clusterer(), Dbscan::default());
        assert!(!pipeline.is_fitted());
    }
}
