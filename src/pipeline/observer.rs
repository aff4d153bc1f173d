//! Stage observers: timing, logging, and debug hooks.
//!
//! The runner calls [`MapperObserver::on_stage_start`] and
//! [`MapperObserver::on_stage_end`] around every stage, plus one artifact hook
//! per intermediate. All methods default to no-ops, so an observer only
//! overrides what it needs.

use std::time::{Duration, Instant};

use crate::cover::Cover;
use crate::graph::MapperGraph;
use crate::partition::Preimages;
use crate::types::FilterValues;

// ─── Stage names ────────────────────────────────────────────────────────────

pub const STAGE_FILTER: &str = "filter";
pub const STAGE_COVER: &str = "cover";
pub const STAGE_PARTITION: &str = "partition";
pub const STAGE_CLUSTER: &str = "cluster";
pub const STAGE_GRAPH: &str = "graph";

/// All stages in execution order.
pub const ALL_STAGES: [&str; 5] = [
    STAGE_FILTER,
    STAGE_COVER,
    STAGE_PARTITION,
    STAGE_CLUSTER,
    STAGE_GRAPH,
];

// ─── StageClock ─────────────────────────────────────────────────────────────

/// Wall-clock stopwatch for one stage.
#[derive(Debug, Clone, Copy)]
pub struct StageClock(Instant);

impl StageClock {
    pub fn start() -> Self {
        Self(Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }
}

// ─── StageReport ────────────────────────────────────────────────────────────

/// Summary of one finished stage.
///
/// Counts are `None` for stages where they do not apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageReport {
    pub elapsed: Duration,
    /// Regions produced (cover) or processed (partition, cluster).
    pub regions: Option<usize>,
    /// Regions skipped because clustering failed.
    pub skipped: Option<usize>,
    pub nodes: Option<usize>,
    pub edges: Option<usize>,
}

impl StageReport {
    pub fn new(elapsed: Duration) -> Self {
        Self {
            elapsed,
            ..Self::default()
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

/// Fluent construction of a [`StageReport`] with counts.
#[derive(Debug, Clone)]
pub struct StageReportBuilder {
    report: StageReport,
}

impl StageReportBuilder {
    pub fn new(elapsed: Duration) -> Self {
        Self {
            report: StageReport::new(elapsed),
        }
    }

    pub fn regions(mut self, n: usize) -> Self {
        self.report.regions = Some(n);
        self
    }

    pub fn skipped(mut self, n: usize) -> Self {
        self.report.skipped = Some(n);
        self
    }

    pub fn nodes(mut self, n: usize) -> Self {
        self.report.nodes = Some(n);
        self
    }

    pub fn edges(mut self, n: usize) -> Self {
        self.report.edges = Some(n);
        self
    }

    pub fn build(self) -> StageReport {
        self.report
    }
}

// ─── Observer trait ─────────────────────────────────────────────────────────

/// Hooks invoked by the pipeline runner.
pub trait MapperObserver {
    fn on_stage_start(&mut self, _stage: &'static str) {}

    fn on_stage_end(&mut self, _stage: &'static str, _report: &StageReport) {}

    fn on_filter_values(&mut self, _values: &FilterValues) {}

    fn on_cover(&mut self, _cover: &Cover) {}

    fn on_preimages(&mut self, _preimages: &Preimages) {}

    fn on_graph(&mut self, _graph: &MapperGraph) {}
}

/// Observer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl MapperObserver for NoopObserver {}

/// Records the duration of every finished stage, in completion order.
#[derive(Debug, Clone, Default)]
pub struct StageTimingObserver {
    timings: Vec<(&'static str, Duration)>,
}

impl StageTimingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timings(&self) -> &[(&'static str, Duration)] {
        &self.timings
    }

    /// Total time of all recorded stages.
    pub fn total(&self) -> Duration {
        self.timings.iter().map(|(_, d)| *d).sum()
    }

    /// Duration of the most recent run of `stage`.
    pub fn get(&self, stage: &str) -> Option<Duration> {
        self.timings
            .iter()
            .rev()
            .find(|(s, _)| *s == stage)
            .map(|(_, d)| *d)
    }

    pub fn clear(&mut self) {
        self.timings.clear();
    }
}

impl MapperObserver for StageTimingObserver {
    fn on_stage_end(&mut self, stage: &'static str, report: &StageReport) {
        self.timings.push((stage, report.elapsed));
    }
}
