//! Clustering of region preimages
//!
//! A [`Clusterer`] partitions the points of one region into disjoint groups,
//! optionally marking some points as noise. Built-in procedures:
//!
//! - [`SingleCluster`]: the whole preimage is one cluster
//! - [`Dbscan`]: density-based clustering with noise
//! - [`FirstSimpleGap`]: single-linkage clustering cut at the first large
//!   gap between merge heights
//!
//! Labels returned by a clusterer are compacted to cluster indices `0..k` in
//! ascending label order; no other re-sorting is applied.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::errors::{ClusterExecutionError, ClusterFailureKind};
use crate::types::PointSubset;

// ============================================================================
// Partition
// ============================================================================

/// One label per subset point; `None` marks noise.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Partition {
    labels: Vec<Option<usize>>,
}

impl Partition {
    pub fn from_labels(labels: Vec<Option<usize>>) -> Self {
        Self { labels }
    }

    /// Every point in cluster 0.
    pub fn single(n_points: usize) -> Self {
        Self {
            labels: vec![Some(0); n_points],
        }
    }

    /// Build from groups of local indices; points in no group are noise.
    ///
    /// Fails if a group references an index `>= n_points` or two groups
    /// share a point.
    pub fn from_groups(n_points: usize, groups: &[Vec<usize>]) -> Result<Self, String> {
        let mut labels = vec![None; n_points];
        for (g, members) in groups.iter().enumerate() {
            for &k in members {
                match labels.get_mut(k) {
                    None => return Err(format!("group {} references point {} of {}", g, k, n_points)),
                    Some(Some(prev)) => {
                        return Err(format!("point {} is in groups {} and {}", k, prev, g))
                    }
                    Some(slot) => *slot = Some(g),
                }
            }
        }
        Ok(Self { labels })
    }

    pub fn labels(&self) -> &[Option<usize>] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_noise(&self) -> usize {
        self.labels.iter().filter(|l| l.is_none()).count()
    }

    /// Number of distinct non-noise labels.
    pub fn n_clusters(&self) -> usize {
        let mut seen: Vec<usize> = self.labels.iter().flatten().copied().collect();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }

    /// Group local indices by label.
    ///
    /// Clusters come out in ascending label order; with
    /// [`NoisePolicy::Singletons`] each noise point follows as its own cluster.
    pub fn clusters(&self, noise: NoisePolicy) -> Vec<Vec<usize>> {
        let mut by_label: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let mut noise_points = Vec::new();
        for (k, label) in self.labels.iter().enumerate() {
            match label {
                Some(l) => by_label.entry(*l).or_default().push(k),
                None => noise_points.push(k),
            }
        }
        let mut clusters: Vec<Vec<usize>> = by_label.into_values().collect();
        if noise == NoisePolicy::Singletons {
            clusters.extend(noise_points.into_iter().map(|k| vec![k]));
        }
        clusters
    }
}

// ============================================================================
// Policies
// ============================================================================

/// What happens to points a clusterer marks as noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoisePolicy {
    /// Noise points are dropped and never become nodes.
    #[default]
    Drop,
    /// Each noise point becomes a single-point cluster.
    Singletons,
}

/// What happens when clustering a region fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterFailurePolicy {
    /// Abort the whole run.
    #[default]
    Fatal,
    /// Log, exclude the region from the graph, and continue.
    Skip,
}

// ============================================================================
// Metric
// ============================================================================

/// Distance used by the built-in clusterers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Euclidean,
    Manhattan,
    Chebyshev,
}

impl Metric {
    #[inline]
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        let diffs = a.iter().zip(b).map(|(x, y)| (x - y).abs());
        match self {
            Metric::Euclidean => diffs.map(|d| d * d).sum::<f64>().sqrt(),
            Metric::Manhattan => diffs.sum(),
            Metric::Chebyshev => diffs.fold(0.0, f64::max),
        }
    }
}

// ============================================================================
// Clusterer trait
// ============================================================================

/// Partitions the points of one region.
///
/// # Contract
///
/// - **Input**: a read-only [`PointSubset`]; the shared cloud must not be
///   mutated (it cannot be, through this API).
/// - **Output**: a [`Partition`] with exactly one label per subset point.
/// - **Errors**: an error message; the pipeline wraps it in a
///   [`ClusterExecutionError`] naming the region.
pub trait Clusterer: Send + Sync {
    fn cluster(&self, points: &PointSubset<'_>) -> Result<Partition, String>;
}

impl<T: Clusterer + ?Sized> Clusterer for Box<T> {
    fn cluster(&self, points: &PointSubset<'_>) -> Result<Partition, String> {
        (**self).cluster(points)
    }
}

/// Puts every point of the region in one cluster.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleCluster;

impl Clusterer for SingleCluster {
    fn cluster(&self, points: &PointSubset<'_>) -> Result<Partition, String> {
        Ok(Partition::single(points.len()))
    }
}

/// Adapts a closure into a [`Clusterer`].
pub struct FnClusterer<F> {
    f: F,
}

impl<F> FnClusterer<F>
where
    F: Fn(&PointSubset<'_>) -> Result<Partition, String> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> std::fmt::Debug for FnClusterer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnClusterer")
    }
}

impl<F> Clusterer for FnClusterer<F>
where
    F: Fn(&PointSubset<'_>) -> Result<Partition, String> + Send + Sync,
{
    fn cluster(&self, points: &PointSubset<'_>) -> Result<Partition, String> {
        (self.f)(points)
    }
}

// ============================================================================
// DBSCAN
// ============================================================================

/// Density-based clustering.
///
/// A point with at least `min_samples` neighbours within `eps` (itself
/// included) is a core point; clusters are the connected components of core
/// points plus the border points they reach. Everything else is noise.
/// Cluster labels follow discovery order, i.e. the lowest-index core point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dbscan {
    pub eps: f64,
    pub min_samples: usize,
    pub metric: Metric,
}

impl Default for Dbscan {
    fn default() -> Self {
        Self::new(0.5, 5)
    }
}

impl Dbscan {
    pub fn new(eps: f64, min_samples: usize) -> Self {
        Self {
            eps,
            min_samples,
            metric: Metric::Euclidean,
        }
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    fn neighbours(&self, points: &PointSubset<'_>, k: usize) -> Vec<usize> {
        let p = points.row(k);
        (0..points.len())
            .filter(|&j| self.metric.distance(p, points.row(j)) <= self.eps)
            .collect()
    }
}

impl Clusterer for Dbscan {
    fn cluster(&self, points: &PointSubset<'_>) -> Result<Partition, String> {
        if self.eps.is_nan() || self.eps <= 0.0 {
            return Err(format!("eps must be > 0, got {}", self.eps));
        }
        if self.min_samples == 0 {
            return Err("min_samples must be >= 1".to_string());
        }

        let n = points.len();
        let mut labels: Vec<Option<usize>> = vec![None; n];
        let mut visited = vec![false; n];
        let mut next_label = 0;

        for seed in 0..n {
            if visited[seed] {
                continue;
            }
            visited[seed] = true;
            let neighbours = self.neighbours(points, seed);
            if neighbours.len() < self.min_samples {
                continue;
            }

            let label = next_label;
            next_label += 1;
            labels[seed] = Some(label);

            let mut queue: VecDeque<usize> = neighbours.into();
            while let Some(j) = queue.pop_front() {
                if labels[j].is_none() {
                    labels[j] = Some(label);
                }
                if visited[j] {
                    continue;
                }
                visited[j] = true;
                let reach = self.neighbours(points, j);
                if reach.len() >= self.min_samples {
                    queue.extend(reach);
                }
            }
        }

        Ok(Partition::from_labels(labels))
    }
}

// ============================================================================
// FirstSimpleGap
// ============================================================================

/// Single-linkage clustering cut at the first gap in merge heights.
///
/// Merge heights `h_1 <= ... <= h_{n-1}` of the single-linkage dendrogram are
/// scanned in order; the dendrogram is cut before the first merge whose
/// height exceeds the previous one by more than `relative_gap * h_{n-1}`.
/// The cut never leaves more than `ceil(max_fraction * n)` clusters. With no
/// such gap the whole region is one cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FirstSimpleGap {
    pub relative_gap: f64,
    pub max_fraction: f64,
    pub metric: Metric,
}

impl Default for FirstSimpleGap {
    fn default() -> Self {
        Self::new(0.3, 1.0)
    }
}

impl FirstSimpleGap {
    pub fn new(relative_gap: f64, max_fraction: f64) -> Self {
        Self {
            relative_gap,
            max_fraction,
            metric: Metric::Euclidean,
        }
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }
}

impl Clusterer for FirstSimpleGap {
    fn cluster(&self, points: &PointSubset<'_>) -> Result<Partition, String> {
        if !(0.0..=1.0).contains(&self.relative_gap) {
            return Err(format!(
                "relative_gap must be in [0, 1], got {}",
                self.relative_gap
            ));
        }
        if !(self.max_fraction > 0.0 && self.max_fraction <= 1.0) {
            return Err(format!(
                "max_fraction must be in (0, 1], got {}",
                self.max_fraction
            ));
        }

        let n = points.len();
        if n <= 1 {
            return Ok(Partition::single(n));
        }

        let merges = single_linkage_merges(points, self.metric);
        let max_height = merges.last().map(|m| m.2).unwrap_or(0.0);
        let max_clusters = ((self.max_fraction * n as f64).ceil() as usize).max(1);
        let min_merges = n.saturating_sub(max_clusters);
        let threshold = self.relative_gap * max_height;

        let mut n_merges = merges.len();
        for k in 0..merges.len().saturating_sub(1) {
            if k + 1 < min_merges {
                continue;
            }
            if merges[k + 1].2 - merges[k].2 > threshold {
                n_merges = k + 1;
                break;
            }
        }

        let mut forest = UnionFind::new(n);
        for &(a, b, _) in &merges[..n_merges] {
            forest.union(a, b);
        }
        Ok(Partition::from_labels(forest.labels()))
    }
}

/// Minimum spanning tree edges (Prim, O(n²)) sorted by height.
///
/// These are exactly the merges of the single-linkage dendrogram.
pub fn single_linkage_merges(
    points: &PointSubset<'_>,
    metric: Metric,
) -> Vec<(usize, usize, f64)> {
    let n = points.len();
    if n < 2 {
        return Vec::new();
    }

    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut parent = vec![0usize; n];
    let mut merges = Vec::with_capacity(n - 1);

    in_tree[0] = true;
    for j in 1..n {
        best[j] = metric.distance(points.row(0), points.row(j));
    }

    for _ in 1..n {
        let mut next = None;
        let mut next_dist = f64::INFINITY;
        for j in 0..n {
            if !in_tree[j] && (next.is_none() || best[j] < next_dist) {
                next = Some(j);
                next_dist = best[j];
            }
        }
        let Some(v) = next else { break };
        in_tree[v] = true;
        merges.push((parent[v], v, next_dist));

        for j in 0..n {
            if !in_tree[j] {
                let d = metric.distance(points.row(v), points.row(j));
                if d < best[j] {
                    best[j] = d;
                    parent[j] = v;
                }
            }
        }
    }

    merges.sort_by(|a, b| a.2.total_cmp(&b.2));
    merges
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }

    /// Labels numbered by first appearance in point order.
    fn labels(&mut self) -> Vec<Option<usize>> {
        let n = self.parent.len();
        let mut root_label = vec![usize::MAX; n];
        let mut next = 0;
        (0..n)
            .map(|k| {
                let r = self.find(k);
                if root_label[r] == usize::MAX {
                    root_label[r] = next;
                    next += 1;
                }
                Some(root_label[r])
            })
            .collect()
    }
}

// ============================================================================
// Single-region execution
// ============================================================================

/// Run `clusterer` on one region and map the result to global point ids.
///
/// Returns the clusters in cluster-index order. The partition is checked
/// against the subset, and a run longer than `budget` is reported as a
/// timeout; its result is discarded.
pub fn cluster_region<C: Clusterer + ?Sized>(
    clusterer: &C,
    region_label: usize,
    points: &PointSubset<'_>,
    noise: NoisePolicy,
    budget: Option<Duration>,
) -> Result<Vec<Vec<usize>>, ClusterExecutionError> {
    let n_points = points.len();
    let fail = |kind, message: String| {
        ClusterExecutionError::new(region_label, n_points, kind, message)
    };

    let started = Instant::now();
    let partition = clusterer
        .cluster(points)
        .map_err(|msg| fail(ClusterFailureKind::Failed, msg))?;
    let elapsed = started.elapsed();

    if let Some(budget) = budget {
        if elapsed > budget {
            return Err(fail(
                ClusterFailureKind::Timeout,
                format!("took {:?}, budget {:?}", elapsed, budget),
            ));
        }
    }

    if partition.len() != n_points {
        return Err(fail(
            ClusterFailureKind::MalformedPartition,
            format!("{} labels for {} points", partition.len(), n_points),
        ));
    }

    let ids = points.indices();
    Ok(partition
        .clusters(noise)
        .into_iter()
        .map(|local| local.into_iter().map(|k| ids[k]).collect())
        .collect())
}
