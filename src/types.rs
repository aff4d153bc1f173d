//! Core data types for rapid_mapper
//!
//! Point clouds and filter values are stored as row-major `ndarray` matrices
//! so that every row can be handed to filters and clusterers as a plain
//! `&[f64]` without copying.

use std::time::Duration;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::clustering::{ClusterFailurePolicy, NoisePolicy};
use crate::cover::CoverConfig;
use crate::errors::{MapperError, Result};
use crate::graph::EdgeStrategy;

// ============================================================================
// Point Cloud
// ============================================================================

/// An immutable set of `n_points` rows, each with `n_features` values.
///
/// Row indices `0..n_points` are the canonical point ids used by every
/// downstream stage.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    data: Array2<f64>,
}

impl PointCloud {
    /// Wrap a matrix of shape `(n_points, n_features)`.
    ///
    /// Non-standard layouts (transposed views, column-major input) are copied
    /// into row-major order.
    pub fn new(data: Array2<f64>) -> Result<Self> {
        if data.ncols() == 0 {
            return Err(MapperError::configuration(
                "point cloud must have at least one feature column",
            ));
        }
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        Ok(Self { data })
    }

    /// Build from a list of rows; every row must have the same length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n_features = rows.first().map(|r| r.len()).unwrap_or(1);
        let n_points = rows.len();
        let mut values = Vec::with_capacity(n_points * n_features);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != n_features {
                return Err(MapperError::configuration(format!(
                    "row {} has {} features, expected {}",
                    i,
                    row.len(),
                    n_features
                )));
            }
            values.extend(row);
        }
        Self::from_shape_vec(n_points, n_features, values)
    }

    /// Build from a flat row-major buffer.
    pub fn from_shape_vec(n_points: usize, n_features: usize, values: Vec<f64>) -> Result<Self> {
        let data = Array2::from_shape_vec((n_points, n_features), values)
            .map_err(|e| MapperError::configuration(format!("invalid point cloud shape: {e}")))?;
        Self::new(data)
    }

    /// Build a one-feature cloud from scalar values.
    pub fn from_column(values: &[f64]) -> Self {
        Self {
            data: Array2::from_shape_fn((values.len(), 1), |(i, _)| values[i]),
        }
    }

    pub fn n_points(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    /// Row `i` as a contiguous slice.
    ///
    /// # Panics
    ///
    /// Panics if `i >= n_points()`.
    pub fn row(&self, i: usize) -> &[f64] {
        let d = self.n_features();
        &self.flat()[i * d..(i + 1) * d]
    }

    /// Iterate over rows in point-id order.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.flat().chunks_exact(self.n_features())
    }

    /// Borrow the underlying matrix.
    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// Restrict the cloud to the given point ids without copying.
    pub fn subset<'a>(&'a self, indices: &'a [usize]) -> PointSubset<'a> {
        PointSubset {
            cloud: self,
            indices,
        }
    }

    fn flat(&self) -> &[f64] {
        self.data
            .as_slice()
            .expect("point cloud is kept in standard layout")
    }
}

// ============================================================================
// Point Subset
// ============================================================================

/// Read-only view of the points in one region's preimage.
///
/// Local position `k` refers to `indices()[k]` in the full cloud.
#[derive(Debug, Clone, Copy)]
pub struct PointSubset<'a> {
    cloud: &'a PointCloud,
    indices: &'a [usize],
}

impl<'a> PointSubset<'a> {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.cloud.n_features()
    }

    /// Original point ids, in preimage order.
    pub fn indices(&self) -> &'a [usize] {
        self.indices
    }

    /// Feature row of the `k`-th point of the subset.
    pub fn row(&self, k: usize) -> &'a [f64] {
        self.cloud.row(self.indices[k])
    }

    pub fn rows(&self) -> impl Iterator<Item = &'a [f64]> + 'a {
        let cloud = self.cloud;
        self.indices.iter().map(move |&i| cloud.row(i))
    }

    /// Copy the subset into an owned matrix (for clusterers that want one).
    pub fn to_array(&self) -> Array2<f64> {
        let d = self.n_features();
        Array2::from_shape_fn((self.len(), d), |(k, j)| self.row(k)[j])
    }
}

// ============================================================================
// Filter Values
// ============================================================================

/// Filter output: one `dim()`-length vector per point.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterValues {
    data: Array2<f64>,
}

impl FilterValues {
    pub(crate) fn from_shape_vec(n_points: usize, dim: usize, values: Vec<f64>) -> Result<Self> {
        let data = Array2::from_shape_vec((n_points, dim), values)
            .map_err(|e| MapperError::internal(format!("filter output shape: {e}")))?;
        Ok(Self { data })
    }

    /// Wrap precomputed filter values (one row per point).
    pub fn from_array(data: Array2<f64>) -> Self {
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        Self { data }
    }

    pub fn n_points(&self) -> usize {
        self.data.nrows()
    }

    /// Filter dimensionality.
    pub fn dim(&self) -> usize {
        self.data.ncols()
    }

    /// Filter value of point `i`.
    pub fn value(&self, i: usize) -> &[f64] {
        let d = self.dim();
        let flat = self
            .data
            .as_slice()
            .expect("filter values are kept in standard layout");
        &flat[i * d..(i + 1) * d]
    }

    /// All values of filter dimension `j`, in point order.
    pub fn column(&self, j: usize) -> Vec<f64> {
        self.data.column(j).to_vec()
    }

    /// Observed `(min, max)` of dimension `j`, or `None` when there are no points.
    pub fn range(&self, j: usize) -> Option<(f64, f64)> {
        self.data.column(j).iter().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for a Mapper pipeline.
///
/// Owned by [`MapperPipeline`](crate::MapperPipeline) and never mutated after
/// construction; building a new pipeline is the only way to reconfigure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Cover policy and parameters
    #[serde(default)]
    pub cover: CoverConfig,
    /// Worker threads for the clustering stage (1 = sequential, 0 = all cores)
    #[serde(default = "default_n_jobs")]
    pub n_jobs: usize,
    /// Emit stage summaries at info level instead of debug
    #[serde(default)]
    pub verbose: bool,
    /// What to do with points a clusterer marks as noise
    #[serde(default)]
    pub noise_policy: NoisePolicy,
    /// What to do when clustering a region fails
    #[serde(default)]
    pub failure_policy: ClusterFailurePolicy,
    /// Per-region clustering time budget.
    ///
    /// Checked after a region's clustering returns: an over-budget result is
    /// discarded as a timeout, but the clusterer itself is never interrupted
    /// and keeps its worker busy until it finishes.
    #[serde(default)]
    pub max_region_runtime: Option<Duration>,
    /// Minimum number of shared points for an edge
    #[serde(default = "default_min_intersection")]
    pub min_intersection: usize,
    /// How edges are computed
    #[serde(default)]
    pub edge_strategy: EdgeStrategy,
    /// Keep the shared point ids on every edge
    #[serde(default)]
    pub store_edge_elements: bool,
}

fn default_n_jobs() -> usize {
    1
}

fn default_min_intersection() -> usize {
    1
}

fn available_cores() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            cover: CoverConfig::default(),
            n_jobs: default_n_jobs(),
            verbose: false,
            noise_policy: NoisePolicy::default(),
            failure_policy: ClusterFailurePolicy::default(),
            max_region_runtime: None,
            min_intersection: default_min_intersection(),
            edge_strategy: EdgeStrategy::default(),
            store_edge_elements: false,
        }
    }
}

impl MapperConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.cover.validate()?;

        if self.min_intersection == 0 {
            return Err(MapperError::configuration("min_intersection must be >= 1"));
        }

        if let Some(budget) = self.max_region_runtime {
            if budget.is_zero() {
                return Err(MapperError::configuration(
                    "max_region_runtime must be > 0 when set",
                ));
            }
        }

        Ok(())
    }

    /// Resolve the worker thread count (`0` means all logical cores).
    ///
    /// Requests above the number of logical cores are capped to it.
    pub fn effective_threads(&self) -> Option<usize> {
        match self.n_jobs {
            0 => None,
            n => Some(n.min(available_cores())),
        }
    }

    /// Builder method: set cover configuration
    pub fn with_cover(mut self, cover: CoverConfig) -> Self {
        self.cover = cover;
        self
    }

    /// Builder method: set degree of parallelism
    pub fn with_n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Builder method: toggle verbose stage logging
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Builder method: set noise policy
    pub fn with_noise_policy(mut self, policy: NoisePolicy) -> Self {
        self.noise_policy = policy;
        self
    }

    /// Builder method: set cluster failure policy
    pub fn with_failure_policy(mut self, policy: ClusterFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Builder method: set per-region clustering time budget
    pub fn with_max_region_runtime(mut self, budget: Duration) -> Self {
        self.max_region_runtime = Some(budget);
        self
    }

    /// Builder method: set minimum edge intersection
    pub fn with_min_intersection(mut self, min: usize) -> Self {
        self.min_intersection = min;
        self
    }

    /// Builder method: set edge strategy
    pub fn with_edge_strategy(mut self, strategy: EdgeStrategy) -> Self {
        self.edge_strategy = strategy;
        self
    }

    /// Builder method: keep shared point ids on edges
    pub fn with_edge_elements(mut self, store: bool) -> Self {
        self.store_edge_elements = store;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cover::CoverPolicy;
    use ndarray::array;

    #[test]
    fn test_point_cloud_rows() {
        let cloud = PointCloud::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(cloud.n_points(), 2);
        assert_eq!(cloud.n_features(), 2);
        assert_eq!(cloud.row(1), &[3.0, 4.0]);
        assert_eq!(cloud.rows().count(), 2);
    }

    #[test]
    fn test_point_cloud_rejects_ragged_rows() {
        let err = PointCloud::from_rows(vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_point_cloud_rejects_zero_features() {
        assert!(PointCloud::new(Array2::zeros((3, 0))).is_err());
    }

    #[test]
    fn test_point_cloud_transposed_input_is_copied() {
        let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let cloud = PointCloud::new(a.reversed_axes()).unwrap();
        assert_eq!(cloud.n_points(), 3);
        assert_eq!(cloud.row(0), &[1.0, 4.0]);
        assert_eq!(cloud.row(2), &[3.0, 6.0]);
    }

    #[test]
    fn test_empty_point_cloud() {
        let cloud = PointCloud::from_rows(vec![]).unwrap();
        assert!(cloud.is_empty());
        assert_eq!(cloud.rows().count(), 0);
    }

    #[test]
    fn test_subset_maps_local_to_global() {
        let cloud = PointCloud::from_column(&[0.0, 10.0, 20.0, 30.0]);
        let idx = [1, 3];
        let sub = cloud.subset(&idx);
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.row(0), &[10.0]);
        assert_eq!(sub.row(1), &[30.0]);
        assert_eq!(sub.to_array(), array![[10.0], [30.0]]);
    }

    #[test]
    fn test_filter_value_range() {
        let fv = FilterValues::from_array(array![[3.0, 1.0], [-1.0, 2.0], [5.0, 0.0]]);
        assert_eq!(fv.dim(), 2);
        assert_eq!(fv.range(0), Some((-1.0, 5.0)));
        assert_eq!(fv.range(1), Some((0.0, 2.0)));
        assert_eq!(fv.value(1), &[-1.0, 2.0]);
    }

    #[test]
    fn test_config_default_is_valid() {
        let cfg = MapperConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.n_jobs, 1);
        assert_eq!(cfg.min_intersection, 1);
        assert_eq!(cfg.failure_policy, ClusterFailurePolicy::Fatal);
    }

    #[test]
    fn test_config_validation() {
        assert!(MapperConfig::new().with_min_intersection(0).validate().is_err());
        assert!(MapperConfig::new()
            .with_max_region_runtime(Duration::ZERO)
            .validate()
            .is_err());
        let bad_cover = CoverConfig::new(CoverPolicy::Uniform {
            n_intervals: 0,
            overlap_frac: 0.1,
        });
        assert!(MapperConfig::new().with_cover(bad_cover).validate().is_err());
    }

    #[test]
    fn test_effective_threads() {
        assert_eq!(MapperConfig::new().effective_threads(), Some(1));
        assert_eq!(
            MapperConfig::new().with_n_jobs(4).effective_threads(),
            Some(4usize.min(available_cores()))
        );
        assert_eq!(MapperConfig::new().with_n_jobs(0).effective_threads(), None);

        let cores = available_cores();
        let huge = MapperConfig::new().with_n_jobs(1_000_000);
        assert_eq!(huge.effective_threads(), Some(cores));
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let cfg: MapperConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, MapperConfig::default());
    }
}
