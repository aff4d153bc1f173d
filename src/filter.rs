//! Filter functions (lenses) and the filter stage
//!
//! A filter maps one row of the point cloud to a small vector. Filters must be
//! pure functions of a single row: the stage is free to evaluate rows in any
//! order.

use crate::errors::{MapperError, Result};
use crate::types::{FilterValues, PointCloud};

/// A row-wise filter function.
pub trait FilterFunction: Send + Sync {
    /// Length of the vector produced for rows with `n_features` values.
    fn output_dim(&self, n_features: usize) -> usize;

    /// Evaluate the filter on one row.
    fn evaluate(&self, row: &[f64]) -> std::result::Result<Vec<f64>, String>;

    /// Check that this filter can run on rows with `n_features` values.
    fn check(&self, _n_features: usize) -> Result<()> {
        Ok(())
    }
}

impl<T: FilterFunction + ?Sized> FilterFunction for Box<T> {
    fn output_dim(&self, n_features: usize) -> usize {
        (**self).output_dim(n_features)
    }

    fn evaluate(&self, row: &[f64]) -> std::result::Result<Vec<f64>, String> {
        (**self).evaluate(row)
    }

    fn check(&self, n_features: usize) -> Result<()> {
        (**self).check(n_features)
    }
}

/// Selects a fixed list of columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    columns: Vec<usize>,
}

impl Projection {
    pub fn new(columns: Vec<usize>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[usize] {
        &self.columns
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::new(vec![0])
    }
}

impl FilterFunction for Projection {
    fn output_dim(&self, _n_features: usize) -> usize {
        self.columns.len()
    }

    fn evaluate(&self, row: &[f64]) -> std::result::Result<Vec<f64>, String> {
        self.columns
            .iter()
            .map(|&c| {
                row.get(c)
                    .copied()
                    .ok_or_else(|| format!("column {} out of range for row of length {}", c, row.len()))
            })
            .collect()
    }

    fn check(&self, n_features: usize) -> Result<()> {
        if self.columns.is_empty() {
            return Err(MapperError::configuration(
                "projection filter needs at least one column",
            ));
        }
        if let Some(&c) = self.columns.iter().find(|&&c| c >= n_features) {
            return Err(MapperError::configuration(format!(
                "projection column {} out of range for {} features",
                c, n_features
            )));
        }
        Ok(())
    }
}

/// Shannon entropy (natural log) of the row's normalised absolute values.
///
/// An all-zero row has entropy 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct Entropy;

impl FilterFunction for Entropy {
    fn output_dim(&self, _n_features: usize) -> usize {
        1
    }

    fn evaluate(&self, row: &[f64]) -> std::result::Result<Vec<f64>, String> {
        let total: f64 = row.iter().map(|v| v.abs()).sum();
        if total == 0.0 {
            return Ok(vec![0.0]);
        }
        let h = row
            .iter()
            .map(|v| v.abs() / total)
            .filter(|&p| p > 0.0)
            .map(|p| -p * p.ln())
            .sum();
        Ok(vec![h])
    }
}

/// p-norm of the row (`p = inf` gives the max norm).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Norm {
    p: f64,
}

impl Norm {
    pub fn new(p: f64) -> Self {
        Self { p }
    }

    pub fn euclidean() -> Self {
        Self::new(2.0)
    }
}

impl Default for Norm {
    fn default() -> Self {
        Self::euclidean()
    }
}

impl FilterFunction for Norm {
    fn output_dim(&self, _n_features: usize) -> usize {
        1
    }

    fn evaluate(&self, row: &[f64]) -> std::result::Result<Vec<f64>, String> {
        let n = if self.p.is_infinite() {
            row.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
        } else {
            row.iter()
                .map(|v| v.abs().powf(self.p))
                .sum::<f64>()
                .powf(1.0 / self.p)
        };
        Ok(vec![n])
    }

    fn check(&self, _n_features: usize) -> Result<()> {
        if self.p.is_nan() || self.p < 1.0 {
            return Err(MapperError::configuration(format!(
                "norm order must be >= 1, got {}",
                self.p
            )));
        }
        Ok(())
    }
}

/// Adapts a closure into a [`FilterFunction`].
///
/// ```
/// use rapid_mapper::filter::{FilterFn, FilterFunction};
///
/// let sum = FilterFn::new(1, |row: &[f64]| Ok(vec![row.iter().sum()]));
/// assert_eq!(sum.evaluate(&[1.0, 2.0]).unwrap(), vec![3.0]);
/// ```
pub struct FilterFn<F> {
    dim: usize,
    f: F,
}

impl<F> FilterFn<F>
where
    F: Fn(&[f64]) -> std::result::Result<Vec<f64>, String> + Send + Sync,
{
    pub fn new(dim: usize, f: F) -> Self {
        Self { dim, f }
    }
}

impl<F> std::fmt::Debug for FilterFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterFn").field("dim", &self.dim).finish()
    }
}

impl<F> FilterFunction for FilterFn<F>
where
    F: Fn(&[f64]) -> std::result::Result<Vec<f64>, String> + Send + Sync,
{
    fn output_dim(&self, _n_features: usize) -> usize {
        self.dim
    }

    fn evaluate(&self, row: &[f64]) -> std::result::Result<Vec<f64>, String> {
        (self.f)(row)
    }
}

/// Evaluate `filter` on every row of `points`.
///
/// Fails fast on the first row whose evaluation errors, returns the wrong
/// number of values, or produces a non-finite value.
pub fn apply_filter<F: FilterFunction + ?Sized>(
    filter: &F,
    points: &PointCloud,
) -> Result<FilterValues> {
    filter.check(points.n_features())?;
    let dim = filter.output_dim(points.n_features());
    if dim == 0 {
        return Err(MapperError::configuration(
            "filter must produce at least one value per row",
        ));
    }

    let mut values = Vec::with_capacity(points.n_points() * dim);
    for (row_idx, row) in points.rows().enumerate() {
        let out = filter
            .evaluate(row)
            .map_err(|msg| MapperError::filter_evaluation(row_idx, msg))?;
        if out.len() != dim {
            return Err(MapperError::filter_evaluation(
                row_idx,
                format!("expected {} values, got {}", dim, out.len()),
            ));
        }
        if let Some(bad) = out.iter().find(|v| !v.is_finite()) {
            return Err(MapperError::filter_evaluation(
                row_idx,
                format!("non-finite filter value {bad}"),
            ));
        }
        values.extend(out);
    }

    FilterValues::from_shape_vec(points.n_points(), dim, values)
}
