//! Cover construction
//!
//! A cover is a finite family of overlapping regions ("pullback sets") over
//! the observed filter range. One-dimensional covers are built per filter
//! dimension; multi-dimensional filters get the cubical (product) cover.
//!
//! Uniform covers with `n` intervals and overlap fraction `f` over `[m, M]`
//! use interval length
//!
//! ```text
//! L = (M - m) / (n - (n - 1) f)
//! ```
//!
//! with left limits `m + i L (1 - f)`, so consecutive intervals share `f L`
//! and the union is exactly `[m, M]`.

use serde::{Deserialize, Serialize};

use crate::errors::{MapperError, Result};
use crate::types::FilterValues;

/// A closed interval `[lower, upper]` in one filter dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    pub fn is_bounded(&self) -> bool {
        self.lower.is_finite() && self.upper.is_finite()
    }
}

/// How the filter range is divided into intervals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoverPolicy {
    /// Equal-width overlapping intervals.
    Uniform { n_intervals: usize, overlap_frac: f64 },
    /// Overlapping intervals holding roughly equal numbers of points.
    Balanced { n_intervals: usize, overlap_frac: f64 },
    /// Caller-supplied intervals, applied to every filter dimension.
    ///
    /// These are used as given and may leave points uncovered.
    Explicit { intervals: Vec<Interval> },
}

impl Default for CoverPolicy {
    fn default() -> Self {
        CoverPolicy::Uniform {
            n_intervals: 10,
            overlap_frac: 0.1,
        }
    }
}

impl CoverPolicy {
    pub fn uniform(n_intervals: usize, overlap_frac: f64) -> Self {
        CoverPolicy::Uniform {
            n_intervals,
            overlap_frac,
        }
    }

    pub fn balanced(n_intervals: usize, overlap_frac: f64) -> Self {
        CoverPolicy::Balanced {
            n_intervals,
            overlap_frac,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CoverPolicy::Uniform { .. } => "uniform",
            CoverPolicy::Balanced { .. } => "balanced",
            CoverPolicy::Explicit { .. } => "explicit",
        }
    }

    fn overlap_frac(&self) -> f64 {
        match self {
            CoverPolicy::Uniform { overlap_frac, .. }
            | CoverPolicy::Balanced { overlap_frac, .. } => *overlap_frac,
            CoverPolicy::Explicit { .. } => 0.0,
        }
    }
}

/// Cover policy plus boundary handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverConfig {
    #[serde(flatten)]
    pub policy: CoverPolicy,
    /// Stretch the outermost intervals to `±inf` so data transformed after
    /// fitting is still covered. Ignored for explicit covers.
    #[serde(default = "default_extend_outer")]
    pub extend_outer: bool,
}

fn default_extend_outer() -> bool {
    true
}

impl Default for CoverConfig {
    fn default() -> Self {
        Self::new(CoverPolicy::default())
    }
}

impl CoverConfig {
    pub fn new(policy: CoverPolicy) -> Self {
        Self {
            policy,
            extend_outer: default_extend_outer(),
        }
    }

    pub fn uniform(n_intervals: usize, overlap_frac: f64) -> Self {
        Self::new(CoverPolicy::uniform(n_intervals, overlap_frac))
    }

    pub fn balanced(n_intervals: usize, overlap_frac: f64) -> Self {
        Self::new(CoverPolicy::balanced(n_intervals, overlap_frac))
    }

    pub fn explicit(intervals: Vec<Interval>) -> Self {
        Self::new(CoverPolicy::Explicit { intervals })
    }

    /// Builder method: keep the outermost bounds at the observed range
    pub fn with_extend_outer(mut self, extend: bool) -> Self {
        self.extend_outer = extend;
        self
    }

    /// Validate the cover parameters
    pub fn validate(&self) -> Result<()> {
        match &self.policy {
            CoverPolicy::Uniform {
                n_intervals,
                overlap_frac,
            }
            | CoverPolicy::Balanced {
                n_intervals,
                overlap_frac,
            } => {
                if *n_intervals < 1 {
                    return Err(MapperError::invalid_cover(format!(
                        "n_intervals must be >= 1, got {}",
                        n_intervals
                    )));
                }
                if !(0.0..1.0).contains(overlap_frac) {
                    return Err(MapperError::invalid_cover(format!(
                        "overlap_frac must be in [0, 1), got {}",
                        overlap_frac
                    )));
                }
            }
            CoverPolicy::Explicit { intervals } => {
                if intervals.is_empty() {
                    return Err(MapperError::invalid_cover(
                        "explicit cover needs at least one interval",
                    ));
                }
                for (i, iv) in intervals.iter().enumerate() {
                    if iv.lower.is_nan() || iv.upper.is_nan() || iv.lower > iv.upper {
                        return Err(MapperError::invalid_cover(format!(
                            "interval {} [{}, {}] is malformed",
                            i, iv.lower, iv.upper
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// One element of the cover.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Region {
    /// Unique label; regions are stored in ascending label order.
    pub label: usize,
    /// One interval per filter dimension.
    pub bounds: Vec<Interval>,
    /// Overlap fraction used to build this region (0.0 for explicit covers).
    pub overlap_frac: f64,
}

impl Region {
    /// Whether a filter value lies inside every dimension's closed bounds.
    #[inline]
    pub fn contains(&self, value: &[f64]) -> bool {
        self.bounds
            .iter()
            .zip(value)
            .all(|(iv, &v)| iv.contains(v))
    }
}

/// A fitted cover: immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cover {
    regions: Vec<Region>,
    dim: usize,
    ranges: Vec<(f64, f64)>,
}

impl Cover {
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn region(&self, label: usize) -> Option<&Region> {
        self.regions.get(label)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Filter dimensionality the cover was fitted on.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Observed `(min, max)` per filter dimension at fit time.
    pub fn observed_ranges(&self) -> &[(f64, f64)] {
        &self.ranges
    }
}

/// Builds a [`Cover`] from filter values.
#[derive(Debug, Clone, Default)]
pub struct CoverBuilder {
    config: CoverConfig,
}

impl CoverBuilder {
    pub fn new(config: CoverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CoverConfig {
        &self.config
    }

    /// Fit a cover to the observed filter range.
    pub fn fit(&self, values: &FilterValues) -> Result<Cover> {
        self.config.validate()?;
        if values.n_points() == 0 {
            return Err(MapperError::invalid_cover(
                "cannot fit a cover on an empty set of filter values",
            ));
        }

        let dim = values.dim();
        let mut per_dim = Vec::with_capacity(dim);
        let mut ranges = Vec::with_capacity(dim);
        for j in 0..dim {
            let column = values.column(j);
            let range = values
                .range(j)
                .ok_or_else(|| MapperError::internal("filter range of a non-empty column"))?;
            ranges.push(range);
            per_dim.push(self.intervals_1d(&column)?);
        }

        let regions = product_regions(&per_dim, self.config.policy.overlap_frac());
        Ok(Cover {
            regions,
            dim,
            ranges,
        })
    }

    /// Intervals for one filter dimension.
    pub fn intervals_1d(&self, column: &[f64]) -> Result<Vec<Interval>> {
        self.config.validate()?;
        let (min, max) = column
            .iter()
            .fold(None, |acc: Option<(f64, f64)>, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
            .ok_or_else(|| MapperError::invalid_cover("no filter values to cover"))?;

        let mut intervals = match &self.config.policy {
            CoverPolicy::Explicit { intervals } => return Ok(intervals.clone()),
            _ if min == max => vec![Interval::new(min, max)],
            CoverPolicy::Uniform {
                n_intervals,
                overlap_frac,
            } => uniform_intervals(min, max, *n_intervals, *overlap_frac),
            CoverPolicy::Balanced {
                n_intervals,
                overlap_frac,
            } => {
                let mut sorted = column.to_vec();
                sorted.sort_by(f64::total_cmp);
                balanced_intervals(&sorted, *n_intervals, *overlap_frac)
            }
        };

        if self.config.extend_outer {
            if let Some(first) = intervals.first_mut() {
                first.lower = f64::NEG_INFINITY;
            }
            if let Some(last) = intervals.last_mut() {
                last.upper = f64::INFINITY;
            }
        }
        Ok(intervals)
    }
}

/// Equal-width intervals covering exactly `[min, max]`.
pub fn uniform_intervals(min: f64, max: f64, n_intervals: usize, overlap_frac: f64) -> Vec<Interval> {
    if n_intervals <= 1 || min == max {
        return vec![Interval::new(min, max)];
    }
    let n = n_intervals as f64;
    let length = (max - min) / (n - (n - 1.0) * overlap_frac);
    let step = length * (1.0 - overlap_frac);

    let mut intervals: Vec<Interval> = (0..n_intervals)
        .map(|i| {
            let lower = min + i as f64 * step;
            Interval::new(lower, lower + length)
        })
        .collect();
    // Pin the ends to the observed range so rounding never drops the extremes.
    intervals[0].lower = min;
    intervals[n_intervals - 1].upper = max;
    // Neighbours must at least touch; with zero overlap rounding can open a gap.
    for i in 1..n_intervals {
        if intervals[i - 1].upper < intervals[i].lower {
            intervals[i - 1].upper = intervals[i].lower;
        }
    }
    intervals
}

/// Equal-population intervals over sorted values.
///
/// The uniform construction is done over ranks `[0, len - 1]` and mapped back
/// to values by interpolating between order statistics. Ties can make
/// neighbouring intervals identical; duplicates are dropped.
pub fn balanced_intervals(sorted: &[f64], n_intervals: usize, overlap_frac: f64) -> Vec<Interval> {
    let (min, max) = match (sorted.first(), sorted.last()) {
        (Some(&lo), Some(&hi)) => (lo, hi),
        _ => return Vec::new(),
    };
    if n_intervals <= 1 || min == max {
        return vec![Interval::new(min, max)];
    }

    let last_rank = (sorted.len() - 1) as f64;
    let at_rank = |r: f64| -> f64 {
        let r = r.clamp(0.0, last_rank);
        let lo = r.floor() as usize;
        let hi = r.ceil() as usize;
        let frac = r - lo as f64;
        sorted[lo] + frac * (sorted[hi] - sorted[lo])
    };

    let mut intervals: Vec<Interval> = Vec::with_capacity(n_intervals);
    for rank_iv in uniform_intervals(0.0, last_rank, n_intervals, overlap_frac) {
        let iv = Interval::new(at_rank(rank_iv.lower), at_rank(rank_iv.upper));
        if intervals.last() != Some(&iv) {
            intervals.push(iv);
        }
    }
    if let Some(first) = intervals.first_mut() {
        first.lower = min;
    }
    if let Some(last) = intervals.last_mut() {
        last.upper = max;
    }
    intervals
}

/// Cartesian product of per-dimension intervals, labelled in row-major order
/// (the last dimension varies fastest).
fn product_regions(per_dim: &[Vec<Interval>], overlap_frac: f64) -> Vec<Region> {
    if per_dim.iter().any(|d| d.is_empty()) {
        return Vec::new();
    }
    let total: usize = per_dim.iter().map(|d| d.len()).product();
    let mut regions = Vec::with_capacity(total);
    let mut digits = vec![0usize; per_dim.len()];

    for label in 0..total {
        let bounds = digits
            .iter()
            .zip(per_dim)
            .map(|(&k, ivs)| ivs[k])
            .collect();
        regions.push(Region {
            label,
            bounds,
            overlap_frac,
        });

        for pos in (0..digits.len()).rev() {
            digits[pos] += 1;
            if digits[pos] < per_dim[pos].len() {
                break;
            }
            digits[pos] = 0;
        }
    }
    regions
}
