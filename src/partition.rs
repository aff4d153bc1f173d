//! Preimage computation: which points fall in which region.

use crate::cover::Cover;
use crate::errors::{MapperError, Result};
use crate::types::FilterValues;

/// Region label → ascending point ids whose filter value lies in the region.
///
/// Every region of the cover has an entry, including those whose preimage is
/// empty. A point appears in every region that contains it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preimages {
    sets: Vec<Vec<usize>>,
    n_points: usize,
}

impl Preimages {
    /// Bucket every point into every region containing its filter value.
    pub fn compute(cover: &Cover, values: &FilterValues) -> Result<Self> {
        if values.dim() != cover.dim() {
            return Err(MapperError::configuration(format!(
                "filter produced {} dimensions but the cover was fitted on {}",
                values.dim(),
                cover.dim()
            )));
        }

        let mut sets = vec![Vec::new(); cover.len()];
        for point in 0..values.n_points() {
            let v = values.value(point);
            for region in cover.regions() {
                if region.contains(v) {
                    sets[region.label].push(point);
                }
            }
        }

        Ok(Self {
            sets,
            n_points: values.n_points(),
        })
    }

    /// Point ids in the given region.
    pub fn get(&self, label: usize) -> Option<&[usize]> {
        self.sets.get(label).map(|s| s.as_slice())
    }

    /// Number of regions (empty or not).
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// `(label, point ids)` in label order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[usize])> + '_ {
        self.sets.iter().enumerate().map(|(l, s)| (l, s.as_slice()))
    }

    /// Regions that will be clustered.
    pub fn non_empty(&self) -> impl Iterator<Item = (usize, &[usize])> + '_ {
        self.iter().filter(|(_, s)| !s.is_empty())
    }

    pub fn n_empty(&self) -> usize {
        self.sets.iter().filter(|s| s.is_empty()).count()
    }

    /// Points that fall in no region, in ascending order.
    pub fn uncovered_points(&self) -> Vec<usize> {
        let mut covered = vec![false; self.n_points];
        for set in &self.sets {
            for &p in set {
                covered[p] = true;
            }
        }
        covered
            .iter()
            .enumerate()
            .filter(|(_, &c)| !c)
            .map(|(i, _)| i)
            .collect()
    }
}
