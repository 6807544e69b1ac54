//! Structured abundance: fish counts per subdivision and age/length bin.

use crate::species::Meristics;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// A `[subdivision][bin]` matrix of fish counts. Entries are non-negative;
/// counts are stored as f64 so that scaled allocations stay exact until a
/// process explicitly rounds them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredAbundance {
    matrix: Array2<f64>,
}

impl StructuredAbundance {
    /// All-zero abundance of the given shape.
    pub fn empty(subdivisions: usize, bins: usize) -> Self {
        Self { matrix: Array2::zeros((subdivisions, bins)) }
    }

    pub fn from_matrix(matrix: Array2<f64>) -> Self {
        Self { matrix }
    }

    /// Build from per-subdivision rows.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        assert!(!rows.is_empty(), "need at least one subdivision");
        let bins = rows[0].len();
        let mut matrix = Array2::zeros((rows.len(), bins));
        for (sub, row) in rows.iter().enumerate() {
            assert_eq!(row.len(), bins, "ragged abundance rows");
            for (bin, &count) in row.iter().enumerate() {
                matrix[[sub, bin]] = count;
            }
        }
        Self { matrix }
    }

    pub fn subdivisions(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn bins(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn get(&self, subdivision: usize, bin: usize) -> f64 {
        self.matrix[[subdivision, bin]]
    }

    pub fn set(&mut self, subdivision: usize, bin: usize, count: f64) {
        self.matrix[[subdivision, bin]] = count;
    }

    pub fn add(&mut self, subdivision: usize, bin: usize, delta: f64) {
        self.matrix[[subdivision, bin]] += delta;
    }

    pub fn as_matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    pub fn as_matrix_mut(&mut self) -> &mut Array2<f64> {
        &mut self.matrix
    }

    /// Total number of fish across all subdivisions and bins.
    pub fn total(&self) -> f64 {
        self.matrix.sum()
    }

    /// Total biomass in kg, weighting each cohort by weight-at-bin.
    pub fn biomass(&self, meristics: &Meristics) -> f64 {
        let mut total = 0.0;
        for sub in 0..self.subdivisions() {
            for bin in 0..self.bins() {
                total += self.matrix[[sub, bin]] * meristics.weight(sub, bin);
            }
        }
        total
    }

    /// Elementwise sum of many abundances of the same shape.
    pub fn sum<'a>(abundances: impl Iterator<Item = &'a StructuredAbundance>) -> Option<Self> {
        let mut result: Option<Self> = None;
        for abundance in abundances {
            match result.as_mut() {
                None => result = Some(abundance.clone()),
                Some(acc) => acc.matrix += &abundance.matrix,
            }
        }
        result
    }

    /// Subtract another abundance in place, clamping every entry at zero so
    /// that rounding noise in extraction never yields negative counts.
    pub fn subtract_clamped(&mut self, taken: &StructuredAbundance) {
        for (entry, removed) in self.matrix.iter_mut().zip(taken.matrix.iter()) {
            *entry = (*entry - removed).max(0.0);
        }
    }
}
