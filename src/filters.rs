//! Selectivity and retention filters.
//!
//! A filter maps a cohort abundance matrix to a filtered matrix by
//! multiplying each `[subdivision][bin]` entry with a probability derived
//! from the species' length-at-bin. Curve shapes are a closed set of tagged
//! variants dispatched through one `compute_probability` routine, so the
//! memoization cache and equality semantics stay uniform.
//!
//! Filters are immutable value objects: two filters with the same parameters
//! compare equal, but each instance owns its probability cache. The cache is
//! keyed by species name and written at most once per species
//! (compute-if-absent); recomputing these curves on every catch event is
//! orders of magnitude slower, so memoization is on by default.

use crate::abundance::StructuredAbundance;
use crate::species::Species;
use ndarray::Array2;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// The curve shape a filter evaluates. Mirror flags swap the male/female
/// probability assignment, not the resulting counts.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterKind {
    /// Probability supplied directly as one fixed row per subdivision.
    Array { rows: Vec<Vec<f64>>, flipped: bool },
    /// 1 on one side of a length threshold, 0 on the other.
    Cutoff { threshold: f64, keep_above: bool, flipped: bool },
    /// `p(len) = 1 / (1 + exp(a - b * len))`
    Logistic { a: f64, b: f64, flipped: bool },
    /// Asymmetric bell: `p(len) = 2^-(((len - peak) / spread)^2)` with the
    /// ascending spread below the peak and the descending spread above it.
    SimplifiedDoubleNormal { peak: f64, ascending_spread: f64, descending_spread: f64 },
    /// Probability of being retained rather than discarded:
    /// `p(len) = asymptote / (1 + exp(-(len - inflection) / slope))`
    Retention { inflection: f64, slope: f64, asymptote: f64 },
    /// Per-bin maximum over component filters: captured by any gear
    /// configuration.
    MaxOf(Vec<AbundanceFilter>),
}

/// An immutable selectivity/retention filter with a per-instance memoized
/// probability matrix per species.
#[derive(Debug, Clone)]
pub struct AbundanceFilter {
    kind: FilterKind,
    memoize: bool,
    /// round filtered counts to whole fish
    rounding: bool,
    cache: RefCell<HashMap<String, Rc<Array2<f64>>>>,
}

impl PartialEq for AbundanceFilter {
    /// Semantic equality: parameters only, the cache is not part of identity.
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.rounding == other.rounding
    }
}

impl AbundanceFilter {
    pub fn new(kind: FilterKind) -> Self {
        Self { kind, memoize: true, rounding: false, cache: RefCell::new(HashMap::new()) }
    }

    pub fn with_rounding(mut self, rounding: bool) -> Self {
        self.rounding = rounding;
        self
    }

    pub fn without_memoization(mut self) -> Self {
        self.memoize = false;
        self
    }

    pub fn array(rows: Vec<Vec<f64>>, flipped: bool) -> Self {
        Self::new(FilterKind::Array { rows, flipped })
    }

    pub fn cutoff(threshold: f64, keep_above: bool, flipped: bool) -> Self {
        Self::new(FilterKind::Cutoff { threshold, keep_above, flipped })
    }

    pub fn logistic(a: f64, b: f64, flipped: bool) -> Self {
        Self::new(FilterKind::Logistic { a, b, flipped })
    }

    pub fn double_normal(peak: f64, ascending_spread: f64, descending_spread: f64) -> Self {
        Self::new(FilterKind::SimplifiedDoubleNormal { peak, ascending_spread, descending_spread })
    }

    pub fn retention(inflection: f64, slope: f64, asymptote: f64) -> Self {
        Self::new(FilterKind::Retention { inflection, slope, asymptote })
    }

    pub fn max_of(filters: Vec<AbundanceFilter>) -> Self {
        Self::new(FilterKind::MaxOf(filters))
    }

    /// The `[subdivision][bin]` capture/retention probability matrix for one
    /// species, memoized per species name. The second call with the same
    /// species returns the cached matrix without recomputing.
    pub fn probability_matrix(&self, species: &Species) -> Rc<Array2<f64>> {
        if !self.memoize {
            return Rc::new(self.compute_probability(species));
        }
        if let Some(hit) = self.cache.borrow().get(species.name()) {
            return Rc::clone(hit);
        }
        let computed = Rc::new(self.compute_probability(species));
        self.cache.borrow_mut().insert(species.name().to_string(), Rc::clone(&computed));
        computed
    }

    /// Apply the filter: returns a new matrix where each entry is the input
    /// count times the capture probability. Never creates fish. With
    /// `rounding` the result is rounded to whole fish.
    pub fn filter(&self, species: &Species, abundance: &StructuredAbundance) -> StructuredAbundance {
        let probability = self.probability_matrix(species);
        let mut result = abundance.clone();
        {
            let matrix = result.as_matrix_mut();
            for (entry, &p) in matrix.iter_mut().zip(probability.iter()) {
                *entry *= p;
                if self.rounding {
                    *entry = entry.round();
                }
            }
        }
        result
    }

    fn compute_probability(&self, species: &Species) -> Array2<f64> {
        let subdivisions = species.number_of_subdivisions();
        let bins = species.number_of_bins();
        let mut matrix = Array2::zeros((subdivisions, bins));

        match &self.kind {
            FilterKind::Array { rows, flipped } => {
                for sub in 0..subdivisions {
                    let row = &rows[curve_row(sub, subdivisions, *flipped)];
                    assert_eq!(row.len(), bins, "array filter row does not match species bins");
                    for bin in 0..bins {
                        matrix[[sub, bin]] = row[bin].clamp(0.0, 1.0);
                    }
                }
            }
            FilterKind::Cutoff { threshold, keep_above, flipped } => {
                for sub in 0..subdivisions {
                    let curve = curve_row(sub, subdivisions, *flipped);
                    for bin in 0..bins {
                        let above = species.length(curve, bin) >= *threshold;
                        matrix[[sub, bin]] = if above == *keep_above { 1.0 } else { 0.0 };
                    }
                }
            }
            FilterKind::Logistic { a, b, flipped } => {
                for sub in 0..subdivisions {
                    let curve = curve_row(sub, subdivisions, *flipped);
                    for bin in 0..bins {
                        // lengths below the curve domain saturate toward zero
                        // probability rather than extrapolating negative
                        let length = species.length(curve, bin).max(0.0);
                        let p = 1.0 / (1.0 + (a - b * length).exp());
                        matrix[[sub, bin]] = p.clamp(0.0, 1.0);
                    }
                }
            }
            FilterKind::SimplifiedDoubleNormal { peak, ascending_spread, descending_spread } => {
                for sub in 0..subdivisions {
                    for bin in 0..bins {
                        let length = species.length(sub, bin);
                        let spread =
                            if length < *peak { *ascending_spread } else { *descending_spread };
                        let standardized = (length - peak) / spread;
                        let p = 2f64.powf(-(standardized * standardized));
                        matrix[[sub, bin]] = p.clamp(0.0, 1.0);
                    }
                }
            }
            FilterKind::Retention { inflection, slope, asymptote } => {
                for sub in 0..subdivisions {
                    for bin in 0..bins {
                        let length = species.length(sub, bin).max(0.0);
                        let p = asymptote / (1.0 + (-(length - inflection) / slope).exp());
                        matrix[[sub, bin]] = p.clamp(0.0, 1.0);
                    }
                }
            }
            FilterKind::MaxOf(filters) => {
                for filter in filters {
                    let component = filter.probability_matrix(species);
                    for (entry, &p) in matrix.iter_mut().zip(component.iter()) {
                        if p > *entry {
                            *entry = p;
                        }
                    }
                }
            }
        }

        matrix
    }
}

/// Which subdivision's curve feeds row `sub`; mirroring swaps the two sexes
/// and leaves any further subdivisions untouched.
fn curve_row(sub: usize, subdivisions: usize, flipped: bool) -> usize {
    if flipped && subdivisions >= 2 && sub < 2 {
        1 - sub
    } else {
        sub
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abundance::StructuredAbundance;
    use crate::species::{Meristics, Species, FEMALE, MALE};
    use std::rc::Rc;

    fn species_with_lengths(male: Vec<f64>, female: Vec<f64>) -> Species {
        let weights_m = vec![1.0; male.len()];
        let weights_f = vec![1.0; female.len()];
        Species::new("test", Meristics::from_lists(vec![male, female], vec![weights_m, weights_f]))
    }

    #[test]
    fn test_array_filter_mirrored() {
        // curves handed in as (first, second); mirrored, so males take the
        // second row and females the first
        let filter = AbundanceFilter::array(vec![vec![0.1, 0.2], vec![0.5, 0.3]], true)
            .with_rounding(true);
        let species = species_with_lengths(vec![1.0, 2.0], vec![1.0, 2.0]);
        let input = StructuredAbundance::from_rows(vec![vec![100.0, 100.0], vec![1000.0, 1000.0]]);

        let output = filter.filter(&species, &input);
        assert_eq!(output.get(MALE, 0), 50.0);
        assert_eq!(output.get(MALE, 1), 30.0);
        assert_eq!(output.get(FEMALE, 0), 100.0);
        assert_eq!(output.get(FEMALE, 1), 200.0);
    }

    #[test]
    fn test_cutoff_filter() {
        // 81 bins; males grow slowly, females fast, threshold at length 10
        let male: Vec<f64> = (0..81).map(|bin| bin as f64 * 0.45).collect();
        let female: Vec<f64> = (0..81).map(|bin| bin as f64 * 4.0).collect();
        let species = species_with_lengths(male, female);

        let filter = AbundanceFilter::cutoff(10.0, false, false);
        let p = filter.probability_matrix(&species);
        assert_eq!(p[[MALE, 3]], 1.0);
        assert_eq!(p[[FEMALE, 20]], 0.0);

        let mirrored = AbundanceFilter::cutoff(10.0, false, true);
        let p = mirrored.probability_matrix(&species);
        assert_eq!(p[[MALE, 3]], 0.0);
        assert_eq!(p[[FEMALE, 20]], 1.0);
    }

    #[test]
    fn test_cutoff_keep_above() {
        let species = species_with_lengths(vec![5.0, 15.0], vec![5.0, 15.0]);
        let filter = AbundanceFilter::cutoff(10.0, true, false);
        let p = filter.probability_matrix(&species);
        assert_eq!(p[[MALE, 0]], 0.0);
        assert_eq!(p[[MALE, 1]], 1.0);
    }

    #[test]
    fn test_logistic_filter_reference_values() {
        let mut male = vec![0.0; 81];
        let mut female = vec![0.0; 81];
        male[5] = 2.4271;
        female[20] = 2.6257;
        let species = species_with_lengths(male, female);

        let filter = AbundanceFilter::logistic(23.5053, 9.03702, false);
        let p = filter.probability_matrix(&species);
        assert!((p[[MALE, 5]] - 0.1720164347).abs() < 0.001);
        assert!((p[[FEMALE, 20]] - 0.5556124037).abs() < 0.001);
    }

    #[test]
    fn test_double_normal_filter_shape() {
        // one unit-length bin per centimeter
        let lengths: Vec<f64> = (0..=50).map(|bin| bin as f64).collect();
        let species = species_with_lengths(lengths.clone(), lengths);

        let filter = AbundanceFilter::double_normal(30.0, 5.0, 10.0);
        let p = filter.probability_matrix(&species);
        assert_eq!(p[[0, 30]], 1.0);
        assert!((p[[0, 20]] - 0.0625).abs() < 1e-9);
        assert!((p[[0, 40]] - 0.5).abs() < 1e-9);
        assert!((p[[0, 50]] - 0.0625).abs() < 1e-9);
    }

    #[test]
    fn test_retention_asymptote_bounds() {
        let lengths: Vec<f64> = (0..=60).map(|bin| bin as f64).collect();
        let species = species_with_lengths(lengths.clone(), lengths);
        let filter = AbundanceFilter::retention(35.0, 3.0, 0.9);
        let p = filter.probability_matrix(&species);
        for sub in 0..2 {
            for bin in 0..=60 {
                assert!(p[[sub, bin]] >= 0.0 && p[[sub, bin]] <= 0.9);
            }
        }
        // well past the inflection the curve approaches the asymptote
        assert!(p[[0, 60]] > 0.89);
        assert!(p[[0, 0]] < 0.01);
    }

    #[test]
    fn test_max_of_filters() {
        let first = AbundanceFilter::array(vec![vec![0.5, 0.0, 0.5], vec![0.2, 0.0, 0.2]], false);
        let second = AbundanceFilter::array(vec![vec![0.0, 0.5, 0.0], vec![1.0, 1.0, 1.0]], false);
        let combined = AbundanceFilter::max_of(vec![first, second]);

        let species = species_with_lengths(vec![1.0, 2.0, 3.0], vec![1.0, 2.0, 3.0]);
        let input = StructuredAbundance::from_rows(vec![vec![1.0; 3], vec![1.0; 3]]);
        let output = combined.filter(&species, &input);
        for bin in 0..3 {
            assert_eq!(output.get(0, bin), 0.5);
            assert_eq!(output.get(1, bin), 1.0);
        }
    }

    #[test]
    fn test_probability_bounds_and_mass_non_creation() {
        let lengths: Vec<f64> = (0..40).map(|bin| bin as f64 * 2.5).collect();
        let species = species_with_lengths(lengths.clone(), lengths);
        let input = StructuredAbundance::from_rows(vec![vec![100.0; 40], vec![100.0; 40]]);

        let filters = vec![
            AbundanceFilter::logistic(10.0, 0.5, false),
            AbundanceFilter::double_normal(50.0, 8.0, 12.0),
            AbundanceFilter::retention(40.0, 5.0, 1.0),
            AbundanceFilter::cutoff(30.0, true, false),
        ];
        for filter in &filters {
            let p = filter.probability_matrix(&species);
            for &value in p.iter() {
                assert!((0.0..=1.0).contains(&value));
            }
            let output = filter.filter(&species, &input);
            for sub in 0..2 {
                for bin in 0..40 {
                    assert!(output.get(sub, bin) <= input.get(sub, bin));
                }
            }
        }
    }

    #[test]
    fn test_memoization_returns_cached_matrix() {
        let lengths: Vec<f64> = (0..30).map(|bin| bin as f64).collect();
        let species = species_with_lengths(lengths.clone(), lengths);
        let filter = AbundanceFilter::logistic(5.0, 0.3, false);

        let first = filter.probability_matrix(&species);
        let second = filter.probability_matrix(&species);
        assert!(Rc::ptr_eq(&first, &second));

        let uncached = filter.without_memoization();
        let a = uncached.probability_matrix(&species);
        let b = uncached.probability_matrix(&species);
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(a, b);
    }

    #[test]
    fn test_semantic_equality_ignores_cache() {
        let lengths: Vec<f64> = (0..10).map(|bin| bin as f64).collect();
        let species = species_with_lengths(lengths.clone(), lengths);

        let warm = AbundanceFilter::logistic(2.0, 0.1, false);
        let _ = warm.probability_matrix(&species);
        let cold = AbundanceFilter::logistic(2.0, 0.1, false);
        assert_eq!(warm, cold);

        let different = AbundanceFilter::logistic(2.0, 0.2, false);
        assert_ne!(warm, different);
    }
}
