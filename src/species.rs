//! Species identity and meristics.
//!
//! A `Species` is created once at model setup and never mutated afterwards.
//! Its `Meristics` hold the life-history arrays every other component reads:
//! length-at-age, weight-at-age, maturity, cumulative survival and the phi
//! (spawning potential) series.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Subdivision index for male fish.
pub const MALE: usize = 0;
/// Subdivision index for female fish.
pub const FEMALE: usize = 1;

/// Von Bertalanffy growth curve plus allometric weight and natural mortality
/// for one sex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowthCurve {
    /// Oldest modeled age (bins = max over sexes + 1)
    pub max_age: usize,
    /// Age at which `young_length` is observed
    pub young_age: f64,
    /// Length at `young_age`, in cm
    pub young_length: f64,
    /// Asymptotic-ish length of old fish, in cm
    pub max_length: f64,
    /// Growth rate parameter K
    pub k: f64,
    /// Allometric weight coefficient (kg = a * length^b)
    pub weight_a: f64,
    /// Allometric weight exponent
    pub weight_b: f64,
    /// Instantaneous natural mortality M (yearly survival = exp(-M))
    pub mortality_m: f64,
}

/// Life-history arrays for one species, computed once at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meristics {
    bins: usize,
    subdivisions: usize,
    /// Length in cm, `[subdivision][bin]`
    length_cm: Array2<f64>,
    /// Weight in kg, `[subdivision][bin]`
    weight_kg: Array2<f64>,
    /// Fraction mature per bin (female curve)
    maturity: Vec<f64>,
    /// Relative fecundity (eggs per kg) per bin
    relative_fecundity: Vec<f64>,
    /// Cumulative natural survival per bin, `[subdivision][bin]`
    cumulative_survival: Array2<f64>,
    /// Spawning potential per bin
    phi: Vec<f64>,
    cumulative_phi: f64,
    /// Instantaneous natural mortality per subdivision
    mortality_m: Vec<f64>,
    /// Beverton-Holt steepness
    steepness: f64,
    /// Recruits produced by the unfished stock
    virgin_recruits: f64,
}

impl Meristics {
    /// Build the full meristic table from growth-curve parameters, the way
    /// stock-assessment inputs describe a species.
    #[allow(clippy::too_many_arguments)]
    pub fn from_growth_curves(
        male: &GrowthCurve,
        female: &GrowthCurve,
        maturity_inflection: f64,
        maturity_slope: f64,
        fecundity_intercept: f64,
        fecundity_slope: f64,
        steepness: f64,
        virgin_recruits: f64,
    ) -> Self {
        let bins = male.max_age.max(female.max_age) + 1;
        let mut length_cm = Array2::zeros((2, bins));
        let mut weight_kg = Array2::zeros((2, bins));

        for (sub, curve) in [(MALE, male), (FEMALE, female)] {
            // l-infinity recovered from the young/max length pair
            let l_inf = curve.young_length
                + (curve.max_length - curve.young_length)
                    / (1.0 - (-curve.k * (curve.max_age as f64 - curve.young_age)).exp());
            for age in 0..bins {
                let mut length = l_inf
                    + (curve.young_length - l_inf) * (-curve.k * (age as f64 - curve.young_age)).exp();
                // the formula goes negative for very young fish; clamp to zero
                if length < 0.0 {
                    length = 0.0;
                }
                length_cm[[sub, age]] = length;
                weight_kg[[sub, age]] = curve.weight_a * length.powf(curve.weight_b);
            }
        }

        let mut maturity = vec![0.0; bins];
        let mut relative_fecundity = vec![0.0; bins];
        let mut cumulative_survival = Array2::zeros((2, bins));
        let mut phi = vec![0.0; bins];
        let mut cumulative_phi = 0.0;
        for age in 0..bins {
            maturity[age] =
                1.0 / (1.0 + (maturity_slope * (length_cm[[FEMALE, age]] - maturity_inflection)).exp());
            let w = weight_kg[[FEMALE, age]];
            relative_fecundity[age] = w * (fecundity_intercept + fecundity_slope * w);
            cumulative_survival[[MALE, age]] = if age == 0 {
                1.0
            } else {
                (-male.mortality_m).exp() * cumulative_survival[[MALE, age - 1]]
            };
            cumulative_survival[[FEMALE, age]] = if age == 0 {
                1.0
            } else {
                (-female.mortality_m).exp() * cumulative_survival[[FEMALE, age - 1]]
            };
            phi[age] = maturity[age] * relative_fecundity[age] * cumulative_survival[[FEMALE, age]];
            cumulative_phi += phi[age];
        }

        Self {
            bins,
            subdivisions: 2,
            length_cm,
            weight_kg,
            maturity,
            relative_fecundity,
            cumulative_survival,
            phi,
            cumulative_phi,
            mortality_m: vec![male.mortality_m, female.mortality_m],
            steepness,
            virgin_recruits,
        }
    }

    /// Build meristics directly from per-bin length and weight lists, one row
    /// per subdivision. Used when length-at-age comes pre-tabulated instead
    /// of as curve parameters.
    pub fn from_lists(lengths: Vec<Vec<f64>>, weights: Vec<Vec<f64>>) -> Self {
        assert!(!lengths.is_empty(), "need at least one subdivision");
        assert_eq!(lengths.len(), weights.len(), "length/weight row mismatch");
        let subdivisions = lengths.len();
        let bins = lengths[0].len();
        let mut length_cm = Array2::zeros((subdivisions, bins));
        let mut weight_kg = Array2::zeros((subdivisions, bins));
        for sub in 0..subdivisions {
            assert_eq!(lengths[sub].len(), bins, "ragged length rows");
            assert_eq!(weights[sub].len(), bins, "ragged weight rows");
            for bin in 0..bins {
                length_cm[[sub, bin]] = lengths[sub][bin];
                weight_kg[[sub, bin]] = weights[sub][bin];
            }
        }
        Self {
            bins,
            subdivisions,
            length_cm,
            weight_kg,
            maturity: vec![1.0; bins],
            relative_fecundity: vec![0.0; bins],
            cumulative_survival: Array2::ones((subdivisions, bins)),
            phi: vec![0.0; bins],
            cumulative_phi: 0.0,
            mortality_m: vec![0.0; subdivisions],
            steepness: 0.0,
            virgin_recruits: 0.0,
        }
    }

    /// Same length/weight list applied to both sexes.
    pub fn from_single_list(lengths: Vec<f64>, weights: Vec<f64>) -> Self {
        Self::from_lists(vec![lengths.clone(), lengths], vec![weights.clone(), weights])
    }

    pub fn number_of_bins(&self) -> usize {
        self.bins
    }

    pub fn number_of_subdivisions(&self) -> usize {
        self.subdivisions
    }

    /// Length in cm of a fish of the given subdivision and bin.
    pub fn length(&self, subdivision: usize, bin: usize) -> f64 {
        self.length_cm[[subdivision, bin]]
    }

    /// Weight in kg of a fish of the given subdivision and bin.
    pub fn weight(&self, subdivision: usize, bin: usize) -> f64 {
        self.weight_kg[[subdivision, bin]]
    }

    pub fn maturity(&self) -> &[f64] {
        &self.maturity
    }

    pub fn relative_fecundity(&self) -> &[f64] {
        &self.relative_fecundity
    }

    pub fn cumulative_survival(&self, subdivision: usize, bin: usize) -> f64 {
        self.cumulative_survival[[subdivision, bin]]
    }

    pub fn phi(&self) -> &[f64] {
        &self.phi
    }

    pub fn cumulative_phi(&self) -> f64 {
        self.cumulative_phi
    }

    pub fn mortality(&self, subdivision: usize) -> f64 {
        self.mortality_m[subdivision]
    }

    pub fn steepness(&self) -> f64 {
        self.steepness
    }

    pub fn virgin_recruits(&self) -> f64 {
        self.virgin_recruits
    }
}

/// Immutable identity plus meristics; one instance per modeled stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Species {
    name: String,
    meristics: Meristics,
}

impl Species {
    pub fn new(name: impl Into<String>, meristics: Meristics) -> Self {
        Self { name: name.into(), meristics }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn meristics(&self) -> &Meristics {
        &self.meristics
    }

    pub fn number_of_bins(&self) -> usize {
        self.meristics.bins
    }

    pub fn number_of_subdivisions(&self) -> usize {
        self.meristics.subdivisions
    }

    pub fn length(&self, subdivision: usize, bin: usize) -> f64 {
        self.meristics.length(subdivision, bin)
    }

    pub fn weight(&self, subdivision: usize, bin: usize) -> f64 {
        self.meristics.weight(subdivision, bin)
    }
}

/// The set of species in the model, indexed by position. Built once at setup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeciesRoster {
    species: Vec<Species>,
}

impl SpeciesRoster {
    pub fn new(species: Vec<Species>) -> Self {
        Self { species }
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn get(&self, index: usize) -> &Species {
        &self.species[index]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.species.iter().position(|s| s.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Species> {
        self.species.iter()
    }
}
