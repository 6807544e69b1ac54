//! Biomass growth models: independent logistic growth per cell and the
//! basin-wide Deriso-Schnute delayed recruitment model.
//!
//! These are the only processes that create biomass; everything else in the
//! engine redistributes or removes it.

use crate::biology::BiologyField;
use crate::error::EngineError;
use crate::grid::CellId;
use log::warn;
use std::collections::VecDeque;

const EPSILON: f64 = 1e-9;

/// Per-cell logistic growth toward carrying capacity.
///
/// `biomass += r * biomass * (1 - biomass / capacity)`, floored at zero.
/// Biomass above capacity is not clipped; the negative increment pulls the
/// overshoot back down across subsequent steps.
#[derive(Debug, Clone)]
pub struct LogisticGrower {
    species_index: usize,
    /// malthusian growth rate per step
    rate: f64,
}

impl LogisticGrower {
    pub fn new(species_index: usize, rate: f64) -> Self {
        Self { species_index, rate }
    }

    pub fn step(&self, field: &mut BiologyField) {
        for cell in field.iter_mut() {
            let Some(biology) = cell.as_biomass_mut() else {
                continue;
            };
            let capacity = biology.carrying_capacity(self.species_index);
            if capacity <= 0.0 {
                continue;
            }
            let biomass = biology.biomass(self.species_index);
            let increment = self.rate * biomass * (1.0 - biomass / capacity);
            biology.add_biomass(self.species_index, increment);
        }
    }
}

/// One year of the Deriso-Schnute recursion: the basin biomass after
/// natural mortality, growth and delayed recruitment, plus the recruit
/// count to feed back next year.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerisoSchnuteStep {
    pub biomass: f64,
    pub recruits: f64,
}

/// Advances the Deriso-Schnute recursion by one year, updating both queues
/// in place.
///
/// `previous_biomasses` holds the last `lag` end-of-year biomasses, newest
/// at the back; its front entry is this year's spawners. `survival_rates`
/// is the two-element window of realized survival rates, newest at the
/// back. Both queues keep their length across the call.
#[allow(clippy::too_many_arguments)]
pub fn deriso_schnute_step(
    current_biomass: f64,
    virgin_biomass: f64,
    previous_biomasses: &mut VecDeque<f64>,
    survival_rates: &mut VecDeque<f64>,
    natural_survival_rate: f64,
    steepness: f64,
    weight_at_recruitment: f64,
    rho: f64,
    weight_at_recruitment_minus1: f64,
    previous_recruits: f64,
) -> DerisoSchnuteStep {
    let virgin_recruits = virgin_biomass
        * (1.0 - (1.0 + rho) * natural_survival_rate
            + rho * natural_survival_rate * natural_survival_rate)
        / (weight_at_recruitment - rho * natural_survival_rate * weight_at_recruitment_minus1);
    let alpha = (1.0 - steepness) / (4.0 * steepness * virgin_recruits);
    let beta = (5.0 * steepness - 1.0) / (4.0 * steepness * virgin_recruits);

    // the newest queue entry is last year's end-of-year biomass; the one
    // before it feeds the rho correction term
    let previous_biomass = previous_biomasses[previous_biomasses.len() - 2];
    let last_recorded = *previous_biomasses.back().unwrap_or(&current_biomass);
    let true_survival_rate = current_biomass / last_recorded * natural_survival_rate;
    survival_rates.pop_front();
    survival_rates.push_back(true_survival_rate);

    // spawners are the biomass `lag` years ago
    let spawners = previous_biomasses.pop_front().unwrap_or(0.0);
    let depletion = spawners / virgin_biomass;
    let recruits = depletion / (alpha + beta * depletion);

    let biomass = (1.0 + rho) * current_biomass * natural_survival_rate
        - rho * survival_rates[0] * survival_rates[1] * previous_biomass
        - rho * survival_rates[1] * weight_at_recruitment_minus1 * previous_recruits
        + weight_at_recruitment * recruits;
    previous_biomasses.push_back(biomass);

    DerisoSchnuteStep { biomass, recruits }
}

/// Grows one species' biomass basin-wide with the Deriso-Schnute recursion
/// and redistributes the yearly change across its governed cells through a
/// fixed per-cell weight map.
#[derive(Debug, Clone)]
pub struct DerisoSchnuteGrower {
    species_index: usize,
    rho: f64,
    natural_survival_rate: f64,
    steepness: f64,
    weight_at_recruitment: f64,
    weight_at_recruitment_minus1: f64,
    previous_biomasses: VecDeque<f64>,
    survival_rates: VecDeque<f64>,
    last_recruits: f64,
    redistribution_weights: Option<Vec<(CellId, f64)>>,
}

impl DerisoSchnuteGrower {
    /// `empirical_yearly_biomasses` is the assessed end-of-year biomass
    /// series, oldest first; the last `lag` entries seed the recruitment
    /// delay queue. `empirical_survival_rates`, when given, seeds the
    /// two-year survival window; otherwise the stock is assumed unfished
    /// and the window starts at the natural survival rate.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        species_name: &str,
        species_index: usize,
        empirical_yearly_biomasses: &[f64],
        empirical_survival_rates: Option<&[f64]>,
        rho: f64,
        natural_survival_rate: f64,
        steepness: f64,
        lag: usize,
        weight_at_recruitment: f64,
        weight_at_recruitment_minus1: f64,
        initial_recruits: f64,
    ) -> Result<Self, EngineError> {
        if empirical_yearly_biomasses.is_empty() {
            return Err(EngineError::EmptyBiomassSeries(species_name.to_string()));
        }
        if lag > empirical_yearly_biomasses.len() {
            return Err(EngineError::LagBeyondSeries {
                lag,
                len: empirical_yearly_biomasses.len(),
            });
        }
        if lag < 2 {
            return Err(EngineError::InvalidConfig(format!(
                "recruitment lag for `{species_name}` must be at least 2 years, got {lag}"
            )));
        }

        let start = empirical_yearly_biomasses.len() - lag;
        let previous_biomasses: VecDeque<f64> =
            empirical_yearly_biomasses[start..].iter().copied().collect();
        let survival_rates: VecDeque<f64> = match empirical_survival_rates {
            Some(rates) if rates.len() >= 2 => rates[rates.len() - 2..].iter().copied().collect(),
            Some(rates) => {
                return Err(EngineError::InvalidConfig(format!(
                    "survival rate series for `{species_name}` needs 2 entries, got {}",
                    rates.len()
                )))
            }
            None => [natural_survival_rate; 2].into_iter().collect(),
        };

        Ok(Self {
            species_index,
            rho,
            natural_survival_rate,
            steepness,
            weight_at_recruitment,
            weight_at_recruitment_minus1,
            previous_biomasses,
            survival_rates,
            last_recruits: initial_recruits,
            redistribution_weights: None,
        })
    }

    /// The fixed share of every yearly biomass change each governed cell
    /// receives. Weights must be non-negative and sum to one.
    pub fn set_redistribution_weights(
        &mut self,
        weights: Vec<(CellId, f64)>,
    ) -> Result<(), EngineError> {
        let sum: f64 = weights.iter().map(|&(_, w)| w).sum();
        if !sum.is_finite() || (sum - 1.0).abs() > 1e-6 || weights.iter().any(|&(_, w)| w < 0.0) {
            return Err(EngineError::BadRedistributionWeights(sum));
        }
        self.redistribution_weights = Some(weights);
        Ok(())
    }

    pub fn species_index(&self) -> usize {
        self.species_index
    }

    pub fn last_recruits(&self) -> f64 {
        self.last_recruits
    }

    /// One yearly step: aggregate the governed cells, run the recursion,
    /// then spread the resulting change back through the weight map.
    pub fn step(&mut self, field: &mut BiologyField) -> Result<(), EngineError> {
        let weights = self
            .redistribution_weights
            .clone()
            .ok_or(EngineError::RedistributionWeightsUnset)?;

        let mut current_biomass = 0.0;
        let mut virgin_biomass = 0.0;
        for &(cell, _) in &weights {
            if let Some(biology) = field[cell].as_biomass() {
                current_biomass += biology.biomass(self.species_index);
                virgin_biomass += biology.carrying_capacity(self.species_index);
            }
        }

        let step = deriso_schnute_step(
            current_biomass,
            virgin_biomass,
            &mut self.previous_biomasses,
            &mut self.survival_rates,
            self.natural_survival_rate,
            self.steepness,
            self.weight_at_recruitment,
            self.rho,
            self.weight_at_recruitment_minus1,
            self.last_recruits,
        );
        self.last_recruits = step.recruits;

        let delta = step.biomass - current_biomass;
        if delta.abs() < EPSILON {
            return Ok(());
        }
        self.redistribute(field, &weights, delta);
        Ok(())
    }

    /// Applies `delta * weight` to each governed cell. A removal larger
    /// than a cell's standing biomass clamps that cell at zero and passes
    /// the shortfall on to the cells that still hold fish, re-weighted
    /// among them, until the whole delta has landed.
    fn redistribute(&self, field: &mut BiologyField, weights: &[(CellId, f64)], delta: f64) {
        let mut remaining = delta;
        while remaining.abs() >= EPSILON {
            let eligible: Vec<(CellId, f64)> = weights
                .iter()
                .copied()
                .filter(|&(cell, weight)| {
                    weight > 0.0
                        && (remaining > 0.0
                            || field[cell]
                                .as_biomass()
                                .map_or(false, |b| b.biomass(self.species_index) > 0.0))
                })
                .collect();
            let weight_sum: f64 = eligible.iter().map(|&(_, w)| w).sum();
            if eligible.is_empty() || weight_sum <= 0.0 {
                break;
            }
            let before = remaining.abs();
            let mut shortfall = 0.0;
            for (cell, weight) in eligible {
                let share = remaining * weight / weight_sum;
                let Some(biology) = field[cell].as_biomass_mut() else {
                    shortfall += share;
                    continue;
                };
                let standing = biology.biomass(self.species_index);
                if share < 0.0 && standing + share < 0.0 {
                    shortfall += standing + share;
                    biology.set_biomass(self.species_index, 0.0);
                } else {
                    biology.add_biomass(self.species_index, share);
                }
            }
            remaining = shortfall;
            // every pass must land part of the delta, or no cell can absorb
            // what is left
            if remaining.abs() >= before {
                break;
            }
        }
        if remaining.abs() >= EPSILON {
            warn!(
                "species {}: biomass change of {:.3} had nowhere to land and was dropped",
                self.species_index, remaining
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biology::{BiomassLocalBiology, LocalBiology};

    fn biomass_field(values: &[(f64, f64)]) -> BiologyField {
        values
            .iter()
            .map(|&(b, k)| LocalBiology::Biomass(BiomassLocalBiology::new(vec![b], vec![k])))
            .collect()
    }

    fn biomasses(field: &BiologyField) -> Vec<f64> {
        field.iter().map(|b| b.as_biomass().unwrap().biomass(0)).collect()
    }

    #[test]
    fn test_logistic_growth_step() {
        let mut field = biomass_field(&[(100.0, 400.0)]);
        let grower = LogisticGrower::new(0, 0.2);
        grower.step(&mut field);
        // 100 + 0.2 * 100 * (1 - 100/400)
        assert!((biomasses(&field)[0] - 115.0).abs() < 1e-9);
    }

    #[test]
    fn test_logistic_growth_is_stationary_at_capacity_and_zero() {
        let mut field = biomass_field(&[(400.0, 400.0), (0.0, 400.0), (10.0, 0.0)]);
        let grower = LogisticGrower::new(0, 0.5);
        grower.step(&mut field);
        assert_eq!(biomasses(&field), vec![400.0, 0.0, 10.0]);
    }

    #[test]
    fn test_logistic_overshoot_decays_without_clipping() {
        let mut field = biomass_field(&[(500.0, 400.0)]);
        let grower = LogisticGrower::new(0, 0.2);
        grower.step(&mut field);
        // 500 + 0.2 * 500 * (1 - 1.25) = 475, not snapped to 400
        assert!((biomasses(&field)[0] - 475.0).abs() < 1e-9);
    }

    #[test]
    fn test_deriso_schnute_virgin_equilibrium() {
        // rho = 0 collapses the recursion to survival plus recruitment;
        // with survival 0.8, steepness 0.6, unit recruit weight and virgin
        // biomass 1000 the virgin state reproduces itself exactly
        let mut biomasses: VecDeque<f64> = [1000.0, 1000.0].into_iter().collect();
        let mut survivals: VecDeque<f64> = [0.8, 0.8].into_iter().collect();
        let step = deriso_schnute_step(
            1000.0, 1000.0, &mut biomasses, &mut survivals, 0.8, 0.6, 1.0, 0.0, 1.0, 200.0,
        );
        assert!((step.recruits - 200.0).abs() < 1e-9);
        assert!((step.biomass - 1000.0).abs() < 1e-9);
        assert_eq!(biomasses.len(), 2);
        assert_eq!(survivals.len(), 2);
    }

    #[test]
    fn test_deriso_schnute_after_fishing() {
        // 100 units were fished out this year; recruitment still answers to
        // the unfished spawners from two years back
        let mut biomasses: VecDeque<f64> = [1000.0, 1000.0].into_iter().collect();
        let mut survivals: VecDeque<f64> = [0.8, 0.8].into_iter().collect();
        let step = deriso_schnute_step(
            900.0, 1000.0, &mut biomasses, &mut survivals, 0.8, 0.6, 1.0, 0.0, 1.0, 200.0,
        );
        assert!((step.recruits - 200.0).abs() < 1e-9);
        assert!((step.biomass - 920.0).abs() < 1e-9);
        // realized survival reflects the catch
        assert!((survivals[1] - 0.72).abs() < 1e-9);
        // the new biomass joined the delay queue
        assert!((biomasses[1] - 920.0).abs() < 1e-9);
    }

    #[test]
    fn test_grower_rejects_bad_series() {
        let err = DerisoSchnuteGrower::new(
            "sablefish", 0, &[], None, 0.9, 0.95, 0.6, 3, 1.0, 0.9, 100.0,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::EmptyBiomassSeries(ref name) if name == "sablefish"));

        let err = DerisoSchnuteGrower::new(
            "sablefish", 0, &[1000.0, 1000.0], None, 0.9, 0.95, 0.6, 3, 1.0, 0.9, 100.0,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::LagBeyondSeries { lag: 3, len: 2 }));
    }

    #[test]
    fn test_grower_requires_weights_before_stepping() {
        let mut grower = DerisoSchnuteGrower::new(
            "sablefish", 0, &[1000.0, 1000.0], None, 0.0, 0.8, 0.6, 2, 1.0, 1.0, 200.0,
        )
        .unwrap();
        let mut field = biomass_field(&[(500.0, 500.0), (500.0, 500.0)]);
        let err = grower.step(&mut field).unwrap_err();
        assert!(matches!(err, EngineError::RedistributionWeightsUnset));

        let err = grower.set_redistribution_weights(vec![(0, 0.5), (1, 0.3)]).unwrap_err();
        assert!(matches!(err, EngineError::BadRedistributionWeights(_)));
    }

    #[test]
    fn test_grower_spreads_change_by_fixed_weights() {
        // virgin equilibrium parameters, with 100 units fished from cell 0:
        // basin moves from 900 to 920, so 20 spreads 25/75
        let mut grower = DerisoSchnuteGrower::new(
            "sablefish", 0, &[1000.0, 1000.0], None, 0.0, 0.8, 0.6, 2, 1.0, 1.0, 200.0,
        )
        .unwrap();
        grower.set_redistribution_weights(vec![(0, 0.25), (1, 0.75)]).unwrap();
        let mut field = biomass_field(&[(400.0, 500.0), (500.0, 500.0)]);
        grower.step(&mut field).unwrap();
        let result = biomasses(&field);
        assert!((result[0] - 405.0).abs() < 1e-9);
        assert!((result[1] - 515.0).abs() < 1e-9);
    }

    #[test]
    fn test_negative_delta_clamps_and_respreads() {
        let grower = DerisoSchnuteGrower::new(
            "sablefish", 0, &[1000.0, 1000.0], None, 0.0, 0.8, 0.6, 2, 1.0, 1.0, 200.0,
        )
        .unwrap();
        let mut field = biomass_field(&[(10.0, 500.0), (990.0, 500.0)]);
        grower.redistribute(&mut field, &[(0, 0.5), (1, 0.5)], -100.0);
        let result = biomasses(&field);
        // cell 0 can only give 10; the missing 40 comes out of cell 1
        assert!((result[0] - 0.0).abs() < 1e-9);
        assert!((result[1] - 900.0).abs() < 1e-9);
        assert!(((result[0] + result[1]) - 900.0).abs() < 1e-9);
    }

    #[test]
    fn test_removal_beyond_the_standing_stock_terminates_empty() {
        let grower = DerisoSchnuteGrower::new(
            "sablefish", 0, &[1000.0, 1000.0], None, 0.0, 0.8, 0.6, 2, 1.0, 1.0, 200.0,
        )
        .unwrap();
        // ask for more than the basin holds, across many uneven cells
        let cells: Vec<(f64, f64)> = (0..80).map(|i| ((i % 7) as f64, 500.0)).collect();
        let mut field = biomass_field(&cells);
        let weights: Vec<(CellId, f64)> =
            (0..80).map(|cell| (cell, 1.0 / 80.0)).collect();
        grower.redistribute(&mut field, &weights, -10_000.0);
        // the whole stock is gone and nothing went negative
        for b in biomasses(&field) {
            assert_eq!(b, 0.0);
        }
    }
}
