//! Daily biomass and abundance diffusion between adjacent cells.
//!
//! Every adjacent pair of water cells is visited exactly once per tick.
//! All moves are computed against a snapshot of the pre-tick state and
//! applied afterwards, so the pass order over pairs never changes the
//! outcome and the grid-wide total is conserved to the last bit of
//! floating-point tolerance.

use crate::biology::BiologyField;
use crate::grid::{CellId, GridTopology};
use crate::species::SpeciesRoster;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Per-species movement parameters for the gradient diffuser.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiffusionRate {
    /// fraction of the inter-cell biomass gap resolved per tick, in [0, 1]
    pub differential_fraction: f64,
    /// ceiling on the share of a cell's own biomass one pair may take, in [0, 1]
    pub daily_cap: f64,
}

/// Moves aggregated biomass down local gradients. Holds one rate per
/// roster species; a uniform diffuser repeats the same rate for all.
#[derive(Debug, Clone)]
pub struct BiomassDiffuser {
    rates: Vec<DiffusionRate>,
}

impl BiomassDiffuser {
    pub fn uniform(species_count: usize, rate: DiffusionRate) -> Self {
        Self { rates: vec![rate; species_count] }
    }

    /// Species-weighted variant: faster swimmers diffuse faster.
    pub fn weighted(rates: Vec<DiffusionRate>) -> Self {
        Self { rates }
    }

    /// One diffusion tick over the whole grid, every species independently.
    pub fn step(&self, grid: &GridTopology, field: &mut BiologyField) {
        for (species_index, rate) in self.rates.iter().enumerate() {
            self.step_species(grid, field, species_index, rate);
        }
    }

    fn step_species(
        &self,
        grid: &GridTopology,
        field: &mut BiologyField,
        species_index: usize,
        rate: &DiffusionRate,
    ) {
        let snapshot: Vec<Option<f64>> = field
            .iter()
            .map(|biology| biology.as_biomass().map(|b| b.biomass(species_index)))
            .collect();

        let mut moves: Vec<(CellId, CellId, f64)> = Vec::new();
        let mut outflow = vec![0.0; field.len()];
        for (a, b) in grid.adjacent_water_pairs() {
            let (Some(biomass_a), Some(biomass_b)) = (snapshot[a], snapshot[b]) else {
                continue;
            };
            let (from, to, gap) = if biomass_a >= biomass_b {
                (a, b, biomass_a - biomass_b)
            } else {
                (b, a, biomass_b - biomass_a)
            };
            if gap <= 0.0 {
                continue;
            }
            let desired = gap * rate.differential_fraction;
            let cap = snapshot[from].unwrap_or(0.0) * rate.daily_cap;
            let moving = desired.min(cap).max(0.0);
            if moving > 0.0 {
                moves.push((from, to, moving));
                outflow[from] += moving;
            }
        }

        // A cell touched by several pairs may have more scheduled outflow
        // than it holds; scale that cell's outgoing moves down uniformly so
        // both ends of every pair still agree on the amount exchanged.
        for (from, to, moving) in moves {
            let available = snapshot[from].unwrap_or(0.0);
            let scale = if outflow[from] > available { available / outflow[from] } else { 1.0 };
            let amount = moving * scale;
            if let Some(biology) = field[from].as_biomass_mut() {
                biology.add_biomass(species_index, -amount);
            }
            if let Some(biology) = field[to].as_biomass_mut() {
                biology.add_biomass(species_index, amount);
            }
        }
    }
}

/// Moves a constant fraction of every cohort's inter-cell count gap each
/// tick, independently per `[subdivision][bin]` entry.
#[derive(Debug, Clone)]
pub struct ConstantRateAbundanceDiffuser {
    species_index: usize,
    /// fraction of each cohort gap moved per tick, in [0, 1]
    rate: f64,
    /// truncate each moved amount to whole fish
    rounding: bool,
}

impl ConstantRateAbundanceDiffuser {
    pub fn new(species_index: usize, rate: f64) -> Self {
        Self { species_index, rate, rounding: false }
    }

    pub fn with_rounding(mut self) -> Self {
        self.rounding = true;
        self
    }

    pub fn step(&self, grid: &GridTopology, roster: &SpeciesRoster, field: &mut BiologyField) {
        let snapshot: Vec<Option<Array2<f64>>> = field
            .iter()
            .map(|biology| {
                biology.as_abundance().map(|b| b.abundance(self.species_index).as_matrix().clone())
            })
            .collect();

        let species = roster.get(self.species_index);
        let subdivisions = species.number_of_subdivisions();
        let bins = species.number_of_bins();

        let mut moves: Vec<(CellId, CellId, usize, usize, f64)> = Vec::new();
        let mut outflow: Vec<Array2<f64>> =
            vec![Array2::zeros((subdivisions, bins)); field.len()];
        for (a, b) in grid.adjacent_water_pairs() {
            let (Some(here), Some(there)) = (&snapshot[a], &snapshot[b]) else {
                continue;
            };
            for sub in 0..subdivisions {
                for bin in 0..bins {
                    let gap = here[[sub, bin]] - there[[sub, bin]];
                    let (from, to, gap) = if gap >= 0.0 { (a, b, gap) } else { (b, a, -gap) };
                    let moving = self.rate * gap;
                    if moving > 0.0 {
                        moves.push((from, to, sub, bin, moving));
                        outflow[from][[sub, bin]] += moving;
                    }
                }
            }
        }

        for (from, to, sub, bin, moving) in moves {
            let available = snapshot[from].as_ref().map_or(0.0, |m| m[[sub, bin]]);
            let scheduled = outflow[from][[sub, bin]];
            let scale = if scheduled > available { available / scheduled } else { 1.0 };
            // floor after the over-drain scaling so whole-fish moves stay whole
            let mut amount = moving * scale;
            if self.rounding {
                amount = amount.floor();
            }
            if amount <= 0.0 {
                continue;
            }
            if let Some(biology) = field[from].as_abundance_mut() {
                biology.abundance_mut(self.species_index).add(sub, bin, -amount);
            }
            if let Some(biology) = field[to].as_abundance_mut() {
                biology.abundance_mut(self.species_index).add(sub, bin, amount);
            }
        }
    }
}
