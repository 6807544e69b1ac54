//! Yearly natural processes for age-structured stocks: spawning-biomass
//! recruitment, exponential natural mortality, cohort aging and the
//! allocation of new recruits back onto the grid.

use crate::abundance::StructuredAbundance;
use crate::allocator::Allocator;
use crate::biology::BiologyField;
use crate::error::EngineError;
use crate::grid::{CellId, GridTopology};
use crate::species::{Species, SpeciesRoster, FEMALE};

/// Beverton-Holt recruitment driven by female spawning biomass.
#[derive(Debug, Clone, PartialEq)]
pub struct RecruitmentBySpawningBiomass {
    virgin_recruits: f64,
    steepness: f64,
    cumulative_phi: f64,
    /// weigh each female by eggs-per-kg as well as by maturity
    use_relative_fecundity: bool,
}

impl RecruitmentBySpawningBiomass {
    pub fn new(virgin_recruits: f64, steepness: f64, cumulative_phi: f64) -> Self {
        Self { virgin_recruits, steepness, cumulative_phi, use_relative_fecundity: false }
    }

    pub fn with_relative_fecundity(mut self) -> Self {
        self.use_relative_fecundity = true;
        self
    }

    /// Female spawning biomass of the given (basin-wide) abundance.
    pub fn spawning_biomass(&self, species: &Species, abundance: &StructuredAbundance) -> f64 {
        let meristics = species.meristics();
        let maturity = meristics.maturity();
        let fecundity = meristics.relative_fecundity();
        let mut spawning = 0.0;
        for bin in 0..meristics.number_of_bins() {
            let weight = meristics.weight(FEMALE, bin);
            if weight <= 0.0 {
                continue;
            }
            let mut contribution = weight * maturity[bin] * abundance.get(FEMALE, bin);
            if self.use_relative_fecundity {
                contribution *= fecundity[bin];
            }
            spawning += contribution;
        }
        spawning
    }

    /// Recruits produced this year, across both sexes.
    pub fn recruit(&self, species: &Species, abundance: &StructuredAbundance) -> f64 {
        let spawning = self.spawning_biomass(species, abundance);
        let (h, r0) = (self.steepness, self.virgin_recruits);
        (4.0 * h * r0 * spawning)
            / (r0 * self.cumulative_phi * (1.0 - h) + (5.0 * h - 1.0) * spawning)
    }
}

/// Yearly exponential survival, one instantaneous rate per subdivision.
/// With `rounding` every surviving cohort count truncates to whole fish.
pub fn exponential_mortality(
    abundance: &mut StructuredAbundance,
    mortality_per_subdivision: &[f64],
    rounding: bool,
) {
    for sub in 0..abundance.subdivisions() {
        let survival = (-mortality_per_subdivision[sub]).exp();
        for bin in 0..abundance.bins() {
            let mut survivors = abundance.get(sub, bin) * survival;
            if rounding {
                survivors = survivors.floor();
            }
            abundance.set(sub, bin, survivors);
        }
    }
}

/// Shifts every cohort up one bin. The youngest bin empties (recruits fill
/// it afterwards); the oldest bin accumulates as a plus-group when
/// `preserve_oldest` is set, and dies off otherwise.
pub fn age_cohorts(abundance: &mut StructuredAbundance, preserve_oldest: bool) {
    let bins = abundance.bins();
    if bins == 0 {
        return;
    }
    for sub in 0..abundance.subdivisions() {
        let last = bins - 1;
        if preserve_oldest && bins >= 2 {
            abundance.add(sub, last, abundance.get(sub, last - 1));
        } else if bins >= 2 {
            abundance.set(sub, last, abundance.get(sub, last - 1));
        }
        for bin in (1..last).rev() {
            abundance.set(sub, bin, abundance.get(sub, bin - 1));
        }
        abundance.set(sub, 0, 0.0);
    }
}

/// The yearly pipeline for one age-structured species over its governed
/// cells: count recruits from pre-mortality spawners, cull, age, then seed
/// the youngest bin where the recruits land.
#[derive(Debug, Clone)]
pub struct NaturalProcesses {
    species_index: usize,
    recruitment: RecruitmentBySpawningBiomass,
    /// recruits land by this allocator when set, by standing biomass otherwise
    recruits_allocator: Option<Allocator>,
    governed: Vec<CellId>,
    preserve_oldest: bool,
    rounding: bool,
    last_recruits: f64,
}

impl NaturalProcesses {
    pub fn new(species_index: usize, recruitment: RecruitmentBySpawningBiomass) -> Self {
        Self {
            species_index,
            recruitment,
            recruits_allocator: None,
            governed: Vec::new(),
            preserve_oldest: true,
            rounding: false,
            last_recruits: 0.0,
        }
    }

    pub fn with_recruits_allocator(mut self, allocator: Allocator) -> Self {
        self.recruits_allocator = Some(allocator);
        self
    }

    pub fn with_rounding(mut self) -> Self {
        self.rounding = true;
        self
    }

    /// The oldest bin dies off each year instead of accumulating.
    pub fn without_plus_group(mut self) -> Self {
        self.preserve_oldest = false;
        self
    }

    /// Registers a cell this process governs. Cells registered twice would
    /// be culled and aged twice, so this refuses duplicates.
    pub fn add_governed_cell(&mut self, cell: CellId) {
        if !self.governed.contains(&cell) {
            self.governed.push(cell);
        }
    }

    pub fn governed_cells(&self) -> &[CellId] {
        &self.governed
    }

    pub fn species_index(&self) -> usize {
        self.species_index
    }

    pub fn last_recruits(&self) -> f64 {
        self.last_recruits
    }

    pub fn step(
        &mut self,
        grid: &GridTopology,
        roster: &SpeciesRoster,
        field: &mut BiologyField,
    ) -> Result<(), EngineError> {
        let species = roster.get(self.species_index);
        let meristics = species.meristics();

        // recruits answer to this year's spawners, before mortality hits
        let total = StructuredAbundance::sum(
            self.governed
                .iter()
                .filter_map(|&cell| field[cell].as_abundance())
                .map(|biology| biology.abundance(self.species_index)),
        );
        let Some(total) = total else {
            return Ok(());
        };
        let mut recruits = self.recruitment.recruit(species, &total);
        if self.rounding {
            recruits = recruits.floor();
        }
        self.last_recruits = recruits;

        // destination weights are fixed before the cull changes the map
        let weights =
            if recruits > 0.0 { self.recruit_weights(grid, roster, field)? } else { Vec::new() };

        for &cell in &self.governed {
            let Some(biology) = field[cell].as_abundance_mut() else {
                continue;
            };
            let abundance = biology.abundance_mut(self.species_index);
            exponential_mortality(
                abundance,
                &(0..meristics.number_of_subdivisions())
                    .map(|sub| meristics.mortality(sub))
                    .collect::<Vec<_>>(),
                self.rounding,
            );
            age_cohorts(abundance, self.preserve_oldest);
        }

        if recruits <= 0.0 {
            return Ok(());
        }
        let subdivisions = meristics.number_of_subdivisions() as f64;
        let mut leftover = 0.0;
        for (cell, ratio) in weights {
            let Some(biology) = field[cell].as_abundance_mut() else {
                continue;
            };
            let abundance = biology.abundance_mut(self.species_index);
            let here = (recruits + leftover) * ratio;
            if self.rounding {
                let whole = here.floor();
                let per_subdivision = (whole / subdivisions).floor();
                for sub in 0..abundance.subdivisions() {
                    abundance.add(sub, 0, per_subdivision);
                }
                leftover = here - per_subdivision * subdivisions;
            } else {
                for sub in 0..abundance.subdivisions() {
                    abundance.add(sub, 0, here / subdivisions);
                }
            }
        }
        Ok(())
    }

    /// Normalized destination weights for this year's recruits.
    fn recruit_weights(
        &self,
        grid: &GridTopology,
        roster: &SpeciesRoster,
        field: &BiologyField,
    ) -> Result<Vec<(CellId, f64)>, EngineError> {
        let species = self.species_index;
        let raw: Vec<(CellId, f64)> = match &self.recruits_allocator {
            Some(allocator) => self
                .governed
                .iter()
                .map(|&cell| (cell, allocator.weight(cell, grid)))
                .collect(),
            None => self
                .governed
                .iter()
                .map(|&cell| (cell, field[cell].biomass(roster, species)))
                .collect(),
        };
        let sum: f64 = raw.iter().map(|&(_, w)| w).sum();
        if !sum.is_finite() || sum <= 0.0 {
            return Err(EngineError::NonNormalizableWeights {
                species: format!("species #{species} recruits"),
                sum,
            });
        }
        Ok(raw.into_iter().map(|(cell, w)| (cell, w / sum)).collect())
    }
}
