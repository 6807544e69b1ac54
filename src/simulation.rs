//! Simulation driver: owns the grid, the biology field and the scheduled
//! processes, and advances them one simulated day at a time.
//!
//! Processes register explicitly at startup (no global factory tables); the
//! driver only distinguishes their cadence. Daily processes run every step,
//! yearly processes run on the last day of each simulated year.

use crate::allocator::{
    AbundanceInitializer, BiomassInitializer, BiomassReallocator, InitialBiomass,
    MultiSpeciesInitializer,
};
use crate::abundance::StructuredAbundance;
use crate::biology::{BiologyField, LocalBiology};
use crate::config::{Config, StockConfig};
use crate::diffusion::{BiomassDiffuser, ConstantRateAbundanceDiffuser, DiffusionRate};
use crate::error::EngineError;
use crate::grid::GridTopology;
use crate::growth::{DerisoSchnuteGrower, LogisticGrower};
use crate::recruitment::{NaturalProcesses, RecruitmentBySpawningBiomass};
use crate::species::{Meristics, Species, SpeciesRoster};
use crate::stats::Stats;
use log::{debug, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// How often a scheduled process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Daily,
    Yearly,
}

/// Mutable view of the simulation state handed to each process tick.
pub struct TickContext<'a> {
    pub grid: &'a GridTopology,
    pub roster: &'a SpeciesRoster,
    pub field: &'a mut BiologyField,
    pub day: u64,
}

/// A process the driver steps at a fixed cadence. Diffusers and growers
/// are the only mutators of the biology field once the run starts.
pub trait ScheduledProcess {
    fn cadence(&self) -> Cadence;
    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), EngineError>;
    /// Recruits produced by the last tick, for stats collection.
    fn last_recruits(&self) -> Option<(usize, f64)> {
        None
    }
}

impl ScheduledProcess for BiomassDiffuser {
    fn cadence(&self) -> Cadence {
        Cadence::Daily
    }

    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), EngineError> {
        self.step(ctx.grid, ctx.field);
        Ok(())
    }
}

impl ScheduledProcess for ConstantRateAbundanceDiffuser {
    fn cadence(&self) -> Cadence {
        Cadence::Daily
    }

    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), EngineError> {
        self.step(ctx.grid, ctx.roster, ctx.field);
        Ok(())
    }
}

impl ScheduledProcess for LogisticGrower {
    fn cadence(&self) -> Cadence {
        Cadence::Yearly
    }

    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), EngineError> {
        self.step(ctx.field);
        Ok(())
    }
}

impl ScheduledProcess for DerisoSchnuteGrower {
    fn cadence(&self) -> Cadence {
        Cadence::Yearly
    }

    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), EngineError> {
        self.step(ctx.field)
    }

    fn last_recruits(&self) -> Option<(usize, f64)> {
        Some((self.species_index(), DerisoSchnuteGrower::last_recruits(self)))
    }
}

/// Fires a biomass reallocation every `interval_years` year boundaries.
pub struct ScheduledReallocation {
    reallocator: BiomassReallocator,
    interval_years: u64,
    years_seen: u64,
}

impl ScheduledReallocation {
    pub fn new(reallocator: BiomassReallocator, interval_years: u64) -> Self {
        Self { reallocator, interval_years: interval_years.max(1), years_seen: 0 }
    }
}

impl ScheduledProcess for ScheduledReallocation {
    fn cadence(&self) -> Cadence {
        Cadence::Yearly
    }

    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), EngineError> {
        self.years_seen += 1;
        if self.years_seen % self.interval_years != 0 {
            return Ok(());
        }
        self.reallocator.reallocate(ctx.grid, ctx.roster, ctx.field)
    }
}

impl ScheduledProcess for NaturalProcesses {
    fn cadence(&self) -> Cadence {
        Cadence::Yearly
    }

    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), EngineError> {
        self.step(ctx.grid, ctx.roster, ctx.field)
    }

    fn last_recruits(&self) -> Option<(usize, f64)> {
        Some((self.species_index(), NaturalProcesses::last_recruits(self)))
    }
}

/// The running model.
pub struct Simulation {
    grid: GridTopology,
    roster: SpeciesRoster,
    field: BiologyField,
    processes: Vec<Box<dyn ScheduledProcess>>,
    days_per_year: u64,
    pub day: u64,
    pub stats: Stats,
}

impl Simulation {
    pub fn new(grid: GridTopology, roster: SpeciesRoster, field: BiologyField) -> Self {
        let species_count = roster.len();
        Self {
            grid,
            roster,
            field,
            processes: Vec::new(),
            days_per_year: 365,
            day: 0,
            stats: Stats::new(species_count),
        }
    }

    /// Build the whole model from a validated configuration.
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        config.validate()?;
        let grid = GridTopology::open_water(config.grid.width, config.grid.height, config.grid.depth);
        let mut rng = ChaCha8Rng::seed_from_u64(config.simulation.seed);

        let roster = SpeciesRoster::new(
            config
                .species
                .iter()
                .map(|entry| Species::new(entry.name.clone(), meristics_for(&entry.stock)))
                .collect(),
        );
        let mut field: BiologyField = vec![LocalBiology::Empty; grid.cell_count()];
        let mut processes: Vec<Box<dyn ScheduledProcess>> = Vec::new();

        let age_structured =
            matches!(config.species[0].stock, StockConfig::AgeStructured { .. });
        if age_structured {
            let mut multi = MultiSpeciesInitializer::default();
            for entry in &config.species {
                let StockConfig::AgeStructured { initial_counts, .. } = &entry.stock else {
                    unreachable!("validate() rejects mixed representations");
                };
                multi.add(AbundanceInitializer::new(
                    entry.name.clone(),
                    StructuredAbundance::from_rows(initial_counts.clone()),
                    entry.allocator.clone(),
                    1.0,
                ));
            }
            multi.populate(&grid, &roster, &mut field)?;
        } else {
            for entry in &config.species {
                let (capacity, initial) = match &entry.stock {
                    StockConfig::Logistic {
                        carrying_capacity,
                        initial_biomass,
                        initial_fraction,
                        ..
                    } => (
                        *carrying_capacity,
                        match initial_fraction {
                            Some(range) => {
                                InitialBiomass::RandomFraction { min: range.min, max: range.max }
                            }
                            None => InitialBiomass::Total(*initial_biomass),
                        },
                    ),
                    StockConfig::DelayedRecruitment {
                        carrying_capacity, initial_biomass, ..
                    } => (*carrying_capacity, InitialBiomass::Total(*initial_biomass)),
                    StockConfig::AgeStructured { .. } => unreachable!(),
                };
                let initializer = BiomassInitializer::new(
                    entry.name.clone(),
                    capacity,
                    initial,
                    entry.allocator.clone(),
                );
                let registry = initializer.create_empty_state(&grid, &roster, &mut field);
                initializer.allocate(&registry, &roster, &mut field, &mut rng)?;
            }
        }

        // one shared gradient diffuser covers every aggregated species
        if !age_structured {
            let rates: Vec<DiffusionRate> = config
                .species
                .iter()
                .map(|entry| {
                    entry.diffusion
                        .as_ref()
                        .and_then(|d| d.rate)
                        .unwrap_or(DiffusionRate { differential_fraction: 0.0, daily_cap: 0.0 })
                })
                .collect();
            if rates.iter().any(|r| r.differential_fraction > 0.0) {
                processes.push(Box::new(BiomassDiffuser::weighted(rates)));
            }
        }

        for (index, entry) in config.species.iter().enumerate() {
            match &entry.stock {
                StockConfig::Logistic { growth_rate, .. } => {
                    processes.push(Box::new(LogisticGrower::new(index, *growth_rate)));
                }
                StockConfig::DelayedRecruitment {
                    rho,
                    natural_survival_rate,
                    steepness,
                    recruitment_lag,
                    weight_at_recruitment,
                    weight_at_recruitment_minus1,
                    initial_recruits,
                    empirical_biomasses,
                    ..
                } => {
                    let mut grower = DerisoSchnuteGrower::new(
                        &entry.name,
                        index,
                        empirical_biomasses,
                        None,
                        *rho,
                        *natural_survival_rate,
                        *steepness,
                        *recruitment_lag,
                        *weight_at_recruitment,
                        *weight_at_recruitment_minus1,
                        *initial_recruits,
                    )?;
                    grower.set_redistribution_weights(capacity_weights(&field, index))?;
                    processes.push(Box::new(grower));
                }
                StockConfig::AgeStructured { steepness, virgin_recruits, .. } => {
                    let species = roster.get(index);
                    let recruitment = RecruitmentBySpawningBiomass::new(
                        *virgin_recruits,
                        *steepness,
                        species.meristics().cumulative_phi(),
                    );
                    let mut natural = NaturalProcesses::new(index, recruitment);
                    for (cell, biology) in field.iter().enumerate() {
                        if biology.as_abundance().is_some() {
                            natural.add_governed_cell(cell);
                        }
                    }
                    processes.push(Box::new(natural));
                    if let Some(rate) =
                        entry.diffusion.as_ref().and_then(|d| d.abundance_rate)
                    {
                        processes
                            .push(Box::new(ConstantRateAbundanceDiffuser::new(index, rate)));
                    }
                }
            }
        }

        // reallocation runs after the growers on its boundary day
        for entry in &config.species {
            let Some(reallocation) = &entry.reallocation else {
                continue;
            };
            let allocator =
                reallocation.allocator.clone().unwrap_or_else(|| entry.allocator.clone());
            processes.push(Box::new(ScheduledReallocation::new(
                BiomassReallocator::new(entry.name.clone(), allocator),
                reallocation.interval_years,
            )));
        }

        info!(
            "model built: {} species over {} water cells, {} scheduled processes",
            roster.len(),
            grid.water_cell_count(),
            processes.len()
        );

        let species_count = roster.len();
        let mut simulation = Self {
            grid,
            roster,
            field,
            processes,
            days_per_year: config.simulation.days_per_year,
            day: 0,
            stats: Stats::new(species_count),
        };
        simulation.refresh_stats();
        Ok(simulation)
    }

    pub fn register(&mut self, process: Box<dyn ScheduledProcess>) {
        self.processes.push(process);
    }

    pub fn grid(&self) -> &GridTopology {
        &self.grid
    }

    pub fn roster(&self) -> &SpeciesRoster {
        &self.roster
    }

    pub fn field(&self) -> &BiologyField {
        &self.field
    }

    pub fn field_mut(&mut self) -> &mut BiologyField {
        &mut self.field
    }

    pub fn total_biomass(&self, species_index: usize) -> f64 {
        self.field.iter().map(|b| b.biomass(&self.roster, species_index)).sum()
    }

    /// Advance one simulated day.
    pub fn step_day(&mut self) -> Result<(), EngineError> {
        let year_boundary = (self.day + 1) % self.days_per_year == 0;
        let mut processes = std::mem::take(&mut self.processes);
        let result = (|| {
            for process in &mut processes {
                let due = match process.cadence() {
                    Cadence::Daily => true,
                    Cadence::Yearly => year_boundary,
                };
                if !due {
                    continue;
                }
                let mut ctx = TickContext {
                    grid: &self.grid,
                    roster: &self.roster,
                    field: &mut self.field,
                    day: self.day,
                };
                process.tick(&mut ctx)?;
            }
            Ok(())
        })();
        if year_boundary {
            for process in &processes {
                if let Some((species, recruits)) = process.last_recruits() {
                    self.stats.record_recruits(species, recruits);
                }
            }
            debug!("year boundary at day {}", self.day);
        }
        self.processes = processes;
        result?;
        self.day += 1;
        self.refresh_stats();
        Ok(())
    }

    /// Run for the given number of days.
    pub fn run(&mut self, days: u64) -> Result<(), EngineError> {
        for _ in 0..days {
            self.step_day()?;
        }
        Ok(())
    }

    fn refresh_stats(&mut self) {
        let day = self.day;
        self.stats.update(&self.roster, &self.field, day);
    }
}

fn meristics_for(stock: &StockConfig) -> Meristics {
    match stock {
        // aggregated stocks carry no real age structure
        StockConfig::Logistic { .. } | StockConfig::DelayedRecruitment { .. } => {
            Meristics::from_single_list(vec![1.0], vec![1.0])
        }
        StockConfig::AgeStructured {
            male,
            female,
            maturity_inflection,
            maturity_slope,
            fecundity_intercept,
            fecundity_slope,
            steepness,
            virgin_recruits,
            ..
        } => Meristics::from_growth_curves(
            male,
            female,
            *maturity_inflection,
            *maturity_slope,
            *fecundity_intercept,
            *fecundity_slope,
            *steepness,
            *virgin_recruits,
        ),
    }
}

/// Capacity-proportional redistribution weights over the populated cells.
fn capacity_weights(field: &BiologyField, species_index: usize) -> Vec<(usize, f64)> {
    let raw: Vec<(usize, f64)> = field
        .iter()
        .enumerate()
        .filter_map(|(cell, biology)| {
            biology
                .as_biomass()
                .map(|b| (cell, b.carrying_capacity(species_index)))
                .filter(|&(_, k)| k > 0.0)
        })
        .collect();
    let sum: f64 = raw.iter().map(|&(_, w)| w).sum();
    raw.into_iter().map(|(cell, w)| (cell, w / sum)).collect()
}
