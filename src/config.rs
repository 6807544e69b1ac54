//! Configuration system for the engine.
//!
//! Supports YAML configuration files with sensible defaults.

use crate::allocator::Allocator;
use crate::diffusion::DiffusionRate;
use crate::error::EngineError;
use crate::species::GrowthCurve;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub grid: GridConfig,
    pub species: Vec<SpeciesConfig>,
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Grid/map configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Grid width in cells
    pub width: usize,
    /// Grid height in cells
    pub height: usize,
    /// Uniform water depth in meters (open-water basin)
    pub depth: f64,
}

/// Scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Days per simulated year
    pub days_per_year: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Days between stats logging
    pub stats_interval: u64,
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

/// One stock to simulate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesConfig {
    pub name: String,
    /// Where the stock lives on the grid
    pub allocator: Allocator,
    /// Population-dynamics model and its seed data
    pub stock: StockConfig,
    /// Daily movement between adjacent cells, if any
    #[serde(default)]
    pub diffusion: Option<DiffusionConfig>,
    /// Scheduled redistribution of the standing stock, if any
    #[serde(default)]
    pub reallocation: Option<ReallocationConfig>,
}

/// Scheduled biomass reallocation for one aggregated species
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReallocationConfig {
    /// Year boundaries between reallocation events
    pub interval_years: u64,
    /// Target distribution; defaults to the species allocator
    #[serde(default)]
    pub allocator: Option<Allocator>,
}

/// Uniform draw bounds, as fractions of cell carrying capacity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FractionRange {
    pub min: f64,
    pub max: f64,
}

/// Daily diffusion parameters for one species
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffusionConfig {
    /// Gradient diffusion for aggregated stocks
    #[serde(default)]
    pub rate: Option<DiffusionRate>,
    /// Constant-rate cohort diffusion for age-structured stocks
    #[serde(default)]
    pub abundance_rate: Option<f64>,
}

/// The three supported stock models
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum StockConfig {
    /// Independent logistic growth per cell
    Logistic {
        carrying_capacity: f64,
        initial_biomass: f64,
        /// malthusian growth rate applied yearly
        growth_rate: f64,
        /// when set, each cell instead draws its seed biomass uniformly
        /// between these fractions of its own capacity
        #[serde(default)]
        initial_fraction: Option<FractionRange>,
    },
    /// Basin-wide Deriso-Schnute delayed recruitment
    DelayedRecruitment {
        carrying_capacity: f64,
        initial_biomass: f64,
        rho: f64,
        natural_survival_rate: f64,
        steepness: f64,
        recruitment_lag: usize,
        weight_at_recruitment: f64,
        weight_at_recruitment_minus1: f64,
        initial_recruits: f64,
        /// assessed end-of-year biomasses, oldest first
        empirical_biomasses: Vec<f64>,
    },
    /// Age- and sex-structured stock with yearly natural processes
    AgeStructured {
        male: GrowthCurve,
        female: GrowthCurve,
        maturity_inflection: f64,
        maturity_slope: f64,
        fecundity_intercept: f64,
        fecundity_slope: f64,
        steepness: f64,
        virgin_recruits: f64,
        /// initial counts `[subdivision][bin]`
        initial_counts: Vec<Vec<f64>>,
    },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            species: vec![SpeciesConfig::default()],
            simulation: SimulationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { width: 50, height: 50, depth: 100.0 }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { seed: 0, days_per_year: 365 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { stats_interval: 30, log_level: "info".to_string() }
    }
}

impl Default for SpeciesConfig {
    fn default() -> Self {
        Self {
            name: "generic".to_string(),
            allocator: Allocator::Constant { weight: 1.0 },
            stock: StockConfig::Logistic {
                carrying_capacity: 1_000_000.0,
                initial_biomass: 500_000.0,
                growth_rate: 0.7,
                initial_fraction: None,
            },
            diffusion: Some(DiffusionConfig {
                rate: Some(DiffusionRate { differential_fraction: 0.001, daily_cap: 0.01 }),
                abundance_rate: None,
            }),
            reallocation: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.grid.width == 0 || self.grid.height == 0 {
            return Err(EngineError::InvalidConfig("grid must have at least one cell".into()));
        }
        if self.species.is_empty() {
            return Err(EngineError::InvalidConfig("at least one species is required".into()));
        }
        if self.simulation.days_per_year == 0 {
            return Err(EngineError::InvalidConfig("days_per_year must be > 0".into()));
        }
        let aggregated = self
            .species
            .iter()
            .filter(|s| !matches!(s.stock, StockConfig::AgeStructured { .. }))
            .count();
        if aggregated != 0 && aggregated != self.species.len() {
            return Err(EngineError::InvalidConfig(
                "all species must share one representation: either every stock is \
                 age-structured or none is"
                    .into(),
            ));
        }
        for species in &self.species {
            if let Some(reallocation) = &species.reallocation {
                if reallocation.interval_years == 0 {
                    return Err(EngineError::InvalidConfig(format!(
                        "`{}`: reallocation interval_years must be > 0",
                        species.name
                    )));
                }
                if matches!(species.stock, StockConfig::AgeStructured { .. }) {
                    return Err(EngineError::InvalidConfig(format!(
                        "`{}`: reallocation applies to aggregated stocks only",
                        species.name
                    )));
                }
            }
            match &species.stock {
                StockConfig::Logistic {
                    carrying_capacity,
                    initial_biomass,
                    growth_rate,
                    initial_fraction,
                } => {
                    if *carrying_capacity <= 0.0 {
                        return Err(EngineError::InvalidConfig(format!(
                            "`{}`: carrying_capacity must be > 0",
                            species.name
                        )));
                    }
                    if *initial_biomass < 0.0 || *growth_rate < 0.0 {
                        return Err(EngineError::InvalidConfig(format!(
                            "`{}`: initial_biomass and growth_rate must be non-negative",
                            species.name
                        )));
                    }
                    if let Some(range) = initial_fraction {
                        if !(0.0..=1.0).contains(&range.min)
                            || !(0.0..=1.0).contains(&range.max)
                            || range.min > range.max
                        {
                            return Err(EngineError::InvalidConfig(format!(
                                "`{}`: initial_fraction [{}, {}] must be ordered and within [0, 1]",
                                species.name, range.min, range.max
                            )));
                        }
                    }
                }
                StockConfig::DelayedRecruitment {
                    empirical_biomasses,
                    recruitment_lag,
                    steepness,
                    ..
                } => {
                    if empirical_biomasses.is_empty() {
                        return Err(EngineError::EmptyBiomassSeries(species.name.clone()));
                    }
                    if *recruitment_lag > empirical_biomasses.len() {
                        return Err(EngineError::LagBeyondSeries {
                            lag: *recruitment_lag,
                            len: empirical_biomasses.len(),
                        });
                    }
                    if *steepness <= 0.0 {
                        return Err(EngineError::InvalidConfig(format!(
                            "`{}`: steepness must be > 0",
                            species.name
                        )));
                    }
                }
                StockConfig::AgeStructured { initial_counts, steepness, virgin_recruits, .. } => {
                    if initial_counts.is_empty() {
                        return Err(EngineError::InvalidConfig(format!(
                            "`{}`: initial_counts must not be empty",
                            species.name
                        )));
                    }
                    if *steepness <= 0.0 || *virgin_recruits <= 0.0 {
                        return Err(EngineError::InvalidConfig(format!(
                            "`{}`: steepness and virgin_recruits must be > 0",
                            species.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
