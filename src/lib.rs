//! # PELAGOS
//!
//! Spatial population-dynamics engine for fisheries-management research.
//!
//! Simulates one or more fish stocks on a water grid: size- and
//! sex-structured abundance or aggregated biomass per cell, gear
//! selectivity and retention filters, gradient diffusion between adjacent
//! cells, and logistic or Deriso-Schnute delayed-recruitment growth.
//!
//! ## Quick Start
//!
//! ```rust
//! use pelagos::{Config, Simulation};
//!
//! // Build the model from the default single-species configuration
//! let config = Config::default();
//! let mut simulation = Simulation::from_config(&config).unwrap();
//!
//! // Run one simulated year
//! simulation.run(365).unwrap();
//! println!("biomass: {:.0} kg", simulation.total_biomass(0));
//! ```
//!
//! ## Filtering a catch
//!
//! ```rust
//! use pelagos::abundance::StructuredAbundance;
//! use pelagos::filters::AbundanceFilter;
//! use pelagos::species::{Meristics, Species};
//!
//! let meristics = Meristics::from_single_list(vec![10.0, 25.0, 40.0], vec![0.2, 1.1, 3.0]);
//! let species = Species::new("yellowtail", meristics);
//! let gear = AbundanceFilter::logistic(23.5053, 9.03702, false);
//!
//! let school = StructuredAbundance::from_rows(vec![vec![100.0; 3], vec![100.0; 3]]);
//! let caught = gear.filter(&species, &school);
//! assert!(caught.total() <= school.total());
//! ```

pub mod abundance;
pub mod allocator;
pub mod biology;
pub mod config;
pub mod diffusion;
pub mod error;
pub mod filters;
pub mod grid;
pub mod growth;
pub mod recruitment;
pub mod simulation;
pub mod species;
pub mod stats;

// Re-export main types
pub use config::Config;
pub use error::EngineError;
pub use simulation::Simulation;
pub use species::{Species, SpeciesRoster};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run a quick benchmark
pub fn benchmark(days: u64, grid_size: usize) -> BenchmarkResult {
    use std::time::Instant;

    let mut config = Config::default();
    config.grid.width = grid_size;
    config.grid.height = grid_size;

    let mut simulation = Simulation::from_config(&config).expect("default config is valid");

    let start = Instant::now();
    simulation.run(days).expect("benchmark run failed");
    let elapsed = start.elapsed();

    BenchmarkResult {
        days,
        grid_size,
        final_biomass: simulation.total_biomass(0),
        elapsed_secs: elapsed.as_secs_f64(),
        days_per_second: days as f64 / elapsed.as_secs_f64(),
    }
}

/// Benchmark result
#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    pub days: u64,
    pub grid_size: usize,
    pub final_biomass: f64,
    pub elapsed_secs: f64,
    pub days_per_second: f64,
}

impl std::fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Benchmark Results ===")?;
        writeln!(f, "Days: {}", self.days)?;
        writeln!(f, "Grid: {}x{}", self.grid_size, self.grid_size)?;
        writeln!(f, "Final biomass: {:.0} kg", self.final_biomass)?;
        writeln!(f, "Time: {:.3}s", self.elapsed_secs)?;
        write!(f, "Speed: {:.1} days/s", self.days_per_second)
    }
}
