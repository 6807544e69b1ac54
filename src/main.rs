//! PELAGOS - CLI Entry Point
//!
//! Spatial population-dynamics engine for fisheries research.

use clap::{Parser, Subcommand};
use pelagos::{benchmark, Config, Simulation};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "pelagos")]
#[command(version)]
#[command(about = "Spatial fish population-dynamics simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation
    Run {
        /// Configuration file (YAML)
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Number of days to simulate
        #[arg(short, long, default_value = "3650")]
        days: u64,

        /// Random seed override
        #[arg(long)]
        seed: Option<u64>,

        /// Quiet mode (minimal output)
        #[arg(short, long)]
        quiet: bool,
    },

    /// Run performance benchmark
    Benchmark {
        /// Number of days
        #[arg(short, long, default_value = "1000")]
        days: u64,

        /// Grid side length in cells
        #[arg(short, long, default_value = "50")]
        grid: usize,
    },

    /// Generate default configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, days, seed, quiet } => run_simulation(config, days, seed, quiet),
        Commands::Benchmark { days, grid } => run_benchmark(days, grid),
        Commands::Init { output } => generate_config(output),
    }
}

fn run_simulation(
    config_path: PathBuf,
    days: u64,
    seed: Option<u64>,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = if config_path.exists() {
        println!("Loading config from: {:?}", config_path);
        Config::from_file(&config_path)?
    } else {
        println!("Using default configuration");
        Config::default()
    };
    if let Some(seed) = seed {
        println!("Using seed: {}", seed);
        config.simulation.seed = seed;
    }

    let mut simulation = Simulation::from_config(&config)?;

    println!("Starting simulation");
    println!("  Grid size: {}x{}", config.grid.width, config.grid.height);
    println!("  Species: {}", simulation.roster().len());
    println!("  Days: {}", days);
    println!();

    let start = Instant::now();
    let stats_interval = config.logging.stats_interval.max(1);

    for day in 0..days {
        simulation.step_day()?;
        if !quiet && day % stats_interval == 0 {
            println!("{}", simulation.stats.summary(simulation.roster()));
        }
    }

    let elapsed = start.elapsed().as_secs_f64();
    println!();
    println!("Done: {} days in {:.2}s ({:.1} days/s)", days, elapsed, days as f64 / elapsed);
    for (index, species) in simulation.roster().iter().enumerate() {
        println!("  {}: {:.0} kg", species.name(), simulation.total_biomass(index));
    }
    Ok(())
}

fn run_benchmark(days: u64, grid: usize) -> Result<(), Box<dyn std::error::Error>> {
    println!("Benchmarking {} days on a {}x{} grid...", days, grid, grid);
    let result = benchmark(days, grid);
    println!("{}", result);
    Ok(())
}

fn generate_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    config.save(&output)?;
    println!("Wrote default configuration to {:?}", output);
    Ok(())
}
