//! Integration tests for PELAGOS

use pelagos::abundance::StructuredAbundance;
use pelagos::allocator::Allocator;
use pelagos::config::{DiffusionConfig, SpeciesConfig, StockConfig};
use pelagos::diffusion::DiffusionRate;
use pelagos::filters::AbundanceFilter;
use pelagos::species::GrowthCurve;
use pelagos::{Config, Simulation};

fn two_stock_config() -> Config {
    let mut config = Config::default();
    config.grid.width = 10;
    config.grid.height = 10;
    config.simulation.days_per_year = 365;
    config.species = vec![
        SpeciesConfig {
            name: "anchovy".to_string(),
            allocator: Allocator::Constant { weight: 1.0 },
            stock: StockConfig::Logistic {
                carrying_capacity: 100_000.0,
                initial_biomass: 40_000.0,
                growth_rate: 0.7,
                initial_fraction: None,
            },
            diffusion: Some(DiffusionConfig {
                rate: Some(DiffusionRate { differential_fraction: 0.005, daily_cap: 0.01 }),
                abundance_rate: None,
            }),
            reallocation: None,
        },
        SpeciesConfig {
            name: "sardine".to_string(),
            allocator: Allocator::BoundedBox { x0: 0, x1: 4, y0: 0, y1: 9 },
            stock: StockConfig::DelayedRecruitment {
                carrying_capacity: 50_000.0,
                initial_biomass: 50_000.0,
                rho: 0.0,
                natural_survival_rate: 0.8,
                steepness: 0.6,
                recruitment_lag: 2,
                weight_at_recruitment: 1.0,
                weight_at_recruitment_minus1: 1.0,
                initial_recruits: 10_000.0,
                empirical_biomasses: vec![50_000.0, 50_000.0, 50_000.0],
            },
            diffusion: None,
            reallocation: None,
        },
    ];
    config
}

#[test]
fn test_full_simulation_cycle() {
    let mut config = two_stock_config();
    config.simulation.seed = 12345;

    let mut simulation = Simulation::from_config(&config).unwrap();
    simulation.run(400).unwrap();

    assert_eq!(simulation.day, 400);
    // the logistic stock grew, and nothing went negative anywhere
    assert!(simulation.total_biomass(0) > 40_000.0);
    for biology in simulation.field() {
        for species in 0..2 {
            assert!(biology.biomass(simulation.roster(), species) >= 0.0);
        }
    }
    // the unfished delayed-recruitment stock holds its virgin level
    assert!((simulation.total_biomass(1) - 50_000.0).abs() / 50_000.0 < 0.05);
}

#[test]
fn test_deterministic_runs_with_same_seed() {
    let mut config = two_stock_config();
    config.simulation.seed = 777;

    let mut first = Simulation::from_config(&config).unwrap();
    let mut second = Simulation::from_config(&config).unwrap();
    first.run(370).unwrap();
    second.run(370).unwrap();

    for species in 0..2 {
        assert_eq!(first.total_biomass(species), second.total_biomass(species));
    }
    for (a, b) in first.field().iter().zip(second.field().iter()) {
        assert_eq!(a.biomass(first.roster(), 0), b.biomass(second.roster(), 0));
    }
}

#[test]
fn test_allocation_conservation_at_startup() {
    let config = two_stock_config();
    let simulation = Simulation::from_config(&config).unwrap();

    // the initializer must hand out exactly the configured totals
    assert!((simulation.total_biomass(0) - 40_000.0).abs() < 1e-6);
    assert!((simulation.total_biomass(1) - 50_000.0).abs() < 1e-6);
    // the bounded stock lives only in its box
    for cell in simulation.grid().water_cells() {
        let here = simulation.field()[cell].biomass(simulation.roster(), 1);
        if simulation.grid().x(cell) > 4 {
            assert_eq!(here, 0.0);
        } else {
            assert!(here > 0.0);
        }
    }
}

#[test]
fn test_diffusion_conserves_mass_over_a_run() {
    let mut config = two_stock_config();
    // freeze growth so only the diffuser touches the anchovy stock
    config.species[0].stock = StockConfig::Logistic {
        carrying_capacity: 100_000.0,
        initial_biomass: 40_000.0,
        growth_rate: 0.0,
        initial_fraction: None,
    };
    // concentrate the stock so there are real gradients to smooth
    config.species[0].allocator = Allocator::BoundedBox { x0: 0, x1: 1, y0: 0, y1: 1 };
    config.species.truncate(1);

    let mut simulation = Simulation::from_config(&config).unwrap();
    let before = simulation.total_biomass(0);
    simulation.run(200).unwrap();
    assert!((simulation.total_biomass(0) - before).abs() < 1e-6);

    // the stock actually spread beyond its starting box
    let outside = simulation
        .grid()
        .water_cells()
        .filter(|&cell| simulation.grid().x(cell) > 1)
        .map(|cell| simulation.field()[cell].biomass(simulation.roster(), 0))
        .sum::<f64>();
    assert!(outside > 0.0);
}

#[test]
fn test_age_structured_stock_with_fishing_pressure() {
    let curve = |max_length: f64, mortality: f64| GrowthCurve {
        max_age: 9,
        young_age: 0.0,
        young_length: 8.0,
        max_length,
        k: 0.25,
        weight_a: 1e-5,
        weight_b: 3.0,
        mortality_m: mortality,
    };
    let mut config = Config::default();
    config.grid.width = 6;
    config.grid.height = 6;
    config.simulation.days_per_year = 365;
    config.species = vec![SpeciesConfig {
        name: "rockfish".to_string(),
        allocator: Allocator::Constant { weight: 1.0 },
        stock: StockConfig::AgeStructured {
            male: curve(55.0, 0.2),
            female: curve(62.0, 0.18),
            maturity_inflection: 40.0,
            maturity_slope: -0.4,
            fecundity_intercept: 1.0,
            fecundity_slope: 0.0,
            steepness: 0.7,
            virgin_recruits: 100_000.0,
            initial_counts: vec![vec![50_000.0; 10]; 2],
        },
        diffusion: Some(DiffusionConfig { rate: None, abundance_rate: Some(0.02) }),
        reallocation: None,
    }];

    let mut simulation = Simulation::from_config(&config).unwrap();
    let gear = AbundanceFilter::logistic(23.5053, 9.03702, false);

    // fish one cell a day with the logistic gear for a year
    for day in 0..365 {
        let cell = day % 36;
        let roster = simulation.roster().clone();
        let species = roster.get(0).clone();
        if let Some(biology) = simulation.field_mut()[cell].as_abundance_mut() {
            let available = biology.abundance(0).clone();
            let caught = gear.filter(&species, &available);
            // retained catch never exceeds what was there
            for sub in 0..caught.subdivisions() {
                for bin in 0..caught.bins() {
                    assert!(caught.get(sub, bin) <= available.get(sub, bin) + 1e-9);
                }
            }
            let scaled = StructuredAbundance::from_matrix(caught.as_matrix() * 0.001);
            biology.react_to_catch(0, &scaled);
        }
        simulation.step_day().unwrap();
    }

    // a year in: recruits arrived and the stock survived the pressure
    assert!(simulation.stats.recruits[0] > 0.0);
    assert!(simulation.stats.abundance[0] > 0.0);
}
