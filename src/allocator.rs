//! Spatial allocation of stock totals across the grid.
//!
//! An allocator is a pure `cell -> weight` mapping. Initialization is an
//! explicit two-stage protocol: `create_empty_state` visits every cell (in
//! no particular order, while the map is still being built) and records a
//! weight for each habitable cell; `allocate` then runs exactly once,
//! normalizes the recorded weights and hands every cell its share of the
//! aggregate total. The per-cell registry travels between the stages as a
//! value, not as hidden mutable state.

use crate::abundance::StructuredAbundance;
use crate::biology::{AbundanceLocalBiology, BiologyField, BiomassLocalBiology, LocalBiology};
use crate::error::EngineError;
use crate::grid::{CellId, GridTopology};
use crate::species::SpeciesRoster;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Pure per-cell weighting schemes. Weights need not sum to one; they are
/// normalized against their sum at allocation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Allocator {
    /// Same weight everywhere (uniform distribution over water).
    Constant { weight: f64 },
    /// Weight 1 inside an inclusive cell rectangle, 0 elsewhere.
    BoundedBox { x0: usize, x1: usize, y0: usize, y1: usize },
    /// Weight 1 where depth (positive meters) falls inside a band.
    DepthBand { min_depth: f64, max_depth: f64 },
}

impl Allocator {
    /// The fraction-weight of the species' total that belongs in this cell.
    /// Land cells always weigh zero.
    pub fn weight(&self, cell: CellId, grid: &GridTopology) -> f64 {
        if !grid.is_water(cell) {
            return 0.0;
        }
        match self {
            Allocator::Constant { weight } => *weight,
            Allocator::BoundedBox { x0, x1, y0, y1 } => {
                let (x, y) = (grid.x(cell), grid.y(cell));
                if x >= *x0 && x <= *x1 && y >= *y0 && y <= *y1 {
                    1.0
                } else {
                    0.0
                }
            }
            Allocator::DepthBand { min_depth, max_depth } => {
                let depth = -grid.altitude(cell);
                if depth >= *min_depth && depth <= *max_depth {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Output of stage one: each habitable cell with its raw allocator weight.
#[derive(Debug, Clone, Default)]
pub struct CellRegistry {
    entries: Vec<(CellId, f64)>,
}

impl CellRegistry {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn weight_sum(&self) -> f64 {
        self.entries.iter().map(|&(_, w)| w).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(CellId, f64)> {
        self.entries.iter()
    }
}

/// Distributes one species' aggregate abundance matrix across the grid.
#[derive(Debug, Clone)]
pub struct AbundanceInitializer {
    species_name: String,
    /// aggregate `[subdivision][bin]` counts from the stock assessment
    totals: StructuredAbundance,
    allocator: Allocator,
    /// scales the assessment counts up or down uniformly
    scaling: f64,
}

impl AbundanceInitializer {
    pub fn new(
        species_name: impl Into<String>,
        totals: StructuredAbundance,
        allocator: Allocator,
        scaling: f64,
    ) -> Self {
        Self { species_name: species_name.into(), totals, allocator, scaling }
    }

    pub fn species_name(&self) -> &str {
        &self.species_name
    }

    /// Stage one: place an empty abundance biology on every habitable water
    /// cell and record its weight. Cells weighing zero (or land) stay as
    /// they are. Safe to call while other initializers are doing the same.
    pub fn create_empty_state(
        &self,
        grid: &GridTopology,
        roster: &SpeciesRoster,
        field: &mut BiologyField,
    ) -> CellRegistry {
        let mut registry = CellRegistry::default();
        for cell in grid.water_cells() {
            let weight = self.allocator.weight(cell, grid);
            if !weight.is_finite() || weight <= 0.0 {
                continue;
            }
            if matches!(field[cell], LocalBiology::Empty) {
                field[cell] = LocalBiology::Abundance(AbundanceLocalBiology::empty(roster));
            }
            registry.entries.push((cell, weight));
        }
        registry
    }

    /// Stage two: normalize the registry weights and assign every bin of the
    /// aggregate total proportionally. The same per-species allocator covers
    /// every age and sex. The sum of allocated counts equals the scaled
    /// total to floating-point tolerance.
    pub fn allocate(
        &self,
        registry: &CellRegistry,
        roster: &SpeciesRoster,
        field: &mut BiologyField,
    ) -> Result<(), EngineError> {
        let species_index = roster
            .index_of(&self.species_name)
            .ok_or_else(|| EngineError::MissingAllocator(self.species_name.clone()))?;
        let species = roster.get(species_index);
        if self.totals.subdivisions() != species.number_of_subdivisions()
            || self.totals.bins() != species.number_of_bins()
        {
            return Err(EngineError::InvalidConfig(format!(
                "initial abundance for `{}` is {}x{}, species has {}x{}",
                self.species_name,
                self.totals.subdivisions(),
                self.totals.bins(),
                species.number_of_subdivisions(),
                species.number_of_bins(),
            )));
        }

        let sum = registry.weight_sum();
        if !sum.is_finite() || sum <= 0.0 {
            return Err(EngineError::NonNormalizableWeights {
                species: self.species_name.clone(),
                sum,
            });
        }

        for &(cell, weight) in registry.iter() {
            let ratio = weight / sum;
            let biology = match field[cell].as_abundance_mut() {
                Some(biology) => biology,
                // another initializer may have replaced the placeholder
                None => continue,
            };
            let abundance = biology.abundance_mut(species_index);
            for sub in 0..self.totals.subdivisions() {
                for bin in 0..self.totals.bins() {
                    abundance.add(sub, bin, self.scaling * self.totals.get(sub, bin) * ratio);
                }
            }
        }
        Ok(())
    }
}

/// Runs several single-species initializers over one grid and merges their
/// per-cell results. Every roster species must have an initializer; a
/// missing one aborts setup.
#[derive(Debug, Clone, Default)]
pub struct MultiSpeciesInitializer {
    initializers: Vec<AbundanceInitializer>,
}

impl MultiSpeciesInitializer {
    pub fn add(&mut self, initializer: AbundanceInitializer) {
        self.initializers.push(initializer);
    }

    /// Both stages for every species, with the merge rule of
    /// `LocalBiology::merged_with` applied cell by cell.
    pub fn populate(
        &self,
        grid: &GridTopology,
        roster: &SpeciesRoster,
        field: &mut BiologyField,
    ) -> Result<(), EngineError> {
        for species in roster.iter() {
            if !self.initializers.iter().any(|i| i.species_name() == species.name()) {
                return Err(EngineError::MissingAllocator(species.name().to_string()));
            }
        }

        let mut registries = Vec::with_capacity(self.initializers.len());
        for initializer in &self.initializers {
            // each initializer populates into its own scratch field, merged below
            let mut scratch: BiologyField = vec![LocalBiology::Empty; grid.cell_count()];
            let registry = initializer.create_empty_state(grid, roster, &mut scratch);
            registries.push((registry, scratch));
        }
        for (initializer, (registry, scratch)) in self.initializers.iter().zip(registries.iter_mut())
        {
            initializer.allocate(registry, roster, scratch)?;
        }
        for (_, scratch) in registries {
            for (cell, biology) in scratch.into_iter().enumerate() {
                let previous = std::mem::replace(&mut field[cell], LocalBiology::Empty);
                field[cell] = previous.merged_with(biology);
            }
        }
        Ok(())
    }
}

/// How much biomass each cell starts with, relative to its capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InitialBiomass {
    /// A known aggregate total, split with the same weights as capacity
    /// (conserved exactly).
    Total(f64),
    /// Drawn uniformly between two fractions of the cell's capacity.
    RandomFraction { min: f64, max: f64 },
}

/// Distributes carrying capacity and initial biomass for an aggregated
/// (non-age-structured) species.
#[derive(Debug, Clone)]
pub struct BiomassInitializer {
    species_name: String,
    total_capacity: f64,
    initial: InitialBiomass,
    allocator: Allocator,
}

impl BiomassInitializer {
    pub fn new(
        species_name: impl Into<String>,
        total_capacity: f64,
        initial: InitialBiomass,
        allocator: Allocator,
    ) -> Self {
        Self { species_name: species_name.into(), total_capacity, initial, allocator }
    }

    pub fn species_name(&self) -> &str {
        &self.species_name
    }

    pub fn create_empty_state(
        &self,
        grid: &GridTopology,
        roster: &SpeciesRoster,
        field: &mut BiologyField,
    ) -> CellRegistry {
        let mut registry = CellRegistry::default();
        for cell in grid.water_cells() {
            let weight = self.allocator.weight(cell, grid);
            if !weight.is_finite() || weight <= 0.0 {
                continue;
            }
            if matches!(field[cell], LocalBiology::Empty) {
                field[cell] = LocalBiology::Biomass(BiomassLocalBiology::empty(roster.len()));
            }
            registry.entries.push((cell, weight));
        }
        registry
    }

    pub fn allocate(
        &self,
        registry: &CellRegistry,
        roster: &SpeciesRoster,
        field: &mut BiologyField,
        rng: &mut impl Rng,
    ) -> Result<(), EngineError> {
        let species_index = roster
            .index_of(&self.species_name)
            .ok_or_else(|| EngineError::MissingAllocator(self.species_name.clone()))?;

        let sum = registry.weight_sum();
        if !sum.is_finite() || sum <= 0.0 {
            return Err(EngineError::NonNormalizableWeights {
                species: self.species_name.clone(),
                sum,
            });
        }
        if let InitialBiomass::RandomFraction { min, max } = &self.initial {
            if !(0.0..=1.0).contains(min) || !(0.0..=1.0).contains(max) || min > max {
                return Err(EngineError::InvalidConfig(format!(
                    "initial biomass fractions [{min}, {max}] must be ordered and within [0, 1]"
                )));
            }
        }

        for &(cell, weight) in registry.iter() {
            let ratio = weight / sum;
            let capacity = self.total_capacity * ratio;
            let biomass = match &self.initial {
                InitialBiomass::Total(total) => total * ratio,
                InitialBiomass::RandomFraction { min, max } => {
                    // when the range collapses the draw denominator would be
                    // zero; skip the draw instead of dividing
                    let fraction =
                        if (max - min).abs() < f64::EPSILON { *min } else { rng.gen_range(*min..*max) };
                    capacity * fraction
                }
            };
            let biology = match field[cell].as_biomass_mut() {
                Some(biology) => biology,
                None => continue,
            };
            biology.set_carrying_capacity(species_index, capacity);
            biology.set_biomass(species_index, biomass);
        }
        Ok(())
    }
}

/// Scheduled redistribution of one species' standing stock. Each event
/// records the basin-wide biomass and deals it back out by allocator
/// weight, so the total is conserved while the spatial pattern snaps back
/// to the allocator's. Carrying capacity is left where it is.
#[derive(Debug, Clone)]
pub struct BiomassReallocator {
    species_name: String,
    allocator: Allocator,
}

impl BiomassReallocator {
    pub fn new(species_name: impl Into<String>, allocator: Allocator) -> Self {
        Self { species_name: species_name.into(), allocator }
    }

    pub fn species_name(&self) -> &str {
        &self.species_name
    }

    /// One reallocation event. An empty basin is a no-op; standing stock
    /// with no habitable cell to land on is an error.
    pub fn reallocate(
        &self,
        grid: &GridTopology,
        roster: &SpeciesRoster,
        field: &mut BiologyField,
    ) -> Result<(), EngineError> {
        let species_index = roster
            .index_of(&self.species_name)
            .ok_or_else(|| EngineError::MissingAllocator(self.species_name.clone()))?;
        let total: f64 = field.iter().map(|b| b.biomass(roster, species_index)).sum();
        if total <= 0.0 {
            return Ok(());
        }

        let mut registry = CellRegistry::default();
        for cell in grid.water_cells() {
            let weight = self.allocator.weight(cell, grid);
            if weight.is_finite() && weight > 0.0 && field[cell].as_biomass().is_some() {
                registry.entries.push((cell, weight));
            }
        }
        let sum = registry.weight_sum();
        if !sum.is_finite() || sum <= 0.0 {
            return Err(EngineError::NonNormalizableWeights {
                species: self.species_name.clone(),
                sum,
            });
        }

        for biology in field.iter_mut() {
            if let Some(biology) = biology.as_biomass_mut() {
                biology.set_biomass(species_index, 0.0);
            }
        }
        for &(cell, weight) in registry.iter() {
            if let Some(biology) = field[cell].as_biomass_mut() {
                biology.set_biomass(species_index, total * weight / sum);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::species::{Meristics, Species};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn roster() -> SpeciesRoster {
        let meristics = Meristics::from_single_list(vec![10.0, 20.0, 30.0], vec![1.0, 1.0, 1.0]);
        SpeciesRoster::new(vec![
            Species::new("yellowfin", meristics.clone()),
            Species::new("skipjack", meristics),
        ])
    }

    fn initializer_for(name: &str, allocator: Allocator) -> AbundanceInitializer {
        let totals =
            StructuredAbundance::from_rows(vec![vec![600.0, 300.0, 100.0], vec![500.0, 250.0, 50.0]]);
        AbundanceInitializer::new(name, totals, allocator, 1.0)
    }

    #[test]
    fn test_allocation_conserves_totals() {
        let grid = GridTopology::open_water(4, 4, 100.0);
        let roster = roster();
        let mut field: BiologyField = vec![LocalBiology::Empty; grid.cell_count()];

        let initializer = initializer_for("yellowfin", Allocator::Constant { weight: 1.0 });
        let registry = initializer.create_empty_state(&grid, &roster, &mut field);
        assert_eq!(registry.len(), 16);
        initializer.allocate(&registry, &roster, &mut field).unwrap();

        let mut allocated = 0.0;
        for biology in &field {
            if let Some(abundance) = biology.as_abundance() {
                allocated += abundance.abundance(0).total();
            }
        }
        assert!((allocated - 1800.0).abs() < 1e-9);
    }

    #[test]
    fn test_bounded_allocator_restricts_cells(){
        let grid = GridTopology::open_water(4, 4, 100.0);
        let roster = roster();
        let mut field: BiologyField = vec![LocalBiology::Empty; grid.cell_count()];

        let allocator = Allocator::BoundedBox { x0: 0, x1: 1, y0: 0, y1: 1 };
        let initializer = initializer_for("yellowfin", allocator);
        let registry = initializer.create_empty_state(&grid, &roster, &mut field);
        assert_eq!(registry.len(), 4);
        initializer.allocate(&registry, &roster, &mut field).unwrap();

        // every populated cell got a quarter of each bin
        let biology = field[grid.cell_at(1, 1)].as_abundance().unwrap();
        assert!((biology.abundance(0).get(0, 0) - 150.0).abs() < 1e-9);
        assert!(matches!(field[grid.cell_at(3, 3)], LocalBiology::Empty));
    }

    #[test]
    fn test_missing_species_is_fatal() {
        let grid = GridTopology::open_water(2, 2, 100.0);
        let roster = roster();
        let mut field: BiologyField = vec![LocalBiology::Empty; grid.cell_count()];

        let mut multi = MultiSpeciesInitializer::default();
        multi.add(initializer_for("yellowfin", Allocator::Constant { weight: 1.0 }));
        // skipjack has no initializer
        let result = multi.populate(&grid, &roster, &mut field);
        assert!(matches!(result, Err(EngineError::MissingAllocator(ref name)) if name == "skipjack"));
    }

    #[test]
    fn test_multi_species_merge_populates_both() {
        let grid = GridTopology::open_water(2, 2, 100.0);
        let roster = roster();
        let mut field: BiologyField = vec![LocalBiology::Empty; grid.cell_count()];

        let mut multi = MultiSpeciesInitializer::default();
        multi.add(initializer_for("yellowfin", Allocator::Constant { weight: 1.0 }));
        multi.add(initializer_for("skipjack", Allocator::BoundedBox { x0: 0, x1: 0, y0: 0, y1: 0 }));
        multi.populate(&grid, &roster, &mut field).unwrap();

        // cell (0,0) hosts both species in a single merged biology
        let shared = field[grid.cell_at(0, 0)].as_abundance().unwrap();
        assert!(shared.abundance(0).total() > 0.0);
        assert!(shared.abundance(1).total() > 0.0);
        // other cells host only yellowfin
        let solo = field[grid.cell_at(1, 1)].as_abundance().unwrap();
        assert!(solo.abundance(0).total() > 0.0);
        assert_eq!(solo.abundance(1).total(), 0.0);
    }

    #[test]
    fn test_zero_weights_cannot_normalize() {
        let grid = GridTopology::open_water(2, 2, 100.0);
        let roster = roster();
        let mut field: BiologyField = vec![LocalBiology::Empty; grid.cell_count()];

        let initializer = initializer_for("yellowfin", Allocator::Constant { weight: 0.0 });
        let registry = initializer.create_empty_state(&grid, &roster, &mut field);
        assert!(registry.is_empty());
        let result = initializer.allocate(&registry, &roster, &mut field);
        assert!(matches!(result, Err(EngineError::NonNormalizableWeights { .. })));
    }

    #[test]
    fn test_biomass_total_is_conserved() {
        let grid = GridTopology::open_water(3, 3, 100.0);
        let roster = roster();
        let mut field: BiologyField = vec![LocalBiology::Empty; grid.cell_count()];
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let initializer = BiomassInitializer::new(
            "yellowfin",
            9000.0,
            InitialBiomass::Total(4500.0),
            Allocator::Constant { weight: 2.0 },
        );
        let registry = initializer.create_empty_state(&grid, &roster, &mut field);
        initializer.allocate(&registry, &roster, &mut field, &mut rng).unwrap();

        let total: f64 = field.iter().map(|b| b.biomass(&roster, 0)).sum();
        assert!((total - 4500.0).abs() < 1e-9);
        let capacity: f64 =
            field.iter().filter_map(|b| b.as_biomass()).map(|b| b.carrying_capacity(0)).sum();
        assert!((capacity - 9000.0).abs() < 1e-9);
    }

    #[test]
    fn test_reallocation_conserves_total_and_follows_weights() {
        let grid = GridTopology::open_water(4, 1, 100.0);
        let roster = roster();
        let mut field: BiologyField = [700.0, 100.0, 150.0, 50.0]
            .iter()
            .map(|&b| {
                LocalBiology::Biomass(BiomassLocalBiology::new(vec![b, 0.0], vec![250.0, 0.0]))
            })
            .collect();

        let reallocator = BiomassReallocator::new(
            "yellowfin",
            Allocator::BoundedBox { x0: 0, x1: 1, y0: 0, y1: 0 },
        );
        reallocator.reallocate(&grid, &roster, &mut field).unwrap();

        let biomasses: Vec<f64> =
            field.iter().map(|b| b.as_biomass().unwrap().biomass(0)).collect();
        // the skewed stock snapped back to the box, nothing lost
        assert_eq!(biomasses, vec![500.0, 500.0, 0.0, 0.0]);
        // capacities untouched
        assert!(field.iter().all(|b| b.as_biomass().unwrap().carrying_capacity(0) == 250.0));
    }

    #[test]
    fn test_reallocation_of_empty_basin_is_a_no_op() {
        let grid = GridTopology::open_water(2, 1, 100.0);
        let roster = roster();
        let mut field: BiologyField = (0..2)
            .map(|_| {
                LocalBiology::Biomass(BiomassLocalBiology::new(vec![0.0, 0.0], vec![100.0, 0.0]))
            })
            .collect();

        let reallocator = BiomassReallocator::new("yellowfin", Allocator::Constant { weight: 1.0 });
        reallocator.reallocate(&grid, &roster, &mut field).unwrap();
        assert!(field.iter().all(|b| b.biomass(&roster, 0) == 0.0));
    }

    #[test]
    fn test_collapsed_fraction_range_uses_minimum() {
        let grid = GridTopology::open_water(2, 1, 100.0);
        let roster = roster();
        let mut field: BiologyField = vec![LocalBiology::Empty; grid.cell_count()];
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let initializer = BiomassInitializer::new(
            "yellowfin",
            1000.0,
            InitialBiomass::RandomFraction { min: 0.4, max: 0.4 },
            Allocator::Constant { weight: 1.0 },
        );
        let registry = initializer.create_empty_state(&grid, &roster, &mut field);
        initializer.allocate(&registry, &roster, &mut field, &mut rng).unwrap();
        let biology = field[0].as_biomass().unwrap();
        assert!((biology.biomass(0) - 0.4 * 500.0).abs() < 1e-9);
    }
}
