//! Per-cell biology state.
//!
//! Each water cell owns exactly one `LocalBiology`: either a structured
//! abundance matrix per species or a biomass/carrying-capacity pair per
//! species. Diffusers and growers are the only mutators; filters and
//! allocators read.

use crate::abundance::StructuredAbundance;
use crate::species::SpeciesRoster;
use serde::{Deserialize, Serialize};

/// Age-and-sex structured state: one abundance matrix per roster species.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbundanceLocalBiology {
    per_species: Vec<StructuredAbundance>,
}

impl AbundanceLocalBiology {
    /// Empty matrices shaped after every species in the roster.
    pub fn empty(roster: &SpeciesRoster) -> Self {
        let per_species = roster
            .iter()
            .map(|s| StructuredAbundance::empty(s.number_of_subdivisions(), s.number_of_bins()))
            .collect();
        Self { per_species }
    }

    pub fn abundance(&self, species_index: usize) -> &StructuredAbundance {
        &self.per_species[species_index]
    }

    pub fn abundance_mut(&mut self, species_index: usize) -> &mut StructuredAbundance {
        &mut self.per_species[species_index]
    }

    /// Biomass in kg of one species at this cell.
    pub fn biomass(&self, roster: &SpeciesRoster, species_index: usize) -> f64 {
        self.per_species[species_index].biomass(roster.get(species_index).meristics())
    }

    /// A catch event removed this many fish per cohort. Entries clamp at
    /// zero so float noise from gear math cannot produce negative counts.
    pub fn react_to_catch(&mut self, species_index: usize, caught: &StructuredAbundance) {
        self.per_species[species_index].subtract_clamped(caught);
    }

    /// True when no species has any fish here.
    pub fn is_unpopulated(&self) -> bool {
        self.per_species.iter().all(|a| a.total() <= 0.0)
    }

    /// Merge another abundance biology into this one, elementwise.
    pub fn absorb(&mut self, other: &AbundanceLocalBiology) {
        for (mine, theirs) in self.per_species.iter_mut().zip(other.per_species.iter()) {
            *mine.as_matrix_mut() += theirs.as_matrix();
        }
    }
}

/// Aggregated state: biomass and carrying capacity per species. Carrying
/// capacity does not cap current biomass; logistic growth pulls overshoot
/// back down instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiomassLocalBiology {
    current: Vec<f64>,
    capacity: Vec<f64>,
}

impl BiomassLocalBiology {
    pub fn new(current: Vec<f64>, capacity: Vec<f64>) -> Self {
        assert_eq!(current.len(), capacity.len(), "biomass/capacity length mismatch");
        Self { current, capacity }
    }

    pub fn empty(species_count: usize) -> Self {
        Self { current: vec![0.0; species_count], capacity: vec![0.0; species_count] }
    }

    pub fn biomass(&self, species_index: usize) -> f64 {
        self.current.get(species_index).copied().unwrap_or(0.0)
    }

    pub fn carrying_capacity(&self, species_index: usize) -> f64 {
        self.capacity.get(species_index).copied().unwrap_or(0.0)
    }

    pub fn set_biomass(&mut self, species_index: usize, biomass: f64) {
        // negative biomass is a numeric artifact; clamp to zero
        self.current[species_index] = biomass.max(0.0);
    }

    pub fn set_carrying_capacity(&mut self, species_index: usize, capacity: f64) {
        self.capacity[species_index] = capacity.max(0.0);
    }

    pub fn add_biomass(&mut self, species_index: usize, delta: f64) {
        self.set_biomass(species_index, self.current[species_index] + delta);
    }

    /// A catch event extracted this much biomass.
    pub fn extract(&mut self, species_index: usize, amount: f64) {
        self.set_biomass(species_index, self.current[species_index] - amount);
    }

    pub fn is_unpopulated(&self) -> bool {
        self.current.iter().all(|&b| b <= 0.0)
    }
}

/// The biology living at one grid cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LocalBiology {
    /// Land, or water no species ever occupies.
    Empty,
    Abundance(AbundanceLocalBiology),
    Biomass(BiomassLocalBiology),
}

impl LocalBiology {
    pub fn as_abundance(&self) -> Option<&AbundanceLocalBiology> {
        match self {
            LocalBiology::Abundance(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_abundance_mut(&mut self) -> Option<&mut AbundanceLocalBiology> {
        match self {
            LocalBiology::Abundance(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_biomass(&self) -> Option<&BiomassLocalBiology> {
        match self {
            LocalBiology::Biomass(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_biomass_mut(&mut self) -> Option<&mut BiomassLocalBiology> {
        match self {
            LocalBiology::Biomass(b) => Some(b),
            _ => None,
        }
    }

    /// Biomass of one species at this cell, zero for empty biologies.
    pub fn biomass(&self, roster: &SpeciesRoster, species_index: usize) -> f64 {
        match self {
            LocalBiology::Empty => 0.0,
            LocalBiology::Abundance(b) => b.biomass(roster, species_index),
            LocalBiology::Biomass(b) => b.biomass(species_index),
        }
    }

    /// Combine the biologies produced for one cell by several single-species
    /// initializers: a populated biology always wins over an empty
    /// placeholder, and two populated abundance biologies merge into one.
    pub fn merged_with(self, other: LocalBiology) -> LocalBiology {
        match (self, other) {
            (LocalBiology::Empty, b) => b,
            (a, LocalBiology::Empty) => a,
            (LocalBiology::Abundance(mut a), LocalBiology::Abundance(b)) => {
                a.absorb(&b);
                LocalBiology::Abundance(a)
            }
            (LocalBiology::Biomass(mut a), LocalBiology::Biomass(b)) => {
                for index in 0..a.current.len().min(b.current.len()) {
                    a.current[index] += b.current[index];
                    a.capacity[index] += b.capacity[index];
                }
                LocalBiology::Biomass(a)
            }
            // mixed representations at one cell: keep whichever holds fish
            (a, b) => {
                let a_empty = match &a {
                    LocalBiology::Abundance(x) => x.is_unpopulated(),
                    LocalBiology::Biomass(x) => x.is_unpopulated(),
                    LocalBiology::Empty => true,
                };
                if a_empty {
                    b
                } else {
                    a
                }
            }
        }
    }
}

/// One biology per grid cell, indexed by `CellId`.
pub type BiologyField = Vec<LocalBiology>;
