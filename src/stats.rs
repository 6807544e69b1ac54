//! Statistics tracking for the simulation.

use crate::biology::BiologyField;
use crate::species::SpeciesRoster;
use serde::{Deserialize, Serialize};

/// Statistics snapshot for a simulation day
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Stats {
    /// Current simulation day
    pub day: u64,
    /// Total biomass per species, in kg
    pub biomass: Vec<f64>,
    /// Total fish count per species (zero for aggregated stocks)
    pub abundance: Vec<f64>,
    /// Recruits produced per species in the last yearly step
    pub recruits: Vec<f64>,
    /// Water cells currently holding any fish
    pub occupied_cells: usize,
    /// Simulated days per second (performance)
    pub days_per_second: f32,
}

impl Stats {
    pub fn new(species_count: usize) -> Self {
        Self {
            day: 0,
            biomass: vec![0.0; species_count],
            abundance: vec![0.0; species_count],
            recruits: vec![0.0; species_count],
            occupied_cells: 0,
            days_per_second: 0.0,
        }
    }

    /// Update stats from current simulation state
    pub fn update(&mut self, roster: &SpeciesRoster, field: &BiologyField, day: u64) {
        self.day = day;
        self.occupied_cells = 0;
        for index in 0..roster.len() {
            self.biomass[index] = 0.0;
            self.abundance[index] = 0.0;
        }
        for biology in field {
            let mut populated = false;
            for index in 0..roster.len() {
                let biomass = biology.biomass(roster, index);
                self.biomass[index] += biomass;
                if let Some(abundance) = biology.as_abundance() {
                    self.abundance[index] += abundance.abundance(index).total();
                }
                populated |= biomass > 0.0;
            }
            if populated {
                self.occupied_cells += 1;
            }
        }
    }

    pub fn record_recruits(&mut self, species_index: usize, recruits: f64) {
        self.recruits[species_index] = recruits;
    }

    /// One-line summary for periodic console output
    pub fn summary(&self, roster: &SpeciesRoster) -> String {
        let mut line = format!("day {:>6} | cells {:>5}", self.day, self.occupied_cells);
        for (index, species) in roster.iter().enumerate() {
            line.push_str(&format!(
                " | {} {:.1}kg ({:.0} fish)",
                species.name(),
                self.biomass[index],
                self.abundance[index]
            ));
        }
        if self.days_per_second > 0.0 {
            line.push_str(&format!(" | {:.0} days/s", self.days_per_second));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biology::{BiomassLocalBiology, LocalBiology};
    use crate::species::{Meristics, Species};

    #[test]
    fn test_update_aggregates_biomass_and_occupancy() {
        let meristics = Meristics::from_single_list(vec![10.0], vec![1.0]);
        let roster = SpeciesRoster::new(vec![Species::new("hake", meristics)]);
        let field: BiologyField = vec![
            LocalBiology::Biomass(BiomassLocalBiology::new(vec![300.0], vec![500.0])),
            LocalBiology::Biomass(BiomassLocalBiology::new(vec![0.0], vec![500.0])),
            LocalBiology::Empty,
        ];
        let mut stats = Stats::new(1);
        stats.update(&roster, &field, 12);
        assert_eq!(stats.day, 12);
        assert_eq!(stats.biomass, vec![300.0]);
        assert_eq!(stats.occupied_cells, 1);
        assert!(stats.summary(&roster).contains("hake"));
    }
}
