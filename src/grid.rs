//! Grid topology: water/land mask and neighbor sets.
//!
//! Map construction happens outside the engine; all the biology needs is,
//! per cell, its water status and the set of adjacent water cells. This
//! module adapts an altitude raster into that shape.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Index of a grid cell, row-major.
pub type CellId = usize;

/// Which cells count as adjacent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Neighborhood {
    /// Four orthogonal neighbors
    VonNeumann,
    /// Eight surrounding neighbors
    Moore,
}

/// Immutable cell adjacency built once from an altitude raster. Cells with
/// altitude below zero are water; only water-water adjacencies are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridTopology {
    width: usize,
    height: usize,
    altitude: Vec<f64>,
    water: Vec<bool>,
    neighbors: Vec<Vec<CellId>>,
}

impl GridTopology {
    pub fn from_altitudes(
        width: usize,
        height: usize,
        altitude: Vec<f64>,
        neighborhood: Neighborhood,
    ) -> Result<Self, EngineError> {
        let expected = width * height;
        if altitude.len() != expected {
            return Err(EngineError::TopologyShapeMismatch { got: altitude.len(), expected });
        }
        let water: Vec<bool> = altitude.iter().map(|&a| a < 0.0).collect();

        let offsets: &[(i64, i64)] = match neighborhood {
            Neighborhood::VonNeumann => &[(0, -1), (-1, 0), (1, 0), (0, 1)],
            Neighborhood::Moore => {
                &[(-1, -1), (0, -1), (1, -1), (-1, 0), (1, 0), (-1, 1), (0, 1), (1, 1)]
            }
        };

        let mut neighbors = vec![Vec::new(); expected];
        for y in 0..height as i64 {
            for x in 0..width as i64 {
                let cell = (y * width as i64 + x) as usize;
                if !water[cell] {
                    continue;
                }
                for &(dx, dy) in offsets {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                        continue;
                    }
                    let other = (ny * width as i64 + nx) as usize;
                    if water[other] {
                        neighbors[cell].push(other);
                    }
                }
            }
        }

        Ok(Self { width, height, altitude, water, neighbors })
    }

    /// All-water rectangular basin at uniform depth (given in positive meters).
    pub fn open_water(width: usize, height: usize, depth: f64) -> Self {
        let altitude = vec![-depth.abs(); width * height];
        match Self::from_altitudes(width, height, altitude, Neighborhood::VonNeumann) {
            Ok(grid) => grid,
            Err(_) => unreachable!("shape is consistent by construction"),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cell_count(&self) -> usize {
        self.water.len()
    }

    pub fn cell_at(&self, x: usize, y: usize) -> CellId {
        y * self.width + x
    }

    pub fn x(&self, cell: CellId) -> usize {
        cell % self.width
    }

    pub fn y(&self, cell: CellId) -> usize {
        cell / self.width
    }

    pub fn is_water(&self, cell: CellId) -> bool {
        self.water[cell]
    }

    pub fn altitude(&self, cell: CellId) -> f64 {
        self.altitude[cell]
    }

    pub fn neighbors(&self, cell: CellId) -> &[CellId] {
        &self.neighbors[cell]
    }

    /// All water cells, in row-major order.
    pub fn water_cells(&self) -> impl Iterator<Item = CellId> + '_ {
        (0..self.water.len()).filter(move |&c| self.water[c])
    }

    pub fn water_cell_count(&self) -> usize {
        self.water.iter().filter(|&&w| w).count()
    }

    /// Each unordered pair of adjacent water cells exactly once.
    pub fn adjacent_water_pairs(&self) -> impl Iterator<Item = (CellId, CellId)> + '_ {
        self.water_cells().flat_map(move |cell| {
            self.neighbors(cell)
                .iter()
                .filter(move |&&other| other > cell)
                .map(move |&other| (cell, other))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_is_fatal() {
        let result = GridTopology::from_altitudes(3, 3, vec![-1.0; 8], Neighborhood::VonNeumann);
        assert!(result.is_err());
    }

    #[test]
    fn test_land_cells_have_no_neighbors() {
        // a single land cell in the middle of a 3x3 basin
        let mut altitude = vec![-10.0; 9];
        altitude[4] = 5.0;
        let grid = GridTopology::from_altitudes(3, 3, altitude, Neighborhood::VonNeumann).unwrap();
        assert!(!grid.is_water(4));
        assert!(grid.neighbors(4).is_empty());
        // edge cells lost their link to the center
        assert_eq!(grid.neighbors(grid.cell_at(0, 0)).len(), 2);
        assert_eq!(grid.neighbors(grid.cell_at(1, 0)).len(), 2);
    }

    #[test]
    fn test_pairs_visited_once() {
        let grid = GridTopology::open_water(3, 1, 100.0);
        let pairs: Vec<_> = grid.adjacent_water_pairs().collect();
        assert_eq!(pairs, vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn test_moore_corner_neighbors() {
        let grid = GridTopology::from_altitudes(3, 3, vec![-1.0; 9], Neighborhood::Moore).unwrap();
        assert_eq!(grid.neighbors(grid.cell_at(0, 0)).len(), 3);
        assert_eq!(grid.neighbors(grid.cell_at(1, 1)).len(), 8);
    }
}
