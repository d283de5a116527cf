use serde_derive::{Deserialize, Serialize};

pub type Index = usize;

/// A square grid of side `side` with both axes wrapping around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Torus {
    pub side: usize,
}

impl Torus {
    pub fn new(side: usize) -> Torus {
        Torus { side }
    }

    pub fn len(&self) -> usize {
        self.side * self.side
    }

    pub fn is_empty(&self) -> bool {
        self.side == 0
    }

    /// ```rust
    /// let grid = model::grid::Torus::new(16);
    /// assert_eq!(grid.index(2, 3), 35);
    /// assert_eq!(grid.coordinates(35), (2, 3));
    /// ```
    pub fn index(&self, row: usize, col: usize) -> Index {
        row * self.side + col
    }

    pub fn coordinates(&self, index: Index) -> (usize, usize) {
        (index / self.side, index % self.side)
    }

    /// The Moore neighbourhood of a cell, row-major from the upper left
    /// neighbour, skipping the cell itself. On grids of side 1 or 2 the same
    /// cell shows up several times.
    pub fn neighbors(&self, index: Index) -> [Index; 8] {
        let (row, col) = self.coordinates(index);
        let mut result = [0; 8];
        let mut k = 0;
        for dr in [self.side - 1, 0, 1].iter() {
            for dc in [self.side - 1, 0, 1].iter() {
                if *dr == 0 && *dc == 0 {
                    continue;
                }
                result[k] = self.index((row + dr) % self.side, (col + dc) % self.side);
                k += 1;
            }
        }
        result
    }
}
