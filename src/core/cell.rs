//! Grid Cells
//!
//! The board is a 5×5 grid indexed row-major from 0 to 24.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{GRID_CELLS, GRID_SIZE};

/// Cell index outside the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cell {0} is outside the 25-cell grid")]
pub struct InvalidCell(pub u32);

/// A validated grid cell.
///
/// Implements Ord so cell sets iterate in index order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Cell(u8);

impl Cell {
    /// Create a cell, rejecting indices ≥ 25.
    pub fn new(index: u32) -> Result<Self, InvalidCell> {
        if index < GRID_CELLS {
            Ok(Self(index as u8))
        } else {
            Err(InvalidCell(index))
        }
    }

    /// Create a cell from row and column, both `0..5`.
    pub fn from_row_col(row: u32, col: u32) -> Result<Self, InvalidCell> {
        if row >= GRID_SIZE || col >= GRID_SIZE {
            return Err(InvalidCell(row.saturating_mul(GRID_SIZE).saturating_add(col)));
        }
        Self::new(row * GRID_SIZE + col)
    }

    /// Row-major index.
    #[inline]
    pub fn index(self) -> u8 {
        self.0
    }

    /// Row (0 = top).
    #[inline]
    pub fn row(self) -> u32 {
        self.0 as u32 / GRID_SIZE
    }

    /// Column (0 = left).
    #[inline]
    pub fn col(self) -> u32 {
        self.0 as u32 % GRID_SIZE
    }

    /// Every cell of the grid in index order.
    pub fn all() -> impl Iterator<Item = Cell> {
        (0..GRID_CELLS as u8).map(Cell)
    }
}

impl TryFrom<u8> for Cell {
    type Error = InvalidCell;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value as u32)
    }
}

impl From<Cell> for u8 {
    fn from(cell: Cell) -> Self {
        cell.0
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cell({})", self.0)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // A1-style: column letter, 1-based row
        let col = (b'A' + self.col() as u8) as char;
        write!(f, "{}{}", col, self.row() + 1)
    }
}

/// Ship orientation on the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    /// Extends to the right of the start cell.
    Horizontal,
    /// Extends downward from the start cell.
    Vertical,
}

impl Orientation {
    /// Cells covered by a ship of `size` starting at `start`, or `None`
    /// when the ship would run off the grid.
    pub fn span(self, start: Cell, size: u32) -> Option<Vec<Cell>> {
        if size == 0 {
            return Some(Vec::new());
        }
        let (row, col) = (start.row(), start.col());
        match self {
            Orientation::Horizontal if col + size <= GRID_SIZE => Some(
                (0..size)
                    .map(|i| Cell((row * GRID_SIZE + col + i) as u8))
                    .collect(),
            ),
            Orientation::Vertical if row + size <= GRID_SIZE => Some(
                (0..size)
                    .map(|i| Cell(((row + i) * GRID_SIZE + col) as u8))
                    .collect(),
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_bounds() {
        assert!(Cell::new(0).is_ok());
        assert!(Cell::new(24).is_ok());
        assert_eq!(Cell::new(25), Err(InvalidCell(25)));
        assert!(Cell::from_row_col(4, 4).is_ok());
        assert!(Cell::from_row_col(5, 0).is_err());
        assert!(Cell::from_row_col(0, 5).is_err());
    }

    #[test]
    fn test_row_col() {
        let cell = Cell::new(13).unwrap();
        assert_eq!(cell.row(), 2);
        assert_eq!(cell.col(), 3);
        assert_eq!(Cell::from_row_col(2, 3).unwrap(), cell);
        assert_eq!(cell.to_string(), "D3");
    }

    #[test]
    fn test_horizontal_span() {
        let start = Cell::from_row_col(1, 2).unwrap();
        let cells = Orientation::Horizontal.span(start, 3).unwrap();
        let idx: Vec<u8> = cells.iter().map(|c| c.index()).collect();
        assert_eq!(idx, vec![7, 8, 9]);

        // Would wrap onto the next row
        let edge = Cell::from_row_col(1, 3).unwrap();
        assert!(Orientation::Horizontal.span(edge, 3).is_none());
    }

    #[test]
    fn test_vertical_span() {
        let start = Cell::from_row_col(2, 4).unwrap();
        let cells = Orientation::Vertical.span(start, 3).unwrap();
        let idx: Vec<u8> = cells.iter().map(|c| c.index()).collect();
        assert_eq!(idx, vec![14, 19, 24]);

        let low = Cell::from_row_col(3, 0).unwrap();
        assert!(Orientation::Vertical.span(low, 3).is_none());
    }

    #[test]
    fn test_serde_rejects_out_of_range() {
        assert_eq!(serde_json::to_string(&Cell::new(7).unwrap()).unwrap(), "7");
        assert!(serde_json::from_str::<Cell>("25").is_err());
        assert_eq!(serde_json::from_str::<Cell>("24").unwrap().index(), 24);
    }

    #[test]
    fn test_all_cells() {
        assert_eq!(Cell::all().count(), 25);
    }
}
