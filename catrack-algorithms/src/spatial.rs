//! Spatial indexing for efficient neighbor lookup.
#![allow(clippy::cast_possible_truncation)]

use std::collections::HashMap;

/// Hash grid for 2D neighbor queries.
///
/// The plane is divided into square cells of `cell_size`; a query returns
/// everything in the 3x3 block of cells around a point, which covers every
/// value within `cell_size` of it.
#[derive(Debug, Default)]
pub struct SpatialGrid<T> {
    cell_size: f64,
    cells: HashMap<(i64, i64), Vec<T>>,
}

impl<T> SpatialGrid<T> {
    /// Create a new spatial grid.
    #[must_use]
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
        }
    }

    fn cell(&self, x: f64, y: f64) -> (i64, i64) {
        (
            (x / self.cell_size).floor() as i64,
            (y / self.cell_size).floor() as i64,
        )
    }

    /// Clear all data.
    pub fn clear(&mut self) {
        self.cells.clear();
    }

    /// Insert a value at the given coordinates.
    pub fn insert(&mut self, x: f64, y: f64, value: T) {
        let cell = self.cell(x, y);
        self.cells.entry(cell).or_default().push(value);
    }

    /// Query the 3x3 neighborhood around a point.
    #[must_use]
    pub fn query_neighborhood(&self, x: f64, y: f64) -> Vec<&T> {
        let (cx, cy) = self.cell(x, y);
        let mut result = Vec::new();

        for dx in -1..=1 {
            for dy in -1..=1 {
                if let Some(values) = self.cells.get(&(cx + dx, cy + dy)) {
                    result.extend(values.iter());
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spatial_grid() {
        let mut grid: SpatialGrid<usize> = SpatialGrid::new(1.5);
        grid.insert(10.0, 10.0, 0);
        grid.insert(11.0, 11.2, 1);
        grid.insert(-10.0, 10.0, 2);
        grid.insert(-0.5, -0.5, 3);

        let neighbors = grid.query_neighborhood(10.0, 10.0);
        assert!(neighbors.contains(&&0));
        assert!(neighbors.contains(&&1));
        assert!(!neighbors.contains(&&2));

        // negative coordinates use floored cells
        assert!(grid.query_neighborhood(0.4, 0.4).contains(&&3));
        assert!(grid.query_neighborhood(-3.5, -3.5).is_empty());
    }
}
