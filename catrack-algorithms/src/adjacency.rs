//! Static wire neighbourhood table.
//!
//! Built once per geometry. Two wires are neighbours if they belong to the
//! same sub-system and super-layer, their layers are at most one layer apart
//! within the super-layer, and their positions are within the adjacency
//! radius.

use crate::spatial::SpatialGrid;
use catrack_core::{Error, Result, WireGeometry, WireId};
use std::collections::HashMap;

/// Neighbour lists keyed by wire.
#[derive(Debug, Clone, Default)]
pub struct WireAdjacency {
    radius: f64,
    neighbors: HashMap<WireId, Vec<WireId>>,
}

impl WireAdjacency {
    /// Builds the table for all wires of `geometry`.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for a non-positive radius.
    pub fn build(geometry: &WireGeometry, radius: f64) -> Result<Self> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(Error::Config(format!(
                "adjacency radius must be positive, got {radius}"
            )));
        }

        // Rank of each layer within its super-layer, in x order.
        let mut rank_in_super_layer: HashMap<u16, usize> = HashMap::new();
        let mut next_rank: HashMap<u16, usize> = HashMap::new();
        for layer in geometry.layers() {
            let rank = next_rank.entry(layer.super_layer).or_insert(0);
            rank_in_super_layer.insert(layer.id, *rank);
            *rank += 1;
        }

        let mut grid = SpatialGrid::new(radius);
        for layer in geometry.layers() {
            for wire in 0..layer.count {
                let [x, y] = layer.wire_position(wire);
                grid.insert(x, y, (WireId::new(layer.id, wire), layer.super_layer));
            }
        }

        let radius_sq = radius * radius;
        let mut neighbors: HashMap<WireId, Vec<WireId>> = HashMap::new();
        for layer in geometry.layers() {
            let rank = rank_in_super_layer.get(&layer.id).copied().unwrap_or_default();
            for wire in 0..layer.count {
                let id = WireId::new(layer.id, wire);
                let [x, y] = layer.wire_position(wire);
                let mut list: Vec<WireId> = grid
                    .query_neighborhood(x, y)
                    .into_iter()
                    .filter(|(other, super_layer)| {
                        *other != id && *super_layer == layer.super_layer
                    })
                    .filter(|(other, _)| {
                        let other_rank = rank_in_super_layer
                            .get(&other.layer)
                            .copied()
                            .unwrap_or_default();
                        rank.abs_diff(other_rank) <= 1
                    })
                    .filter(|(other, _)| {
                        geometry.wire_position(*other).is_some_and(|[ox, oy]| {
                            (ox - x).powi(2) + (oy - y).powi(2) <= radius_sq
                        })
                    })
                    .map(|(other, _)| *other)
                    .collect();
                list.sort_unstable();
                neighbors.insert(id, list);
            }
        }

        let adjacency = Self { radius, neighbors };
        log::info!(
            "wire adjacency: {} wires, {} neighbour pairs, radius {radius}",
            adjacency.n_wires(),
            adjacency.n_pairs()
        );
        Ok(adjacency)
    }

    /// Neighbours of a wire, sorted by `(layer, wire)`.
    #[must_use]
    pub fn neighbors(&self, wire: WireId) -> &[WireId] {
        self.neighbors.get(&wire).map_or(&[], Vec::as_slice)
    }

    /// Returns true if the two wires are neighbours.
    #[must_use]
    pub fn are_adjacent(&self, a: WireId, b: WireId) -> bool {
        self.neighbors(a).binary_search(&b).is_ok()
    }

    /// Radius the table was built with.
    #[must_use]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Number of wires in the table.
    #[must_use]
    pub fn n_wires(&self) -> usize {
        self.neighbors.len()
    }

    /// Number of unordered neighbour pairs.
    #[must_use]
    pub fn n_pairs(&self) -> usize {
        self.neighbors.values().map(Vec::len).sum::<usize>() / 2
    }
}
