//! Cellular automaton bookkeeping attached to facets, segments and tracks.

use serde::{Deserialize, Serialize};

/// Mutable automaton state of one graph node.
///
/// `state` and `weight` are recomputed on every relaxation pass; the
/// flags are inputs to the pass and survive it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AutomatonCell {
    state: u32,
    weight: f64,
    intrinsic_weight: f64,
    taken: bool,
    background: bool,
    do_not_use: bool,
}

impl AutomatonCell {
    /// Creates a fresh cell with the weight the node contributes on its own.
    #[must_use]
    pub fn new(intrinsic_weight: f64) -> Self {
        Self {
            state: 0,
            weight: intrinsic_weight,
            intrinsic_weight,
            ..Self::default()
        }
    }

    /// Length of the longest chain starting at this cell, minus one.
    #[inline]
    #[must_use]
    pub fn state(&self) -> u32 {
        self.state
    }

    /// Accumulated weight along the best chain starting at this cell.
    #[inline]
    #[must_use]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Weight contributed by the node itself.
    #[inline]
    #[must_use]
    pub fn intrinsic_weight(&self) -> f64 {
        self.intrinsic_weight
    }

    /// Sets the relaxed state and accumulated weight.
    #[inline]
    pub fn assign(&mut self, state: u32, weight: f64) {
        self.state = state;
        self.weight = weight;
    }

    /// Resets the relaxation result, keeping flags.
    #[inline]
    pub fn reset_state(&mut self) {
        self.state = 0;
        self.weight = self.intrinsic_weight;
    }

    /// Resets relaxation result and all flags.
    pub fn reset(&mut self) {
        self.reset_state();
        self.taken = false;
        self.background = false;
        self.do_not_use = false;
    }

    /// Cell already belongs to an extracted path.
    #[inline]
    #[must_use]
    pub fn is_taken(&self) -> bool {
        self.taken
    }

    /// Marks the cell as part of an extracted path.
    #[inline]
    pub fn set_taken(&mut self, taken: bool) {
        self.taken = taken;
    }

    /// Cell was classified as background.
    #[inline]
    #[must_use]
    pub fn is_background(&self) -> bool {
        self.background
    }

    /// Sets the background flag.
    #[inline]
    pub fn set_background(&mut self, background: bool) {
        self.background = background;
    }

    /// Cell is blocked, e.g. because it shares a hit with an accepted path.
    #[inline]
    #[must_use]
    pub fn is_do_not_use(&self) -> bool {
        self.do_not_use
    }

    /// Sets the blocking flag.
    #[inline]
    pub fn set_do_not_use(&mut self, do_not_use: bool) {
        self.do_not_use = do_not_use;
    }

    /// Cell may take part in relaxation and extraction.
    #[inline]
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.taken && !self.background && !self.do_not_use
    }
}

/// Access to the automaton cell of a graph node.
///
/// The cellular automaton is generic over any node type implementing this.
pub trait HasAutomatonCell {
    /// Shared access to the cell.
    fn automaton_cell(&self) -> &AutomatonCell;

    /// Mutable access to the cell.
    fn automaton_cell_mut(&mut self) -> &mut AutomatonCell;
}

impl HasAutomatonCell for AutomatonCell {
    fn automaton_cell(&self) -> &AutomatonCell {
        self
    }

    fn automaton_cell_mut(&mut self) -> &mut AutomatonCell {
        self
    }
}
