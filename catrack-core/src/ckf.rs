//! Combinatorial Kalman filter states, paths and results.

use crate::hit::TrackPoint;
use crate::kalman::KalmanState;
use serde::{Deserialize, Serialize};

/// One extension step: a hit attached to a parent state.
#[derive(Debug, Clone, PartialEq)]
pub struct CkfState {
    /// Parent state in the arena, `None` for the seed.
    pub parent: Option<usize>,
    /// Attached measurement, `None` for the seed.
    pub point: Option<TrackPoint>,
    /// Filtered trajectory state.
    pub kalman: KalmanState,
    /// Chi2 accumulated from the seed.
    pub chi2: f64,
    /// Filter score accumulated from the seed.
    pub score: f64,
}

impl CkfState {
    /// Creates the root state of a seed.
    #[must_use]
    pub fn seed(kalman: KalmanState) -> Self {
        Self {
            parent: None,
            point: None,
            kalman,
            chi2: 0.0,
            score: 0.0,
        }
    }
}

/// Arena holding every state created for one seed.
///
/// States reference their parent by index, so branching paths share their
/// common prefix.
#[derive(Debug, Clone, Default)]
pub struct StateArena {
    states: Vec<CkfState>,
}

impl StateArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a state and returns its index.
    pub fn push(&mut self, state: CkfState) -> usize {
        self.states.push(state);
        self.states.len() - 1
    }

    /// State by index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&CkfState> {
        self.states.get(index)
    }

    /// Number of states.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns true if the arena is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// States from the seed to `leaf`, inclusive.
    #[must_use]
    pub fn path(&self, leaf: usize) -> Vec<&CkfState> {
        let mut states = Vec::new();
        let mut cursor = Some(leaf);
        while let Some(index) = cursor {
            let Some(state) = self.states.get(index) else {
                break;
            };
            states.push(state);
            cursor = state.parent;
        }
        states.reverse();
        states
    }
}

/// Why a path stopped growing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// No candidate survived on the next layer.
    NoCandidate,
    /// The last target layer was reached.
    LastLayer,
    /// The step or time budget ran out.
    Budget,
}

/// Lifecycle of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStatus {
    /// Still in the beam.
    Extending,
    /// Finished, kept as a result candidate.
    Accepted(Termination),
    /// Dropped by beam pruning or a numeric failure.
    Pruned,
}

/// Leaf of a growing path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CkfPath {
    /// Seed track index.
    pub seed: usize,
    /// Leaf state in the seed's arena.
    pub leaf: usize,
    /// Number of states including the seed; grows by one per step.
    pub length: usize,
    /// Accumulated score.
    pub score: f64,
    /// Accumulated chi2.
    pub chi2: f64,
    /// Lifecycle status.
    pub status: PathStatus,
}

impl CkfPath {
    /// Path consisting of the seed state only.
    #[must_use]
    pub fn seed(seed: usize, leaf: usize) -> Self {
        Self {
            seed,
            leaf,
            length: 1,
            score: 0.0,
            chi2: 0.0,
            status: PathStatus::Extending,
        }
    }

    /// Number of hits added to the seed.
    #[must_use]
    pub fn n_added(&self) -> usize {
        self.length - 1
    }
}

/// Extended track handed to downstream fitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CkfResult {
    /// Seed track index.
    pub seed: usize,
    /// Measurements of the seed track.
    pub seed_points: Vec<TrackPoint>,
    /// Measurements added by the extension, in extension order.
    pub added: Vec<TrackPoint>,
    /// Filtered states after each added measurement.
    pub states: Vec<KalmanState>,
    /// Accumulated chi2 of the added measurements.
    pub chi2: f64,
    /// Accumulated state filter score.
    pub score: f64,
    /// Quality assigned by the result filter.
    pub quality: f64,
    /// Why the path stopped.
    pub termination: Termination,
}

impl CkfResult {
    /// Number of added measurements.
    #[must_use]
    pub fn n_added(&self) -> usize {
        self.added.len()
    }

    /// All hit indices: seed hits followed by added hits.
    #[must_use]
    pub fn hits(&self) -> Vec<usize> {
        self.seed_points
            .iter()
            .chain(&self.added)
            .map(|p| p.hit)
            .collect()
    }

    /// Added hit indices.
    #[must_use]
    pub fn added_hits(&self) -> Vec<usize> {
        self.added.iter().map(|p| p.hit).collect()
    }

    /// Number of added hits also used by `other`.
    #[must_use]
    pub fn shared_hits(&self, other: &Self) -> usize {
        self.added
            .iter()
            .filter(|p| other.added.iter().any(|q| q.hit == p.hit))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Vector3};

    fn kalman(x: f64) -> KalmanState {
        KalmanState::new(x, Vector3::zeros(), Matrix3::identity())
    }

    #[test]
    fn test_arena_path_walks_parents() {
        let mut arena = StateArena::new();
        let root = arena.push(CkfState::seed(kalman(10.0)));
        let a = arena.push(CkfState {
            parent: Some(root),
            ..CkfState::seed(kalman(9.0))
        });
        let _sibling = arena.push(CkfState {
            parent: Some(root),
            ..CkfState::seed(kalman(9.0))
        });
        let b = arena.push(CkfState {
            parent: Some(a),
            ..CkfState::seed(kalman(8.0))
        });

        let path = arena.path(b);
        assert_eq!(path.len(), 3);
        assert!((path[0].kalman.x - 10.0).abs() < f64::EPSILON);
        assert!((path[2].kalman.x - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_seed_path() {
        let path = CkfPath::seed(3, 0);
        assert_eq!(path.length, 1);
        assert_eq!(path.n_added(), 0);
        assert_eq!(path.status, PathStatus::Extending);
    }
}
