//! Hit traits and types for wire and strip detectors.

use crate::geometry::{LayerKind, Subdetector, WireId};
use serde::{Deserialize, Serialize};

/// Trait for primitive hits delivered by the unpacking collaborator.
///
/// This trait provides a common interface for different hit sources
/// (raw unpacker output, simulation, test fixtures) so that hit preparation
/// does not depend on a concrete input type.
pub trait Hit: Send + Sync {
    /// Channel the hit was recorded on.
    fn wire(&self) -> WireId;

    /// Reconstructed position `[x, y]`, if the collaborator provides one.
    fn position(&self) -> Option<[f64; 2]>;

    /// Variance of the measured coordinate.
    fn variance(&self) -> f64;

    /// Drift distance to the wire.
    fn drift_length(&self) -> f64;

    /// Variance of the drift distance.
    fn drift_length_variance(&self) -> f64;

    /// Drift or ionization time.
    fn drift_time(&self) -> f64;

    /// Simulated particle that produced this hit (validation only).
    fn mc_particle(&self) -> Option<u32> {
        None
    }

    /// Returns the layer id.
    #[inline]
    fn layer(&self) -> u16 {
        self.wire().layer
    }
}

/// Primitive hit as read from event files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    /// Layer id.
    pub layer: u16,
    /// Wire index within the layer.
    pub channel: u16,
    /// Reconstructed position; the wire position is used when absent.
    #[serde(default)]
    pub position: Option<[f64; 2]>,
    /// Variance of the measured coordinate.
    #[serde(default = "default_variance")]
    pub variance: f64,
    /// Drift distance to the wire.
    #[serde(default)]
    pub drift_length: f64,
    /// Variance of the drift distance.
    #[serde(default = "default_variance")]
    pub drift_length_variance: f64,
    /// Drift or ionization time.
    #[serde(default)]
    pub drift_time: f64,
    /// Ground truth particle id, present only in simulated events.
    #[serde(default)]
    pub mc_particle: Option<u32>,
}

fn default_variance() -> f64 {
    0.01
}

impl RawHit {
    /// Creates a hit at the given channel with default uncertainties.
    #[must_use]
    pub fn new(layer: u16, channel: u16) -> Self {
        Self {
            layer,
            channel,
            position: None,
            variance: default_variance(),
            drift_length: 0.0,
            drift_length_variance: default_variance(),
            drift_time: 0.0,
            mc_particle: None,
        }
    }

    /// Sets the reconstructed position.
    #[must_use]
    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Some([x, y]);
        self
    }

    /// Sets the coordinate variance.
    #[must_use]
    pub fn with_variance(mut self, variance: f64) -> Self {
        self.variance = variance;
        self
    }

    /// Sets drift length and time.
    #[must_use]
    pub fn with_drift(mut self, length: f64, time: f64) -> Self {
        self.drift_length = length;
        self.drift_time = time;
        self
    }

    /// Sets the ground truth particle.
    #[must_use]
    pub fn with_mc_particle(mut self, particle: u32) -> Self {
        self.mc_particle = Some(particle);
        self
    }
}

impl Hit for RawHit {
    #[inline]
    fn wire(&self) -> WireId {
        WireId::new(self.layer, self.channel)
    }

    #[inline]
    fn position(&self) -> Option<[f64; 2]> {
        self.position
    }

    #[inline]
    fn variance(&self) -> f64 {
        self.variance
    }

    #[inline]
    fn drift_length(&self) -> f64 {
        self.drift_length
    }

    #[inline]
    fn drift_length_variance(&self) -> f64 {
        self.drift_length_variance
    }

    #[inline]
    fn drift_time(&self) -> f64 {
        self.drift_time
    }

    #[inline]
    fn mc_particle(&self) -> Option<u32> {
        self.mc_particle
    }
}

/// One event worth of primitive hits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event number.
    pub id: u64,
    /// Hits in unpacking order.
    pub hits: Vec<RawHit>,
}

impl Event {
    /// Creates an event.
    #[must_use]
    pub fn new(id: u64, hits: Vec<RawHit>) -> Self {
        Self { id, hits }
    }
}

/// Prepared hit: a graph node of the hit arena.
///
/// Created by the hit preparation stage and read-only afterwards; its
/// ownership is tracked separately in [`crate::HitOwnership`].
#[derive(Debug, Clone, PartialEq)]
pub struct WireHit {
    /// Position in the prepared hit arena.
    pub index: usize,
    /// Position in the input event.
    pub source: usize,
    /// Channel.
    pub wire: WireId,
    /// Super-layer id.
    pub super_layer: u16,
    /// Sub-system.
    pub subdetector: Subdetector,
    /// Axial or stereo.
    pub kind: LayerKind,
    /// Plane position.
    pub x: f64,
    /// Measured coordinate.
    pub y: f64,
    /// Variance of `y`.
    pub variance: f64,
    /// Drift distance to the wire.
    pub drift_length: f64,
    /// Variance of the drift distance.
    pub drift_length_variance: f64,
    /// Drift time.
    pub drift_time: f64,
    /// Ground truth particle.
    pub mc_particle: Option<u32>,
}

impl WireHit {
    /// Compact copy used inside facets, segments and tracks.
    #[must_use]
    pub fn point(&self) -> TrackPoint {
        TrackPoint {
            hit: self.index,
            layer: self.wire.layer,
            x: self.x,
            y: self.y,
            variance: self.variance,
            drift_length: self.drift_length,
            mc_particle: self.mc_particle,
        }
    }

    /// Distance between the two hit positions.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Measurement attached to a facet, segment, track or CKF state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    /// Index into the prepared hit arena.
    pub hit: usize,
    /// Layer id.
    pub layer: u16,
    /// Plane position.
    pub x: f64,
    /// Measured coordinate.
    pub y: f64,
    /// Variance of `y`.
    pub variance: f64,
    /// Drift distance to the wire.
    pub drift_length: f64,
    /// Ground truth particle.
    pub mc_particle: Option<u32>,
}

impl TrackPoint {
    /// Position as an array.
    #[inline]
    #[must_use]
    pub fn position(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}

/// Common truth of a set of measurements.
///
/// `Some(true)` if every point carries the same particle, `Some(false)` if
/// they disagree or some are unmatched, `None` if no point carries truth.
#[must_use]
pub fn common_truth<'a, I>(points: I) -> Option<bool>
where
    I: IntoIterator<Item = &'a TrackPoint>,
{
    let mut particle = None;
    let mut any_truth = false;
    let mut all_match = true;
    for point in points {
        match (point.mc_particle, particle) {
            (Some(id), None) => {
                any_truth = true;
                particle = Some(id);
            }
            (Some(id), Some(first)) => {
                any_truth = true;
                all_match &= id == first;
            }
            (None, _) => all_match = false,
        }
    }
    any_truth.then_some(all_match)
}
