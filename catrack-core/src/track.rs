//! Facets, segments and tracks: the candidates built on top of hits.

use crate::cell::{AutomatonCell, HasAutomatonCell};
use crate::error::NumericError;
use crate::fit::{fit_line, fit_parabola, three_point_curvature, TrajectoryFit};
use crate::geometry::LayerKind;
use crate::hit::TrackPoint;
use serde::{Deserialize, Serialize};

/// Oriented three-hit trajectory hypothesis.
#[derive(Debug, Clone, PartialEq)]
pub struct Facet {
    /// Start, middle and end measurement, in construction order.
    pub points: [TrackPoint; 3],
    /// Super-layer all three hits belong to.
    pub super_layer: u16,
    /// Automaton bookkeeping; the intrinsic weight is the facet filter weight.
    pub cell: AutomatonCell,
}

impl Facet {
    /// Creates an unscored facet.
    #[must_use]
    pub fn new(points: [TrackPoint; 3], super_layer: u16) -> Self {
        Self {
            points,
            super_layer,
            cell: AutomatonCell::default(),
        }
    }

    /// Start hit index.
    #[inline]
    #[must_use]
    pub fn start(&self) -> usize {
        self.points[0].hit
    }

    /// Middle hit index.
    #[inline]
    #[must_use]
    pub fn middle(&self) -> usize {
        self.points[1].hit
    }

    /// End hit index.
    #[inline]
    #[must_use]
    pub fn end(&self) -> usize {
        self.points[2].hit
    }

    /// Hit indices.
    #[must_use]
    pub fn hits(&self) -> [usize; 3] {
        [self.start(), self.middle(), self.end()]
    }

    /// Returns true if the facet uses the hit.
    #[must_use]
    pub fn contains(&self, hit: usize) -> bool {
        self.points.iter().any(|p| p.hit == hit)
    }

    /// Straight-line fit through the three hits.
    ///
    /// # Errors
    /// Fails for hits on fewer than two planes.
    pub fn line_fit(&self) -> Result<TrajectoryFit, NumericError> {
        fit_line(&self.points, self.points[1].x)
    }

    /// Signed curvature of the circle through the three hits.
    #[must_use]
    pub fn curvature(&self) -> Option<f64> {
        three_point_curvature(
            self.points[0].position(),
            self.points[1].position(),
            self.points[2].position(),
        )
    }
}

impl HasAutomatonCell for Facet {
    fn automaton_cell(&self) -> &AutomatonCell {
        &self.cell
    }

    fn automaton_cell_mut(&mut self) -> &mut AutomatonCell {
        &mut self.cell
    }
}

/// Ordered chain of hits confined to one super-layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Measurements in construction order.
    pub points: Vec<TrackPoint>,
    /// Super-layer id.
    pub super_layer: u16,
    /// Axial or stereo super-layer.
    pub kind: LayerKind,
    /// Trajectory fit, absent if the hits are degenerate.
    pub fit: Option<TrajectoryFit>,
    /// Weight assigned by the segment filter.
    pub weight: f64,
    /// Automaton bookkeeping for the track linking pass.
    #[serde(skip)]
    pub cell: AutomatonCell,
}

impl Segment {
    /// Creates a segment and fits it.
    #[must_use]
    pub fn new(points: Vec<TrackPoint>, super_layer: u16, kind: LayerKind) -> Self {
        let fit = fit_points(&points).ok();
        Self {
            points,
            super_layer,
            kind,
            fit,
            weight: 0.0,
            cell: AutomatonCell::default(),
        }
    }

    /// Number of hits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the segment has no hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Hit indices.
    #[must_use]
    pub fn hits(&self) -> Vec<usize> {
        self.points.iter().map(|p| p.hit).collect()
    }

    /// Plane of the first hit.
    #[must_use]
    pub fn first_x(&self) -> f64 {
        self.points.first().map_or(f64::NAN, |p| p.x)
    }
}

impl HasAutomatonCell for Segment {
    fn automaton_cell(&self) -> &AutomatonCell {
        &self.cell
    }

    fn automaton_cell_mut(&mut self) -> &mut AutomatonCell {
        &mut self.cell
    }
}

/// Ordered chain of segments forming a full track candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Measurements sorted by plane.
    pub points: Vec<TrackPoint>,
    /// Super-layers crossed, with their wire kind, sorted.
    pub super_layers: Vec<(u16, LayerKind)>,
    /// Number of segments the track was built from.
    pub n_segments: usize,
    /// Trajectory fit, absent if the hits are degenerate.
    pub fit: Option<TrajectoryFit>,
    /// Quality assigned by the track filter.
    pub quality: f64,
}

impl Track {
    /// Builds a track from segments: hits are concatenated and sorted by plane.
    #[must_use]
    pub fn from_segments<'a, I>(segments: I) -> Self
    where
        I: IntoIterator<Item = &'a Segment>,
    {
        let mut points = Vec::new();
        let mut super_layers = Vec::new();
        let mut n_segments = 0;
        for segment in segments {
            points.extend_from_slice(&segment.points);
            super_layers.push((segment.super_layer, segment.kind));
            n_segments += 1;
        }
        Self::from_parts(points, super_layers, n_segments)
    }

    /// Builds a track from measurements and super-layer list, refitting it.
    #[must_use]
    pub fn from_parts(
        mut points: Vec<TrackPoint>,
        mut super_layers: Vec<(u16, LayerKind)>,
        n_segments: usize,
    ) -> Self {
        points.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.hit.cmp(&b.hit)));
        super_layers.sort_by_key(|&(id, _)| id);
        super_layers.dedup_by_key(|&mut (id, _)| id);
        let fit = fit_points(&points).ok();
        Self {
            points,
            super_layers,
            n_segments,
            fit,
            quality: 0.0,
        }
    }

    /// Number of hits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the track has no hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Hit indices.
    #[must_use]
    pub fn hits(&self) -> Vec<usize> {
        self.points.iter().map(|p| p.hit).collect()
    }

    /// Innermost and outermost super-layer.
    #[must_use]
    pub fn super_layer_range(&self) -> Option<(u16, u16)> {
        Some((self.super_layers.first()?.0, self.super_layers.last()?.0))
    }

    /// Refits after the hit content changed.
    pub fn refit(&mut self) {
        self.fit = fit_points(&self.points).ok();
    }
}

/// Parabola fit when enough planes are available, straight line otherwise.
///
/// # Errors
/// Fails for hits on fewer than two planes.
pub fn fit_points(points: &[TrackPoint]) -> Result<TrajectoryFit, NumericError> {
    let x0 = points.first().map_or(0.0, |p| p.x);
    match fit_parabola(points, x0) {
        Err(NumericError::DegenerateFit { .. }) => fit_line(points, x0),
        result => result,
    }
}
