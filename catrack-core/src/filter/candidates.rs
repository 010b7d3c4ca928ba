//! Candidate implementations for every stage of the pipeline.
//!
//! Pair candidates borrow their members; filters for them are stored as
//! `Filter<FacetPair<'static>>` and so on, which coerces to any shorter
//! lifetime at the call site.
#![allow(clippy::cast_precision_loss)]

use super::candidate::Candidate;
use crate::ckf::CkfResult;
use crate::error::NumericError;
use crate::fit::{opening_cosine, TrajectoryFit};
use crate::hit::{common_truth, TrackPoint, WireHit};
use crate::kalman::KalmanState;
use crate::track::{fit_points, Facet, Segment, Track};

fn reduced_chi2_of(fit: Option<&TrajectoryFit>) -> Result<f64, NumericError> {
    fit.map(TrajectoryFit::reduced_chi2)
        .ok_or(NumericError::DegenerateFit {
            points: 0,
            distinct: 0,
            parameters: 3,
        })
}

fn combined_reduced_chi2<'a, I>(points: I) -> Result<f64, NumericError>
where
    I: IntoIterator<Item = &'a TrackPoint>,
{
    let mut points: Vec<TrackPoint> = points.into_iter().copied().collect();
    points.sort_by(|a, b| a.x.total_cmp(&b.x));
    fit_points(&points).map(|fit| fit.reduced_chi2())
}

fn span(points: &[TrackPoint]) -> f64 {
    match (points.first(), points.last()) {
        (Some(first), Some(last)) => last.x - first.x,
        _ => 0.0,
    }
}

/// Whether two sets of measurements come from the same particle.
fn same_particle(a: &[TrackPoint], b: &[TrackPoint]) -> Option<bool> {
    let first = |points: &[TrackPoint]| points.iter().find_map(|p| p.mc_particle);
    match (first(a), first(b)) {
        (Some(x), Some(y)) => Some(x == y),
        (None, None) => None,
        _ => Some(false),
    }
}

impl Candidate for WireHit {
    const KIND: &'static str = "wire_hit";
    const FEATURE_NAMES: &'static [&'static str] =
        &["x", "y", "variance", "drift_length", "drift_time"];

    fn intrinsic_weight(&self) -> f64 {
        1.0
    }

    fn features(&self) -> Vec<f64> {
        vec![
            self.x,
            self.y,
            self.variance,
            self.drift_length,
            self.drift_time,
        ]
    }

    fn truth(&self) -> Option<bool> {
        self.mc_particle.map(|_| true)
    }
}

/// Two hits considered for the same cluster.
#[derive(Debug, Clone, Copy)]
pub struct HitPair<'a> {
    /// Hit earlier in construction order.
    pub from: &'a WireHit,
    /// Hit later in construction order.
    pub to: &'a WireHit,
}

impl Candidate for HitPair<'_> {
    const KIND: &'static str = "hit_pair";
    const FEATURE_NAMES: &'static [&'static str] = &["distance", "delta_layer", "delta_time"];

    fn intrinsic_weight(&self) -> f64 {
        1.0
    }

    fn features(&self) -> Vec<f64> {
        vec![
            self.from.distance(self.to),
            f64::from(self.to.wire.layer) - f64::from(self.from.wire.layer),
            self.to.drift_time - self.from.drift_time,
        ]
    }

    fn truth(&self) -> Option<bool> {
        common_truth(&[self.from.point(), self.to.point()])
    }
}

impl Candidate for Facet {
    const KIND: &'static str = "facet";
    const FEATURE_NAMES: &'static [&'static str] =
        &["curvature", "opening_cosine", "line_chi2", "span"];
    const SUPPORTS_FIT: bool = true;

    fn intrinsic_weight(&self) -> f64 {
        1.0
    }

    fn stored_weight(&self) -> Option<f64> {
        Some(self.cell.intrinsic_weight())
    }

    fn fit_chi2(&self) -> Result<f64, NumericError> {
        self.line_fit().map(|fit| fit.reduced_chi2())
    }

    fn features(&self) -> Vec<f64> {
        let [a, b, c] = self.points.map(|p| p.position());
        vec![
            self.curvature().unwrap_or(f64::NAN),
            opening_cosine(a, b, c).unwrap_or(f64::NAN),
            self.fit_chi2().unwrap_or(f64::NAN),
            span(&self.points),
        ]
    }

    fn truth(&self) -> Option<bool> {
        common_truth(&self.points)
    }
}

/// Relation between two facets sharing two hits.
#[derive(Debug, Clone, Copy)]
pub struct FacetPair<'a> {
    /// Facet whose middle and end are shared.
    pub from: &'a Facet,
    /// Facet starting at `from`'s middle hit.
    pub to: &'a Facet,
}

impl FacetPair<'_> {
    /// The four distinct measurements of the pair.
    #[must_use]
    pub fn points(&self) -> [TrackPoint; 4] {
        [
            self.from.points[0],
            self.from.points[1],
            self.from.points[2],
            self.to.points[2],
        ]
    }
}

impl Candidate for FacetPair<'_> {
    const KIND: &'static str = "facet_pair";
    const FEATURE_NAMES: &'static [&'static str] =
        &["delta_curvature", "opening_cosine", "reduced_chi2"];
    const SUPPORTS_FIT: bool = true;

    fn intrinsic_weight(&self) -> f64 {
        1.0
    }

    fn fit_chi2(&self) -> Result<f64, NumericError> {
        combined_reduced_chi2(&self.points())
    }

    fn features(&self) -> Vec<f64> {
        let delta_curvature = match (self.from.curvature(), self.to.curvature()) {
            (Some(a), Some(b)) => b - a,
            _ => f64::NAN,
        };
        let [a, _, c, d] = self.points().map(|p| p.position());
        vec![
            delta_curvature,
            opening_cosine(a, c, d).unwrap_or(f64::NAN),
            self.fit_chi2().unwrap_or(f64::NAN),
        ]
    }

    fn truth(&self) -> Option<bool> {
        common_truth(&self.points())
    }
}

impl Candidate for Segment {
    const KIND: &'static str = "segment";
    const FEATURE_NAMES: &'static [&'static str] =
        &["n_hits", "reduced_chi2", "curvature", "span"];
    const SUPPORTS_FIT: bool = true;

    fn intrinsic_weight(&self) -> f64 {
        self.len() as f64
    }

    fn stored_weight(&self) -> Option<f64> {
        Some(self.weight)
    }

    fn fit_chi2(&self) -> Result<f64, NumericError> {
        reduced_chi2_of(self.fit.as_ref())
    }

    fn features(&self) -> Vec<f64> {
        vec![
            self.len() as f64,
            self.fit_chi2().unwrap_or(f64::NAN),
            self.fit.as_ref().map_or(f64::NAN, TrajectoryFit::curvature),
            span(&self.points),
        ]
    }

    fn truth(&self) -> Option<bool> {
        common_truth(&self.points)
    }
}

/// Relation between two segments in different super-layers.
#[derive(Debug, Clone, Copy)]
pub struct SegmentPair<'a> {
    /// Inner segment.
    pub from: &'a Segment,
    /// Outer segment.
    pub to: &'a Segment,
}

impl Candidate for SegmentPair<'_> {
    const KIND: &'static str = "segment_pair";
    const FEATURE_NAMES: &'static [&'static str] =
        &["n_hits", "reduced_chi2", "delta_slope", "gap"];
    const SUPPORTS_FIT: bool = true;

    fn intrinsic_weight(&self) -> f64 {
        self.to.len() as f64
    }

    fn fit_chi2(&self) -> Result<f64, NumericError> {
        combined_reduced_chi2(self.from.points.iter().chain(&self.to.points))
    }

    fn features(&self) -> Vec<f64> {
        let x = self.to.first_x();
        let delta_slope = match (&self.from.fit, &self.to.fit) {
            (Some(a), Some(b)) => b.slope_at(x) - a.slope_at(x),
            _ => f64::NAN,
        };
        let gap = self.from.points.last().map_or(f64::NAN, |p| x - p.x);
        vec![
            (self.from.len() + self.to.len()) as f64,
            self.fit_chi2().unwrap_or(f64::NAN),
            delta_slope,
            gap,
        ]
    }

    fn truth(&self) -> Option<bool> {
        common_truth(self.from.points.iter().chain(&self.to.points))
    }
}

impl Candidate for Track {
    const KIND: &'static str = "track";
    const FEATURE_NAMES: &'static [&'static str] =
        &["n_hits", "n_super_layers", "reduced_chi2", "curvature"];
    const SUPPORTS_FIT: bool = true;

    fn intrinsic_weight(&self) -> f64 {
        self.len() as f64
    }

    fn stored_weight(&self) -> Option<f64> {
        Some(self.quality)
    }

    fn fit_chi2(&self) -> Result<f64, NumericError> {
        reduced_chi2_of(self.fit.as_ref())
    }

    fn features(&self) -> Vec<f64> {
        vec![
            self.len() as f64,
            self.super_layers.len() as f64,
            self.fit_chi2().unwrap_or(f64::NAN),
            self.fit.as_ref().map_or(f64::NAN, TrajectoryFit::curvature),
        ]
    }

    fn truth(&self) -> Option<bool> {
        common_truth(&self.points)
    }
}

/// Two tracks considered for merging.
#[derive(Debug, Clone, Copy)]
pub struct TrackPair<'a> {
    /// Track at smaller x.
    pub inner: &'a Track,
    /// Track at larger x.
    pub outer: &'a Track,
}

impl TrackPair<'_> {
    /// Differences of coordinate and slope of the two fits at the outer
    /// track's first plane.
    #[must_use]
    pub fn boundary_deltas(&self) -> Option<(f64, f64)> {
        let x = self.outer.points.first()?.x;
        let inner = self.inner.fit.as_ref()?;
        let outer = self.outer.fit.as_ref()?;
        Some((
            outer.y_at(x) - inner.y_at(x),
            outer.slope_at(x) - inner.slope_at(x),
        ))
    }
}

impl Candidate for TrackPair<'_> {
    const KIND: &'static str = "track_pair";
    const FEATURE_NAMES: &'static [&'static str] =
        &["n_hits", "reduced_chi2", "delta_y", "delta_slope"];
    const SUPPORTS_FIT: bool = true;

    fn intrinsic_weight(&self) -> f64 {
        1.0
    }

    fn fit_chi2(&self) -> Result<f64, NumericError> {
        combined_reduced_chi2(self.inner.points.iter().chain(&self.outer.points))
    }

    fn features(&self) -> Vec<f64> {
        let (delta_y, delta_slope) = self.boundary_deltas().unwrap_or((f64::NAN, f64::NAN));
        vec![
            (self.inner.len() + self.outer.len()) as f64,
            self.fit_chi2().unwrap_or(f64::NAN),
            delta_y,
            delta_slope,
        ]
    }

    fn truth(&self) -> Option<bool> {
        same_particle(&self.inner.points, &self.outer.points)
    }
}

/// One proposed CKF extension step, after the Kalman update.
#[derive(Debug, Clone, Copy)]
pub struct StateCandidate<'a> {
    /// Proposed measurement.
    pub point: &'a TrackPoint,
    /// State propagated to the measurement plane, before the update.
    pub predicted: &'a KalmanState,
    /// Chi2 increment of the update.
    pub chi2: f64,
    /// Chi2 accumulated by the path before this step.
    pub path_chi2: f64,
    /// Hits added by the path before this step.
    pub n_added: usize,
    /// Particle of the seed track, if known.
    pub seed_particle: Option<u32>,
}

impl Candidate for StateCandidate<'_> {
    const KIND: &'static str = "ckf_state";
    const FEATURE_NAMES: &'static [&'static str] =
        &["chi2", "residual", "prediction_sigma", "path_chi2", "n_added"];
    const SUPPORTS_FIT: bool = true;

    fn intrinsic_weight(&self) -> f64 {
        1.0
    }

    fn fit_chi2(&self) -> Result<f64, NumericError> {
        if self.chi2.is_finite() {
            Ok(self.chi2)
        } else {
            Err(NumericError::NonFinite("state chi2"))
        }
    }

    fn features(&self) -> Vec<f64> {
        vec![
            self.chi2,
            self.point.y - self.predicted.y(),
            self.predicted.variance_y().sqrt(),
            self.path_chi2,
            self.n_added as f64,
        ]
    }

    fn truth(&self) -> Option<bool> {
        match (self.seed_particle, self.point.mc_particle) {
            (Some(seed), Some(hit)) => Some(seed == hit),
            (None, None) => None,
            _ => Some(false),
        }
    }
}

impl Candidate for CkfResult {
    const KIND: &'static str = "ckf_result";
    const FEATURE_NAMES: &'static [&'static str] = &["n_added", "chi2", "score", "reduced_chi2"];
    const SUPPORTS_FIT: bool = true;

    fn intrinsic_weight(&self) -> f64 {
        self.score
    }

    fn stored_weight(&self) -> Option<f64> {
        Some(self.score)
    }

    fn fit_chi2(&self) -> Result<f64, NumericError> {
        if self.added.is_empty() {
            return Err(NumericError::DegenerateFit {
                points: 0,
                distinct: 0,
                parameters: 1,
            });
        }
        Ok(self.chi2 / self.n_added() as f64)
    }

    fn features(&self) -> Vec<f64> {
        vec![
            self.n_added() as f64,
            self.chi2,
            self.score,
            self.fit_chi2().unwrap_or(f64::NAN),
        ]
    }

    fn truth(&self) -> Option<bool> {
        common_truth(self.seed_points.iter().chain(&self.added))
    }
}

/// Two CKF results sharing added hits.
#[derive(Debug, Clone, Copy)]
pub struct ResultPair<'a> {
    /// Higher scored result.
    pub first: &'a CkfResult,
    /// Lower scored result.
    pub second: &'a CkfResult,
}

impl Candidate for ResultPair<'_> {
    const KIND: &'static str = "result_pair";
    const FEATURE_NAMES: &'static [&'static str] =
        &["shared_hits", "delta_score", "n_added_first", "n_added_second"];

    fn intrinsic_weight(&self) -> f64 {
        self.first.shared_hits(self.second) as f64
    }

    fn features(&self) -> Vec<f64> {
        vec![
            self.intrinsic_weight(),
            self.first.score - self.second.score,
            self.first.n_added() as f64,
            self.second.n_added() as f64,
        ]
    }

    fn truth(&self) -> Option<bool> {
        same_particle(&self.first.added, &self.second.added)
    }
}
