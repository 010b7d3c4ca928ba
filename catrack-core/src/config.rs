//! Pipeline configuration.
//!
//! Every stage has a plain configuration struct with defaults and builder
//! methods. All structs deserialize with `#[serde(default)]`, so a JSON file
//! only needs to name the values it overrides.
#![allow(clippy::doc_markdown)]

use crate::error::{Error, Result};
use crate::geometry::Subdetector;
use serde::{Deserialize, Serialize};

/// Filter selection for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Factory name: `all`, `none`, `truth`, `fit`, `mva`, `not`,
    /// `pass_through` or `recording`.
    pub name: String,
    /// Reduced chi2 cut of the `fit` filter.
    pub chi2_cut: f64,
    /// Model name of the `mva` filter.
    pub model: Option<String>,
    /// Probability threshold of the `mva` filter.
    pub threshold: f64,
    /// Wrapped filter of `not` and `recording`.
    pub inner: Option<Box<FilterConfig>>,
    /// Fixed weight returned by `recording` instead of the inner weight.
    pub return_weight: Option<f64>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            name: "all".to_string(),
            chi2_cut: 10.0,
            model: None,
            threshold: 0.5,
            inner: None,
            return_weight: None,
        }
    }
}

impl FilterConfig {
    /// Filter with the given factory name and default parameters.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Accept everything.
    #[must_use]
    pub fn all() -> Self {
        Self::named("all")
    }

    /// Reject everything.
    #[must_use]
    pub fn none() -> Self {
        Self::named("none")
    }

    /// Accept on Monte Carlo truth.
    #[must_use]
    pub fn truth() -> Self {
        Self::named("truth")
    }

    /// Chi2 cut on the candidate's fit hypothesis.
    #[must_use]
    pub fn fit(chi2_cut: f64) -> Self {
        Self {
            chi2_cut,
            ..Self::named("fit")
        }
    }

    /// Classifier with a probability threshold.
    #[must_use]
    pub fn mva(model: &str, threshold: f64) -> Self {
        Self {
            model: Some(model.to_string()),
            threshold,
            ..Self::named("mva")
        }
    }

    /// Inverts the inner filter.
    #[must_use]
    pub fn not(inner: Self) -> Self {
        Self {
            inner: Some(Box::new(inner)),
            ..Self::named("not")
        }
    }

    /// Re-exposes the weight stored on the candidate.
    #[must_use]
    pub fn pass_through() -> Self {
        Self::named("pass_through")
    }

    /// Records every candidate scored by the inner filter.
    #[must_use]
    pub fn recording(inner: Self) -> Self {
        Self {
            inner: Some(Box::new(inner)),
            ..Self::named("recording")
        }
    }

    /// Sets the fixed weight returned by a recording filter.
    #[must_use]
    pub fn with_return_weight(mut self, weight: f64) -> Self {
        self.return_weight = Some(weight);
        self
    }

    fn validate(&self, stage: &str) -> Result<()> {
        if self.name == "fit" && !(self.chi2_cut.is_finite() && self.chi2_cut > 0.0) {
            return Err(Error::Config(format!(
                "{stage}: chi2_cut must be positive, got {}",
                self.chi2_cut
            )));
        }
        if self.name == "mva" && !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::Config(format!(
                "{stage}: threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if let Some(inner) = &self.inner {
            inner.validate(stage)?;
        }
        Ok(())
    }
}

/// Hit preparation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HitPreparerConfig {
    /// Filter on single hits.
    pub filter: FilterConfig,
}

/// Clustering of adjacent hits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterizerConfig {
    /// Sub-system searched by local track finding.
    pub subdetector: Subdetector,
    /// Maximum distance between neighbouring wires.
    pub adjacency_radius: f64,
    /// Maximum drift time difference of connected hits.
    pub max_time_difference: f64,
    /// Clusters with fewer hits are background.
    pub min_cluster_size: usize,
    /// Clusters with more hits are background.
    pub max_cluster_size: Option<usize>,
    /// Filter on hit pairs.
    pub filter: FilterConfig,
}

impl Default for ClusterizerConfig {
    fn default() -> Self {
        Self {
            subdetector: Subdetector::Drift,
            adjacency_radius: 1.5,
            max_time_difference: 200.0,
            min_cluster_size: 3,
            max_cluster_size: None,
            filter: FilterConfig::all(),
        }
    }
}

impl ClusterizerConfig {
    /// Sets the wire adjacency radius.
    #[must_use]
    pub fn with_adjacency_radius(mut self, radius: f64) -> Self {
        self.adjacency_radius = radius;
        self
    }

    /// Sets the maximum drift time difference.
    #[must_use]
    pub fn with_max_time_difference(mut self, dt: f64) -> Self {
        self.max_time_difference = dt;
        self
    }

    /// Sets the minimum cluster size.
    #[must_use]
    pub fn with_min_cluster_size(mut self, size: usize) -> Self {
        self.min_cluster_size = size;
        self
    }

    /// Sets the maximum cluster size.
    #[must_use]
    pub fn with_max_cluster_size(mut self, size: usize) -> Self {
        self.max_cluster_size = Some(size);
        self
    }
}

/// Facet creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacetConfig {
    /// Filter on hit triplets.
    pub filter: FilterConfig,
    /// Upper bound on facets per event.
    pub max_facets: usize,
}

impl Default for FacetConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::fit(10.0),
            max_facets: 200_000,
        }
    }
}

impl FacetConfig {
    /// Sets the facet filter.
    #[must_use]
    pub fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the facet cap.
    #[must_use]
    pub fn with_max_facets(mut self, max_facets: usize) -> Self {
        self.max_facets = max_facets;
        self
    }
}

/// Segment extraction from the facet graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Filter on facet relations.
    pub relation_filter: FilterConfig,
    /// Filter on extracted segments.
    pub segment_filter: FilterConfig,
    /// Minimum automaton state of an extracted facet path.
    pub min_state: u32,
    /// Minimum number of hits per segment.
    pub min_hits: usize,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            relation_filter: FilterConfig::fit(10.0),
            segment_filter: FilterConfig::all(),
            min_state: 0,
            min_hits: 3,
        }
    }
}

impl SegmentConfig {
    /// Sets the facet relation filter.
    #[must_use]
    pub fn with_relation_filter(mut self, filter: FilterConfig) -> Self {
        self.relation_filter = filter;
        self
    }

    /// Sets the segment filter.
    #[must_use]
    pub fn with_segment_filter(mut self, filter: FilterConfig) -> Self {
        self.segment_filter = filter;
        self
    }

    /// Sets the minimum number of hits.
    #[must_use]
    pub fn with_min_hits(mut self, min_hits: usize) -> Self {
        self.min_hits = min_hits;
        self
    }
}

/// Which track pairs the merger considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Only tracks whose boundary super-layers differ in wire kind.
    #[default]
    AxialStereo,
    /// Any pair of tracks with disjoint super-layers.
    Any,
}

/// Merging of tracks split across super-layer boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergerConfig {
    /// Enables the merger.
    pub enabled: bool,
    /// Pair selection policy.
    pub policy: MergePolicy,
    /// Agreement of the fits at the boundary, in standard deviations.
    pub tolerance: f64,
    /// Filter on track pairs.
    pub filter: FilterConfig,
    /// Hits with a larger pull are removed after merging.
    pub outlier_pull: f64,
}

impl Default for MergerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: MergePolicy::AxialStereo,
            tolerance: 5.0,
            filter: FilterConfig::fit(10.0),
            outlier_pull: 5.0,
        }
    }
}

/// Track linking from segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    /// Filter on segment relations.
    pub relation_filter: FilterConfig,
    /// Filter on linked tracks; its weight becomes the track quality.
    pub track_filter: FilterConfig,
    /// Largest super-layer distance bridged by one relation.
    pub max_super_layer_gap: u16,
    /// Minimum automaton state of an extracted segment path.
    pub min_state: u32,
    /// Track merger.
    pub merger: MergerConfig,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            relation_filter: FilterConfig::fit(10.0),
            track_filter: FilterConfig::all(),
            max_super_layer_gap: 1,
            min_state: 0,
            merger: MergerConfig::default(),
        }
    }
}

impl TrackConfig {
    /// Sets the segment relation filter.
    #[must_use]
    pub fn with_relation_filter(mut self, filter: FilterConfig) -> Self {
        self.relation_filter = filter;
        self
    }

    /// Sets the track filter.
    #[must_use]
    pub fn with_track_filter(mut self, filter: FilterConfig) -> Self {
        self.track_filter = filter;
        self
    }

    /// Sets the largest bridged super-layer gap.
    #[must_use]
    pub fn with_max_super_layer_gap(mut self, gap: u16) -> Self {
        self.max_super_layer_gap = gap;
        self
    }

    /// Sets the merger configuration.
    #[must_use]
    pub fn with_merger(mut self, merger: MergerConfig) -> Self {
        self.merger = merger;
        self
    }
}

/// Direction of the CKF extension along x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Towards smaller x.
    #[default]
    Inward,
    /// Towards larger x.
    Outward,
}

/// Combinatorial Kalman filter extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CkfConfig {
    /// Enables the extension.
    pub enabled: bool,
    /// Sub-system holding the target layers.
    pub target_subdetector: Subdetector,
    /// Extension direction.
    pub direction: Direction,
    /// Filter on single extension steps.
    pub state_filter: FilterConfig,
    /// Filter on finished results.
    pub result_filter: FilterConfig,
    /// Paths kept after every layer.
    pub beam_width: usize,
    /// Candidate hits proposed per state and layer.
    pub max_candidates_per_state: usize,
    /// Search window in standard deviations of the prediction.
    pub window_sigma: f64,
    /// Lower bound of the search window half-width.
    pub min_window: f64,
    /// Slope variance added per unit length.
    pub scattering_variance: f64,
    /// Inflation of the seed covariance.
    pub seed_covariance_scale: f64,
    /// Minimum number of added hits for a result.
    pub min_added_hits: usize,
    /// Results kept per seed.
    pub results_per_seed: usize,
    /// Candidate expansions allowed per event.
    pub max_steps: usize,
    /// Wall-clock budget per event in milliseconds.
    pub time_budget_ms: Option<u64>,
}

impl Default for CkfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_subdetector: Subdetector::Strip,
            direction: Direction::Inward,
            state_filter: FilterConfig::fit(25.0),
            result_filter: FilterConfig::all(),
            beam_width: 5,
            max_candidates_per_state: 8,
            window_sigma: 5.0,
            min_window: 0.3,
            scattering_variance: 1e-6,
            seed_covariance_scale: 10.0,
            min_added_hits: 1,
            results_per_seed: 1,
            max_steps: 100_000,
            time_budget_ms: None,
        }
    }
}

impl CkfConfig {
    /// Sets the beam width.
    #[must_use]
    pub fn with_beam_width(mut self, beam_width: usize) -> Self {
        self.beam_width = beam_width;
        self
    }

    /// Sets the state filter.
    #[must_use]
    pub fn with_state_filter(mut self, filter: FilterConfig) -> Self {
        self.state_filter = filter;
        self
    }

    /// Sets the result filter.
    #[must_use]
    pub fn with_result_filter(mut self, filter: FilterConfig) -> Self {
        self.result_filter = filter;
        self
    }

    /// Sets the extension direction.
    #[must_use]
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Sets the candidate fan-out per state.
    #[must_use]
    pub fn with_max_candidates_per_state(mut self, max: usize) -> Self {
        self.max_candidates_per_state = max;
        self
    }

    /// Sets the step budget.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Sets the wall-clock budget.
    #[must_use]
    pub fn with_time_budget_ms(mut self, budget: u64) -> Self {
        self.time_budget_ms = Some(budget);
        self
    }

    /// Sets the minimum number of added hits.
    #[must_use]
    pub fn with_min_added_hits(mut self, min: usize) -> Self {
        self.min_added_hits = min;
        self
    }

    /// Sets the number of results kept per seed.
    #[must_use]
    pub fn with_results_per_seed(mut self, n: usize) -> Self {
        self.results_per_seed = n;
        self
    }
}

/// Resolution of overlapping CKF results.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultFilterConfig {
    /// Filter deciding whether two overlapping results conflict.
    pub filter: FilterConfig,
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Hit preparation.
    pub hit_preparer: HitPreparerConfig,
    /// Clustering.
    pub clusterizer: ClusterizerConfig,
    /// Facet creation.
    pub facets: FacetConfig,
    /// Segment extraction.
    pub segments: SegmentConfig,
    /// Track linking and merging.
    pub tracks: TrackConfig,
    /// CKF extension.
    pub ckf: CkfConfig,
    /// Result overlap resolution.
    pub result_filter: ResultFilterConfig,
}

impl PipelineConfig {
    /// Parses a configuration from JSON.
    ///
    /// # Errors
    /// Returns an error for malformed JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Checks value ranges. Filter names are resolved later by the factory.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for the first out-of-range value.
    pub fn validate(&self) -> Result<()> {
        let clusterizer = &self.clusterizer;
        check_positive("clusterizer.adjacency_radius", clusterizer.adjacency_radius)?;
        check_non_negative(
            "clusterizer.max_time_difference",
            clusterizer.max_time_difference,
        )?;
        if let Some(max) = clusterizer.max_cluster_size {
            if max < clusterizer.min_cluster_size {
                return Err(Error::Config(format!(
                    "clusterizer.max_cluster_size {max} is below min_cluster_size {}",
                    clusterizer.min_cluster_size
                )));
            }
        }
        if self.segments.min_hits < 3 {
            return Err(Error::Config(format!(
                "segments.min_hits must be at least 3, got {}",
                self.segments.min_hits
            )));
        }
        if self.tracks.max_super_layer_gap == 0 {
            return Err(Error::Config(
                "tracks.max_super_layer_gap must be at least 1".to_string(),
            ));
        }
        let merger = &self.tracks.merger;
        check_positive("tracks.merger.tolerance", merger.tolerance)?;
        check_positive("tracks.merger.outlier_pull", merger.outlier_pull)?;

        let ckf = &self.ckf;
        if ckf.beam_width == 0 {
            return Err(Error::Config("ckf.beam_width must be at least 1".to_string()));
        }
        if ckf.max_candidates_per_state == 0 {
            return Err(Error::Config(
                "ckf.max_candidates_per_state must be at least 1".to_string(),
            ));
        }
        if ckf.results_per_seed == 0 {
            return Err(Error::Config(
                "ckf.results_per_seed must be at least 1".to_string(),
            ));
        }
        check_positive("ckf.window_sigma", ckf.window_sigma)?;
        check_non_negative("ckf.min_window", ckf.min_window)?;
        check_non_negative("ckf.scattering_variance", ckf.scattering_variance)?;
        check_positive("ckf.seed_covariance_scale", ckf.seed_covariance_scale)?;

        for (stage, filter) in self.filters() {
            filter.validate(stage)?;
        }
        Ok(())
    }

    /// Every filter of the pipeline with its stage name.
    #[must_use]
    pub fn filters(&self) -> Vec<(&'static str, &FilterConfig)> {
        vec![
            ("hit_preparer.filter", &self.hit_preparer.filter),
            ("clusterizer.filter", &self.clusterizer.filter),
            ("facets.filter", &self.facets.filter),
            ("segments.relation_filter", &self.segments.relation_filter),
            ("segments.segment_filter", &self.segments.segment_filter),
            ("tracks.relation_filter", &self.tracks.relation_filter),
            ("tracks.track_filter", &self.tracks.track_filter),
            ("tracks.merger.filter", &self.tracks.merger.filter),
            ("ckf.state_filter", &self.ckf.state_filter),
            ("ckf.result_filter", &self.ckf.result_filter),
            ("result_filter.filter", &self.result_filter.filter),
        ]
    }
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::Config(format!("{name} must be positive, got {value}")))
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{name} must be non-negative, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PipelineConfig::from_json(
            r#"{"ckf": {"beam_width": 3}, "facets": {"filter": {"name": "none"}}}"#,
        )
        .unwrap();
        assert_eq!(config.ckf.beam_width, 3);
        assert_eq!(config.ckf.window_sigma, CkfConfig::default().window_sigma);
        assert_eq!(config.facets.filter.name, "none");
        assert_eq!(config.facets.max_facets, FacetConfig::default().max_facets);
    }

    #[test]
    fn test_out_of_range_values() {
        let mut config = PipelineConfig::default();
        config.ckf.beam_width = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = PipelineConfig::default();
        config.ckf.min_window = -1.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.tracks.track_filter = FilterConfig::not(FilterConfig::fit(0.0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nested_filter_json() {
        let filter: FilterConfig = serde_json::from_str(
            r#"{"name": "recording", "inner": {"name": "fit", "chi2_cut": 4.0}, "return_weight": 1.0}"#,
        )
        .unwrap();
        assert_eq!(
            filter,
            FilterConfig::recording(FilterConfig::fit(4.0)).with_return_weight(1.0)
        );
    }
}
