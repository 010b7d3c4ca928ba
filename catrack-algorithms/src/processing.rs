//! Per-event pipeline driver.

use crate::adjacency::WireAdjacency;
use crate::ckf::CkfExtrapolator;
use crate::clusterizer::Clusterizer;
use crate::facet_creator::FacetCreator;
use crate::hit_preparer::HitPreparer;
use crate::result_filter::ResultFilter;
use crate::segment_extractor::SegmentExtractor;
use crate::track_linker::TrackLinker;
use crate::track_merger::TrackMerger;
use catrack_core::{
    Candidate, ChooseableFilter, CkfResult, Event, FilterConfig, FilterFactory, HitOwnership,
    ModelStore, PipelineConfig, Recorder, Result, Track, WireGeometry,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-event counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDiagnostics {
    /// Hits in the input event.
    pub n_hits: usize,
    /// Hits on unknown channels or with non-finite values.
    pub dropped_hits: usize,
    /// Hits rejected by the hit filter.
    pub rejected_hits: usize,
    /// Hits in clusters outside the size limits.
    pub background_hits: usize,
    /// Clusters kept.
    pub clusters: usize,
    /// Facets kept.
    pub facets: usize,
    /// Facets dropped by the facet cap.
    pub facet_overflow: usize,
    /// Accepted facet relations.
    pub facet_relations: usize,
    /// Segments extracted.
    pub segments: usize,
    /// Accepted segment relations.
    pub segment_relations: usize,
    /// Tracks after merging.
    pub tracks: usize,
    /// Track merges.
    pub merges: usize,
    /// Hits removed from merged tracks.
    pub removed_outliers: usize,
    /// Numeric failures absorbed by the CKF.
    pub numeric_failures: usize,
    /// CKF candidate expansions.
    pub ckf_expansions: usize,
    /// CKF paths dropped by beam pruning.
    pub ckf_pruned: usize,
    /// The CKF budget ran out.
    pub budget_exhausted: bool,
    /// CKF results before overlap resolution.
    pub results_before: usize,
    /// CKF results after overlap resolution.
    pub results_after: usize,
    /// Cycle-closing relations ignored by the automaton passes.
    pub cycles_ignored: usize,
}

impl EventDiagnostics {
    /// Adds the counters of another event.
    pub fn accumulate(&mut self, other: &Self) {
        self.n_hits += other.n_hits;
        self.dropped_hits += other.dropped_hits;
        self.rejected_hits += other.rejected_hits;
        self.background_hits += other.background_hits;
        self.clusters += other.clusters;
        self.facets += other.facets;
        self.facet_overflow += other.facet_overflow;
        self.facet_relations += other.facet_relations;
        self.segments += other.segments;
        self.segment_relations += other.segment_relations;
        self.tracks += other.tracks;
        self.merges += other.merges;
        self.removed_outliers += other.removed_outliers;
        self.numeric_failures += other.numeric_failures;
        self.ckf_expansions += other.ckf_expansions;
        self.ckf_pruned += other.ckf_pruned;
        self.budget_exhausted |= other.budget_exhausted;
        self.results_before += other.results_before;
        self.results_after += other.results_after;
        self.cycles_ignored += other.cycles_ignored;
    }
}

/// Reconstruction output of one event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventResult {
    /// Event id.
    pub event_id: u64,
    /// Tracks of the local finding.
    pub tracks: Vec<Track>,
    /// Tracks extended into the target sub-system.
    pub ckf_results: Vec<CkfResult>,
    /// Counters.
    pub diagnostics: EventDiagnostics,
}

/// The complete track finding chain.
///
/// Built once per configuration; [`TrackFinder::process_event`] takes
/// `&self` and can run on many events concurrently.
#[derive(Debug)]
pub struct TrackFinder {
    geometry: Arc<WireGeometry>,
    adjacency: WireAdjacency,
    hit_preparer: HitPreparer,
    clusterizer: Clusterizer,
    facet_creator: FacetCreator,
    segment_extractor: SegmentExtractor,
    track_linker: TrackLinker,
    track_merger: TrackMerger,
    ckf: CkfExtrapolator,
    result_filter: ResultFilter,
}

fn chooseable<C: Candidate>(
    stage: &'static str,
    config: &FilterConfig,
    models: &ModelStore,
    recorder: Option<&Recorder>,
) -> Result<ChooseableFilter<C>> {
    let factory = FilterFactory::new(stage, models).with_recorder(recorder.cloned());
    ChooseableFilter::new(&factory, config)
}

impl TrackFinder {
    /// Validates the configuration and builds every stage.
    ///
    /// # Errors
    /// Returns a configuration error for out-of-range values, unknown
    /// filter or model names, or a recording filter without `recorder`.
    pub fn new(
        config: PipelineConfig,
        geometry: Arc<WireGeometry>,
        models: &ModelStore,
        recorder: Option<Recorder>,
    ) -> Result<Self> {
        config.validate()?;
        let recorder = recorder.as_ref();
        let adjacency = WireAdjacency::build(&geometry, config.clusterizer.adjacency_radius)?;

        let hit_preparer = HitPreparer::new(chooseable(
            "hit_preparer.filter",
            &config.hit_preparer.filter,
            models,
            recorder,
        )?);
        let clusterizer = Clusterizer::new(
            config.clusterizer.clone(),
            chooseable(
                "clusterizer.filter",
                &config.clusterizer.filter,
                models,
                recorder,
            )?,
        );
        let facet_creator = FacetCreator::new(
            config.facets.clone(),
            chooseable("facets.filter", &config.facets.filter, models, recorder)?,
        );
        let segment_extractor = SegmentExtractor::new(
            config.segments.clone(),
            chooseable(
                "segments.relation_filter",
                &config.segments.relation_filter,
                models,
                recorder,
            )?,
            chooseable(
                "segments.segment_filter",
                &config.segments.segment_filter,
                models,
                recorder,
            )?,
        );
        let track_linker = TrackLinker::new(
            config.tracks.clone(),
            chooseable(
                "tracks.relation_filter",
                &config.tracks.relation_filter,
                models,
                recorder,
            )?,
            chooseable(
                "tracks.track_filter",
                &config.tracks.track_filter,
                models,
                recorder,
            )?,
        );
        let track_merger = TrackMerger::new(
            config.tracks.merger.clone(),
            chooseable(
                "tracks.merger.filter",
                &config.tracks.merger.filter,
                models,
                recorder,
            )?,
        );
        let ckf = CkfExtrapolator::new(
            config.ckf.clone(),
            Arc::clone(&geometry),
            chooseable("ckf.state_filter", &config.ckf.state_filter, models, recorder)?,
            chooseable(
                "ckf.result_filter",
                &config.ckf.result_filter,
                models,
                recorder,
            )?,
        );
        let result_filter = ResultFilter::new(
            chooseable(
                "result_filter.filter",
                &config.result_filter.filter,
                models,
                recorder,
            )?,
            config.ckf.min_added_hits,
        );

        log::info!(
            "track finder ready: {} layers, {} wires, beam width {}",
            geometry.layers().len(),
            geometry.n_wires(),
            config.ckf.beam_width
        );
        Ok(Self {
            geometry,
            adjacency,
            hit_preparer,
            clusterizer,
            facet_creator,
            segment_extractor,
            track_linker,
            track_merger,
            ckf,
            result_filter,
        })
    }

    /// Geometry the finder was built for.
    #[must_use]
    pub fn geometry(&self) -> &WireGeometry {
        &self.geometry
    }

    /// Wire adjacency table.
    #[must_use]
    pub fn adjacency(&self) -> &WireAdjacency {
        &self.adjacency
    }

    /// Runs all stages on one event.
    ///
    /// Malformed input degrades the result; it never fails the event.
    #[must_use]
    pub fn process_event(&self, event: &Event) -> EventResult {
        let mut diagnostics = EventDiagnostics {
            n_hits: event.hits.len(),
            ..EventDiagnostics::default()
        };

        let prepared = self.hit_preparer.prepare(&self.geometry, &event.hits);
        diagnostics.dropped_hits = prepared.dropped;
        diagnostics.rejected_hits = prepared.rejected;
        let hits = prepared.hits;
        let mut ownership = HitOwnership::new(hits.len());

        let clusters = self
            .clusterizer
            .cluster(&hits, &self.adjacency, &mut ownership);
        diagnostics.background_hits = clusters.n_background;
        diagnostics.clusters = clusters.clusters.len();

        let facets = self
            .facet_creator
            .create(&hits, &clusters.clusters, &self.adjacency, &ownership);
        diagnostics.facets = facets.facets.len();
        diagnostics.facet_overflow = facets.overflow;
        let mut facets = facets.facets;

        let segments = self
            .segment_extractor
            .extract(&hits, &mut facets, &mut ownership);
        diagnostics.segments = segments.segments.len();
        diagnostics.facet_relations = segments.relations;
        let mut segments_cycles = segments.cycles_ignored;
        let mut segments = segments.segments;

        let linked = self.track_linker.link(&mut segments, &mut ownership);
        diagnostics.segment_relations = linked.relations;
        segments_cycles += linked.cycles_ignored;
        diagnostics.cycles_ignored = segments_cycles;

        let merged = self.track_merger.merge(linked.tracks, &mut ownership);
        diagnostics.tracks = merged.tracks.len();
        diagnostics.merges = merged.merges;
        diagnostics.removed_outliers = merged.removed_outliers;
        let tracks = merged.tracks;

        let (results, stats) = self.ckf.extend(&tracks, &hits, &ownership);
        diagnostics.numeric_failures = stats.numeric_failures;
        diagnostics.ckf_expansions = stats.expansions;
        diagnostics.ckf_pruned = stats.pruned;
        diagnostics.budget_exhausted = stats.budget_exhausted;
        diagnostics.results_before = results.len();

        let ckf_results = self.result_filter.resolve(results, &mut ownership);
        diagnostics.results_after = ckf_results.len();

        log::debug!(
            "event {}: {} hits, {} segments, {} tracks, {} extended",
            event.id,
            hits.len(),
            diagnostics.segments,
            diagnostics.tracks,
            diagnostics.results_after
        );
        EventResult {
            event_id: event.id,
            tracks,
            ckf_results,
            diagnostics,
        }
    }

    /// Processes independent events in parallel, preserving input order.
    #[must_use]
    pub fn process_events(&self, events: &[Event]) -> Vec<EventResult> {
        events
            .par_iter()
            .map(|event| self.process_event(event))
            .collect()
    }
}
