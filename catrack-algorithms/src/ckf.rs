//! Combinatorial Kalman filter: beam-search extension of tracks.
//!
//! Key characteristics:
//! - Seeds are the tracks of the local finding, their fit gives the
//!   initial Kalman state
//! - One step extends every path of the beam by one target layer
//! - Candidate hits come from a per-layer y-sorted index (binary search)
//! - The beam keeps the `beam_width` best paths by accumulated score
//! - A step budget (and optional deadline) is shared by all seeds of an event
#![allow(clippy::cast_precision_loss)]

use catrack_core::{
    CkfConfig, CkfPath, CkfResult, CkfState, ChooseableFilter, Direction, HitOwnership,
    KalmanState, LayerGeometry, PathStatus, StateArena, StateCandidate, Subdetector,
    Termination, Track, WireGeometry, WireHit,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counters of one extension run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CkfStats {
    /// Candidate hits evaluated.
    pub expansions: usize,
    /// Paths dropped by beam pruning.
    pub pruned: usize,
    /// Candidates rejected by the state filter.
    pub rejected: usize,
    /// Propagation or update failures.
    pub numeric_failures: usize,
    /// The step or time budget ran out.
    pub budget_exhausted: bool,
}

impl CkfStats {
    fn add(&mut self, other: &Self) {
        self.expansions += other.expansions;
        self.pruned += other.pruned;
        self.rejected += other.rejected;
        self.numeric_failures += other.numeric_failures;
        self.budget_exhausted |= other.budget_exhausted;
    }
}

/// Per-event step and time budget.
#[derive(Debug, Clone)]
pub struct Budget {
    steps_left: usize,
    deadline: Option<Instant>,
    exhausted: bool,
}

impl Budget {
    /// Creates a budget of `max_steps` candidate expansions, optionally
    /// bounded in wall-clock time.
    #[must_use]
    pub fn new(max_steps: usize, time_limit: Option<Duration>) -> Self {
        Self {
            steps_left: max_steps,
            deadline: time_limit.map(|limit| Instant::now() + limit),
            exhausted: false,
        }
    }

    /// Budget without any limit.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(usize::MAX, None)
    }

    /// Takes one step. Returns false once the budget is exhausted.
    pub fn consume(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        let late = self.deadline.is_some_and(|deadline| Instant::now() >= deadline);
        if self.steps_left == 0 || late {
            self.exhausted = true;
            return false;
        }
        self.steps_left -= 1;
        true
    }

    /// Returns true once a step was refused.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

/// Available hits of the target sub-system, per layer, sorted by `y`.
#[derive(Debug, Clone, Default)]
pub struct CandidateIndex {
    layers: HashMap<u16, Vec<(f64, usize)>>,
}

impl CandidateIndex {
    /// Indexes the available hits of one sub-system.
    #[must_use]
    pub fn build(hits: &[WireHit], subdetector: Subdetector, ownership: &HitOwnership) -> Self {
        let mut layers: HashMap<u16, Vec<(f64, usize)>> = HashMap::new();
        for hit in hits {
            if hit.subdetector == subdetector && ownership.is_available(hit.index) {
                layers
                    .entry(hit.wire.layer)
                    .or_default()
                    .push((hit.y, hit.index));
            }
        }
        for entries in layers.values_mut() {
            entries.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        }
        Self { layers }
    }

    /// Hits of `layer` within `half_width` of `y`, nearest first (ties to
    /// the lower hit index), at most `max`.
    #[must_use]
    pub fn in_window(&self, layer: u16, y: f64, half_width: f64, max: usize) -> Vec<usize> {
        let Some(entries) = self.layers.get(&layer) else {
            return Vec::new();
        };
        let low = entries.partition_point(|&(value, _)| value < y - half_width);
        let high = entries.partition_point(|&(value, _)| value <= y + half_width);
        let mut window: Vec<(f64, usize)> = entries[low..high.max(low)]
            .iter()
            .map(|&(value, hit)| ((value - y).abs(), hit))
            .collect();
        window.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        window.truncate(max);
        window.into_iter().map(|(_, hit)| hit).collect()
    }

    /// Number of indexed hits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.values().map(Vec::len).sum()
    }

    /// Returns true if no hit is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.values().all(Vec::is_empty)
    }
}

/// Keeps the `width` best paths by accumulated score.
///
/// The sort is stable, so equal scores keep proposal order. Returns the
/// number of dropped paths.
pub fn select_beam(paths: &mut Vec<CkfPath>, width: usize) -> usize {
    paths.sort_by(|a, b| b.score.total_cmp(&a.score));
    let dropped = paths.len().saturating_sub(width);
    paths.truncate(width);
    dropped
}

/// Extends seed tracks into a further sub-system.
#[derive(Debug, Clone)]
pub struct CkfExtrapolator {
    config: CkfConfig,
    geometry: Arc<WireGeometry>,
    state_filter: ChooseableFilter<StateCandidate<'static>>,
    result_filter: ChooseableFilter<CkfResult>,
}

impl CkfExtrapolator {
    /// Creates an extrapolator.
    #[must_use]
    pub fn new(
        config: CkfConfig,
        geometry: Arc<WireGeometry>,
        state_filter: ChooseableFilter<StateCandidate<'static>>,
        result_filter: ChooseableFilter<CkfResult>,
    ) -> Self {
        Self {
            config,
            geometry,
            state_filter,
            result_filter,
        }
    }

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &CkfConfig {
        &self.config
    }

    /// Extends every track, sharing one budget across all seeds.
    ///
    /// Returns the kept results of all seeds, in seed order.
    pub fn extend(
        &self,
        tracks: &[Track],
        hits: &[WireHit],
        ownership: &HitOwnership,
    ) -> (Vec<CkfResult>, CkfStats) {
        let mut stats = CkfStats::default();
        if !self.config.enabled {
            return (Vec::new(), stats);
        }

        let index = CandidateIndex::build(hits, self.config.target_subdetector, ownership);
        let mut budget = Budget::new(
            self.config.max_steps,
            self.config.time_budget_ms.map(Duration::from_millis),
        );

        let mut results = Vec::new();
        for (seed, track) in tracks.iter().enumerate() {
            let Some(mut search) = CkfSearch::new(self, hits, &index, seed, track) else {
                log::debug!("seed {seed} has no trajectory fit, skipped");
                stats.numeric_failures += 1;
                continue;
            };
            while search.step(&mut budget) {}
            stats.add(search.stats());
            results.extend(search.into_results());
        }

        if budget.is_exhausted() {
            log::warn!("CKF budget exhausted, returning partial results");
            stats.budget_exhausted = true;
        }
        (results, stats)
    }

    /// Target layers beyond the seed, nearest first.
    fn target_layers(&self, track: &Track) -> Vec<&LayerGeometry> {
        let layers = self.geometry.layers_of(self.config.target_subdetector);
        match self.config.direction {
            Direction::Inward => {
                let Some(first) = track.points.first() else {
                    return Vec::new();
                };
                let mut layers: Vec<_> = layers.filter(|layer| layer.x < first.x).collect();
                layers.reverse();
                layers
            }
            Direction::Outward => {
                let Some(last) = track.points.last() else {
                    return Vec::new();
                };
                layers.filter(|layer| layer.x > last.x).collect()
            }
        }
    }

    /// Search window half width: `window_sigma` standard deviations of the
    /// predicted coordinate combined with the strip resolution.
    fn window(&self, predicted: &KalmanState, layer: &LayerGeometry) -> f64 {
        let resolution = layer.pitch * layer.pitch / 12.0;
        let sigma = (predicted.variance_y().max(0.0) + resolution).sqrt();
        (self.config.window_sigma * sigma).max(self.config.min_window)
    }
}

/// Beam search of one seed.
#[derive(Debug, Clone)]
pub struct CkfSearch<'a> {
    extrapolator: &'a CkfExtrapolator,
    hits: &'a [WireHit],
    index: &'a CandidateIndex,
    seed: usize,
    track: &'a Track,
    seed_particle: Option<u32>,
    layers: Vec<&'a LayerGeometry>,
    next_layer: usize,
    arena: StateArena,
    beam: Vec<CkfPath>,
    finished: Vec<CkfPath>,
    stats: CkfStats,
}

impl<'a> CkfSearch<'a> {
    /// Starts a search from a seed track. Returns `None` without a fit.
    #[must_use]
    pub fn new(
        extrapolator: &'a CkfExtrapolator,
        hits: &'a [WireHit],
        index: &'a CandidateIndex,
        seed: usize,
        track: &'a Track,
    ) -> Option<Self> {
        let config = &extrapolator.config;
        let fit = track.fit.as_ref()?;
        let x = match config.direction {
            Direction::Inward => track.points.first()?.x,
            Direction::Outward => track.points.last()?.x,
        };
        let kalman = KalmanState::from_fit(fit, x, config.seed_covariance_scale);

        let mut arena = StateArena::new();
        let root = arena.push(CkfState::seed(kalman));
        let seed_particle = track.points.iter().find_map(|point| point.mc_particle);

        Some(Self {
            extrapolator,
            hits,
            index,
            seed,
            track,
            seed_particle,
            layers: extrapolator.target_layers(track),
            next_layer: 0,
            arena,
            beam: vec![CkfPath::seed(seed, root)],
            finished: Vec::new(),
            stats: CkfStats::default(),
        })
    }

    /// Paths currently in the beam.
    #[must_use]
    pub fn beam(&self) -> &[CkfPath] {
        &self.beam
    }

    /// Terminated paths so far.
    #[must_use]
    pub fn finished(&self) -> &[CkfPath] {
        &self.finished
    }

    /// State arena of this seed.
    #[must_use]
    pub fn arena(&self) -> &StateArena {
        &self.arena
    }

    /// Counters of this seed.
    #[must_use]
    pub fn stats(&self) -> &CkfStats {
        &self.stats
    }

    /// Extends every beam path by one target layer.
    ///
    /// Returns false once the search is over: the beam is empty, the last
    /// layer was reached or the budget ran out. Running out of budget ends
    /// the beam paths at their current leaf; proposals of the interrupted
    /// layer are discarded.
    pub fn step(&mut self, budget: &mut Budget) -> bool {
        if self.beam.is_empty() {
            return false;
        }
        let Some(&layer) = self.layers.get(self.next_layer) else {
            self.terminate_beam(Termination::LastLayer);
            return false;
        };

        let config = &self.extrapolator.config;
        let beam = std::mem::take(&mut self.beam);
        let mut proposals: Vec<CkfPath> = Vec::new();
        let mut ended: Vec<CkfPath> = Vec::new();
        let mut failed: Vec<usize> = Vec::new();
        let mut exhausted = false;

        for path in &beam {
            if exhausted {
                break;
            }
            let Some(parent) = self.arena.get(path.leaf) else {
                continue;
            };
            let predicted = match parent.kalman.propagate(layer.x, config.scattering_variance) {
                Ok(predicted) => predicted,
                Err(err) => {
                    log::debug!("seed {}: propagation failed: {err}", self.seed);
                    self.stats.numeric_failures += 1;
                    failed.push(path.leaf);
                    continue;
                }
            };

            let window = self.extrapolator.window(&predicted, layer);
            let candidates = self.index.in_window(
                layer.id,
                predicted.y(),
                window,
                config.max_candidates_per_state,
            );

            let mut children = 0;
            for hit in candidates {
                if !budget.consume() {
                    exhausted = true;
                    break;
                }
                self.stats.expansions += 1;
                let Some(point) = self.hits.get(hit).map(WireHit::point) else {
                    continue;
                };
                let (updated, chi2) = match predicted.update(point.y, point.variance) {
                    Ok(update) => update,
                    Err(err) => {
                        log::debug!("seed {}: update with hit {hit} failed: {err}", self.seed);
                        self.stats.numeric_failures += 1;
                        continue;
                    }
                };
                let candidate = StateCandidate {
                    point: &point,
                    predicted: &predicted,
                    chi2,
                    path_chi2: path.chi2,
                    n_added: path.n_added(),
                    seed_particle: self.seed_particle,
                };
                let Some(weight) = self.extrapolator.state_filter.score(&candidate).value()
                else {
                    self.stats.rejected += 1;
                    continue;
                };

                let score = path.score + weight;
                let chi2 = path.chi2 + chi2;
                let leaf = self.arena.push(CkfState {
                    parent: Some(path.leaf),
                    point: Some(point),
                    kalman: updated,
                    chi2,
                    score,
                });
                proposals.push(CkfPath {
                    seed: self.seed,
                    leaf,
                    length: path.length + 1,
                    score,
                    chi2,
                    status: PathStatus::Extending,
                });
                children += 1;
            }

            if children == 0 && !exhausted {
                ended.push(finish(*path, Termination::NoCandidate));
            }
        }
        self.finished.extend(ended.iter().copied());

        if exhausted {
            // every path not ended on this layer stops at its current leaf
            self.stats.pruned += proposals.len();
            for path in &beam {
                let done = ended.iter().any(|done| done.leaf == path.leaf);
                if !done && !failed.contains(&path.leaf) {
                    self.finished.push(finish(*path, Termination::Budget));
                }
            }
            self.stats.budget_exhausted = true;
            return false;
        }

        self.stats.pruned += select_beam(&mut proposals, config.beam_width);
        self.beam = proposals;
        self.next_layer += 1;
        if self.beam.is_empty() {
            return false;
        }
        if self.next_layer >= self.layers.len() {
            self.terminate_beam(Termination::LastLayer);
            return false;
        }
        true
    }

    fn terminate_beam(&mut self, termination: Termination) {
        let beam = std::mem::take(&mut self.beam);
        self.finished
            .extend(beam.into_iter().map(|path| finish(path, termination)));
    }

    /// Converts terminated paths into results: at least `min_added_hits`
    /// added hits, accepted by the result filter (which sets the quality),
    /// best `results_per_seed` by quality.
    #[must_use]
    pub fn into_results(self) -> Vec<CkfResult> {
        let config = &self.extrapolator.config;
        let mut results: Vec<CkfResult> = self
            .finished
            .iter()
            .filter(|path| path.n_added() >= config.min_added_hits)
            .filter_map(|path| {
                let PathStatus::Accepted(termination) = path.status else {
                    return None;
                };
                let states = self.arena.path(path.leaf);
                let added: Vec<_> = states.iter().filter_map(|state| state.point).collect();
                let mut result = CkfResult {
                    seed: self.seed,
                    seed_points: self.track.points.clone(),
                    added,
                    states: states
                        .iter()
                        .skip(1)
                        .map(|state| state.kalman.clone())
                        .collect(),
                    chi2: path.chi2,
                    score: path.score,
                    quality: 0.0,
                    termination,
                };
                result.quality = self.extrapolator.result_filter.score(&result).value()?;
                Some(result)
            })
            .collect();
        results.sort_by(|a, b| b.quality.total_cmp(&a.quality));
        results.truncate(config.results_per_seed);
        results
    }
}

fn finish(mut path: CkfPath, termination: Termination) -> CkfPath {
    path.status = PathStatus::Accepted(termination);
    path
}
