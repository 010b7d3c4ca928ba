//! Merging of tracks split across super-layer boundaries.
//!
//! Runs after the linker, outside the cellular automaton. Pairs are merged
//! greedily, best filter weight first, until no compatible pair is left.

use catrack_core::{
    ChooseableFilter, HitOwnership, MergePolicy, MergerConfig, Owner, Track, TrackPair,
};

/// Result of the merge step.
#[derive(Debug, Clone, Default)]
pub struct MergedTracks {
    /// Tracks after merging; track `i` owns its hits as `Owner::Track(i)`.
    pub tracks: Vec<Track>,
    /// Number of merges performed.
    pub merges: usize,
    /// Hits removed as outliers after merging.
    pub removed_outliers: usize,
}

/// Joins compatible tracks with disjoint super-layers.
#[derive(Debug, Clone)]
pub struct TrackMerger {
    config: MergerConfig,
    filter: ChooseableFilter<TrackPair<'static>>,
}

impl TrackMerger {
    /// Creates a merger.
    #[must_use]
    pub fn new(config: MergerConfig, filter: ChooseableFilter<TrackPair<'static>>) -> Self {
        Self { config, filter }
    }

    /// Merges tracks until no compatible pair is left.
    ///
    /// The merged track takes the lower index of the two; indices are
    /// compacted at the end, keeping the original order.
    pub fn merge(&self, tracks: Vec<Track>, ownership: &mut HitOwnership) -> MergedTracks {
        if !self.config.enabled {
            return MergedTracks {
                tracks,
                ..MergedTracks::default()
            };
        }

        let mut slots: Vec<Option<Track>> = tracks.into_iter().map(Some).collect();
        let mut merges = 0;
        let mut removed_outliers = 0;

        while let Some((i, j)) = self.best_pair(&slots) {
            let (Some(a), Some(b)) = (slots[i].take(), slots[j].take()) else {
                break;
            };
            ownership.transfer(Owner::Track(j), Owner::Track(i));

            let quality = a.quality + b.quality;
            let mut points = a.points;
            points.extend(b.points);
            let mut super_layers = a.super_layers;
            super_layers.extend(b.super_layers);
            let mut merged = Track::from_parts(points, super_layers, a.n_segments + b.n_segments);
            merged.quality = quality;

            removed_outliers += self.remove_outliers(&mut merged, Owner::Track(i), ownership);
            slots[i] = Some(merged);
            merges += 1;
        }

        let mut tracks = Vec::with_capacity(slots.len());
        for (old, slot) in slots.into_iter().enumerate() {
            if let Some(track) = slot {
                let new = tracks.len();
                if new != old {
                    ownership.transfer(Owner::Track(old), Owner::Track(new));
                }
                tracks.push(track);
            }
        }

        if merges > 0 {
            log::debug!(
                "track merger: {merges} merges, {removed_outliers} outlier hits removed"
            );
        }
        MergedTracks {
            tracks,
            merges,
            removed_outliers,
        }
    }

    /// Highest weighted compatible pair, ties to the lowest `(i, j)`.
    fn best_pair(&self, slots: &[Option<Track>]) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize, f64)> = None;
        for (i, a) in slots.iter().enumerate() {
            let Some(a) = a else { continue };
            for (j, b) in slots.iter().enumerate().skip(i + 1) {
                let Some(b) = b else { continue };
                let Some(weight) = self.pair_weight(a, b) else {
                    continue;
                };
                if best.is_none_or(|(_, _, w)| weight > w) {
                    best = Some((i, j, weight));
                }
            }
        }
        best.map(|(i, j, _)| (i, j))
    }

    fn pair_weight(&self, a: &Track, b: &Track) -> Option<f64> {
        let (a_first, a_last) = a.super_layer_range()?;
        let (b_first, b_last) = b.super_layer_range()?;
        let (inner, outer) = if a_last < b_first {
            (a, b)
        } else if b_last < a_first {
            (b, a)
        } else {
            return None;
        };

        if self.config.policy == MergePolicy::AxialStereo {
            let inner_kind = inner.super_layers.last()?.1;
            let outer_kind = outer.super_layers.first()?.1;
            if inner_kind == outer_kind {
                return None;
            }
        }

        if !self.compatible(inner, outer)? {
            return None;
        }
        self.filter.score(&TrackPair { inner, outer }).value()
    }

    /// Coordinate and slope agree within `tolerance` standard deviations at
    /// the outer track's first plane.
    fn compatible(&self, inner: &Track, outer: &Track) -> Option<bool> {
        let x = outer.points.first()?.x;
        let (inner_params, inner_cov) = inner.fit.as_ref()?.state_at(x);
        let (outer_params, outer_cov) = outer.fit.as_ref()?.state_at(x);
        let tolerance = self.config.tolerance;

        let dy = (outer_params[0] - inner_params[0]).abs();
        let dslope = (outer_params[1] - inner_params[1]).abs();
        let sigma_y = (inner_cov[(0, 0)] + outer_cov[(0, 0)]).sqrt();
        let sigma_slope = (inner_cov[(1, 1)] + outer_cov[(1, 1)]).sqrt();
        Some(dy <= tolerance * sigma_y && dslope <= tolerance * sigma_slope)
    }

    /// Removes the worst hit while its pull exceeds `outlier_pull`, keeping
    /// at least three hits.
    fn remove_outliers(
        &self,
        track: &mut Track,
        owner: Owner,
        ownership: &mut HitOwnership,
    ) -> usize {
        let mut removed = 0;
        while track.len() > 3 {
            let Some(fit) = track.fit.as_ref() else {
                break;
            };
            let worst = track
                .points
                .iter()
                .enumerate()
                .map(|(index, point)| (index, fit.pull(point).abs()))
                .filter(|(_, pull)| pull.is_finite())
                .max_by(|a, b| a.1.total_cmp(&b.1));
            let Some((index, pull)) = worst else {
                break;
            };
            if pull <= self.config.outlier_pull {
                break;
            }
            let point = track.points.remove(index);
            ownership.release_hit(point.hit, owner);
            track.refit();
            removed += 1;
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use catrack_core::{FilterFactory, LayerKind, ModelStore, TrackPoint};

    fn point(hit: usize, x: f64, y: f64) -> TrackPoint {
        TrackPoint {
            hit,
            layer: 0,
            x,
            y,
            variance: 0.01,
            drift_length: 0.0,
            mc_particle: None,
        }
    }

    fn half_track(first_hit: usize, x0: f64, super_layer: u16, kind: LayerKind) -> Track {
        let points = (0..6)
            .map(|i| {
                let x = x0 + f64::from(i);
                point(first_hit + i as usize, x, 1.0 + 0.1 * x)
            })
            .collect();
        let mut track = Track::from_parts(points, vec![(super_layer, kind)], 1);
        track.quality = 6.0;
        track
    }

    fn merger(config: MergerConfig) -> TrackMerger {
        let models = ModelStore::new();
        let factory = FilterFactory::new("tracks.merger.filter", &models);
        let filter = ChooseableFilter::new(&factory, &config.filter).unwrap();
        TrackMerger::new(config, filter)
    }

    fn claim(tracks: &[Track], n_hits: usize) -> HitOwnership {
        let mut ownership = HitOwnership::new(n_hits);
        for (index, track) in tracks.iter().enumerate() {
            assert!(ownership.claim(&track.hits(), Owner::Track(index)));
        }
        ownership
    }

    #[test]
    fn test_merges_across_axial_stereo_boundary() {
        // outer half listed first: the merged track keeps index 0
        let tracks = vec![
            half_track(6, 29.0, 1, LayerKind::Stereo),
            half_track(0, 20.0, 0, LayerKind::Axial),
        ];
        let mut ownership = claim(&tracks, 12);
        let merged = merger(MergerConfig::default()).merge(tracks, &mut ownership);

        assert_eq!(merged.merges, 1);
        assert_eq!(merged.tracks.len(), 1);
        let track = &merged.tracks[0];
        assert_eq!(track.hits(), (0..12).collect::<Vec<_>>());
        assert_eq!(track.super_layers.len(), 2);
        assert_eq!(track.n_segments, 2);
        assert_relative_eq!(track.quality, 12.0);
        assert!((0..12).all(|h| ownership.owner(h) == Some(Owner::Track(0))));
    }

    #[test]
    fn test_same_kind_not_merged() {
        let tracks = vec![
            half_track(0, 20.0, 0, LayerKind::Axial),
            half_track(6, 29.0, 1, LayerKind::Axial),
        ];
        let mut ownership = claim(&tracks, 12);
        let merged = merger(MergerConfig::default()).merge(tracks.clone(), &mut ownership);
        assert_eq!(merged.tracks.len(), 2);

        let config = MergerConfig {
            policy: MergePolicy::Any,
            ..MergerConfig::default()
        };
        let merged = merger(config).merge(tracks, &mut ownership);
        assert_eq!(merged.tracks.len(), 1);
    }

    #[test]
    fn test_overlapping_super_layers_not_merged() {
        let tracks = vec![
            half_track(0, 20.0, 0, LayerKind::Axial),
            half_track(6, 29.0, 0, LayerKind::Stereo),
        ];
        let mut ownership = claim(&tracks, 12);
        let merged = merger(MergerConfig::default()).merge(tracks, &mut ownership);
        assert_eq!(merged.merges, 0);
    }

    #[test]
    fn test_outlier_removed_and_released() {
        let mut outer = half_track(6, 29.0, 1, LayerKind::Stereo);
        outer.points[2].y += 1.0;
        outer.refit();
        let tracks = vec![half_track(0, 20.0, 0, LayerKind::Axial), outer];
        let mut ownership = claim(&tracks, 12);
        let config = MergerConfig {
            tolerance: 1000.0,
            filter: catrack_core::FilterConfig::all(),
            ..MergerConfig::default()
        };
        let merged = merger(config).merge(tracks, &mut ownership);

        assert_eq!(merged.tracks.len(), 1);
        assert_eq!(merged.removed_outliers, 1);
        assert_eq!(merged.tracks[0].len(), 11);
        assert!(!merged.tracks[0].hits().contains(&8));
        assert!(ownership.is_available(8));
    }
}
