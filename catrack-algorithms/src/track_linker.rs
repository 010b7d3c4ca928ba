//! Track linking: second cellular automaton pass, over segments.

use crate::automaton::{CellularAutomaton, WeightedNeighborhood};
use catrack_core::{
    AutomatonCell, ChooseableFilter, HitOwnership, Owner, Segment, SegmentPair, Track,
    TrackConfig,
};

/// Tracks of one event, before merging.
#[derive(Debug, Clone, Default)]
pub struct LinkedTracks {
    /// Accepted tracks; track `i` owns its hits as `Owner::Track(i)`.
    pub tracks: Vec<Track>,
    /// Accepted segment relations.
    pub relations: usize,
    /// Cycle-closing segment relations ignored by the automaton.
    pub cycles_ignored: usize,
}

/// Chains segments across super-layers into tracks.
#[derive(Debug, Clone)]
pub struct TrackLinker {
    config: TrackConfig,
    relation_filter: ChooseableFilter<SegmentPair<'static>>,
    track_filter: ChooseableFilter<Track>,
}

impl TrackLinker {
    /// Creates a linker.
    #[must_use]
    pub fn new(
        config: TrackConfig,
        relation_filter: ChooseableFilter<SegmentPair<'static>>,
        track_filter: ChooseableFilter<Track>,
    ) -> Self {
        Self {
            config,
            relation_filter,
            track_filter,
        }
    }

    /// Links segments into tracks.
    ///
    /// Segment `A` relates to segment `B` when `B` lies in one of the next
    /// `max_super_layer_gap` super-layers. Hits of linked segments move to
    /// the track; segments left out of every track release their hits.
    pub fn link(&self, segments: &mut [Segment], ownership: &mut HitOwnership) -> LinkedTracks {
        for segment in segments.iter_mut() {
            segment.cell = AutomatonCell::new(segment.weight);
        }
        let neighborhood = self.build_neighborhood(segments);

        let mut tracks: Vec<Track> = Vec::new();
        let mut used = vec![false; segments.len()];
        let automaton = CellularAutomaton::new(self.config.min_state);
        let extraction = automaton.extract_with(segments, &neighborhood, |path, segments| {
            let mut track = Track::from_segments(path.iter().map(|&index| &segments[index]));
            let Some(quality) = self.track_filter.score(&track).value() else {
                return false;
            };
            track.quality = quality;

            let owner = Owner::Track(tracks.len());
            for &index in path {
                ownership.transfer(Owner::Segment(index), owner);
                used[index] = true;
            }
            tracks.push(track);
            true
        });

        let mut released = 0;
        for index in (0..segments.len()).filter(|&index| !used[index]) {
            released += ownership.release(Owner::Segment(index));
        }
        log::debug!(
            "track linker: {} tracks from {} segments, released {released} hits",
            tracks.len(),
            segments.len()
        );
        LinkedTracks {
            tracks,
            relations: neighborhood.len(),
            cycles_ignored: extraction.cycles_ignored,
        }
    }

    fn build_neighborhood(&self, segments: &[Segment]) -> WeightedNeighborhood {
        let gap = self.config.max_super_layer_gap;
        let candidates = segments.iter().enumerate().flat_map(|(from, inner)| {
            segments
                .iter()
                .enumerate()
                .filter(move |(_, outer)| {
                    outer.super_layer > inner.super_layer
                        && outer.super_layer - inner.super_layer <= gap
                })
                .map(move |(to, _)| (from, to))
        });
        WeightedNeighborhood::build(segments.len(), candidates, |from, to| {
            self.relation_filter.score(&SegmentPair {
                from: &segments[from],
                to: &segments[to],
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catrack_core::{FilterConfig, FilterFactory, LayerKind, ModelStore, TrackPoint};

    fn segment(first_hit: usize, super_layer: u16, x0: f64, slope: f64) -> Segment {
        let points = (0..4)
            .map(|i| {
                let x = x0 + f64::from(i);
                TrackPoint {
                    hit: first_hit + i as usize,
                    layer: 0,
                    x,
                    y: slope * x,
                    variance: 0.01,
                    drift_length: 0.0,
                    mc_particle: None,
                }
            })
            .collect();
        let kind = if super_layer % 2 == 0 {
            LayerKind::Axial
        } else {
            LayerKind::Stereo
        };
        let mut segment = Segment::new(points, super_layer, kind);
        segment.weight = 4.0;
        segment
    }

    fn linker(config: TrackConfig) -> TrackLinker {
        let models = ModelStore::new();
        let relations = FilterFactory::new("tracks.relation_filter", &models);
        let tracks = FilterFactory::new("tracks.track_filter", &models);
        TrackLinker::new(
            config.clone(),
            ChooseableFilter::new(&relations, &config.relation_filter).unwrap(),
            ChooseableFilter::new(&tracks, &config.track_filter).unwrap(),
        )
    }

    fn claim_all(segments: &[Segment], ownership: &mut HitOwnership) {
        for (index, segment) in segments.iter().enumerate() {
            assert!(ownership.claim(&segment.hits(), Owner::Segment(index)));
        }
    }

    #[test]
    fn test_collinear_segments_link() {
        let mut segments = vec![
            segment(0, 0, 0.0, 0.2),
            segment(4, 1, 7.0, 0.2),
            segment(8, 2, 14.0, 0.2),
        ];
        let mut ownership = HitOwnership::new(12);
        claim_all(&segments, &mut ownership);

        let linked = linker(TrackConfig::default()).link(&mut segments, &mut ownership);
        assert_eq!(linked.tracks.len(), 1);
        assert_eq!(linked.tracks[0].n_segments, 3);
        assert_eq!(linked.tracks[0].len(), 12);
        assert!((0..12).all(|h| ownership.owner(h) == Some(Owner::Track(0))));
    }

    #[test]
    fn test_incompatible_segments_stay_apart() {
        let mut segments = vec![segment(0, 0, 0.0, 0.2), segment(4, 1, 7.0, -3.0)];
        let mut ownership = HitOwnership::new(8);
        claim_all(&segments, &mut ownership);

        let linked = linker(TrackConfig::default()).link(&mut segments, &mut ownership);
        assert_eq!(linked.relations, 0);
        assert_eq!(linked.tracks.len(), 2);
        assert_eq!(ownership.owner(5), Some(Owner::Track(1)));
    }

    #[test]
    fn test_rejected_tracks_release_hits() {
        let mut segments = vec![segment(0, 0, 0.0, 0.2)];
        let mut ownership = HitOwnership::new(4);
        claim_all(&segments, &mut ownership);

        let config = TrackConfig::default().with_track_filter(FilterConfig::none());
        let linked = linker(config).link(&mut segments, &mut ownership);
        assert!(linked.tracks.is_empty());
        assert_eq!(ownership.n_owned(), 0);
    }

    #[test]
    fn test_super_layer_gap() {
        let mut segments = vec![segment(0, 0, 0.0, 0.2), segment(4, 2, 14.0, 0.2)];
        let mut ownership = HitOwnership::new(8);
        claim_all(&segments, &mut ownership);
        let linked = linker(TrackConfig::default()).link(&mut segments, &mut ownership);
        assert_eq!(linked.tracks.len(), 2);

        let mut segments = vec![segment(0, 0, 0.0, 0.2), segment(4, 2, 14.0, 0.2)];
        let mut ownership = HitOwnership::new(8);
        claim_all(&segments, &mut ownership);
        let config = TrackConfig::default().with_max_super_layer_gap(2);
        let linked = linker(config).link(&mut segments, &mut ownership);
        assert_eq!(linked.tracks.len(), 1);
    }
}
