//! Segment extraction: first cellular automaton pass, over facets.

use crate::automaton::{CellularAutomaton, WeightedNeighborhood};
use catrack_core::{
    AutomatonCell, ChooseableFilter, Facet, FacetPair, HitOwnership, Owner, Segment,
    SegmentConfig, TrackPoint, WireHit,
};
use std::collections::HashMap;

/// Segments of one event.
#[derive(Debug, Clone, Default)]
pub struct Segments {
    /// Accepted segments; segment `i` owns its hits as `Owner::Segment(i)`.
    pub segments: Vec<Segment>,
    /// Accepted facet relations.
    pub relations: usize,
    /// Cycle-closing facet relations ignored by the automaton.
    pub cycles_ignored: usize,
}

/// Turns facet chains into per-super-layer segments.
#[derive(Debug, Clone)]
pub struct SegmentExtractor {
    config: SegmentConfig,
    relation_filter: ChooseableFilter<FacetPair<'static>>,
    segment_filter: ChooseableFilter<Segment>,
}

impl SegmentExtractor {
    /// Creates an extractor.
    #[must_use]
    pub fn new(
        config: SegmentConfig,
        relation_filter: ChooseableFilter<FacetPair<'static>>,
        segment_filter: ChooseableFilter<Segment>,
    ) -> Self {
        Self {
            config,
            relation_filter,
            segment_filter,
        }
    }

    /// Builds the facet graph, relaxes it and extracts segments greedily.
    ///
    /// Facet `A` relates to facet `B` when `B` starts at `A`'s middle hit and
    /// continues through `A`'s end hit. Accepted segments claim their hits;
    /// every facet touching a claimed hit is blocked for later passes.
    pub fn extract(
        &self,
        hits: &[WireHit],
        facets: &mut [Facet],
        ownership: &mut HitOwnership,
    ) -> Segments {
        let neighborhood = self.build_neighborhood(facets);

        let mut facets_by_hit: Vec<Vec<usize>> = vec![Vec::new(); ownership.len()];
        for (index, facet) in facets.iter().enumerate() {
            for hit in facet.hits() {
                if let Some(list) = facets_by_hit.get_mut(hit) {
                    list.push(index);
                }
            }
        }

        let mut segments: Vec<Segment> = Vec::new();
        let automaton = CellularAutomaton::new(self.config.min_state);
        let extraction = automaton.extract_with(facets, &neighborhood, |path, facets| {
            let Some(segment) = self.build_segment(hits, path, facets, ownership) else {
                return false;
            };
            let claimed = segment.hits();
            if !ownership.claim(&claimed, Owner::Segment(segments.len())) {
                return false;
            }
            for &hit in &claimed {
                for &facet in facets_by_hit.get(hit).map_or(&[][..], Vec::as_slice) {
                    facets[facet].cell.set_do_not_use(true);
                }
            }
            segments.push(segment);
            true
        });

        log::debug!(
            "segment extractor: {} segments from {} facets, {} relations",
            segments.len(),
            facets.len(),
            neighborhood.len()
        );
        Segments {
            segments,
            relations: neighborhood.len(),
            cycles_ignored: extraction.cycles_ignored,
        }
    }

    fn build_neighborhood(&self, facets: &[Facet]) -> WeightedNeighborhood {
        let mut by_start: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
        for (index, facet) in facets.iter().enumerate() {
            by_start
                .entry((facet.start(), facet.middle()))
                .or_default()
                .push(index);
        }

        let candidates = facets.iter().enumerate().flat_map(|(from, facet)| {
            by_start
                .get(&(facet.middle(), facet.end()))
                .into_iter()
                .flatten()
                .map(move |&to| (from, to))
        });
        WeightedNeighborhood::build(facets.len(), candidates, |from, to| {
            self.relation_filter.score(&FacetPair {
                from: &facets[from],
                to: &facets[to],
            })
        })
    }

    /// Hit sequence of a facet path: the first facet's three hits followed by
    /// the end hit of every further facet.
    fn build_segment(
        &self,
        hits: &[WireHit],
        path: &[usize],
        facets: &[Facet],
        ownership: &HitOwnership,
    ) -> Option<Segment> {
        let first = facets.get(*path.first()?)?;
        let mut points: Vec<TrackPoint> = first.points.to_vec();
        points.extend(path[1..].iter().map(|&facet| facets[facet].points[2]));
        points.retain(|point| ownership.is_available(point.hit));
        if points.len() < self.config.min_hits {
            return None;
        }

        let kind = hits.get(points.first()?.hit)?.kind;
        let mut segment = Segment::new(points, first.super_layer, kind);
        let weight = self.segment_filter.score(&segment).value()?;
        segment.weight = weight;
        segment.cell = AutomatonCell::new(weight);
        Some(segment)
    }
}
