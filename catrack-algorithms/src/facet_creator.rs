//! Construction of oriented hit triplets inside clusters.

use crate::adjacency::WireAdjacency;
use catrack_core::{AutomatonCell, ChooseableFilter, Facet, FacetConfig, HitOwnership, WireHit};

/// Facets of one event.
#[derive(Debug, Clone, Default)]
pub struct Facets {
    /// Accepted facets sorted by `(start, middle, end)`.
    pub facets: Vec<Facet>,
    /// Accepted facets dropped because the cap was reached.
    pub overflow: usize,
}

/// Builds and scores facets from adjacent hits.
#[derive(Debug, Clone)]
pub struct FacetCreator {
    config: FacetConfig,
    filter: ChooseableFilter<Facet>,
}

impl FacetCreator {
    /// Creates a facet creator.
    #[must_use]
    pub fn new(config: FacetConfig, filter: ChooseableFilter<Facet>) -> Self {
        Self { config, filter }
    }

    /// Enumerates triplets `(start, middle, end)` of available hits of one
    /// cluster with increasing hit index, where start and end are both
    /// adjacent to the middle hit.
    ///
    /// The facet filter weight becomes the intrinsic weight of the facet's
    /// automaton cell.
    pub fn create(
        &self,
        hits: &[WireHit],
        clusters: &[Vec<usize>],
        adjacency: &WireAdjacency,
        ownership: &HitOwnership,
    ) -> Facets {
        let mut facets = Vec::new();
        let mut overflow = 0;

        for cluster in clusters {
            let available: Vec<&WireHit> = cluster
                .iter()
                .filter(|&&hit| ownership.is_available(hit))
                .filter_map(|&hit| hits.get(hit))
                .collect();

            for (m, middle) in available.iter().enumerate() {
                let is_neighbor =
                    |other: &&&WireHit| adjacency.are_adjacent(middle.wire, other.wire);
                let starts: Vec<&WireHit> =
                    available[..m].iter().filter(is_neighbor).copied().collect();
                let ends: Vec<&WireHit> =
                    available[m + 1..].iter().filter(is_neighbor).copied().collect();

                for start in &starts {
                    for end in &ends {
                        let mut facet = Facet::new(
                            [start.point(), middle.point(), end.point()],
                            middle.super_layer,
                        );
                        let Some(weight) = self.filter.score(&facet).value() else {
                            continue;
                        };
                        if facets.len() >= self.config.max_facets {
                            overflow += 1;
                            continue;
                        }
                        facet.cell = AutomatonCell::new(weight);
                        facets.push(facet);
                    }
                }
            }
        }

        if overflow > 0 {
            log::warn!(
                "facet cap of {} reached, dropped {overflow} facets",
                self.config.max_facets
            );
        }
        facets.sort_by_key(Facet::hits);
        log::debug!("facet creator: {} facets", facets.len());
        Facets { facets, overflow }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use catrack_core::{
        FilterConfig, FilterFactory, LayerKind, ModelStore, PlanarLayout, Subdetector,
        WireGeometry, WireId,
    };

    fn hit(index: usize, layer: u16, wire: u16) -> WireHit {
        WireHit {
            index,
            source: index,
            wire: WireId::new(layer, wire),
            super_layer: 0,
            subdetector: Subdetector::Drift,
            kind: LayerKind::Axial,
            x: f64::from(layer),
            y: f64::from(wire),
            variance: 0.01,
            drift_length: 0.0,
            drift_length_variance: 0.01,
            drift_time: 0.0,
            mc_particle: None,
        }
    }

    fn creator(config: FacetConfig) -> FacetCreator {
        let models = ModelStore::new();
        let factory = FilterFactory::new("facets.filter", &models);
        let filter = ChooseableFilter::new(&factory, &config.filter).unwrap();
        FacetCreator::new(config, filter)
    }

    fn adjacency() -> WireAdjacency {
        let geometry = WireGeometry::planar(&[PlanarLayout::default()]).unwrap();
        WireAdjacency::build(&geometry, 1.5).unwrap()
    }

    #[test]
    fn test_straight_triplet() {
        let hits = vec![hit(0, 0, 10), hit(1, 1, 10), hit(2, 2, 10)];
        let ownership = HitOwnership::new(hits.len());
        let facets = creator(FacetConfig::default()).create(
            &hits,
            &[vec![0, 1, 2]],
            &adjacency(),
            &ownership,
        );
        assert_eq!(facets.facets.len(), 1);
        assert_eq!(facets.facets[0].hits(), [0, 1, 2]);
        assert_relative_eq!(facets.facets[0].cell.intrinsic_weight(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_owned_hits_are_skipped() {
        let hits = vec![hit(0, 0, 10), hit(1, 1, 10), hit(2, 2, 10)];
        let mut ownership = HitOwnership::new(hits.len());
        ownership.set_background(1);
        let facets = creator(FacetConfig::default()).create(
            &hits,
            &[vec![0, 1, 2]],
            &adjacency(),
            &ownership,
        );
        assert!(facets.facets.is_empty());
    }

    #[test]
    fn test_cap_counts_overflow() {
        // two hits per layer on neighbouring wires: 2 x 2 triplets around each middle
        let hits = vec![
            hit(0, 0, 10),
            hit(1, 0, 11),
            hit(2, 1, 10),
            hit(3, 2, 10),
            hit(4, 2, 11),
        ];
        let ownership = HitOwnership::new(hits.len());
        let config = FacetConfig::default()
            .with_filter(FilterConfig::all())
            .with_max_facets(2);
        let facets = creator(config).create(
            &hits,
            &[vec![0, 1, 2, 3, 4]],
            &adjacency(),
            &ownership,
        );
        assert_eq!(facets.facets.len(), 2);
        assert!(facets.overflow > 0);
    }

    #[test]
    fn test_none_filter_yields_no_facets() {
        let hits = vec![hit(0, 0, 10), hit(1, 1, 10), hit(2, 2, 10)];
        let ownership = HitOwnership::new(hits.len());
        let config = FacetConfig::default().with_filter(FilterConfig::none());
        let facets = creator(config).create(&hits, &[vec![0, 1, 2]], &adjacency(), &ownership);
        assert!(facets.facets.is_empty());
        assert_eq!(facets.overflow, 0);
    }
}
