//! Conversion of primitive hits into the per-event hit arena.

use catrack_core::{ChooseableFilter, Hit, WireGeometry, WireHit, WireId};

/// Prepared hits of one event.
#[derive(Debug, Clone, Default)]
pub struct PreparedHits {
    /// Hits sorted by `(layer, wire, drift_time)`; `hits[i].index == i`.
    pub hits: Vec<WireHit>,
    /// Hits on unknown channels or with non-finite values.
    pub dropped: usize,
    /// Hits rejected by the hit filter.
    pub rejected: usize,
}

/// Wraps primitive hits as graph nodes.
#[derive(Debug, Clone)]
pub struct HitPreparer {
    filter: ChooseableFilter<WireHit>,
}

impl HitPreparer {
    /// Creates a preparer with a hit filter.
    #[must_use]
    pub fn new(filter: ChooseableFilter<WireHit>) -> Self {
        Self { filter }
    }

    /// Converts, validates, sorts and filters the hits of one event.
    ///
    /// Malformed hits are dropped and counted; they never fail the event.
    pub fn prepare<H: Hit>(&self, geometry: &WireGeometry, input: &[H]) -> PreparedHits {
        let mut dropped = 0;
        let mut hits: Vec<WireHit> = input
            .iter()
            .enumerate()
            .filter_map(|(source, hit)| {
                let prepared = convert(geometry, source, hit);
                if prepared.is_none() {
                    dropped += 1;
                }
                prepared
            })
            .collect();

        hits.sort_by(|a, b| {
            a.wire
                .cmp(&b.wire)
                .then(a.drift_time.total_cmp(&b.drift_time))
                .then(a.source.cmp(&b.source))
        });

        let before = hits.len();
        hits.retain(|hit| self.filter.score(hit).is_accepted());
        let rejected = before - hits.len();
        for (index, hit) in hits.iter_mut().enumerate() {
            hit.index = index;
        }

        if dropped > 0 {
            log::debug!("dropped {dropped} malformed hits");
        }
        PreparedHits {
            hits,
            dropped,
            rejected,
        }
    }
}

fn convert<H: Hit>(geometry: &WireGeometry, source: usize, hit: &H) -> Option<WireHit> {
    let wire: WireId = hit.wire();
    let layer = geometry.layer(wire.layer)?;
    if !layer.contains(wire.wire) {
        return None;
    }
    let [x, y] = hit.position().unwrap_or_else(|| layer.wire_position(wire.wire));
    let variance = hit.variance();
    let values = [
        x,
        y,
        variance,
        hit.drift_length(),
        hit.drift_length_variance(),
        hit.drift_time(),
    ];
    if !values.iter().all(|v| v.is_finite()) || variance <= 0.0 {
        return None;
    }
    Some(WireHit {
        index: 0,
        source,
        wire,
        super_layer: layer.super_layer,
        subdetector: layer.subdetector,
        kind: layer.kind,
        x,
        y,
        variance,
        drift_length: hit.drift_length(),
        drift_length_variance: hit.drift_length_variance(),
        drift_time: hit.drift_time(),
        mc_particle: hit.mc_particle(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use catrack_core::{FilterConfig, FilterFactory, ModelStore, PlanarLayout, RawHit, Subdetector};

    fn preparer(config: &FilterConfig) -> HitPreparer {
        let models = ModelStore::new();
        let factory = FilterFactory::<WireHit>::new("hit_preparer.filter", &models);
        HitPreparer::new(ChooseableFilter::new(&factory, config).unwrap())
    }

    #[test]
    fn test_sort_and_default_position() {
        let geometry = WireGeometry::planar(&[PlanarLayout::default()]).unwrap();
        let hits = vec![
            RawHit::new(2, 5).with_drift(0.1, 30.0),
            RawHit::new(1, 7).with_drift(0.1, 20.0),
            RawHit::new(2, 5).with_drift(0.1, 10.0),
        ];
        let prepared = preparer(&FilterConfig::all()).prepare(&geometry, &hits);
        assert_eq!(prepared.dropped, 0);
        let order: Vec<_> = prepared.hits.iter().map(|h| h.source).collect();
        assert_eq!(order, vec![1, 2, 0]);
        assert!(prepared.hits.iter().enumerate().all(|(i, h)| h.index == i));

        let expected = geometry.wire_position(WireId::new(1, 7)).unwrap();
        assert_eq!([prepared.hits[0].x, prepared.hits[0].y], expected);
        assert_eq!(prepared.hits[0].subdetector, Subdetector::Drift);
    }

    #[test]
    fn test_malformed_hits_are_dropped() {
        let geometry = WireGeometry::planar(&[PlanarLayout::default()]).unwrap();
        let hits = vec![
            RawHit::new(200, 0),
            RawHit::new(0, 999),
            RawHit::new(0, 1).with_position(f64::NAN, 0.0),
            RawHit::new(0, 1).with_variance(0.0),
            RawHit::new(0, 2),
        ];
        let prepared = preparer(&FilterConfig::all()).prepare(&geometry, &hits);
        assert_eq!(prepared.dropped, 4);
        assert_eq!(prepared.hits.len(), 1);
    }

    #[test]
    fn test_none_filter_rejects_all() {
        let geometry = WireGeometry::planar(&[PlanarLayout::default()]).unwrap();
        let prepared = preparer(&FilterConfig::none())
            .prepare(&geometry, &[RawHit::new(0, 1), RawHit::new(0, 2)]);
        assert!(prepared.hits.is_empty());
        assert_eq!(prepared.rejected, 2);
    }
}
