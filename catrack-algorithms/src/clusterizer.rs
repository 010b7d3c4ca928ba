//! Grouping of adjacent hits into connected components.
//!
//! Uses a union-find data structure over hit pairs on neighbouring wires.

use crate::adjacency::WireAdjacency;
use catrack_core::{ChooseableFilter, ClusterizerConfig, HitOwnership, HitPair, WireHit, WireId};
use std::collections::HashMap;

/// Union-Find data structure for connected component detection.
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, x: usize, y: usize) {
        let px = self.find(x);
        let py = self.find(y);

        if px == py {
            return;
        }

        match self.rank[px].cmp(&self.rank[py]) {
            std::cmp::Ordering::Less => self.parent[px] = py,
            std::cmp::Ordering::Greater => self.parent[py] = px,
            std::cmp::Ordering::Equal => {
                self.parent[py] = px;
                self.rank[px] += 1;
            }
        }
    }
}

/// Clusters of one event.
#[derive(Debug, Clone, Default)]
pub struct Clusters {
    /// Hit indices per cluster, ascending, clusters ordered by first hit.
    pub clusters: Vec<Vec<usize>>,
    /// Hits flagged as background.
    pub n_background: usize,
}

/// Union-find clustering of hits on adjacent wires.
#[derive(Debug, Clone)]
pub struct Clusterizer {
    config: ClusterizerConfig,
    filter: ChooseableFilter<HitPair<'static>>,
}

impl Clusterizer {
    /// Creates a clusterizer.
    #[must_use]
    pub fn new(config: ClusterizerConfig, filter: ChooseableFilter<HitPair<'static>>) -> Self {
        Self { config, filter }
    }

    /// Clusters the hits of the configured sub-system.
    ///
    /// Hits in clusters outside the size limits are flagged as background in
    /// `ownership`; they are not returned.
    pub fn cluster(
        &self,
        hits: &[WireHit],
        adjacency: &WireAdjacency,
        ownership: &mut HitOwnership,
    ) -> Clusters {
        let mut by_wire: HashMap<WireId, Vec<usize>> = HashMap::new();
        for hit in hits
            .iter()
            .filter(|hit| hit.subdetector == self.config.subdetector)
        {
            by_wire.entry(hit.wire).or_default().push(hit.index);
        }

        let mut uf = UnionFind::new(hits.len());
        for (wire, members) in &by_wire {
            for &neighbor in adjacency.neighbors(*wire) {
                // each unordered wire pair once
                if neighbor < *wire {
                    continue;
                }
                let Some(others) = by_wire.get(&neighbor) else {
                    continue;
                };
                for &i in members {
                    for &j in others {
                        let (from, to) = if i < j { (i, j) } else { (j, i) };
                        if self.connects(&hits[from], &hits[to]) {
                            uf.union(from, to);
                        }
                    }
                }
            }
        }

        let mut components: HashMap<usize, Vec<usize>> = HashMap::new();
        for members in by_wire.values() {
            for &i in members {
                components.entry(uf.find(i)).or_default().push(i);
            }
        }

        let mut clusters = Vec::new();
        let mut n_background = 0;
        for mut members in components.into_values() {
            let size = members.len();
            let in_range = size >= self.config.min_cluster_size
                && self.config.max_cluster_size.is_none_or(|max| size <= max);
            if in_range {
                members.sort_unstable();
                clusters.push(members);
            } else {
                for &hit in &members {
                    ownership.set_background(hit);
                }
                n_background += size;
            }
        }
        clusters.sort_unstable_by_key(|members| members[0]);

        log::debug!(
            "clusterizer: {} clusters, {n_background} background hits",
            clusters.len()
        );
        Clusters {
            clusters,
            n_background,
        }
    }

    fn connects(&self, from: &WireHit, to: &WireHit) -> bool {
        (from.drift_time - to.drift_time).abs() <= self.config.max_time_difference
            && self.filter.score(&HitPair { from, to }).is_accepted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catrack_core::{FilterConfig, FilterFactory, ModelStore, PlanarLayout, WireGeometry};

    fn hit(index: usize, layer: u16, wire: u16, time: f64) -> WireHit {
        WireHit {
            index,
            source: index,
            wire: WireId::new(layer, wire),
            super_layer: 0,
            subdetector: catrack_core::Subdetector::Drift,
            kind: catrack_core::LayerKind::Axial,
            x: f64::from(layer),
            y: f64::from(wire),
            variance: 0.01,
            drift_length: 0.0,
            drift_length_variance: 0.01,
            drift_time: time,
            mc_particle: None,
        }
    }

    fn clusterizer(config: ClusterizerConfig, filter: &FilterConfig) -> Clusterizer {
        let models = ModelStore::new();
        let factory = FilterFactory::new("clusterizer.filter", &models);
        Clusterizer::new(config, ChooseableFilter::new(&factory, filter).unwrap())
    }

    fn adjacency() -> WireAdjacency {
        let geometry = WireGeometry::planar(&[PlanarLayout::default()]).unwrap();
        WireAdjacency::build(&geometry, 1.5).unwrap()
    }

    #[test]
    fn test_union_find() {
        let mut uf = UnionFind::new(5);
        uf.union(0, 1);
        uf.union(2, 3);
        uf.union(1, 2);

        assert_eq!(uf.find(0), uf.find(3));
        assert_ne!(uf.find(0), uf.find(4));
    }

    #[test]
    fn test_two_clusters_and_background() {
        let hits = vec![
            hit(0, 0, 10, 0.0),
            hit(1, 0, 40, 0.0),
            hit(2, 1, 11, 0.0),
            hit(3, 1, 41, 0.0),
            hit(4, 2, 12, 0.0),
            hit(5, 2, 42, 0.0),
            hit(6, 3, 60, 0.0),
        ];
        let mut ownership = HitOwnership::new(hits.len());
        let clusters = clusterizer(ClusterizerConfig::default(), &FilterConfig::all()).cluster(
            &hits,
            &adjacency(),
            &mut ownership,
        );
        assert_eq!(clusters.clusters, vec![vec![0, 2, 4], vec![1, 3, 5]]);
        assert_eq!(clusters.n_background, 1);
        assert!(ownership.is_background(6));
    }

    #[test]
    fn test_time_difference_splits() {
        let hits = vec![hit(0, 0, 10, 0.0), hit(1, 1, 11, 500.0)];
        let mut ownership = HitOwnership::new(hits.len());
        let config = ClusterizerConfig::default().with_min_cluster_size(1);
        let clusters = clusterizer(config, &FilterConfig::all()).cluster(
            &hits,
            &adjacency(),
            &mut ownership,
        );
        assert_eq!(clusters.clusters.len(), 2);
    }

    #[test]
    fn test_none_filter_leaves_singletons() {
        let hits = vec![hit(0, 0, 10, 0.0), hit(1, 1, 11, 0.0), hit(2, 2, 12, 0.0)];
        let mut ownership = HitOwnership::new(hits.len());
        let clusters = clusterizer(ClusterizerConfig::default(), &FilterConfig::none()).cluster(
            &hits,
            &adjacency(),
            &mut ownership,
        );
        assert!(clusters.clusters.is_empty());
        assert_eq!(ownership.n_background(), 3);
    }
}
