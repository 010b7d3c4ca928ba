//! Resolution of CKF results sharing hits.

use catrack_core::{ChooseableFilter, CkfResult, HitOwnership, Owner, ResultPair};
use std::collections::HashSet;

/// Greedy overlap resolution of CKF results.
#[derive(Debug, Clone)]
pub struct ResultFilter {
    filter: ChooseableFilter<ResultPair<'static>>,
    min_added_hits: usize,
}

impl ResultFilter {
    /// Creates a result filter. The pair filter decides whether two results
    /// sharing added hits are duplicates; a trimmed result needs at least
    /// `min_added_hits` hits of its own to survive.
    #[must_use]
    pub fn new(filter: ChooseableFilter<ResultPair<'static>>, min_added_hits: usize) -> Self {
        Self {
            filter,
            min_added_hits: min_added_hits.max(1),
        }
    }

    /// Accepts results by descending quality (ties: lower seed, then input
    /// order).
    ///
    /// A result the pair filter marks as duplicate of an accepted one is
    /// dropped. Otherwise hits already used by accepted results are removed
    /// from it together with their states, and it is dropped when fewer than
    /// `min_added_hits` remain. No hit is listed by two kept results.
    /// Accepted result `k` claims its added hits as `Owner::CkfResult(k)`.
    pub fn resolve(
        &self,
        results: Vec<CkfResult>,
        ownership: &mut HitOwnership,
    ) -> Vec<CkfResult> {
        let mut order: Vec<usize> = (0..results.len()).collect();
        order.sort_by(|&a, &b| {
            results[b]
                .quality
                .total_cmp(&results[a].quality)
                .then(results[a].seed.cmp(&results[b].seed))
                .then(a.cmp(&b))
        });

        let mut slots: Vec<Option<CkfResult>> = results.into_iter().map(Some).collect();
        let mut kept: Vec<CkfResult> = Vec::new();
        let mut used: HashSet<usize> = HashSet::new();
        let mut trimmed = 0;
        for index in order {
            let Some(mut candidate) = slots[index].take() else {
                continue;
            };
            let duplicate = kept.iter().any(|first| {
                first.shared_hits(&candidate) > 0
                    && self
                        .filter
                        .score(&ResultPair {
                            first,
                            second: &candidate,
                        })
                        .is_accepted()
            });
            if duplicate {
                log::trace!("result of seed {} dropped as duplicate", candidate.seed);
                continue;
            }

            if candidate.added.iter().any(|p| used.contains(&p.hit)) {
                remove_used_hits(&mut candidate, &used);
                trimmed += 1;
                if candidate.n_added() < self.min_added_hits {
                    log::trace!("result of seed {} dropped after trimming", candidate.seed);
                    continue;
                }
            }
            used.extend(candidate.added.iter().map(|p| p.hit));
            kept.push(candidate);
        }

        let mut claimed = 0;
        for (k, result) in kept.iter().enumerate() {
            claimed += result
                .added_hits()
                .into_iter()
                .filter(|&hit| ownership.claim(&[hit], Owner::CkfResult(k)))
                .count();
        }
        log::debug!(
            "result filter: kept {} results ({trimmed} trimmed), {claimed} hits claimed",
            kept.len()
        );
        kept
    }
}

/// Removes added hits found in `used`, keeping states aligned with their
/// measurements.
fn remove_used_hits(result: &mut CkfResult, used: &HashSet<usize>) {
    if result.states.len() == result.added.len() {
        let mut position = 0;
        let added = &result.added;
        result.states.retain(|_| {
            let keep = !used.contains(&added[position].hit);
            position += 1;
            keep
        });
    }
    result.added.retain(|p| !used.contains(&p.hit));
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use catrack_core::fit::fit_line;
    use catrack_core::{
        FilterConfig, FilterFactory, KalmanState, ModelStore, Termination, TrackPoint,
    };

    fn point(hit: usize) -> TrackPoint {
        TrackPoint {
            hit,
            layer: 0,
            x: 0.0,
            y: 0.0,
            variance: 0.01,
            drift_length: 0.0,
            mc_particle: None,
        }
    }

    fn result(seed: usize, added: &[usize], quality: f64) -> CkfResult {
        CkfResult {
            seed,
            seed_points: Vec::new(),
            added: added.iter().copied().map(point).collect(),
            states: Vec::new(),
            chi2: 0.0,
            score: quality,
            quality,
            termination: Termination::LastLayer,
        }
    }

    fn filter(config: &FilterConfig) -> ResultFilter {
        let models = ModelStore::new();
        let factory = FilterFactory::new("result_filter.filter", &models);
        ResultFilter::new(ChooseableFilter::new(&factory, config).unwrap(), 1)
    }

    fn assert_exclusive(kept: &[CkfResult]) {
        let mut seen = HashSet::new();
        for result in kept {
            for hit in result.added_hits() {
                assert!(seen.insert(hit), "hit {hit} listed twice");
            }
        }
    }

    #[test]
    fn test_higher_quality_wins_overlap() {
        let results = vec![
            result(0, &[1, 2, 3], 2.0),
            result(1, &[3, 4], 5.0),
            result(2, &[6, 7], 1.0),
        ];
        let mut ownership = HitOwnership::new(8);
        let kept = filter(&FilterConfig::all()).resolve(results, &mut ownership);

        let seeds: Vec<usize> = kept.iter().map(|r| r.seed).collect();
        assert_eq!(seeds, vec![1, 2]);
        assert_eq!(ownership.owner(3), Some(Owner::CkfResult(0)));
        assert_eq!(ownership.owner(6), Some(Owner::CkfResult(1)));
        assert!(ownership.is_available(1));
    }

    #[test]
    fn test_ties_go_to_lower_seed() {
        let results = vec![result(3, &[1], 1.0), result(2, &[1], 1.0)];
        let mut ownership = HitOwnership::new(2);
        let kept = filter(&FilterConfig::all()).resolve(results, &mut ownership);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].seed, 2);
    }

    #[test]
    fn test_shared_hits_never_duplicated() {
        for config in [
            FilterConfig::all(),
            FilterConfig::none(),
            FilterConfig::truth(),
        ] {
            let results = vec![
                result(0, &[1, 2], 1.0),
                result(1, &[1, 3], 2.0),
                result(2, &[3], 0.5),
            ];
            let mut ownership = HitOwnership::new(4);
            let kept = filter(&config).resolve(results, &mut ownership);
            assert_exclusive(&kept);
            assert_eq!(kept[0].seed, 1);
            assert_eq!(ownership.owner(1), Some(Owner::CkfResult(0)));
        }
    }

    #[test]
    fn test_non_duplicate_overlap_is_trimmed() {
        let line: Vec<TrackPoint> = (0..3)
            .map(|hit| TrackPoint {
                x: hit as f64,
                ..point(hit)
            })
            .collect();
        let fit = fit_line(&line, 0.0).unwrap();
        let mut lower = result(0, &[1, 2], 1.0);
        lower.states = vec![
            KalmanState::from_fit(&fit, 1.0, 1.0),
            KalmanState::from_fit(&fit, 2.0, 1.0),
        ];
        let results = vec![lower, result(1, &[1, 3], 2.0), result(2, &[3], 0.5)];
        let mut ownership = HitOwnership::new(4);
        let kept = filter(&FilterConfig::none()).resolve(results, &mut ownership);

        let seeds: Vec<usize> = kept.iter().map(|r| r.seed).collect();
        assert_eq!(seeds, vec![1, 0]);
        assert_eq!(kept[1].added_hits(), vec![2]);
        assert_eq!(kept[1].states.len(), 1);
        assert_relative_eq!(kept[1].states[0].x, 2.0);
        assert_eq!(ownership.owner(2), Some(Owner::CkfResult(1)));
    }

    #[test]
    fn test_trimmed_below_minimum_is_dropped() {
        let models = ModelStore::new();
        let factory = FilterFactory::new("result_filter.filter", &models);
        let filter = ResultFilter::new(
            ChooseableFilter::new(&factory, &FilterConfig::none()).unwrap(),
            2,
        );
        let results = vec![result(0, &[1, 2], 1.0), result(1, &[1, 3], 2.0)];
        let mut ownership = HitOwnership::new(4);
        let kept = filter.resolve(results, &mut ownership);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].seed, 1);
        assert!(ownership.is_available(2));
    }
}
