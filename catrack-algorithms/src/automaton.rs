//! Weighted cellular automaton over a relation graph.
//!
//! The automaton is generic over the cell type and is instantiated for
//! facets (segment extraction) and segments (track linking). Each
//! relaxation computes, for every usable cell, the length of the longest
//! chain of accepted relations starting at it (`state`) and the summed
//! weight along that chain (`weight`). Extraction then greedily removes the
//! best chains.
//!
//! Relations are expected to point forward in construction order, which
//! keeps the graph acyclic. Should a cycle appear anyway, the closing edge
//! is ignored during that relaxation and counted.

use catrack_core::{HasAutomatonCell, Weight};

/// Accepted relation to a neighbour cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedRelation {
    /// Neighbour cell index.
    pub to: usize,
    /// Finite relation weight.
    pub weight: f64,
}

/// Accepted relations of every cell in compressed row form.
///
/// Rejected relations are never stored, so they cannot contribute to a
/// chain.
#[derive(Debug, Clone, Default)]
pub struct WeightedNeighborhood {
    offsets: Vec<usize>,
    relations: Vec<WeightedRelation>,
}

impl WeightedNeighborhood {
    /// Builds the neighbourhood from `(from, to, weight)` triples.
    ///
    /// Rejected weights, non-finite accepted weights, self relations and
    /// indices outside `0..n_cells` are dropped. Neighbours are sorted by
    /// index.
    #[must_use]
    pub fn from_relations<I>(n_cells: usize, relations: I) -> Self
    where
        I: IntoIterator<Item = (usize, usize, Weight)>,
    {
        let mut accepted: Vec<(usize, WeightedRelation)> = relations
            .into_iter()
            .filter(|&(from, to, _)| from < n_cells && to < n_cells && from != to)
            .filter_map(|(from, to, weight)| {
                weight
                    .value()
                    .filter(|w| w.is_finite())
                    .map(|weight| (from, WeightedRelation { to, weight }))
            })
            .collect();
        accepted.sort_by_key(|&(from, relation)| (from, relation.to));
        accepted.dedup_by_key(|&mut (from, relation)| (from, relation.to));

        let mut offsets = vec![0; n_cells + 1];
        for &(from, _) in &accepted {
            offsets[from + 1] += 1;
        }
        for i in 0..n_cells {
            offsets[i + 1] += offsets[i];
        }
        Self {
            offsets,
            relations: accepted.into_iter().map(|(_, relation)| relation).collect(),
        }
    }

    /// Builds the neighbourhood by scoring candidate pairs.
    pub fn build<I, F>(n_cells: usize, candidates: I, mut score: F) -> Self
    where
        I: IntoIterator<Item = (usize, usize)>,
        F: FnMut(usize, usize) -> Weight,
    {
        Self::from_relations(
            n_cells,
            candidates
                .into_iter()
                .map(|(from, to)| (from, to, score(from, to))),
        )
    }

    /// Accepted relations of `cell`, sorted by neighbour index.
    #[must_use]
    pub fn neighbors(&self, cell: usize) -> &[WeightedRelation] {
        match (self.offsets.get(cell), self.offsets.get(cell + 1)) {
            (Some(&start), Some(&end)) => &self.relations[start..end],
            _ => &[],
        }
    }

    /// Number of cells.
    #[must_use]
    pub fn n_cells(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Number of accepted relations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.relations.len()
    }

    /// Returns true if there is no accepted relation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

/// Outcome of a greedy extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Accepted paths in extraction order, each listed from its start cell.
    pub paths: Vec<Vec<usize>>,
    /// Cycle-closing relations ignored by the first relaxation.
    pub cycles_ignored: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Active,
    Done,
}

/// Longest-chain cellular automaton with greedy path extraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct CellularAutomaton {
    min_state: u32,
}

impl CellularAutomaton {
    /// Creates an automaton that extracts chains whose start cell reached at
    /// least `min_state`, i.e. paths of more than `min_state` cells.
    #[must_use]
    pub fn new(min_state: u32) -> Self {
        Self { min_state }
    }

    /// Minimum start state of an extracted chain.
    #[must_use]
    pub fn min_state(&self) -> u32 {
        self.min_state
    }

    /// Recomputes state and weight of every cell.
    ///
    /// `state(c) = 1 + max state(n)` over usable neighbours `n`, or 0 without
    /// one; `weight(c) = intrinsic(c) + relation weight + weight(n)` of the
    /// neighbour with the highest `(state, relation weight + weight)`.
    /// Unusable cells keep state 0 and are never followed. Flags are left
    /// untouched.
    ///
    /// Returns the number of cycle-closing relations that were ignored.
    pub fn relax<C: HasAutomatonCell>(
        &self,
        cells: &mut [C],
        neighborhood: &WeightedNeighborhood,
    ) -> usize {
        for cell in cells.iter_mut() {
            cell.automaton_cell_mut().reset_state();
        }

        let n = cells.len();
        let mut marks = vec![Mark::New; n];
        let mut ignored = 0;
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for root in 0..n {
            if marks[root] != Mark::New || !cells[root].automaton_cell().is_usable() {
                continue;
            }
            marks[root] = Mark::Active;
            stack.push((root, 0));

            while let Some(top) = stack.last_mut() {
                let (cell, position) = *top;
                let relations = neighborhood.neighbors(cell);
                if let Some(relation) = relations.get(position) {
                    top.1 += 1;
                    let next = relation.to;
                    if next < n
                        && marks[next] == Mark::New
                        && cells[next].automaton_cell().is_usable()
                    {
                        marks[next] = Mark::Active;
                        stack.push((next, 0));
                    }
                    continue;
                }
                stack.pop();

                let mut best: Option<(u32, f64)> = None;
                for relation in relations {
                    match marks.get(relation.to) {
                        Some(Mark::Done) => {}
                        Some(Mark::Active) => {
                            ignored += 1;
                            continue;
                        }
                        _ => continue,
                    }
                    let neighbor = cells[relation.to].automaton_cell();
                    let candidate = (neighbor.state() + 1, relation.weight + neighbor.weight());
                    let better = best.is_none_or(|(state, weight)| {
                        candidate.0 > state || (candidate.0 == state && candidate.1 > weight)
                    });
                    if better {
                        best = Some(candidate);
                    }
                }
                let automaton_cell = cells[cell].automaton_cell_mut();
                if let Some((state, weight)) = best {
                    let intrinsic = automaton_cell.intrinsic_weight();
                    automaton_cell.assign(state, intrinsic + weight);
                }
                marks[cell] = Mark::Done;
            }
        }

        if ignored > 0 {
            log::trace!("ignored {ignored} cycle-closing relations during relaxation");
        }
        ignored
    }

    /// Extracts chains until no usable cell reaches the minimum state.
    ///
    /// Each extracted chain is marked taken.
    pub fn extract_paths<C: HasAutomatonCell>(
        &self,
        cells: &mut [C],
        neighborhood: &WeightedNeighborhood,
    ) -> Vec<Vec<usize>> {
        self.extract_with(cells, neighborhood, |_, _| true).paths
    }

    /// Extracts chains, letting `accept` veto each one.
    ///
    /// Every pass relaxes the graph, picks the usable cell with the highest
    /// `(state, weight)` (ties: lowest index) and walks its chain. `accept`
    /// sees the path and may update the cells, e.g. to block cells sharing
    /// resources with the path. An accepted path is marked taken and
    /// returned; for a vetoed path only its start cell is marked taken.
    pub fn extract_with<C, F>(
        &self,
        cells: &mut [C],
        neighborhood: &WeightedNeighborhood,
        mut accept: F,
    ) -> Extraction
    where
        C: HasAutomatonCell,
        F: FnMut(&[usize], &mut [C]) -> bool,
    {
        let mut paths = Vec::new();
        let mut cycles_ignored = None;
        loop {
            let ignored = self.relax(cells, neighborhood);
            cycles_ignored.get_or_insert(ignored);
            let Some(seed) = best_seed(cells) else {
                break;
            };
            if cells[seed].automaton_cell().state() < self.min_state {
                break;
            }
            let path = walk(cells, neighborhood, seed);
            if accept(&path, cells) {
                for &cell in &path {
                    cells[cell].automaton_cell_mut().set_taken(true);
                }
                paths.push(path);
            } else {
                cells[seed].automaton_cell_mut().set_taken(true);
            }
        }

        let cycles_ignored = cycles_ignored.unwrap_or_default();
        if cycles_ignored > 0 {
            log::warn!("relation graph contains cycles, ignored {cycles_ignored} relations");
        }
        Extraction {
            paths,
            cycles_ignored,
        }
    }
}

fn best_seed<C: HasAutomatonCell>(cells: &[C]) -> Option<usize> {
    let mut best: Option<(usize, u32, f64)> = None;
    for (index, cell) in cells.iter().enumerate() {
        let cell = cell.automaton_cell();
        if !cell.is_usable() {
            continue;
        }
        let better = best.is_none_or(|(_, state, weight)| {
            cell.state() > state || (cell.state() == state && cell.weight() > weight)
        });
        if better {
            best = Some((index, cell.state(), cell.weight()));
        }
    }
    best.map(|(index, _, _)| index)
}

/// Follows the usable neighbour with the highest `(state, relation weight +
/// weight)`, ties to the lower index. States strictly decrease along the
/// walk.
fn walk<C: HasAutomatonCell>(
    cells: &[C],
    neighborhood: &WeightedNeighborhood,
    seed: usize,
) -> Vec<usize> {
    let mut path = vec![seed];
    let mut current = seed;
    loop {
        let state = cells[current].automaton_cell().state();
        let mut next: Option<(usize, u32, f64)> = None;
        for relation in neighborhood.neighbors(current) {
            let Some(neighbor) = cells.get(relation.to).map(HasAutomatonCell::automaton_cell)
            else {
                continue;
            };
            if !neighbor.is_usable() || neighbor.state() >= state {
                continue;
            }
            let score = relation.weight + neighbor.weight();
            let better = next.is_none_or(|(_, best_state, best_score)| {
                neighbor.state() > best_state
                    || (neighbor.state() == best_state && score > best_score)
            });
            if better {
                next = Some((relation.to, neighbor.state(), score));
            }
        }
        match next {
            Some((cell, _, _)) => {
                path.push(cell);
                current = cell;
            }
            None => return path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use catrack_core::AutomatonCell;

    fn cells(n: usize) -> Vec<AutomatonCell> {
        (0..n).map(|_| AutomatonCell::new(1.0)).collect()
    }

    fn chain(n: usize, weight: f64) -> WeightedNeighborhood {
        WeightedNeighborhood::from_relations(
            n,
            (0..n.saturating_sub(1)).map(|i| (i, i + 1, Weight::Accepted(weight))),
        )
    }

    #[test]
    fn test_chain_state() {
        let mut cells = cells(5);
        let ignored = CellularAutomaton::new(0).relax(&mut cells, &chain(5, 0.5));
        assert_eq!(ignored, 0);
        assert_eq!(cells[0].state(), 4);
        assert_eq!(cells[4].state(), 0);
        // 5 intrinsic weights + 4 relations
        assert_relative_eq!(cells[0].weight(), 7.0);
    }

    #[test]
    fn test_rejected_relations_never_count() {
        let neighborhood = WeightedNeighborhood::from_relations(
            3,
            [
                (0, 1, Weight::Rejected),
                (1, 2, Weight::Accepted(f64::NAN)),
                (0, 2, Weight::from_score(f64::NAN)),
            ],
        );
        assert!(neighborhood.is_empty());
        let mut cells = cells(3);
        CellularAutomaton::new(0).relax(&mut cells, &neighborhood);
        assert!(cells.iter().all(|c| c.state() == 0));
    }

    #[test]
    fn test_unusable_cells_break_chains() {
        let mut cells = cells(4);
        cells[2].set_do_not_use(true);
        CellularAutomaton::new(0).relax(&mut cells, &chain(4, 1.0));
        assert_eq!(cells[0].state(), 1);
        assert_eq!(cells[2].state(), 0);
    }

    #[test]
    fn test_cycle_is_broken() {
        let neighborhood = WeightedNeighborhood::from_relations(
            3,
            [
                (0, 1, Weight::Accepted(1.0)),
                (1, 2, Weight::Accepted(1.0)),
                (2, 0, Weight::Accepted(1.0)),
            ],
        );
        let mut cells = cells(3);
        let ignored = CellularAutomaton::new(0).relax(&mut cells, &neighborhood);
        assert_eq!(ignored, 1);
        assert_eq!(cells[0].state(), 2);
        assert_eq!(cells[2].state(), 0);

        let paths = CellularAutomaton::new(0).extract_paths(&mut cells, &neighborhood);
        assert_eq!(paths, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let automaton = CellularAutomaton::new(0);
        let neighborhood = chain(4, 1.0);
        let mut cells = cells(4);
        let paths = automaton.extract_paths(&mut cells, &neighborhood);
        assert_eq!(paths, vec![vec![0, 1, 2, 3]]);
        assert!(cells.iter().all(AutomatonCell::is_taken));
        assert!(automaton.extract_paths(&mut cells, &neighborhood).is_empty());
    }

    #[test]
    fn test_min_state() {
        // 0 -> 1 and an isolated cell 2
        let neighborhood =
            WeightedNeighborhood::from_relations(3, [(0, 1, Weight::Accepted(1.0))]);
        assert_eq!(neighborhood.n_cells(), 3);
        let mut cells = cells(3);
        let paths = CellularAutomaton::new(1).extract_paths(&mut cells, &neighborhood);
        assert_eq!(paths, vec![vec![0, 1]]);
        assert!(!cells[2].is_taken());
    }

    #[test]
    fn test_seed_tie_break_lowest_index() {
        // two disjoint equal chains: 0 -> 1 and 2 -> 3
        let neighborhood = WeightedNeighborhood::from_relations(
            4,
            [(0, 1, Weight::Accepted(1.0)), (2, 3, Weight::Accepted(1.0))],
        );
        let mut cells = cells(4);
        let paths = CellularAutomaton::new(0).extract_paths(&mut cells, &neighborhood);
        assert_eq!(paths, vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn test_walk_prefers_weight_then_lower_index() {
        // 0 branches to 1 and 2 (equal states); 2 has the heavier relation
        let heavier = WeightedNeighborhood::from_relations(
            3,
            [(0, 1, Weight::Accepted(1.0)), (0, 2, Weight::Accepted(2.0))],
        );
        let mut cells_a = cells(3);
        let paths = CellularAutomaton::new(1).extract_paths(&mut cells_a, &heavier);
        assert_eq!(paths, vec![vec![0, 2]]);

        let equal = WeightedNeighborhood::from_relations(
            3,
            [(0, 2, Weight::Accepted(1.0)), (0, 1, Weight::Accepted(1.0))],
        );
        let mut cells_b = cells(3);
        let paths = CellularAutomaton::new(1).extract_paths(&mut cells_b, &equal);
        assert_eq!(paths, vec![vec![0, 1]]);
    }

    #[test]
    fn test_veto_takes_only_seed() {
        let neighborhood = chain(3, 1.0);
        let mut cells = cells(3);
        let mut calls = 0;
        let extraction =
            CellularAutomaton::new(0).extract_with(&mut cells, &neighborhood, |path, _| {
                calls += 1;
                path.len() == 2
            });
        // [0, 1, 2] vetoed, then [1, 2] accepted
        assert_eq!(extraction.paths, vec![vec![1, 2]]);
        assert_eq!(extraction.cycles_ignored, 0);
        assert_eq!(calls, 2);
        assert!(cells.iter().all(AutomatonCell::is_taken));
    }
}
