//! Per-event hit ownership table.
//!
//! Replaces mutable "taken" flags on shared hit objects: every stage reads
//! and writes ownership through this table, which lives for one event.

/// Accepted object owning a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    /// Segment index of the current event.
    Segment(usize),
    /// Track index of the current event.
    Track(usize),
    /// CKF result index of the current event.
    CkfResult(usize),
}

/// Exclusive hit ownership for one event.
#[derive(Debug, Clone, Default)]
pub struct HitOwnership {
    owners: Vec<Option<Owner>>,
    background: Vec<bool>,
}

impl HitOwnership {
    /// Creates a table for `n_hits` unowned hits.
    #[must_use]
    pub fn new(n_hits: usize) -> Self {
        Self {
            owners: vec![None; n_hits],
            background: vec![false; n_hits],
        }
    }

    /// Number of hits in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Returns true if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Current owner of a hit.
    #[must_use]
    pub fn owner(&self, hit: usize) -> Option<Owner> {
        self.owners.get(hit).copied().flatten()
    }

    /// Hit is neither owned nor flagged as background.
    #[must_use]
    pub fn is_available(&self, hit: usize) -> bool {
        hit < self.owners.len() && self.owners[hit].is_none() && !self.background[hit]
    }

    /// Hit has been consumed by an accepted object.
    #[must_use]
    pub fn is_owned(&self, hit: usize) -> bool {
        self.owner(hit).is_some()
    }

    /// Flags a hit as background.
    pub fn set_background(&mut self, hit: usize) {
        if let Some(flag) = self.background.get_mut(hit) {
            *flag = true;
        }
    }

    /// Background flag of a hit.
    #[must_use]
    pub fn is_background(&self, hit: usize) -> bool {
        self.background.get(hit).copied().unwrap_or(false)
    }

    /// Claims all hits for `owner`.
    ///
    /// All-or-nothing: if any hit is unavailable (owned, background or out
    /// of range) nothing changes and `false` is returned.
    pub fn claim(&mut self, hits: &[usize], owner: Owner) -> bool {
        if !hits.iter().all(|&hit| self.is_available(hit)) {
            return false;
        }
        for &hit in hits {
            self.owners[hit] = Some(owner);
        }
        true
    }

    /// Moves every hit owned by `from` to `to`. Returns the number moved.
    pub fn transfer(&mut self, from: Owner, to: Owner) -> usize {
        let mut moved = 0;
        for slot in &mut self.owners {
            if *slot == Some(from) {
                *slot = Some(to);
                moved += 1;
            }
        }
        moved
    }

    /// Releases a single hit if it belongs to `owner`.
    pub fn release_hit(&mut self, hit: usize, owner: Owner) -> bool {
        match self.owners.get_mut(hit) {
            Some(slot) if *slot == Some(owner) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Releases every hit owned by `owner`. Returns the number released.
    pub fn release(&mut self, owner: Owner) -> usize {
        let mut released = 0;
        for slot in &mut self.owners {
            if *slot == Some(owner) {
                *slot = None;
                released += 1;
            }
        }
        released
    }

    /// Number of owned hits.
    #[must_use]
    pub fn n_owned(&self) -> usize {
        self.owners.iter().filter(|owner| owner.is_some()).count()
    }

    /// Number of background hits.
    #[must_use]
    pub fn n_background(&self) -> usize {
        self.background.iter().filter(|&&flag| flag).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive() {
        let mut table = HitOwnership::new(4);
        assert!(table.claim(&[0, 1], Owner::Segment(0)));
        assert!(!table.claim(&[1, 2], Owner::Segment(1)));
        // failed claim leaves hit 2 untouched
        assert!(table.is_available(2));
        assert_eq!(table.owner(1), Some(Owner::Segment(0)));
    }

    #[test]
    fn test_transfer_and_release() {
        let mut table = HitOwnership::new(3);
        table.claim(&[0, 2], Owner::Segment(4));
        assert_eq!(table.transfer(Owner::Segment(4), Owner::Track(0)), 2);
        assert_eq!(table.owner(2), Some(Owner::Track(0)));
        assert!(table.release_hit(2, Owner::Track(0)));
        assert!(!table.release_hit(2, Owner::Track(0)));
        assert_eq!(table.release(Owner::Track(0)), 1);
        assert_eq!(table.n_owned(), 0);
    }

    #[test]
    fn test_background_is_unavailable() {
        let mut table = HitOwnership::new(2);
        table.set_background(1);
        assert!(!table.is_available(1));
        assert!(!table.claim(&[1], Owner::Segment(0)));
        assert_eq!(table.n_background(), 1);
        assert!(!table.is_available(5));
    }
}
