//! Randomized mirror selection.
//!
//! `CandidateSet` yields every configured mirror exactly once, in a
//! uniformly random order. Mirrors are never compacted away: retired
//! slots are tombstoned in place and skipped on the next walk.

use rand::Rng;

/// Index of a live slot in a `CandidateSet`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Slot(usize);

/// Mirrors still available for this run.
#[derive(Clone, Debug)]
pub(crate) struct CandidateSet {
    slots: Vec<Option<String>>,
    live: usize,
}

impl CandidateSet {
    pub(crate) fn new<I, S>(mirrors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slots: Vec<_> = mirrors.into_iter().map(|m| Some(m.into())).collect();
        let live = slots.len();
        Self { slots, live }
    }

    /// Number of mirrors not yet attempted.
    pub(crate) fn live(&self) -> usize {
        self.live
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.live == 0
    }

    /// Pick a random live slot, or `None` once all mirrors are retired.
    pub(crate) fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Slot> {
        if self.is_exhausted() {
            return None;
        }

        // Walk forward by `skip` live entries.
        let mut skip = rng.gen_range(0..self.live);
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.is_none() {
                continue;
            }
            if skip == 0 {
                return Some(Slot(index));
            }
            skip -= 1;
        }

        None
    }

    /// Mirror identifier at the given slot, if still live.
    pub(crate) fn mirror(&self, slot: Slot) -> Option<&str> {
        self.slots.get(slot.0).and_then(|s| s.as_deref())
    }

    /// Tombstone a slot, removing it from future picks.
    pub(crate) fn retire(&mut self, slot: Slot) {
        if let Some(entry) = self.slots.get_mut(slot.0) {
            if entry.take().is_some() {
                self.live -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn drain(set: &mut CandidateSet, rng: &mut StdRng) -> Vec<String> {
        let mut visited = vec![];
        while let Some(slot) = set.pick(rng) {
            visited.push(set.mirror(slot).unwrap().to_string());
            set.retire(slot);
        }
        visited
    }

    #[test]
    fn visits_each_mirror_once() {
        let mirrors: Vec<String> = (0..7).map(|n| format!("http://mirror-{}/", n)).collect();
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut set = CandidateSet::new(mirrors.clone());
            let mut visited = drain(&mut set, &mut rng);
            assert!(set.is_exhausted());
            assert_eq!(set.pick(&mut rng), None);

            visited.sort();
            let mut expected = mirrors.clone();
            expected.sort();
            assert_eq!(visited, expected);
        }
    }

    #[test]
    fn duplicate_entries_are_separate_slots() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut set = CandidateSet::new(vec!["a", "a", "b"]);
        let visited = drain(&mut set, &mut rng);
        assert_eq!(visited.len(), 3);
        assert_eq!(visited.iter().filter(|m| *m == "a").count(), 2);
    }

    #[test]
    fn empty_set_is_exhausted() {
        let mut rng = StdRng::seed_from_u64(0);
        let set = CandidateSet::new(Vec::<String>::new());
        assert!(set.is_exhausted());
        assert_eq!(set.pick(&mut rng), None);
    }

    #[test]
    fn live_count_only_shrinks() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut set = CandidateSet::new(vec!["a", "b", "c"]);
        assert_eq!(set.live(), 3);

        let slot = set.pick(&mut rng).unwrap();
        assert_eq!(set.live(), 3);
        assert!(set.mirror(slot).is_some());
        set.retire(slot);
        assert_eq!(set.live(), 2);
        assert_eq!(set.mirror(slot), None);

        // Retiring twice is a no-op.
        set.retire(slot);
        assert_eq!(set.live(), 2);
    }

    #[test]
    fn first_pick_is_spread() {
        let mut rng = StdRng::seed_from_u64(42);
        let set = CandidateSet::new(vec!["a", "b", "c"]);
        let mut hits: HashMap<String, usize> = HashMap::new();
        for _ in 0..3000 {
            let slot = set.pick(&mut rng).unwrap();
            *hits.entry(set.mirror(slot).unwrap().to_string()).or_default() += 1;
        }

        assert_eq!(hits.len(), 3);
        for count in hits.values() {
            assert!(*count > 800, "skewed selection: {:?}", hits);
        }
    }
}
