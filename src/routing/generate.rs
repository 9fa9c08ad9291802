//! Chain enumerator: a validator-driven odometer over the factory index.
//!
//! Chains of a fixed length are enumerated as an odometer: every position
//! indexes into the catalog and the rightmost position advances fastest.
//! The validator's backtrack depth lets the enumerator fast-forward past
//! whole families of doomed permutations: positions before the depth are
//! kept, positions after it reset to the first factory, and the named
//! position advances (wrapping carries leftward).
//!
//! Enumeration is lazy — the caller pulls one validated candidate at a
//! time — and deterministic in catalog order. A generator is cheap state;
//! planning passes create a fresh one per route and length.

use super::index::{FactoryEntry, FactoryIndex};
use super::MAX_CHAIN_LENGTH;
use smallvec::SmallVec;

/// Inline storage for chain positions and entry slices.
pub type Chain<'i> = SmallVec<[&'i FactoryEntry; MAX_CHAIN_LENGTH]>;

/// Odometer state for chains of one fixed length.
pub struct ChainGenerator {
    length: usize,
    positions: SmallVec<[usize; MAX_CHAIN_LENGTH]>,
    primed: bool,
    exhausted: bool,
}

impl ChainGenerator {
    /// Create a generator for chains of `length` factories.
    pub fn new(length: usize) -> Self {
        debug_assert!(length > 0);
        Self {
            length,
            positions: smallvec::smallvec![0; length],
            primed: false,
            exhausted: false,
        }
    }

    /// Pull the next chain accepted by `validate`.
    ///
    /// `validate` receives the candidate in src-first order and returns
    /// the backtrack depth for rejected candidates, as described in
    /// [`crate::routing::validate`]. Returns `None` once every
    /// permutation has been tried.
    pub fn next_valid<'i, F>(&mut self, index: &'i FactoryIndex, mut validate: F) -> Option<Chain<'i>>
    where
        F: FnMut(&[&'i FactoryEntry]) -> Option<usize>,
    {
        if self.exhausted || index.is_empty() {
            return None;
        }

        let entries = index.entries();
        let mut backtrack = self.length - 1;

        loop {
            if !self.primed {
                self.primed = true;
            } else if !self.advance(entries.len(), backtrack) {
                self.exhausted = true;
                return None;
            }

            let chain: Chain<'i> = self.positions.iter().map(|&p| &entries[p]).collect();

            match validate(&chain) {
                None => return Some(chain),
                Some(depth) => backtrack = depth.min(self.length - 1),
            }
        }
    }

    /// Reset positions after `from`, then advance position `from` with
    /// leftward carry. Returns `false` when the odometer wraps around
    /// completely.
    fn advance(&mut self, catalog_len: usize, from: usize) -> bool {
        for position in &mut self.positions[from + 1..] {
            *position = 0;
        }

        let mut p = from;
        loop {
            self.positions[p] += 1;
            if self.positions[p] < catalog_len {
                return true;
            }
            self.positions[p] = 0;
            if p == 0 {
                return false;
            }
            p -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::{Caps, CapsStructure};
    use crate::element::{ElementFactory, TransformFactory};
    use std::sync::Arc;

    fn caps(format: &str) -> Caps {
        Caps::from(CapsStructure::new("video/raw").with_field("format", format))
    }

    fn index(names: &[&str]) -> FactoryIndex {
        let catalog: Vec<Arc<dyn ElementFactory>> = names
            .iter()
            .map(|name| {
                Arc::new(TransformFactory::new(
                    *name,
                    "Converter",
                    caps("rgb"),
                    caps("rgb"),
                )) as Arc<dyn ElementFactory>
            })
            .collect();
        FactoryIndex::build(&catalog)
    }

    fn names(chain: &[&FactoryEntry]) -> Vec<String> {
        chain.iter().map(|e| e.name().to_string()).collect()
    }

    #[test]
    fn test_enumerates_all_permutations_rightmost_fastest() {
        let index = index(&["a", "b"]);
        let mut generator = ChainGenerator::new(2);

        let mut seen = Vec::new();
        while let Some(chain) = generator.next_valid(&index, |_| None) {
            seen.push(names(&chain).join(""));
        }

        assert_eq!(seen, vec!["aa", "ab", "ba", "bb"]);
    }

    #[test]
    fn test_exhaustion_is_terminal() {
        let index = index(&["a"]);
        let mut generator = ChainGenerator::new(1);
        assert!(generator.next_valid(&index, |_| None).is_some());
        assert!(generator.next_valid(&index, |_| None).is_none());
        assert!(generator.next_valid(&index, |_| None).is_none());
    }

    #[test]
    fn test_empty_catalog_yields_nothing() {
        let index = index(&[]);
        let mut generator = ChainGenerator::new(3);
        assert!(generator.next_valid(&index, |_| None).is_none());
    }

    #[test]
    fn test_backtrack_skips_suffix_permutations() {
        let index = index(&["a", "b", "c"]);
        let mut generator = ChainGenerator::new(3);

        // Reject every chain whose position-0 entry is "a", blaming
        // position 0: the generator must skip all 9 "a??" permutations at
        // once and never show us more than one of them.
        let mut rejected = 0;
        let chain = generator
            .next_valid(&index, |chain| {
                if chain[0].name() == "a" {
                    rejected += 1;
                    Some(0)
                } else {
                    None
                }
            })
            .unwrap();

        assert_eq!(rejected, 1);
        assert_eq!(names(&chain), vec!["b", "a", "a"]);
    }

    #[test]
    fn test_backtrack_mid_position_keeps_prefix() {
        let index = index(&["a", "b"]);
        let mut generator = ChainGenerator::new(3);

        // Blame position 1 whenever it holds "a": position 2 resets and
        // position 1 advances, keeping position 0.
        let chain = generator
            .next_valid(&index, |chain| (chain[1].name() == "a").then_some(1))
            .unwrap();
        assert_eq!(names(&chain), vec!["a", "b", "a"]);
    }

    #[test]
    fn test_deterministic_in_catalog_order() {
        let run = || {
            let index = index(&["x", "y", "z"]);
            let mut generator = ChainGenerator::new(2);
            let mut seen = Vec::new();
            while let Some(chain) = generator.next_valid(&index, |_| None) {
                seen.push(names(&chain).join(""));
            }
            seen
        };
        assert_eq!(run(), run());
        assert_eq!(run().len(), 9);
    }
}
