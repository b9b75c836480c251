//! Terminal subset masks
//!
//! Bit `i` of a mask selects terminal position `i`. Nontrivial masks are
//! `1..2^k - 1` (the empty and the full set are excluded). Enumeration is
//! index-based and ordered by population count so that any table filled in
//! that order has every smaller subset resolved before a larger one.

use std::collections::HashSet;

use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::config::SparsifierConfig;

/// A subset of terminal positions
pub type SubsetMask = u64;

/// Number of nontrivial masks for `k` terminals (2^k - 2)
pub fn nontrivial_count(k: usize) -> u64 {
    if k >= 64 {
        u64::MAX
    } else {
        (1u64 << k).saturating_sub(2)
    }
}

/// Next mask with the same population count (Gosper's hack)
#[inline]
fn next_same_popcount(mask: u64) -> u64 {
    let c = mask & mask.wrapping_neg();
    let r = mask + c;
    (((r ^ mask) >> 2) / c) | r
}

/// All nontrivial masks for `k` terminals, by increasing popcount then value
pub fn masks_by_popcount(k: usize) -> Vec<SubsetMask> {
    let mut masks = Vec::with_capacity(usize::try_from(nontrivial_count(k)).unwrap_or(0));
    if k < 2 || k >= 64 {
        return masks;
    }
    let limit = 1u64 << k;
    for r in 1..k {
        let mut mask = (1u64 << r) - 1;
        while mask < limit {
            masks.push(mask);
            mask = next_same_popcount(mask);
        }
    }
    masks
}

/// Which masks an evaluation visits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubsetSelection {
    /// Every nontrivial mask
    All,
    /// A seeded random sample of distinct masks
    Sampled {
        /// Number of masks to score
        count: usize,
        /// Sampler seed
        seed: u64,
    },
}

impl SubsetSelection {
    /// Exhaustive for small `k`, sampled beyond the configured limit
    pub fn for_terminals(k: usize, config: &SparsifierConfig) -> Self {
        if nontrivial_count(k) <= config.exhaustive_subset_limit as u64 {
            SubsetSelection::All
        } else {
            SubsetSelection::Sampled {
                count: config.sample_size,
                seed: config.seed,
            }
        }
    }
}

/// Seeded stream of masks that can be extended with replacements
pub(crate) struct MaskSampler {
    rng: StdRng,
    total: u64,
    seen: HashSet<SubsetMask>,
}

impl MaskSampler {
    pub(crate) fn new(k: usize, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            total: nontrivial_count(k),
            seen: HashSet::new(),
        }
    }

    /// Draw a mask not drawn before, or `None` once every mask was drawn
    pub(crate) fn draw(&mut self) -> Option<SubsetMask> {
        if self.seen.len() as u64 >= self.total {
            return None;
        }
        loop {
            let mask = self.rng.gen_range(1..=self.total);
            if self.seen.insert(mask) {
                return Some(mask);
            }
        }
    }
}

/// Seeded sample of distinct terminal position pairs (all pairs when they fit)
pub(crate) fn terminal_pairs(k: usize, limit: usize, seed: u64) -> Vec<(usize, usize)> {
    let all = k * k.saturating_sub(1) / 2;
    if all <= limit {
        return (0..k)
            .flat_map(|i| ((i + 1)..k).map(move |j| (i, j)))
            .collect();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seen = HashSet::with_capacity(limit);
    let mut pairs = Vec::with_capacity(limit);
    while pairs.len() < limit {
        let i = rng.gen_range(0..k);
        let j = rng.gen_range(0..k);
        if i == j {
            continue;
        }
        let pair = (i.min(j), i.max(j));
        if seen.insert(pair) {
            pairs.push(pair);
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nontrivial_count() {
        assert_eq!(nontrivial_count(2), 2);
        assert_eq!(nontrivial_count(4), 14);
    }

    #[test]
    fn test_masks_by_popcount_order() {
        let masks = masks_by_popcount(3);
        assert_eq!(masks, vec![0b001, 0b010, 0b100, 0b011, 0b101, 0b110]);

        let masks = masks_by_popcount(5);
        assert_eq!(masks.len(), 30);
        for pair in masks.windows(2) {
            assert!(pair[0].count_ones() <= pair[1].count_ones());
        }
        let unique: HashSet<_> = masks.iter().collect();
        assert_eq!(unique.len(), 30);
        assert!(!masks.contains(&0));
        assert!(!masks.contains(&0b11111));
    }

    #[test]
    fn test_mask_sampler_seeded() {
        let draw = |seed| {
            let mut sampler = MaskSampler::new(10, seed);
            (0..50).map(|_| sampler.draw().unwrap()).collect::<Vec<_>>()
        };
        let a = draw(7);
        assert_eq!(a, draw(7));
        assert!(a.iter().all(|&m| m >= 1 && m <= nontrivial_count(10)));
        let unique: HashSet<_> = a.iter().collect();
        assert_eq!(unique.len(), 50);
    }

    #[test]
    fn test_selection_for_terminals() {
        let config = SparsifierConfig::default().with_sampling(14, 8);
        assert_eq!(SubsetSelection::for_terminals(4, &config), SubsetSelection::All);
        assert_eq!(
            SubsetSelection::for_terminals(5, &config),
            SubsetSelection::Sampled { count: 8, seed: 42 }
        );
    }

    #[test]
    fn test_mask_sampler_exhausts() {
        let mut sampler = MaskSampler::new(3, 9);
        let mut drawn: Vec<_> = std::iter::from_fn(|| sampler.draw()).collect();
        drawn.sort_unstable();
        assert_eq!(drawn, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_terminal_pairs() {
        assert_eq!(terminal_pairs(3, 10, 0), vec![(0, 1), (0, 2), (1, 2)]);
        let sampled = terminal_pairs(30, 20, 5);
        assert_eq!(sampled.len(), 20);
        assert!(sampled.iter().all(|&(i, j)| i < j && j < 30));
    }
}
