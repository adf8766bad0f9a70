//! Deterministic helpers for reproducible tree training
//!
//! Row and column subsampling draw from a small LCG so that a boosted
//! ensemble is bit-identical for a given seed on every platform.

use std::num::Wrapping;

/// Linear congruential generator (glibc constants)
#[derive(Clone, Debug)]
pub struct LcgRng {
    state: Wrapping<i64>,
}

impl LcgRng {
    const MULTIPLIER: i64 = 1103515245;
    const INCREMENT: i64 = 12345;
    const MODULUS: i64 = 1 << 31;

    pub fn new(seed: u64) -> Self {
        Self {
            state: Wrapping((seed % Self::MODULUS as u64) as i64),
        }
    }

    /// Next value in `[0, 2^31)`
    pub fn next_i64(&mut self) -> i64 {
        self.state = self.state * Wrapping(Self::MULTIPLIER) + Wrapping(Self::INCREMENT);
        self.state.0 & (Self::MODULUS - 1)
    }

    /// Next value in `[0, max)`
    pub fn next_range(&mut self, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        (self.next_i64() as u64 % max as u64) as usize
    }

    /// `count` distinct indices from `0..n`, sorted ascending
    ///
    /// Partial Fisher-Yates over the index range.
    pub fn sample_indices(&mut self, n: usize, count: usize) -> Vec<usize> {
        let count = count.min(n);
        let mut pool: Vec<usize> = (0..n).collect();
        for i in 0..count {
            let j = i + self.next_range(n - i);
            pool.swap(i, j);
        }
        pool.truncate(count);
        pool.sort_unstable();
        pool
    }
}

/// How many of `n` items a sampling fraction keeps (at least one)
pub fn sample_size(n: usize, fraction: f64) -> usize {
    if n == 0 {
        return 0;
    }
    ((fraction * n as f64).round() as usize).clamp(1, n)
}

/// Ordering used when two splits have equal gain; smaller wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SplitTieBreaker {
    pub feature_idx: usize,
    pub threshold: i64,
    pub node_id: usize,
}

impl SplitTieBreaker {
    pub fn new(feature_idx: usize, threshold: i64, node_id: usize) -> Self {
        Self {
            feature_idx,
            threshold,
            node_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcg_determinism() {
        let mut rng1 = LcgRng::new(42);
        let mut rng2 = LcgRng::new(42);
        for _ in 0..100 {
            assert_eq!(rng1.next_i64(), rng2.next_i64());
        }
    }

    #[test]
    fn test_lcg_range() {
        let mut rng = LcgRng::new(42);
        for _ in 0..100 {
            assert!(rng.next_range(10) < 10);
        }
        assert_eq!(rng.next_range(0), 0);
    }

    #[test]
    fn test_sample_indices() {
        let mut rng = LcgRng::new(7);
        let picked = rng.sample_indices(20, 14);
        assert_eq!(picked.len(), 14);
        assert!(picked.windows(2).all(|w| w[0] < w[1]));
        assert!(picked.iter().all(|&i| i < 20));

        assert_eq!(LcgRng::new(7).sample_indices(20, 14), picked);
        assert_eq!(LcgRng::new(1).sample_indices(5, 5), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_sample_size() {
        assert_eq!(sample_size(10, 0.7), 7);
        assert_eq!(sample_size(5, 0.7), 4);
        assert_eq!(sample_size(3, 0.01), 1);
        assert_eq!(sample_size(0, 0.5), 0);
    }

    #[test]
    fn test_tie_breaker_ordering() {
        let t1 = SplitTieBreaker::new(0, 100, 0);
        let t2 = SplitTieBreaker::new(0, 100, 1);
        let t3 = SplitTieBreaker::new(1, 50, 0);
        assert!(t1 < t2);
        assert!(t1 < t3);
    }
}
