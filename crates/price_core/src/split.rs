//! Seeded train/test partitioning and k-fold index generation

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::errors::{PricingError, Result};

/// Index sets produced by a split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n` with `seed` and hold out `ceil(test_fraction * n)` rows
///
/// A fraction of zero keeps every row in the training set.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Result<SplitIndices> {
    if !(0.0..1.0).contains(&test_fraction) {
        return Err(PricingError::InvalidParameters(format!(
            "test fraction must be in [0, 1), got {test_fraction}"
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let n_test = (test_fraction * n as f64).ceil() as usize;
    if n > 0 && n_test >= n {
        return Err(PricingError::InvalidParameters(format!(
            "test fraction {test_fraction} leaves no training rows out of {n}"
        )));
    }

    let train = order.split_off(n_test);
    Ok(SplitIndices { train, test: order })
}

/// Contiguous, unshuffled folds; the first `n % k` folds get one extra row
pub fn kfold(n: usize, k: usize) -> Result<Vec<SplitIndices>> {
    if k < 2 || k > n {
        return Err(PricingError::InvalidParameters(format!(
            "cannot make {k} folds from {n} rows"
        )));
    }

    let base = n / k;
    let extra = n % k;
    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for fold in 0..k {
        let size = base + usize::from(fold < extra);
        let end = start + size;
        folds.push(SplitIndices {
            train: (0..start).chain(end..n).collect(),
            test: (start..end).collect(),
        });
        start = end;
    }
    Ok(folds)
}

/// Gather the elements at `indices`
pub fn select<T: Clone>(items: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| items[i].clone()).collect()
}
