//! Fixed-point training matrices
//!
//! Scaled features and targets are quantized to integers at `SCALE` before
//! tree training so that split search and leaf values never touch floats.

use anyhow::{bail, Result};
use realty_price_core::gbdt::{from_fixed, to_fixed};

#[derive(Clone, Debug)]
pub struct FixedPointSet {
    pub features: Vec<Vec<i64>>,
    pub targets: Vec<i64>,
    pub feature_count: usize,
}

impl FixedPointSet {
    /// Quantize scaled rows and targets
    pub fn from_scaled(rows: &[Vec<f64>], targets: &[f64]) -> Result<Self> {
        if rows.len() != targets.len() {
            bail!("{} feature rows but {} targets", rows.len(), targets.len());
        }
        let feature_count = match rows.first() {
            Some(row) => row.len(),
            None => bail!("Dataset is empty"),
        };

        let mut features = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            if row.len() != feature_count {
                bail!("Row {}: expected {} features, got {}", i, feature_count, row.len());
            }
            if row.iter().any(|v| !v.is_finite()) {
                bail!("Row {}: non-finite feature value", i);
            }
            features.push(row.iter().map(|&v| to_fixed(v)).collect());
        }
        if targets.iter().any(|v| !v.is_finite()) {
            bail!("Non-finite target value");
        }

        Ok(Self {
            features,
            targets: targets.iter().map(|&t| to_fixed(t)).collect(),
            feature_count,
        })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Rows at `indices`, in that order
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            targets: indices.iter().map(|&i| self.targets[i]).collect(),
            feature_count: self.feature_count,
        }
    }

    /// Targets back in scaled float units
    pub fn targets_f64(&self) -> Vec<f64> {
        self.targets.iter().map(|&t| from_fixed(t)).collect()
    }
}
