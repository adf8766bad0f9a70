//! Boosted ensemble with integer-only scoring

use serde::{Deserialize, Serialize};

use super::tree::Tree;
use crate::errors::{PricingError, Result};
use crate::serde_canon::hash_canonical_hex;

/// Fixed-point scale (1e6)
pub const SCALE: i64 = 1_000_000;

/// Current ensemble format
pub const FORMAT_VERSION: i32 = 1;

/// Quantize a scaled feature or target to fixed point
pub fn to_fixed(value: f64) -> i64 {
    (value * SCALE as f64).round() as i64
}

pub fn from_fixed(value: i64) -> f64 {
    value as f64 / SCALE as f64
}

/// Gradient-boosted regression ensemble over fixed-point features
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Model {
    pub version: i32,
    pub scale: i64,
    /// Width of the feature vector the trees index into
    pub feature_count: usize,
    pub trees: Vec<Tree>,
    /// Initial prediction (mean target) in fixed point
    pub bias: i64,
}

impl Model {
    pub fn new(trees: Vec<Tree>, bias: i64, feature_count: usize) -> Self {
        Self {
            version: FORMAT_VERSION,
            scale: SCALE,
            feature_count,
            trees,
            bias,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != FORMAT_VERSION {
            return Err(PricingError::ArtifactCorrupted(format!(
                "unsupported ensemble version {}",
                self.version
            )));
        }
        if self.scale != SCALE {
            return Err(PricingError::ArtifactCorrupted(format!(
                "unexpected fixed-point scale {}",
                self.scale
            )));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.feature_count).map_err(|e| {
                PricingError::ArtifactCorrupted(format!("tree {i}: {e}"))
            })?;
        }
        Ok(())
    }

    /// `bias + Σ leaf · weight / scale`, saturating on overflow
    pub fn score(&self, features: &[i64]) -> i64 {
        self.trees.iter().fold(self.bias, |sum, tree| {
            let weighted = (tree.evaluate(features) as i128 * tree.weight as i128) / self.scale as i128;
            sum.saturating_add(weighted.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
        })
    }

    /// Scaled prediction for one scaled row
    pub fn predict(&self, row: &[f64]) -> Result<f64> {
        if row.len() != self.feature_count {
            return Err(PricingError::ShapeMismatch {
                expected: self.feature_count,
                actual: row.len(),
            });
        }
        let fixed: Vec<i64> = row.iter().map(|&v| to_fixed(v)).collect();
        Ok(from_fixed(self.score(&fixed)))
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// BLAKE3 of the canonical JSON form
    pub fn hash_hex(&self) -> Result<String> {
        hash_canonical_hex(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gbdt::tree::Node;

    fn create_test_model() -> Model {
        let tree1 = Tree::new(
            vec![
                Node::internal(0, 0, 50 * SCALE, 1, 2),
                Node::leaf(1, 100 * SCALE),
                Node::leaf(2, 200 * SCALE),
            ],
            SCALE,
        );
        let tree2 = Tree::new(
            vec![
                Node::internal(0, 1, 30 * SCALE, 1, 2),
                Node::leaf(1, -50 * SCALE),
                Node::leaf(2, 50 * SCALE),
            ],
            SCALE / 2,
        );
        Model::new(vec![tree1, tree2], 10 * SCALE, 2)
    }

    #[test]
    fn test_score() {
        let model = create_test_model();
        // 10 + 100 + (-50 * 0.5)
        assert_eq!(model.score(&[30 * SCALE, 20 * SCALE]), 85 * SCALE);
        // 10 + 200 + (50 * 0.5)
        assert_eq!(model.score(&[60 * SCALE, 40 * SCALE]), 235 * SCALE);
    }

    #[test]
    fn test_predict_f64() {
        let model = create_test_model();
        assert_eq!(model.predict(&[30.0, 20.0]).unwrap(), 85.0);
        assert!(matches!(
            model.predict(&[1.0]),
            Err(PricingError::ShapeMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_fixed_point_conversion() {
        assert_eq!(to_fixed(1.5), 1_500_000);
        assert_eq!(to_fixed(-0.000_000_4), 0);
        assert_eq!(from_fixed(-2_250_000), -2.25);
    }

    #[test]
    fn test_validation() {
        assert!(create_test_model().validate().is_ok());

        let mut narrow = create_test_model();
        narrow.feature_count = 1;
        assert!(narrow.validate().is_err());

        let mut wrong_version = create_test_model();
        wrong_version.version = 999;
        assert!(wrong_version.validate().is_err());
    }

    #[test]
    fn test_hash_tracks_content() {
        let a = create_test_model();
        let mut b = create_test_model();
        assert_eq!(a.hash_hex().unwrap(), b.hash_hex().unwrap());
        b.bias += 1;
        assert_ne!(a.hash_hex().unwrap(), b.hash_hex().unwrap());
        assert_eq!(a.hash_hex().unwrap().len(), 64);
    }

    #[test]
    fn test_overflow_saturates() {
        let tree = Tree::new(vec![Node::leaf(0, i64::MAX)], i64::MAX);
        let model = Model::new(vec![tree.clone(), tree], 0, 0);
        assert_eq!(model.score(&[]), i64::MAX);
    }
}
