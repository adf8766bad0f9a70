//! Gradient-boosted tree trainer
//!
//! Squared-loss boosting over a [`FixedPointSet`]: the bias is the mean
//! target, each stage fits a CART tree to the residual gradients of a row
//! subsample restricted to a column subsample, and the tree is scaled by the
//! learning rate. Everything stays in fixed-point integers.

use anyhow::{ensure, Result};
use realty_price_core::config::BoostingParams;
use realty_price_core::gbdt::{from_fixed, to_fixed, Model, SCALE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cart::{CartBuilder, TreeConfig, HESSIAN_UNIT};
use crate::dataset::FixedPointSet;
use crate::deterministic::{sample_size, LcgRng};

/// Hyperparameters for one boosting run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GbdtConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub learning_rate: f64,
    /// Share of rows drawn for each tree
    pub subsample: f64,
    /// Share of feature columns drawn for each tree
    pub colsample: f64,
    pub quant_step: i64,
    pub seed: u64,
}

impl Default for GbdtConfig {
    fn default() -> Self {
        Self::from_params(&BoostingParams::default(), 42)
    }
}

impl GbdtConfig {
    pub fn from_params(params: &BoostingParams, seed: u64) -> Self {
        Self {
            n_trees: params.n_trees,
            max_depth: params.max_depth,
            min_samples_leaf: params.min_samples_leaf,
            learning_rate: params.learning_rate,
            subsample: params.subsample,
            colsample: params.colsample,
            quant_step: params.quant_step,
            seed,
        }
    }
}

pub struct GbdtTrainer {
    config: GbdtConfig,
}

impl GbdtTrainer {
    pub fn new(config: GbdtConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GbdtConfig {
        &self.config
    }

    pub fn train(&self, dataset: &FixedPointSet) -> Result<Model> {
        ensure!(!dataset.is_empty(), "Dataset is empty");
        ensure!(self.config.quant_step > 0, "quant_step must be positive");

        let n_samples = dataset.len();
        let feature_count = dataset.feature_count;
        let bias = Self::calculate_bias(&dataset.targets);
        let weight = to_fixed(self.config.learning_rate);
        let row_count = sample_size(n_samples, self.config.subsample);
        let column_count = sample_size(feature_count, self.config.colsample);

        let tree_config = TreeConfig {
            max_depth: self.config.max_depth,
            min_samples_leaf: self.config.min_samples_leaf,
            quant_step: self.config.quant_step,
        };
        let hessians = vec![HESSIAN_UNIT; n_samples];
        let mut predictions = vec![bias; n_samples];
        let mut rng = LcgRng::new(self.config.seed);
        let mut trees = Vec::with_capacity(self.config.n_trees);

        for tree_idx in 0..self.config.n_trees {
            let gradients: Vec<i64> = predictions
                .iter()
                .zip(&dataset.targets)
                .map(|(p, t)| p.saturating_sub(*t))
                .collect();

            let rows = rng.sample_indices(n_samples, row_count);
            let columns = rng.sample_indices(feature_count, column_count);

            let builder = CartBuilder::new(
                &dataset.features,
                &gradients,
                &hessians,
                columns,
                tree_config.clone(),
            );
            let tree = builder.build(&rows, weight);

            for (pred, row) in predictions.iter_mut().zip(&dataset.features) {
                let step = (tree.evaluate(row) as i128 * weight as i128) / SCALE as i128;
                *pred = pred.saturating_add(step as i64);
            }

            debug!(
                "Tree {}/{}: depth {}, {} leaves, train mse {:.6}",
                tree_idx + 1,
                self.config.n_trees,
                tree.depth(),
                tree.leaf_count(),
                fixed_mse(&predictions, &dataset.targets)
            );
            trees.push(tree);
        }

        let model = Model::new(trees, bias, feature_count);
        model.validate()?;
        debug!("Boosted ensemble ready: {} trees, bias {}", model.num_trees(), bias);
        Ok(model)
    }

    /// Mean target in fixed point
    fn calculate_bias(targets: &[i64]) -> i64 {
        if targets.is_empty() {
            return 0;
        }
        let sum: i128 = targets.iter().map(|&t| t as i128).sum();
        (sum / targets.len() as i128) as i64
    }
}

/// Mean squared error of fixed-point predictions, in scaled units
pub fn fixed_mse(predictions: &[i64], targets: &[i64]) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    predictions
        .iter()
        .zip(targets)
        .map(|(p, t)| from_fixed(p - t).powi(2))
        .sum::<f64>()
        / targets.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_simple_dataset() -> FixedPointSet {
        let rows: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64 / 10.0, (i % 4) as f64]).collect();
        let targets: Vec<f64> = (0..40).map(|i| if i < 20 { -1.0 } else { 1.0 }).collect();
        FixedPointSet::from_scaled(&rows, &targets).unwrap()
    }

    fn config() -> GbdtConfig {
        GbdtConfig {
            n_trees: 20,
            max_depth: 2,
            min_samples_leaf: 1,
            learning_rate: 0.3,
            subsample: 1.0,
            colsample: 1.0,
            quant_step: 10_000,
            seed: 42,
        }
    }

    #[test]
    fn test_train_reduces_error() -> Result<()> {
        let dataset = create_simple_dataset();
        let model = GbdtTrainer::new(config()).train(&dataset)?;

        assert_eq!(model.num_trees(), 20);
        assert_eq!(model.feature_count, 2);
        assert_eq!(model.trees[0].weight, 300_000);

        let predictions: Vec<i64> = dataset.features.iter().map(|r| model.score(r)).collect();
        let baseline = vec![model.bias; dataset.len()];
        assert!(fixed_mse(&predictions, &dataset.targets) < 0.1 * fixed_mse(&baseline, &dataset.targets));
        Ok(())
    }

    #[test]
    fn test_bias_calculation() {
        assert_eq!(GbdtTrainer::calculate_bias(&[1_000_000, 2_000_000, 3_000_000]), 2_000_000);
        assert_eq!(GbdtTrainer::calculate_bias(&[]), 0);
    }

    #[test]
    fn test_determinism_with_subsampling() -> Result<()> {
        let dataset = create_simple_dataset();
        let cfg = GbdtConfig {
            subsample: 0.7,
            colsample: 0.5,
            ..config()
        };

        let model1 = GbdtTrainer::new(cfg.clone()).train(&dataset)?;
        let model2 = GbdtTrainer::new(cfg.clone()).train(&dataset)?;
        assert_eq!(model1, model2);
        assert_eq!(model1.hash_hex()?, model2.hash_hex()?);

        let other_seed = GbdtTrainer::new(GbdtConfig { seed: 7, ..cfg }).train(&dataset)?;
        assert_ne!(model1, other_seed);
        Ok(())
    }
}
