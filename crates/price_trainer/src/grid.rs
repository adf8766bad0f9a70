//! Exhaustive hyperparameter search for the boosted trees
//!
//! Every grid point is scored by k-fold cross-validated negative MSE on the
//! scaled target. Points are evaluated in parallel; the result does not
//! depend on scheduling because scores are collected in grid order and ties
//! go to the earlier point.

use anyhow::{ensure, Result};
use rayon::prelude::*;
use realty_price_core::config::{BoostingParams, GridParams};
use realty_price_core::gbdt::Model;
use realty_price_core::split::kfold;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::FixedPointSet;
use crate::trainer::{fixed_mse, GbdtConfig, GbdtTrainer};

/// One combination of tunable boosting hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub n_trees: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub subsample: f64,
    pub colsample: f64,
}

impl GridPoint {
    /// Training config for this point; untuned settings come from `base`
    pub fn config(&self, base: &BoostingParams, seed: u64) -> GbdtConfig {
        GbdtConfig {
            n_trees: self.n_trees,
            max_depth: self.max_depth,
            learning_rate: self.learning_rate,
            subsample: self.subsample,
            colsample: self.colsample,
            ..GbdtConfig::from_params(base, seed)
        }
    }
}

/// Cross-validated score of one grid point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridScore {
    pub point: GridPoint,
    /// Mean over folds of the negative validation MSE
    pub mean_score: f64,
    pub fold_scores: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridResult {
    pub best: GridPoint,
    pub best_score: f64,
    /// Every point, in grid order
    pub scores: Vec<GridScore>,
}

/// All points of `grid`, `n_trees` varying slowest and `colsample` fastest
pub fn enumerate(grid: &GridParams) -> Vec<GridPoint> {
    let mut points = Vec::with_capacity(grid.size());
    for &n_trees in &grid.n_trees {
        for &max_depth in &grid.max_depth {
            for &learning_rate in &grid.learning_rate {
                for &subsample in &grid.subsample {
                    for &colsample in &grid.colsample {
                        points.push(GridPoint {
                            n_trees,
                            max_depth,
                            learning_rate,
                            subsample,
                            colsample,
                        });
                    }
                }
            }
        }
    }
    points
}

pub struct GridSearch {
    grid: GridParams,
    base: BoostingParams,
    seed: u64,
}

impl GridSearch {
    pub fn new(grid: GridParams, base: BoostingParams, seed: u64) -> Self {
        Self { grid, base, seed }
    }

    pub fn run(&self, data: &FixedPointSet) -> Result<GridResult> {
        let points = enumerate(&self.grid);
        ensure!(!points.is_empty(), "Search grid is empty");
        let folds = kfold(data.len(), self.grid.folds)?;

        info!(
            "Grid search: {} points x {} folds on {} rows",
            points.len(),
            folds.len(),
            data.len()
        );

        let fold_sets: Vec<(FixedPointSet, FixedPointSet)> = folds
            .iter()
            .map(|f| (data.subset(&f.train), data.subset(&f.test)))
            .collect();

        let scores: Vec<GridScore> = points
            .par_iter()
            .map(|point| self.score_point(point, &fold_sets))
            .collect::<Result<_>>()?;

        let mut best_idx = 0;
        for (idx, score) in scores.iter().enumerate().skip(1) {
            if score.mean_score > scores[best_idx].mean_score {
                best_idx = idx;
            }
        }
        let best = scores[best_idx].point;
        let best_score = scores[best_idx].mean_score;

        info!(
            "Best grid point #{}: {:?} (cv score {:.6})",
            best_idx, best, best_score
        );
        Ok(GridResult {
            best,
            best_score,
            scores,
        })
    }

    fn score_point(&self, point: &GridPoint, folds: &[(FixedPointSet, FixedPointSet)]) -> Result<GridScore> {
        let trainer = GbdtTrainer::new(point.config(&self.base, self.seed));
        let mut fold_scores = Vec::with_capacity(folds.len());
        for (train, validation) in folds {
            let model = trainer.train(train)?;
            fold_scores.push(-validation_mse(&model, validation));
        }
        let mean_score = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
        debug!("Grid point {:?}: cv score {:.6}", point, mean_score);
        Ok(GridScore {
            point: *point,
            mean_score,
            fold_scores,
        })
    }
}

fn validation_mse(model: &Model, data: &FixedPointSet) -> f64 {
    let predictions: Vec<i64> = data.features.iter().map(|row| model.score(row)).collect();
    fixed_mse(&predictions, &data.targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_grid() -> GridParams {
        GridParams {
            n_trees: vec![2, 10],
            max_depth: vec![1, 2],
            learning_rate: vec![0.3],
            subsample: vec![1.0],
            colsample: vec![1.0],
            folds: 3,
        }
    }

    fn step_data() -> FixedPointSet {
        let rows: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64 / 10.0, ((i * 7) % 5) as f64]).collect();
        let targets: Vec<f64> = rows.iter().map(|r| if r[0] < 1.5 { -1.0 } else { 1.0 }).collect();
        FixedPointSet::from_scaled(&rows, &targets).unwrap()
    }

    #[test]
    fn test_enumerate_order() {
        let points = enumerate(&GridParams::default());
        assert_eq!(points.len(), 162);
        assert_eq!(points[0].n_trees, 100);
        assert_eq!(points[0].colsample, 0.7);
        assert_eq!(points[1].colsample, 0.8);
        assert_eq!(points[3].subsample, 0.8);
        assert_eq!(points[161].n_trees, 200);
        assert_eq!(points[161].max_depth, 7);
    }

    #[test]
    fn test_search_prefers_more_trees() {
        let search = GridSearch::new(tiny_grid(), BoostingParams::default(), 42);
        let result = search.run(&step_data()).unwrap();

        assert_eq!(result.scores.len(), 4);
        assert!(result.scores.iter().all(|s| s.fold_scores.len() == 3));
        assert_eq!(result.best.n_trees, 10);
        assert!(result.scores.iter().all(|s| s.mean_score <= result.best_score));
    }

    #[test]
    fn test_ties_go_to_first_point() {
        // identical points score identically, the first must win
        let grid = GridParams {
            n_trees: vec![5, 5],
            max_depth: vec![2],
            ..tiny_grid()
        };
        let result = GridSearch::new(grid, BoostingParams::default(), 1).run(&step_data()).unwrap();
        assert_eq!(result.scores[0].mean_score, result.scores[1].mean_score);
        assert_eq!(result.best, result.scores[0].point);
    }

    #[test]
    fn test_search_is_deterministic() {
        let grid = GridParams {
            subsample: vec![0.7],
            colsample: vec![0.5],
            ..tiny_grid()
        };
        let a = GridSearch::new(grid.clone(), BoostingParams::default(), 9).run(&step_data()).unwrap();
        let b = GridSearch::new(grid, BoostingParams::default(), 9).run(&step_data()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_too_many_folds() {
        let grid = GridParams {
            folds: 100,
            ..tiny_grid()
        };
        assert!(GridSearch::new(grid, BoostingParams::default(), 1).run(&step_data()).is_err());
    }
}
