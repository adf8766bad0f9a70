//! End-to-end training: load, clean, split, fit preprocessing, train,
//! evaluate and persist.

use chrono::Utc;
use realty_price_core::artifact::{self, ModelArtifact, PriceModel, SchemaTag, TrainingSummary};
use realty_price_core::cleaner::{remove_price_outliers, CleanReport};
use realty_price_core::config::{AppConfig, ModelKind};
use realty_price_core::dataset::{Dataset, LoadOptions, LoadReport};
use realty_price_core::listing::{Listing, NumericColumn};
use realty_price_core::metrics::RegressionMetrics;
use realty_price_core::pipeline::{Predictor, Preprocessor};
use realty_price_core::split::{select, train_test_split};
use serde::Serialize;
use tracing::{info, warn};

use crate::dataset::FixedPointSet;
use crate::errors::{Result, TrainerError};
use crate::grid::{GridResult, GridSearch};
use crate::mlp::{MlpTrainer, TrainingHistory};
use crate::trainer::{GbdtConfig, GbdtTrainer};

/// Cleaned listings partitioned for training
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub numeric: Vec<NumericColumn>,
    pub load: LoadReport,
    pub clean: CleanReport,
    pub train: Vec<Listing>,
    pub test: Vec<Listing>,
}

/// Scaled training matrix for the model
struct TrainingMatrix {
    rows: Vec<Vec<f64>>,
    targets: Vec<f64>,
}

/// Everything a training run produced
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub artifact: ModelArtifact,
    pub grid: Option<GridResult>,
    pub history: Option<TrainingHistory>,
}

/// Predictor ready to serve, and where it came from
#[derive(Debug, Clone)]
pub struct Bootstrap {
    pub predictor: Predictor,
    pub digest: String,
    /// True when no usable artifact was on disk and a model was trained
    pub trained: bool,
}

pub fn load_dataset(config: &AppConfig) -> Result<Dataset> {
    let options = LoadOptions {
        impute_missing_price: config.data.impute_missing_price,
    };
    Ok(Dataset::load(&config.data.csv_path, options)?)
}

/// Outlier removal followed by the seeded train/test split
pub fn prepare(config: &AppConfig, dataset: Dataset) -> Result<PreparedData> {
    let Dataset {
        listings,
        numeric_columns,
        report,
    } = dataset;

    let (cleaned, clean) = remove_price_outliers(listings)?;
    let split = train_test_split(cleaned.len(), config.model.test_fraction, config.model.seed)?;
    if split.train.is_empty() {
        return Err(TrainerError::Dataset("no rows left after cleaning".to_string()));
    }

    info!(
        "Split {} rows into {} train / {} test (seed {})",
        cleaned.len(),
        split.train.len(),
        split.test.len(),
        config.model.seed
    );
    Ok(PreparedData {
        numeric: numeric_columns,
        load: report,
        clean,
        train: select(&cleaned, &split.train),
        test: select(&cleaned, &split.test),
    })
}

fn fit_preprocessor(config: &AppConfig, data: &PreparedData) -> Result<Preprocessor> {
    Ok(Preprocessor::fit(
        &data.numeric,
        config.model.postcode_encoding,
        config.model.target_transform,
        &data.train,
    )?)
}

fn training_matrix(preprocessor: &Preprocessor, listings: &[Listing]) -> Result<TrainingMatrix> {
    let rows = listings
        .iter()
        .map(|l| preprocessor.listing_features(l))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let targets = listings.iter().map(|l| preprocessor.scaled_target(l.price)).collect();
    Ok(TrainingMatrix { rows, targets })
}

/// Grid search only, on the training split of `dataset`
pub fn tune(config: &AppConfig, dataset: Dataset) -> Result<GridResult> {
    let data = prepare(config, dataset)?;
    let preprocessor = fit_preprocessor(config, &data)?;
    let matrix = training_matrix(&preprocessor, &data.train)?;
    let fixed = FixedPointSet::from_scaled(&matrix.rows, &matrix.targets)
        .map_err(|e| TrainerError::Dataset(e.to_string()))?;
    run_grid(config, &fixed)
}

fn run_grid(config: &AppConfig, fixed: &FixedPointSet) -> Result<GridResult> {
    GridSearch::new(config.grid.clone(), config.boosting.clone(), config.model.seed)
        .run(fixed)
        .map_err(|e| TrainerError::Training(e.to_string()))
}

/// Train the configured model kind and package it as an artifact
pub fn train_pipeline(config: &AppConfig, dataset: Dataset) -> Result<TrainOutcome> {
    let data = prepare(config, dataset)?;
    let preprocessor = fit_preprocessor(config, &data)?;
    let matrix = training_matrix(&preprocessor, &data.train)?;
    let seed = config.model.seed;

    info!(
        "Training {} on {} rows x {} features",
        config.model.kind,
        matrix.rows.len(),
        preprocessor.columns().len()
    );

    let (model, hyperparameters, grid, history) = match config.model.kind {
        ModelKind::NeuralNet => {
            let (net, history) = MlpTrainer::new(config.network.clone(), seed)
                .train(&matrix.rows, &matrix.targets)
                .map_err(|e| TrainerError::Training(e.to_string()))?;
            (
                PriceModel::NeuralNet(net),
                to_value(&config.network)?,
                None,
                Some(history),
            )
        }
        ModelKind::GradientBoosting => {
            let fixed = FixedPointSet::from_scaled(&matrix.rows, &matrix.targets)
                .map_err(|e| TrainerError::Dataset(e.to_string()))?;
            let (gbdt_config, grid) = if config.boosting.tune {
                let result = run_grid(config, &fixed)?;
                (result.best.config(&config.boosting, seed), Some(result))
            } else {
                (GbdtConfig::from_params(&config.boosting, seed), None)
            };
            let model = GbdtTrainer::new(gbdt_config.clone())
                .train(&fixed)
                .map_err(|e| TrainerError::Training(e.to_string()))?;
            (
                PriceModel::GradientBoosting(model),
                to_value(&gbdt_config)?,
                grid,
                None,
            )
        }
    };

    let schema = SchemaTag::expected(&data.numeric, &config.model);
    let mut artifact = ModelArtifact {
        schema,
        preprocessor,
        model,
        summary: TrainingSummary {
            trained_at: Utc::now(),
            seed,
            train_rows: data.train.len(),
            test_rows: data.test.len(),
            load: data.load.clone(),
            clean: data.clean.clone(),
            metrics: None,
            hyperparameters,
        },
    };
    artifact.validate()?;

    let predictor = Predictor::new(artifact.clone(), config.model.unknown_type_policy);
    artifact.summary.metrics = evaluate(&predictor, &data.test)?;

    Ok(TrainOutcome {
        artifact,
        grid,
        history,
    })
}

/// Held-out scores in original price units; `None` without test rows
pub fn evaluate(predictor: &Predictor, test: &[Listing]) -> Result<Option<RegressionMetrics>> {
    if test.is_empty() {
        warn!("No held-out rows, skipping evaluation");
        return Ok(None);
    }
    let predicted = predictor.predict_listings(test)?;
    let actual: Vec<f64> = test.iter().map(|l| l.price).collect();
    let metrics = RegressionMetrics::compute(&actual, &predicted)?;
    info!(
        "Test metrics on {} rows: rmse {:.2}, mae {:.2}, r2 {:.4}",
        metrics.count, metrics.rmse, metrics.mae, metrics.r2
    );
    Ok(Some(metrics))
}

/// Load the artifact on disk if it is usable, otherwise train and save one
///
/// The dataset is always read first so that a missing file or column fails
/// before any model is touched. `force` skips loading.
pub fn load_or_train(config: &AppConfig, force: bool) -> Result<Bootstrap> {
    let dataset = load_dataset(config)?;
    let expected = SchemaTag::expected(&dataset.numeric_columns, &config.model);
    let path = &config.model.artifact_path;
    let policy = config.model.unknown_type_policy;

    if !force {
        if let Some(loaded) = artifact::load(path, &expected)? {
            return Ok(Bootstrap {
                predictor: Predictor::new(loaded.artifact, policy),
                digest: loaded.digest,
                trained: false,
            });
        }
        info!("No model at {}, training a new one", path.display());
    }

    let outcome = train_pipeline(config, dataset)?;
    let digest = artifact::save(&outcome.artifact, path)?;
    Ok(Bootstrap {
        predictor: Predictor::new(outcome.artifact, policy),
        digest,
        trained: true,
    })
}

fn to_value<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| TrainerError::Training(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use realty_price_core::listing::PropertyType;

    fn listings(n: usize) -> Vec<Listing> {
        (0..n)
            .map(|i| {
                let rooms = 1 + (i % 5) as u32;
                let ty = PropertyType::ALL[i % 3];
                let distance = 1.0 + (i % 11) as f64;
                let price = 300_000.0 + 150_000.0 * rooms as f64 - 10_000.0 * distance;
                Listing::new(rooms, ty, 3000 + (i % 4) as u32, distance, price)
            })
            .collect()
    }

    fn dataset(n: usize) -> Dataset {
        Dataset {
            listings: listings(n),
            numeric_columns: vec![NumericColumn::Rooms, NumericColumn::Distance, NumericColumn::Postcode],
            report: LoadReport {
                total_rows: n,
                ..LoadReport::default()
            },
        }
    }

    fn boosting_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.model.kind = ModelKind::GradientBoosting;
        config.boosting.tune = false;
        config.boosting.n_trees = 20;
        config
    }

    #[test]
    fn test_prepare_splits_with_seed() {
        let config = AppConfig::default();
        let a = prepare(&config, dataset(50)).unwrap();
        let b = prepare(&config, dataset(50)).unwrap();
        assert_eq!(a.test.len(), 10);
        assert_eq!(a.train.len(), 40);
        assert_eq!(a.test, b.test);
    }

    #[test]
    fn test_boosted_pipeline_records_metrics() {
        let outcome = train_pipeline(&boosting_config(), dataset(60)).unwrap();
        let artifact = &outcome.artifact;

        assert_eq!(artifact.schema.model_kind, ModelKind::GradientBoosting);
        assert_eq!(artifact.schema.columns, ["Rooms", "Distance", "Postcode", "Type_t", "Type_u"]);
        assert_eq!(artifact.summary.train_rows + artifact.summary.test_rows, 60);
        assert!(artifact.summary.metrics.as_ref().unwrap().r2 > 0.5);
        assert_eq!(artifact.summary.hyperparameters["n_trees"], 20);
        assert!(outcome.grid.is_none());
        assert!(outcome.history.is_none());
    }

    #[test]
    fn test_tuned_pipeline_uses_best_point() {
        let mut config = boosting_config();
        config.boosting.tune = true;
        config.grid.n_trees = vec![5, 15];
        config.grid.max_depth = vec![2];
        config.grid.learning_rate = vec![0.3];
        config.grid.subsample = vec![1.0];
        config.grid.colsample = vec![1.0];
        config.grid.folds = 3;

        let outcome = train_pipeline(&config, dataset(60)).unwrap();
        let grid = outcome.grid.unwrap();
        assert_eq!(grid.scores.len(), 2);
        assert_eq!(
            outcome.artifact.summary.hyperparameters["n_trees"],
            grid.best.n_trees
        );
    }

    #[test]
    fn test_network_pipeline_keeps_history() {
        let mut config = AppConfig::default();
        config.network.hidden = vec![8];
        config.network.epochs = 3;

        let outcome = train_pipeline(&config, dataset(40)).unwrap();
        assert_eq!(outcome.history.unwrap().train_loss.len(), 3);
        assert_eq!(outcome.artifact.model.kind(), ModelKind::NeuralNet);
        assert!(outcome.artifact.summary.metrics.is_some());
    }

    #[test]
    fn test_zero_test_fraction_skips_metrics() {
        let mut config = boosting_config();
        config.model.test_fraction = 0.0;
        let outcome = train_pipeline(&config, dataset(30)).unwrap();
        assert_eq!(outcome.artifact.summary.test_rows, 0);
        assert!(outcome.artifact.summary.metrics.is_none());
    }
}
