//! Layered application configuration
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML
//! file, then environment variables prefixed `REALTY_` with `__` between
//! nested keys (`REALTY_SERVER__PORT=8000`).

use std::fmt;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::encoding::{PostcodeEncoding, UnknownTypePolicy};
use crate::errors::{PricingError, Result};
use crate::scaler::TargetTransform;

/// Config file picked up when no path is given
pub const DEFAULT_CONFIG_PATH: &str = "config/realty.toml";
/// Environment variable prefix
pub const ENV_PREFIX: &str = "REALTY";

/// Which regressor backs the predictor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    NeuralNet,
    GradientBoosting,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NeuralNet => f.write_str("neural_net"),
            Self::GradientBoosting => f.write_str("gradient_boosting"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub model: ModelConfig,
    pub network: NetworkParams,
    pub boosting: BoostingParams,
    pub grid: GridParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub csv_path: PathBuf,
    pub impute_missing_price: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("data.csv"),
            impute_missing_price: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub kind: ModelKind,
    pub artifact_path: PathBuf,
    pub seed: u64,
    pub test_fraction: f64,
    pub postcode_encoding: PostcodeEncoding,
    pub target_transform: TargetTransform,
    pub unknown_type_policy: UnknownTypePolicy,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::NeuralNet,
            artifact_path: PathBuf::from("models/price_model.json"),
            seed: 42,
            test_fraction: 0.2,
            postcode_encoding: PostcodeEncoding::Raw,
            target_transform: TargetTransform::None,
            unknown_type_policy: UnknownTypePolicy::Reference,
        }
    }
}

/// Feed-forward network hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkParams {
    pub hidden: Vec<usize>,
    pub dropout: f64,
    pub batch_norm_momentum: f64,
    pub batch_norm_epsilon: f64,
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub adam_epsilon: f64,
    pub epochs: usize,
    pub batch_size: usize,
    /// Trailing share of training rows held out for validation loss
    pub validation_split: f64,
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            hidden: crate::nn::DEFAULT_HIDDEN.to_vec(),
            dropout: 0.1,
            batch_norm_momentum: 0.99,
            batch_norm_epsilon: 1e-3,
            learning_rate: 1e-4,
            beta1: 0.9,
            beta2: 0.999,
            adam_epsilon: 1e-7,
            epochs: 200,
            batch_size: 32,
            validation_split: 0.2,
        }
    }
}

/// Boosted-tree hyperparameters, used as-is when tuning is off
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub subsample: f64,
    pub colsample: f64,
    pub min_samples_leaf: usize,
    /// Threshold quantization step in fixed-point units
    pub quant_step: i64,
    /// Run the grid search before the final fit
    pub tune: bool,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 3,
            learning_rate: 0.1,
            subsample: 1.0,
            colsample: 1.0,
            min_samples_leaf: 1,
            quant_step: 10_000,
            tune: true,
        }
    }
}

/// Exhaustive search grid for the boosted trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridParams {
    pub n_trees: Vec<usize>,
    pub max_depth: Vec<usize>,
    pub learning_rate: Vec<f64>,
    pub subsample: Vec<f64>,
    pub colsample: Vec<f64>,
    pub folds: usize,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            n_trees: vec![100, 200],
            max_depth: vec![3, 5, 7],
            learning_rate: vec![0.01, 0.05, 0.1],
            subsample: vec![0.7, 0.8, 1.0],
            colsample: vec![0.7, 0.8, 1.0],
            folds: 5,
        }
    }
}

impl GridParams {
    pub fn size(&self) -> usize {
        self.n_trees.len()
            * self.max_depth.len()
            * self.learning_rate.len()
            * self.subsample.len()
            * self.colsample.len()
    }
}

/// Require `value` in `(0, 1]`
fn unit_fraction(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(PricingError::Config(format!("{name} out of range: {value}")))
    }
}

impl AppConfig {
    /// Load defaults, then `path` (or the default file if present), then env
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let resolved = match path {
            Some(path) if !path.exists() => {
                return Err(PricingError::Config(format!(
                    "configuration file {} not found",
                    path.display()
                )))
            }
            Some(path) => Some(path.to_path_buf()),
            None => Some(PathBuf::from(DEFAULT_CONFIG_PATH)).filter(|p| p.exists()),
        };

        let mut builder = Config::builder();
        if let Some(path) = &resolved {
            debug!("Reading configuration from {}", path.display());
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("server.allowed_origins"),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.allowed_origins.iter().any(|o| o.trim() == "*") {
            return Err(PricingError::Config(
                "server.allowed_origins cannot contain \"*\" when credentials are allowed; list explicit origins"
                    .to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.model.test_fraction) {
            return Err(PricingError::Config(format!(
                "model.test_fraction must be in [0, 1), got {}",
                self.model.test_fraction
            )));
        }

        let net = &self.network;
        if net.hidden.is_empty() || net.hidden.contains(&0) {
            return Err(PricingError::Config(
                "network.hidden needs at least one positive width".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&net.dropout) {
            return Err(PricingError::Config(format!(
                "network.dropout must be in [0, 1), got {}",
                net.dropout
            )));
        }
        if !(0.0..1.0).contains(&net.validation_split) {
            return Err(PricingError::Config(format!(
                "network.validation_split must be in [0, 1), got {}",
                net.validation_split
            )));
        }
        if net.epochs == 0 || net.batch_size == 0 || !(net.learning_rate > 0.0) {
            return Err(PricingError::Config(
                "network epochs, batch_size and learning_rate must be positive".to_string(),
            ));
        }

        let boost = &self.boosting;
        if boost.n_trees == 0 || boost.max_depth == 0 || boost.quant_step <= 0 {
            return Err(PricingError::Config(
                "boosting n_trees, max_depth and quant_step must be positive".to_string(),
            ));
        }
        unit_fraction("boosting.learning_rate", boost.learning_rate)?;
        unit_fraction("boosting.subsample", boost.subsample)?;
        unit_fraction("boosting.colsample", boost.colsample)?;

        let grid = &self.grid;
        if grid.size() == 0 {
            return Err(PricingError::Config("grid has an empty axis".to_string()));
        }
        if grid.folds < 2 {
            return Err(PricingError::Config("grid.folds must be at least 2".to_string()));
        }
        for &v in grid.subsample.iter().chain(&grid.colsample).chain(&grid.learning_rate) {
            unit_fraction("grid value", v)?;
        }
        if grid.n_trees.contains(&0) || grid.max_depth.contains(&0) {
            return Err(PricingError::Config(
                "grid tree counts and depths must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
