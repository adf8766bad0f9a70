//! Real-estate price prediction core
//!
//! Loads listing data, removes price outliers, encodes and scales features,
//! and runs fitted regressors on single requests.
//!
//! Modules:
//! - `dataset`: CSV loading and raw record passthrough
//! - `cleaner`: IQR outlier filter on price
//! - `encoding`: property-type indicators and postcode encoding
//! - `scaler`: standard scaling and the optional log transform
//! - `split`: seeded train/test split and k-fold indices
//! - `nn`: feed-forward regressor (inference side)
//! - `gbdt`: fixed-point boosted trees (inference side)
//! - `knn`: price band classifier
//! - `metrics`: regression and classification scores
//! - `pipeline`: preprocessing state and the inference adapter
//! - `artifact`: model persistence with schema tag and digest
//! - `config`: layered application configuration

pub mod artifact;
pub mod cleaner;
pub mod config;
pub mod dataset;
pub mod encoding;
pub mod errors;
pub mod gbdt;
pub mod knn;
pub mod listing;
pub mod metrics;
pub mod nn;
pub mod pipeline;
pub mod scaler;
pub mod serde_canon;
pub mod split;

pub use artifact::{LoadedArtifact, ModelArtifact, PriceModel, SchemaTag, TrainingSummary};
pub use cleaner::{remove_price_outliers, CleanReport, IQR_MULTIPLIER};
pub use config::{AppConfig, ModelKind};
pub use dataset::{read_raw_records, Dataset, LoadOptions, LoadReport, RawRecord};
pub use encoding::{FeatureEncoder, PostcodeEncoding, UnknownTypePolicy};
pub use errors::{PricingError, Result};
pub use knn::{KnnClassifier, PriceCategory};
pub use listing::{Listing, NumericColumn, PropertyType};
pub use metrics::{ClassificationReport, RegressionMetrics};
pub use pipeline::{Predictor, Preprocessor};
pub use scaler::{StandardScaler, TargetScaler, TargetTransform};

/// Crate version string for health reports
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
