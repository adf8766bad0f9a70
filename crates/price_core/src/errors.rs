//! Error types for the pricing core

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur anywhere in the prediction pipeline
#[derive(Error, Debug)]
pub enum PricingError {
    /// The listing CSV does not exist at the configured path
    #[error("Dataset not found at {0}")]
    DatasetNotFound(PathBuf),

    /// A required column is absent from the CSV header
    #[error("Required column '{0}' not found in dataset")]
    MissingColumn(String),

    /// CSV decoding failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// No usable rows remain
    #[error("Dataset is empty: {0}")]
    EmptyDataset(String),

    /// Feature width does not match what a fitted component expects
    #[error("Shape mismatch: expected {expected} features, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Property type code outside `h`/`t`/`u` under the reject policy
    #[error("Unknown property type '{0}' (expected one of h, t, u)")]
    UnknownPropertyType(String),

    /// Persisted model was produced for a different feature layout
    #[error("Model schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    /// Persisted model failed its digest check
    #[error("Model artifact corrupted: {0}")]
    ArtifactCorrupted(String),

    /// Invalid hyperparameters or pipeline settings
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Training produced an unusable model
    #[error("Training failed: {0}")]
    Training(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<config::ConfigError> for PricingError {
    fn from(err: config::ConfigError) -> Self {
        PricingError::Config(err.to_string())
    }
}

/// Result type for pricing core operations
pub type Result<T> = std::result::Result<T, PricingError>;
