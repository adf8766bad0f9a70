//! Persisted model artifact
//!
//! One artifact holds the fitted preprocessing state, the regressor and a
//! schema tag. It is written as canonical JSON next to a `<path>.hash`
//! sidecar carrying the BLAKE3 digest of the file bytes.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cleaner::CleanReport;
use crate::config::{ModelConfig, ModelKind};
use crate::dataset::LoadReport;
use crate::encoding::{layout, PostcodeEncoding};
use crate::errors::{PricingError, Result};
use crate::gbdt;
use crate::listing::NumericColumn;
use crate::metrics::RegressionMetrics;
use crate::nn::MlpRegressor;
use crate::pipeline::Preprocessor;
use crate::scaler::TargetTransform;
use crate::serde_canon::{digest_hex, to_canonical_json};

/// Bumped whenever the artifact layout changes
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// What a persisted model was trained to consume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaTag {
    pub format_version: u32,
    pub columns: Vec<String>,
    pub model_kind: ModelKind,
    pub target_transform: TargetTransform,
    pub postcode_encoding: PostcodeEncoding,
}

impl SchemaTag {
    /// Schema a model trained now, on this header and config, would carry
    pub fn expected(numeric: &[NumericColumn], model: &ModelConfig) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            columns: layout(numeric, model.postcode_encoding),
            model_kind: model.kind,
            target_transform: model.target_transform,
            postcode_encoding: model.postcode_encoding,
        }
    }

    pub fn ensure_matches(&self, expected: &SchemaTag) -> Result<()> {
        if self == expected {
            Ok(())
        } else {
            Err(PricingError::SchemaMismatch {
                expected: expected.to_string(),
                found: self.to_string(),
            })
        }
    }
}

impl fmt::Display for SchemaTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "v{} {} [{}] postcode={} target={}",
            self.format_version,
            self.model_kind,
            self.columns.join(","),
            self.postcode_encoding,
            self.target_transform
        )
    }
}

/// Fitted regressor operating on scaled features and target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "snake_case")]
pub enum PriceModel {
    NeuralNet(MlpRegressor),
    GradientBoosting(gbdt::Model),
}

impl PriceModel {
    pub fn kind(&self) -> ModelKind {
        match self {
            Self::NeuralNet(_) => ModelKind::NeuralNet,
            Self::GradientBoosting(_) => ModelKind::GradientBoosting,
        }
    }

    /// Scaled prediction for one scaled row
    pub fn predict(&self, row: &[f64]) -> Result<f64> {
        match self {
            Self::NeuralNet(net) => net.predict(row),
            Self::GradientBoosting(model) => model.predict(row),
        }
    }

    pub fn input_width(&self) -> usize {
        match self {
            Self::NeuralNet(net) => net.input_width(),
            Self::GradientBoosting(model) => model.feature_count,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::NeuralNet(net) => net.validate(),
            Self::GradientBoosting(model) => model.validate(),
        }
    }
}

/// How and on what the model was trained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub trained_at: DateTime<Utc>,
    pub seed: u64,
    pub train_rows: usize,
    pub test_rows: usize,
    pub load: LoadReport,
    pub clean: CleanReport,
    /// Held-out scores; absent when trained without a test split
    pub metrics: Option<RegressionMetrics>,
    /// Hyperparameters actually used for the final fit
    pub hyperparameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub schema: SchemaTag,
    pub preprocessor: Preprocessor,
    pub model: PriceModel,
    pub summary: TrainingSummary,
}

impl ModelArtifact {
    /// Internal consistency between tag, preprocessing and model
    pub fn validate(&self) -> Result<()> {
        if self.schema.model_kind != self.model.kind() {
            return Err(PricingError::ArtifactCorrupted(format!(
                "schema says {} but model is {}",
                self.schema.model_kind,
                self.model.kind()
            )));
        }
        if self.schema.columns != self.preprocessor.columns() {
            return Err(PricingError::ArtifactCorrupted(
                "schema columns differ from fitted encoder columns".to_string(),
            ));
        }
        let width = self.schema.columns.len();
        if self.preprocessor.scaler.width() != width || self.model.input_width() != width {
            return Err(PricingError::ShapeMismatch {
                expected: width,
                actual: self.model.input_width(),
            });
        }
        let targets = [self.preprocessor.target_scaler.mean, self.preprocessor.target_scaler.std];
        if self
            .preprocessor
            .scaler
            .mean
            .iter()
            .chain(&self.preprocessor.scaler.std)
            .chain(&targets)
            .any(|v| !v.is_finite())
        {
            return Err(PricingError::ArtifactCorrupted(
                "scaler statistics are not finite".to_string(),
            ));
        }
        self.model.validate()
    }
}

/// Artifact read back from disk with the digest of its bytes
#[derive(Debug, Clone)]
pub struct LoadedArtifact {
    pub artifact: ModelArtifact,
    pub digest: String,
}

/// `<path>.hash`
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".hash");
    PathBuf::from(name)
}

/// Write the artifact and its digest sidecar; returns the digest
pub fn save(artifact: &ModelArtifact, path: &Path) -> Result<String> {
    artifact.validate()?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let json = to_canonical_json(artifact)?;
    let digest = digest_hex(json.as_bytes());
    fs::write(path, &json)?;
    fs::write(sidecar_path(path), &digest)?;

    info!(
        "Saved {} model to {} (blake3 {})",
        artifact.schema.model_kind,
        path.display(),
        digest
    );
    Ok(digest)
}

/// Read the artifact at `path` if there is one
///
/// A present sidecar must match the file bytes, and the stored schema tag
/// must equal `expected`.
pub fn load(path: &Path, expected: &SchemaTag) -> Result<Option<LoadedArtifact>> {
    if !path.exists() {
        return Ok(None);
    }

    let bytes = fs::read(path)?;
    let digest = digest_hex(&bytes);
    match fs::read_to_string(sidecar_path(path)) {
        Ok(recorded) if recorded.trim() == digest => {}
        Ok(recorded) => {
            return Err(PricingError::ArtifactCorrupted(format!(
                "digest {} does not match recorded {}",
                digest,
                recorded.trim()
            )))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                "No digest sidecar for {}, loading without integrity check",
                path.display()
            );
        }
        Err(e) => return Err(e.into()),
    }

    let artifact: ModelArtifact = serde_json::from_slice(&bytes)
        .map_err(|e| PricingError::ArtifactCorrupted(format!("unreadable artifact: {e}")))?;
    artifact.schema.ensure_matches(expected)?;
    artifact.validate()?;

    info!(
        "Loaded {} model from {} (blake3 {})",
        artifact.schema.model_kind,
        path.display(),
        digest
    );
    Ok(Some(LoadedArtifact { artifact, digest }))
}
