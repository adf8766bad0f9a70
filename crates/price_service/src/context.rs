//! Shared, read-only state handed to every request handler

use std::path::Path;
use std::sync::Arc;

use realty_price_core::artifact::SchemaTag;
use realty_price_core::config::AppConfig;
use realty_price_core::pipeline::Predictor;
use realty_price_trainer::pipeline::load_or_train;
use realty_price_trainer::TrainerError;
use tracing::info;

use crate::errors::ServiceError;

/// Loaded model plus what the handlers need to answer requests
#[derive(Debug)]
pub struct PricingContext {
    pub config: AppConfig,
    pub predictor: Predictor,
    pub digest: String,
}

pub type SharedContext = Arc<PricingContext>;

impl PricingContext {
    pub fn new(config: AppConfig, predictor: Predictor, digest: String) -> Self {
        Self {
            config,
            predictor,
            digest,
        }
    }

    /// Load the saved model, or train and save one, off the async runtime
    pub async fn bootstrap(config: AppConfig) -> Result<SharedContext, ServiceError> {
        config.validate().map_err(TrainerError::from)?;
        let worker_config = config.clone();
        let bootstrap = tokio::task::spawn_blocking(move || load_or_train(&worker_config, false)).await??;

        info!(
            "Serving {} model ({}, {} columns, blake3 {})",
            bootstrap.predictor.schema().model_kind,
            if bootstrap.trained { "freshly trained" } else { "loaded" },
            bootstrap.predictor.columns().len(),
            bootstrap.digest
        );
        Ok(Arc::new(Self::new(config, bootstrap.predictor, bootstrap.digest)))
    }

    pub fn dataset_path(&self) -> &Path {
        &self.config.data.csv_path
    }

    pub fn schema(&self) -> &SchemaTag {
        self.predictor.schema()
    }
}
