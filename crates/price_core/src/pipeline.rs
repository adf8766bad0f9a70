//! Preprocessing state and the single-row inference adapter

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::artifact::{ModelArtifact, SchemaTag};
use crate::encoding::{resolve_property_type, FeatureEncoder, PostcodeEncoding, UnknownTypePolicy};
use crate::errors::{PricingError, Result};
use crate::listing::{Listing, NumericColumn, PropertyType};
use crate::scaler::{StandardScaler, TargetScaler, TargetTransform};

/// Everything fitted on the training split before the model sees a row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub encoder: FeatureEncoder,
    /// Applied to non-indicator features and to the target
    pub transform: TargetTransform,
    pub scaler: StandardScaler,
    pub target_scaler: TargetScaler,
}

impl Preprocessor {
    pub fn fit(
        numeric: &[NumericColumn],
        postcode_encoding: PostcodeEncoding,
        transform: TargetTransform,
        train: &[Listing],
    ) -> Result<Self> {
        let encoder = FeatureEncoder::fit(numeric, postcode_encoding, train)?;
        let rows: Vec<Vec<f64>> = train
            .iter()
            .map(|l| transformed(&encoder, transform, encoder.encode_listing(l)))
            .collect();
        let targets: Vec<f64> = train.iter().map(|l| transform.apply(l.price)).collect();

        Ok(Self {
            scaler: StandardScaler::fit(&rows)?,
            target_scaler: TargetScaler::fit(&targets)?,
            encoder,
            transform,
        })
    }

    pub fn columns(&self) -> &[String] {
        self.encoder.columns()
    }

    /// Encoded row in column order, before any transform or scaling
    pub fn encoded_row(&self, rooms: u32, property_type: PropertyType, postcode: u32, distance: f64) -> Vec<f64> {
        self.encoder.encode(rooms, property_type, postcode, distance)
    }

    /// Model input for one set of listing fields
    pub fn features(&self, rooms: u32, property_type: PropertyType, postcode: u32, distance: f64) -> Result<Vec<f64>> {
        let row = transformed(
            &self.encoder,
            self.transform,
            self.encoded_row(rooms, property_type, postcode, distance),
        );
        self.scaler.transform(&row)
    }

    pub fn listing_features(&self, listing: &Listing) -> Result<Vec<f64>> {
        self.features(
            listing.rooms,
            listing.property_type,
            listing.postcode,
            listing.distance,
        )
    }

    pub fn scaled_target(&self, price: f64) -> f64 {
        self.target_scaler.transform(self.transform.apply(price))
    }

    pub fn price_from_scaled(&self, scaled: f64) -> f64 {
        self.transform.invert(self.target_scaler.inverse_transform(scaled))
    }
}

fn transformed(encoder: &FeatureEncoder, transform: TargetTransform, mut row: Vec<f64>) -> Vec<f64> {
    if transform != TargetTransform::None {
        for (idx, value) in row.iter_mut().enumerate() {
            if !encoder.is_indicator(idx) {
                *value = transform.apply(*value);
            }
        }
    }
    row
}

/// Turns request fields into a price using a loaded artifact
#[derive(Debug, Clone)]
pub struct Predictor {
    artifact: ModelArtifact,
    policy: UnknownTypePolicy,
}

impl Predictor {
    pub fn new(artifact: ModelArtifact, policy: UnknownTypePolicy) -> Self {
        Self { artifact, policy }
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn schema(&self) -> &SchemaTag {
        &self.artifact.schema
    }

    pub fn policy(&self) -> UnknownTypePolicy {
        self.policy
    }

    /// Feature column names the model was trained on
    pub fn columns(&self) -> &[String] {
        self.artifact.preprocessor.columns()
    }

    /// Encoded row for a request, aligned with [`Predictor::columns`]
    pub fn feature_row(&self, rooms: u32, type_code: &str, postcode: u32, distance: f64) -> Result<Vec<f64>> {
        let property_type = resolve_property_type(type_code, self.policy)?;
        Ok(self
            .artifact
            .preprocessor
            .encoded_row(rooms, property_type, postcode, distance))
    }

    /// Predicted price in original units for one request
    pub fn predict_price(&self, rooms: u32, type_code: &str, postcode: u32, distance: f64) -> Result<f64> {
        let property_type = resolve_property_type(type_code, self.policy)?;
        self.predict(rooms, property_type, postcode, distance)
    }

    pub fn predict(&self, rooms: u32, property_type: PropertyType, postcode: u32, distance: f64) -> Result<f64> {
        if !distance.is_finite() || distance < 0.0 {
            return Err(PricingError::InvalidParameters(format!(
                "distance must be a non-negative number, got {distance}"
            )));
        }

        let preprocessor = &self.artifact.preprocessor;
        let features = preprocessor.features(rooms, property_type, postcode, distance)?;
        let scaled = self.artifact.model.predict(&features)?;
        let price = preprocessor.price_from_scaled(scaled);
        debug!(
            rooms,
            property_type = %property_type,
            postcode,
            distance,
            price,
            "Predicted price"
        );
        Ok(price)
    }

    pub fn predict_listing(&self, listing: &Listing) -> Result<f64> {
        self.predict(
            listing.rooms,
            listing.property_type,
            listing.postcode,
            listing.distance,
        )
    }

    pub fn predict_listings(&self, listings: &[Listing]) -> Result<Vec<f64>> {
        listings.iter().map(|l| self.predict_listing(l)).collect()
    }
}
