//! Feature encoding: property-type indicators and postcode handling
//!
//! Every row, whether it comes from the training set or from a single
//! request, is first turned into named values and then reindexed onto the
//! fitted column list. Columns a row does not mention are zero-filled, so
//! the feature order seen at inference is always the training order.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{PricingError, Result};
use crate::listing::{Listing, NumericColumn, PropertyType};

/// Indicator columns, one per non-reference property type
pub const TYPE_INDICATORS: [(&str, PropertyType); 2] = [
    ("Type_t", PropertyType::Townhouse),
    ("Type_u", PropertyType::Unit),
];

/// Column name used when the postcode is replaced by its mean price
pub const POSTCODE_ENCODED: &str = "Postcode_encoded";

/// How the postcode enters the feature vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostcodeEncoding {
    /// Postcode used as a plain number
    #[default]
    Raw,
    /// Postcode replaced by the mean training price for that postcode
    TargetMean,
}

impl fmt::Display for PostcodeEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => f.write_str("raw"),
            Self::TargetMean => f.write_str("target_mean"),
        }
    }
}

/// What to do with a property-type code outside `h`/`t`/`u`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownTypePolicy {
    /// Treat it as the reference category (house) and log a warning
    #[default]
    Reference,
    /// Refuse the request
    Reject,
}

/// Map a raw type code to a category under the given policy
pub fn resolve_property_type(code: &str, policy: UnknownTypePolicy) -> Result<PropertyType> {
    if let Some(ty) = PropertyType::from_code(code) {
        return Ok(ty);
    }
    match policy {
        UnknownTypePolicy::Reference => {
            warn!(
                "Unknown property type '{}', treating as '{}'",
                code,
                PropertyType::REFERENCE
            );
            Ok(PropertyType::REFERENCE)
        }
        UnknownTypePolicy::Reject => Err(PricingError::UnknownPropertyType(code.to_string())),
    }
}

/// Per-postcode mean price fitted on the training split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostcodeMeans {
    pub means: BTreeMap<u32, f64>,
    /// Used for postcodes never seen during fit
    pub global_mean: f64,
}

impl PostcodeMeans {
    pub fn fit(listings: &[Listing]) -> Result<Self> {
        if listings.is_empty() {
            return Err(PricingError::EmptyDataset(
                "cannot fit postcode means without rows".to_string(),
            ));
        }

        let mut sums: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
        let mut total = 0.0;
        for listing in listings {
            let entry = sums.entry(listing.postcode).or_insert((0.0, 0));
            entry.0 += listing.price;
            entry.1 += 1;
            total += listing.price;
        }

        Ok(Self {
            means: sums
                .into_iter()
                .map(|(postcode, (sum, count))| (postcode, sum / count as f64))
                .collect(),
            global_mean: total / listings.len() as f64,
        })
    }

    pub fn encode(&self, postcode: u32) -> f64 {
        self.means.get(&postcode).copied().unwrap_or(self.global_mean)
    }
}

/// Fitted mapping from listing fields to an ordered feature row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    numeric: Vec<NumericColumn>,
    postcode_encoding: PostcodeEncoding,
    postcode_means: Option<PostcodeMeans>,
    columns: Vec<String>,
}

impl FeatureEncoder {
    /// Fit the encoder on the training split
    ///
    /// `numeric` gives the numeric columns in CSV header order.
    pub fn fit(
        numeric: &[NumericColumn],
        postcode_encoding: PostcodeEncoding,
        train: &[Listing],
    ) -> Result<Self> {
        let postcode_means = match postcode_encoding {
            PostcodeEncoding::Raw => None,
            PostcodeEncoding::TargetMean => Some(PostcodeMeans::fit(train)?),
        };

        Ok(Self {
            numeric: numeric.to_vec(),
            postcode_encoding,
            postcode_means,
            columns: layout(numeric, postcode_encoding),
        })
    }

    /// Feature column names in model input order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn postcode_encoding(&self) -> PostcodeEncoding {
        self.postcode_encoding
    }

    /// Named values for one row, before reindexing
    ///
    /// Only the indicator of the row's own category is emitted; the
    /// reference category emits none.
    pub fn named_values(
        &self,
        rooms: u32,
        property_type: PropertyType,
        postcode: u32,
        distance: f64,
    ) -> Vec<(&'static str, f64)> {
        let mut values = Vec::with_capacity(self.columns.len());
        for column in &self.numeric {
            match (column, &self.postcode_means) {
                (NumericColumn::Postcode, Some(means)) => {
                    values.push((POSTCODE_ENCODED, means.encode(postcode)));
                }
                _ => values.push((column.name(), column.value(rooms, postcode, distance))),
            }
        }
        for (name, ty) in TYPE_INDICATORS {
            if property_type == ty {
                values.push((name, 1.0));
            }
        }
        values
    }

    /// Place named values onto the fitted column order, zero-filling gaps
    pub fn reindex(&self, named: &[(&str, f64)]) -> Vec<f64> {
        self.columns
            .iter()
            .map(|column| {
                named
                    .iter()
                    .find(|(name, _)| name == column)
                    .map(|(_, value)| *value)
                    .unwrap_or(0.0)
            })
            .collect()
    }

    /// Encode one set of listing fields into a feature row
    pub fn encode(&self, rooms: u32, property_type: PropertyType, postcode: u32, distance: f64) -> Vec<f64> {
        self.reindex(&self.named_values(rooms, property_type, postcode, distance))
    }

    pub fn encode_listing(&self, listing: &Listing) -> Vec<f64> {
        self.encode(
            listing.rooms,
            listing.property_type,
            listing.postcode,
            listing.distance,
        )
    }

    /// Whether the column at `idx` is a 0/1 category indicator
    pub fn is_indicator(&self, idx: usize) -> bool {
        self.columns
            .get(idx)
            .map(|c| TYPE_INDICATORS.iter().any(|(name, _)| name == c))
            .unwrap_or(false)
    }
}

/// Column layout: numeric columns (encoded postcode moved last), then indicators
pub fn layout(numeric: &[NumericColumn], postcode_encoding: PostcodeEncoding) -> Vec<String> {
    let mut columns: Vec<String> = numeric
        .iter()
        .filter(|c| postcode_encoding == PostcodeEncoding::Raw || **c != NumericColumn::Postcode)
        .map(|c| c.name().to_string())
        .collect();
    if postcode_encoding == PostcodeEncoding::TargetMean && numeric.contains(&NumericColumn::Postcode) {
        columns.push(POSTCODE_ENCODED.to_string());
    }
    columns.extend(TYPE_INDICATORS.iter().map(|(name, _)| name.to_string()));
    columns
}

#[cfg(test)]
mod tests {
    use super::*;

    const NUMERIC: [NumericColumn; 3] = [
        NumericColumn::Rooms,
        NumericColumn::Distance,
        NumericColumn::Postcode,
    ];

    fn train() -> Vec<Listing> {
        vec![
            Listing::new(2, PropertyType::House, 3000, 2.0, 100.0),
            Listing::new(3, PropertyType::Unit, 3000, 3.0, 300.0),
            Listing::new(4, PropertyType::Townhouse, 3121, 4.0, 800.0),
        ]
    }

    #[test]
    fn test_raw_layout() {
        let encoder = FeatureEncoder::fit(&NUMERIC, PostcodeEncoding::Raw, &train()).unwrap();
        assert_eq!(
            encoder.columns(),
            &["Rooms", "Distance", "Postcode", "Type_t", "Type_u"]
        );
    }

    #[test]
    fn test_target_mean_layout() {
        let encoder = FeatureEncoder::fit(&NUMERIC, PostcodeEncoding::TargetMean, &train()).unwrap();
        assert_eq!(
            encoder.columns(),
            &["Rooms", "Distance", "Postcode_encoded", "Type_t", "Type_u"]
        );
        assert_eq!(encoder.encode(2, PropertyType::House, 3000, 1.0)[2], 200.0);
        assert_eq!(encoder.encode(2, PropertyType::House, 3121, 1.0)[2], 800.0);
        // unseen postcode falls back to the global mean
        assert_eq!(encoder.encode(2, PropertyType::House, 9999, 1.0)[2], 400.0);
    }

    #[test]
    fn test_indicators() {
        let encoder = FeatureEncoder::fit(&NUMERIC, PostcodeEncoding::Raw, &train()).unwrap();
        assert_eq!(
            encoder.encode(3, PropertyType::House, 3000, 5.2),
            vec![3.0, 5.2, 3000.0, 0.0, 0.0]
        );
        assert_eq!(
            encoder.encode(3, PropertyType::Townhouse, 3000, 5.2),
            vec![3.0, 5.2, 3000.0, 1.0, 0.0]
        );
        assert_eq!(
            encoder.encode(3, PropertyType::Unit, 3000, 5.2),
            vec![3.0, 5.2, 3000.0, 0.0, 1.0]
        );
        assert!(encoder.is_indicator(3));
        assert!(!encoder.is_indicator(0));
    }

    #[test]
    fn test_reindex_zero_fills_and_ignores_extras() {
        let encoder = FeatureEncoder::fit(&NUMERIC, PostcodeEncoding::Raw, &train()).unwrap();
        let row = encoder.reindex(&[("Type_u", 1.0), ("Rooms", 2.0), ("Suburb", 7.0)]);
        assert_eq!(row, vec![2.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_unknown_type_policy() {
        assert_eq!(
            resolve_property_type("z", UnknownTypePolicy::Reference).unwrap(),
            PropertyType::House
        );
        assert!(matches!(
            resolve_property_type("z", UnknownTypePolicy::Reject),
            Err(PricingError::UnknownPropertyType(_))
        ));
        assert_eq!(
            resolve_property_type("u", UnknownTypePolicy::Reject).unwrap(),
            PropertyType::Unit
        );
    }
}
