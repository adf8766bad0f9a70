//! k-nearest-neighbour price band classifier

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{PricingError, Result};
use crate::listing::Listing;
use crate::scaler::StandardScaler;

/// Upper bound (inclusive) of the `Low` band
pub const LOW_CEILING: f64 = 700_000.0;
/// Upper bound (inclusive) of the `Medium` band
pub const MEDIUM_CEILING: f64 = 1_400_000.0;

/// Price band
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PriceCategory {
    Low,
    Medium,
    High,
}

impl PriceCategory {
    pub const ALL: [PriceCategory; 3] = [Self::Low, Self::Medium, Self::High];

    /// Band for a price; non-positive prices fall outside every band
    pub fn from_price(price: f64) -> Option<Self> {
        if !(price > 0.0) {
            None
        } else if price <= LOW_CEILING {
            Some(Self::Low)
        } else if price <= MEDIUM_CEILING {
            Some(Self::Medium)
        } else {
            Some(Self::High)
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for PriceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `[Rooms, Type label, Postcode, Distance]`
pub fn knn_features(listing: &Listing) -> Vec<f64> {
    vec![
        listing.rooms as f64,
        listing.property_type.label() as f64,
        listing.postcode as f64,
        listing.distance,
    ]
}

/// Fitted k-NN classifier over standardized listing features
#[derive(Debug, Clone)]
pub struct KnnClassifier {
    k: usize,
    scaler: StandardScaler,
    points: Vec<Vec<f64>>,
    labels: Vec<PriceCategory>,
}

impl KnnClassifier {
    pub const DEFAULT_K: usize = 5;

    /// Fit on listings; rows without a price band are ignored
    pub fn fit(listings: &[Listing], k: usize) -> Result<Self> {
        if k == 0 {
            return Err(PricingError::InvalidParameters("k must be positive".to_string()));
        }

        let (raw, labels): (Vec<Vec<f64>>, Vec<PriceCategory>) = listings
            .iter()
            .filter_map(|l| PriceCategory::from_price(l.price).map(|c| (knn_features(l), c)))
            .unzip();
        if raw.is_empty() {
            return Err(PricingError::EmptyDataset(
                "no labelled rows for k-NN".to_string(),
            ));
        }

        let scaler = StandardScaler::fit(&raw)?;
        let points = scaler.transform_all(&raw)?;
        Ok(Self {
            k,
            scaler,
            points,
            labels,
        })
    }

    pub fn predict(&self, listing: &Listing) -> Result<PriceCategory> {
        let query = self.scaler.transform(&knn_features(listing))?;

        let mut distances: Vec<(f64, usize)> = self
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let d2: f64 = p.iter().zip(&query).map(|(a, b)| (a - b).powi(2)).sum();
                (d2, i)
            })
            .collect();
        distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut votes = [0usize; 3];
        for &(_, i) in distances.iter().take(self.k) {
            votes[self.labels[i].index()] += 1;
        }

        // strict > keeps the lower band on ties
        let mut best = PriceCategory::Low;
        for category in PriceCategory::ALL {
            if votes[category.index()] > votes[best.index()] {
                best = category;
            }
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::PropertyType;

    #[test]
    fn test_price_bands() {
        assert_eq!(PriceCategory::from_price(700_000.0), Some(PriceCategory::Low));
        assert_eq!(PriceCategory::from_price(700_001.0), Some(PriceCategory::Medium));
        assert_eq!(PriceCategory::from_price(1_400_000.0), Some(PriceCategory::Medium));
        assert_eq!(PriceCategory::from_price(2_000_000.0), Some(PriceCategory::High));
        assert_eq!(PriceCategory::from_price(0.0), None);
    }

    #[test]
    fn test_nearest_neighbours_vote() {
        let mut train = Vec::new();
        for i in 0..5 {
            train.push(Listing::new(2, PropertyType::Unit, 3000, 1.0 + i as f64 * 0.1, 500_000.0));
            train.push(Listing::new(5, PropertyType::House, 3100, 20.0 + i as f64 * 0.1, 2_000_000.0));
        }
        let knn = KnnClassifier::fit(&train, 5).unwrap();

        let near_units = Listing::new(2, PropertyType::Unit, 3000, 1.2, 0.0);
        let near_houses = Listing::new(5, PropertyType::House, 3100, 20.1, 0.0);
        assert_eq!(knn.predict(&near_units).unwrap(), PriceCategory::Low);
        assert_eq!(knn.predict(&near_houses).unwrap(), PriceCategory::High);
    }

    #[test]
    fn test_tie_goes_to_lower_band() {
        let train = vec![
            Listing::new(2, PropertyType::House, 3000, 1.0, 1_000_000.0),
            Listing::new(2, PropertyType::House, 3000, 3.0, 2_000_000.0),
        ];
        let knn = KnnClassifier::fit(&train, 2).unwrap();
        let query = Listing::new(2, PropertyType::House, 3000, 2.0, 0.0);
        assert_eq!(knn.predict(&query).unwrap(), PriceCategory::Medium);
    }

    #[test]
    fn test_invalid_k() {
        let train = vec![Listing::new(2, PropertyType::House, 3000, 1.0, 1.0)];
        assert!(KnnClassifier::fit(&train, 0).is_err());
    }
}
