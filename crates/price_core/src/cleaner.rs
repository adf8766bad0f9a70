//! IQR outlier filter on the target price

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{PricingError, Result};
use crate::listing::Listing;

/// Fence multiplier applied to the interquartile range
pub const IQR_MULTIPLIER: f64 = 1.5;

/// Bounds and counts from one cleaning pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanReport {
    pub q1: f64,
    pub q3: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub before: usize,
    pub removed: usize,
}

impl CleanReport {
    pub fn retained(&self) -> usize {
        self.before - self.removed
    }

    /// Whether a price sits inside the inclusive fences
    pub fn admits(&self, price: f64) -> bool {
        price >= self.lower_bound && price <= self.upper_bound
    }
}

/// Quantile with linear interpolation between order statistics
///
/// `q` must lie in `[0, 1]`. Returns NaN for an empty slice.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Drop listings whose price falls outside `[Q1 - 1.5·IQR, Q3 + 1.5·IQR]`
pub fn remove_price_outliers(listings: Vec<Listing>) -> Result<(Vec<Listing>, CleanReport)> {
    if listings.is_empty() {
        return Err(PricingError::EmptyDataset(
            "cannot remove outliers from an empty dataset".to_string(),
        ));
    }

    let prices: Vec<f64> = listings.iter().map(|l| l.price).collect();
    let q1 = quantile(&prices, 0.25);
    let q3 = quantile(&prices, 0.75);
    let iqr = q3 - q1;

    let mut report = CleanReport {
        q1,
        q3,
        lower_bound: q1 - IQR_MULTIPLIER * iqr,
        upper_bound: q3 + IQR_MULTIPLIER * iqr,
        before: listings.len(),
        removed: 0,
    };

    let retained: Vec<Listing> = listings
        .into_iter()
        .filter(|l| report.admits(l.price))
        .collect();
    report.removed = report.before - retained.len();

    info!(
        "Outlier filter kept {} of {} rows (bounds [{:.2}, {:.2}], removed {})",
        retained.len(),
        report.before,
        report.lower_bound,
        report.upper_bound,
        report.removed
    );

    Ok((retained, report))
}
