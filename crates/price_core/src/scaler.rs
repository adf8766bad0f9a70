//! Standard scaling for features and target
//!
//! Statistics are fitted once on the training split and never change
//! afterwards. Both scalers are stored in the model artifact.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{PricingError, Result};

/// Optional monotone transform applied before scaling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetTransform {
    #[default]
    None,
    /// `ln(1 + x)` on the target and non-indicator features
    Log1p,
}

impl TargetTransform {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Self::None => value,
            Self::Log1p => value.ln_1p(),
        }
    }

    pub fn invert(self, value: f64) -> f64 {
        match self {
            Self::None => value,
            Self::Log1p => value.exp_m1(),
        }
    }
}

impl fmt::Display for TargetTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Log1p => f.write_str("log1p"),
        }
    }
}

fn usable_std(std: f64) -> f64 {
    if std.is_finite() && std > 0.0 {
        std
    } else {
        1.0
    }
}

fn mean_and_std<I: Iterator<Item = f64> + Clone>(values: I, n: usize) -> (f64, f64) {
    let mean = values.clone().sum::<f64>() / n as f64;
    let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    (mean, usable_std(var.sqrt()))
}

/// Per-column `(x - mean) / std`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    /// Population standard deviation; zero replaced by one
    pub std: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self> {
        let width = match rows.first() {
            Some(row) => row.len(),
            None => {
                return Err(PricingError::EmptyDataset(
                    "cannot fit scaler on zero rows".to_string(),
                ))
            }
        };
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(PricingError::ShapeMismatch {
                expected: width,
                actual: bad.len(),
            });
        }

        let (mean, std) = (0..width)
            .map(|col| mean_and_std(rows.iter().map(move |r| r[col]), rows.len()))
            .unzip();

        Ok(Self { mean, std })
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    fn check(&self, row: &[f64]) -> Result<()> {
        if row.len() != self.width() {
            return Err(PricingError::ShapeMismatch {
                expected: self.width(),
                actual: row.len(),
            });
        }
        Ok(())
    }

    pub fn transform(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.check(row)?;
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(x, (m, s))| (x - m) / s)
            .collect())
    }

    pub fn inverse_transform(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.check(row)?;
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(z, (m, s))| z * s + m)
            .collect())
    }

    pub fn transform_all(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}

/// Scaler for the single target column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetScaler {
    pub mean: f64,
    pub std: f64,
}

impl TargetScaler {
    pub fn fit(values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Err(PricingError::EmptyDataset(
                "cannot fit target scaler on zero rows".to_string(),
            ));
        }
        let (mean, std) = mean_and_std(values.iter().copied(), values.len());
        Ok(Self { mean, std })
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.mean) / self.std
    }

    pub fn inverse_transform(&self, scaled: f64) -> f64 {
        scaled * self.std + self.mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_population_std() {
        let scaler = StandardScaler::fit(&[vec![1.0, 10.0], vec![3.0, 10.0]]).unwrap();
        assert_eq!(scaler.mean, vec![2.0, 10.0]);
        assert_eq!(scaler.std, vec![1.0, 1.0]);
        assert_eq!(scaler.transform(&[3.0, 10.0]).unwrap(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_constant_column_maps_to_zero() {
        let scaler = StandardScaler::fit(&[vec![5.0], vec![5.0], vec![5.0]]).unwrap();
        assert_eq!(scaler.transform(&[5.0]).unwrap(), vec![0.0]);
    }

    #[test]
    fn test_shape_mismatch() {
        let scaler = StandardScaler::fit(&[vec![1.0, 2.0]]).unwrap();
        assert!(matches!(
            scaler.transform(&[1.0]),
            Err(PricingError::ShapeMismatch { expected: 2, actual: 1 })
        ));
        assert!(StandardScaler::fit(&[vec![1.0, 2.0], vec![1.0]]).is_err());
        assert!(StandardScaler::fit(&[]).is_err());
    }

    #[test]
    fn test_target_round_trip() {
        let scaler = TargetScaler::fit(&[100_000.0, 500_000.0, 900_000.0]).unwrap();
        let scaled = scaler.transform(650_000.0);
        assert!((scaler.inverse_transform(scaled) - 650_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_log1p_transform() {
        let t = TargetTransform::Log1p;
        assert_eq!(t.apply(0.0), 0.0);
        assert!((t.invert(t.apply(1_250_000.0)) - 1_250_000.0).abs() < 1e-4);
        assert_eq!(TargetTransform::None.apply(3.5), 3.5);
    }
}
