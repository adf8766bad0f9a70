//! Evaluation metrics in original price units

use serde::{Deserialize, Serialize};

use crate::errors::{PricingError, Result};

/// Regression scores on a held-out split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub count: usize,
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
    pub mean_actual: f64,
    pub mean_predicted: f64,
}

impl RegressionMetrics {
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Result<Self> {
        if actual.len() != predicted.len() {
            return Err(PricingError::ShapeMismatch {
                expected: actual.len(),
                actual: predicted.len(),
            });
        }
        if actual.is_empty() {
            return Err(PricingError::EmptyDataset(
                "no rows to evaluate".to_string(),
            ));
        }

        let n = actual.len() as f64;
        let mean_actual = actual.iter().sum::<f64>() / n;
        let mean_predicted = predicted.iter().sum::<f64>() / n;

        let mut sse = 0.0;
        let mut sae = 0.0;
        let mut sst = 0.0;
        for (a, p) in actual.iter().zip(predicted) {
            sse += (a - p).powi(2);
            sae += (a - p).abs();
            sst += (a - mean_actual).powi(2);
        }

        let mse = sse / n;
        // Constant targets: perfect fit scores 1, anything else 0
        let r2 = if sst > 0.0 {
            1.0 - sse / sst
        } else if sse == 0.0 {
            1.0
        } else {
            0.0
        };

        Ok(Self {
            count: actual.len(),
            mse,
            rmse: mse.sqrt(),
            mae: sae / n,
            r2,
            mean_actual,
            mean_predicted,
        })
    }
}

/// Precision, recall and F1 for one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScores {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Multi-class evaluation with a confusion matrix (rows = actual)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub accuracy: f64,
    pub classes: Vec<ClassScores>,
    pub confusion: Vec<Vec<usize>>,
}

impl ClassificationReport {
    /// `actual` and `predicted` hold class indices into `labels`
    pub fn compute(labels: &[&str], actual: &[usize], predicted: &[usize]) -> Result<Self> {
        if actual.len() != predicted.len() {
            return Err(PricingError::ShapeMismatch {
                expected: actual.len(),
                actual: predicted.len(),
            });
        }
        if actual.is_empty() {
            return Err(PricingError::EmptyDataset(
                "no rows to evaluate".to_string(),
            ));
        }

        let k = labels.len();
        let mut confusion = vec![vec![0usize; k]; k];
        for (&a, &p) in actual.iter().zip(predicted) {
            if a >= k || p >= k {
                return Err(PricingError::InvalidParameters(format!(
                    "class index out of range for {k} labels"
                )));
            }
            confusion[a][p] += 1;
        }

        let correct: usize = (0..k).map(|i| confusion[i][i]).sum();
        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };

        let classes = labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let tp = confusion[i][i];
                let predicted_i: usize = (0..k).map(|r| confusion[r][i]).sum();
                let support: usize = confusion[i].iter().sum();
                let precision = ratio(tp, predicted_i);
                let recall = ratio(tp, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassScores {
                    label: label.to_string(),
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect();

        Ok(Self {
            accuracy: ratio(correct, actual.len()),
            classes,
            confusion,
        })
    }
}
