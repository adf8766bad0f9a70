//! Feed-forward price regressor: inference and initialisation
//!
//! Each hidden block is `Dense -> ReLU -> BatchNorm -> Dropout`, followed by
//! a single linear output unit. Dropout is only active while training, so
//! this module never applies it. Backpropagation lives in the trainer.

use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{PricingError, Result};

/// Hidden layer widths of the served network
pub const DEFAULT_HIDDEN: [usize; 3] = [128, 64, 32];

/// Fully connected layer, `y = x · W + b`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    /// Shape `(inputs, outputs)`
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

impl Dense {
    /// Glorot-uniform weights, zero bias
    pub fn glorot<R: Rng>(inputs: usize, outputs: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (inputs + outputs) as f64).sqrt();
        let weights = Array2::from_shape_fn((inputs, outputs), |_| rng.gen_range(-limit..limit));
        Self {
            weights,
            bias: Array1::zeros(outputs),
        }
    }

    pub fn inputs(&self) -> usize {
        self.weights.nrows()
    }

    pub fn outputs(&self) -> usize {
        self.weights.ncols()
    }

    pub fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        x.dot(&self.weights) + &self.bias
    }
}

/// Batch normalisation with running statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchNorm {
    pub gamma: Array1<f64>,
    pub beta: Array1<f64>,
    pub running_mean: Array1<f64>,
    pub running_var: Array1<f64>,
    pub momentum: f64,
    pub epsilon: f64,
}

impl BatchNorm {
    pub const DEFAULT_MOMENTUM: f64 = 0.99;
    pub const DEFAULT_EPSILON: f64 = 1e-3;

    pub fn new(width: usize, momentum: f64, epsilon: f64) -> Self {
        Self {
            gamma: Array1::ones(width),
            beta: Array1::zeros(width),
            running_mean: Array1::zeros(width),
            running_var: Array1::ones(width),
            momentum,
            epsilon,
        }
    }

    /// Normalise with the running statistics
    pub fn infer(&self, x: &Array2<f64>) -> Array2<f64> {
        let inv_std = self.running_var.mapv(|v| 1.0 / (v + self.epsilon).sqrt());
        (x - &self.running_mean) * &inv_std * &self.gamma + &self.beta
    }
}

/// `Dense -> ReLU -> BatchNorm -> Dropout`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HiddenBlock {
    pub dense: Dense,
    pub norm: BatchNorm,
    pub dropout: f64,
}

impl HiddenBlock {
    pub fn infer(&self, x: &Array2<f64>) -> Array2<f64> {
        let activated = self.dense.forward(x).mapv(relu);
        self.norm.infer(&activated)
    }
}

pub fn relu(v: f64) -> f64 {
    v.max(0.0)
}

/// Shape of a freshly initialised network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkShape {
    pub inputs: usize,
    pub hidden: Vec<usize>,
    pub dropout: f64,
    pub momentum: f64,
    pub epsilon: f64,
}

/// Multi-layer perceptron regressor on scaled features and target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpRegressor {
    pub hidden: Vec<HiddenBlock>,
    pub output: Dense,
}

impl MlpRegressor {
    /// Build a network with Glorot-uniform weights drawn from `rng`
    pub fn initialize<R: Rng>(shape: &NetworkShape, rng: &mut R) -> Result<Self> {
        if shape.inputs == 0 {
            return Err(PricingError::InvalidParameters(
                "network needs at least one input".to_string(),
            ));
        }
        if shape.hidden.iter().any(|&w| w == 0) {
            return Err(PricingError::InvalidParameters(
                "hidden layer widths must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&shape.dropout) {
            return Err(PricingError::InvalidParameters(format!(
                "dropout must be in [0, 1), got {}",
                shape.dropout
            )));
        }

        let mut hidden = Vec::with_capacity(shape.hidden.len());
        let mut width = shape.inputs;
        for &next in &shape.hidden {
            hidden.push(HiddenBlock {
                dense: Dense::glorot(width, next, rng),
                norm: BatchNorm::new(next, shape.momentum, shape.epsilon),
                dropout: shape.dropout,
            });
            width = next;
        }
        let output = Dense::glorot(width, 1, rng);

        Ok(Self { hidden, output })
    }

    pub fn input_width(&self) -> usize {
        self.hidden
            .first()
            .map(|b| b.dense.inputs())
            .unwrap_or_else(|| self.output.inputs())
    }

    /// Scaled predictions for a batch of scaled rows
    pub fn predict_batch(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.input_width() {
            return Err(PricingError::ShapeMismatch {
                expected: self.input_width(),
                actual: x.ncols(),
            });
        }
        let mut activation = x.to_owned();
        for block in &self.hidden {
            activation = block.infer(&activation);
        }
        Ok(self.output.forward(&activation).index_axis_move(Axis(1), 0))
    }

    /// Scaled prediction for one scaled row
    pub fn predict(&self, row: &[f64]) -> Result<f64> {
        let x = Array2::from_shape_vec((1, row.len()), row.to_vec())
            .map_err(|e| PricingError::InvalidParameters(e.to_string()))?;
        Ok(self.predict_batch(&x)?[0])
    }

    /// Reject networks with inconsistent shapes or non-finite parameters
    pub fn validate(&self) -> Result<()> {
        let mut width = self.input_width();
        for (i, block) in self.hidden.iter().enumerate() {
            let out = block.dense.outputs();
            if block.dense.inputs() != width
                || block.dense.bias.len() != out
                || block.norm.gamma.len() != out
                || block.norm.beta.len() != out
                || block.norm.running_mean.len() != out
                || block.norm.running_var.len() != out
            {
                return Err(PricingError::ArtifactCorrupted(format!(
                    "hidden layer {i} has inconsistent shapes"
                )));
            }
            width = out;
        }
        if self.output.inputs() != width || self.output.outputs() != 1 || self.output.bias.len() != 1 {
            return Err(PricingError::ArtifactCorrupted(
                "output layer has inconsistent shapes".to_string(),
            ));
        }

        let all_finite = self.hidden.iter().all(|b| {
            b.dense.weights.iter().all(|v| v.is_finite())
                && b.dense.bias.iter().all(|v| v.is_finite())
                && b.norm.gamma.iter().all(|v| v.is_finite())
                && b.norm.beta.iter().all(|v| v.is_finite())
                && b.norm.running_mean.iter().all(|v| v.is_finite())
                && b.norm.running_var.iter().all(|v| v.is_finite() && *v >= 0.0)
        }) && self.output.weights.iter().all(|v| v.is_finite())
            && self.output.bias.iter().all(|v| v.is_finite());
        if !all_finite {
            return Err(PricingError::Training(
                "network contains non-finite parameters".to_string(),
            ));
        }
        Ok(())
    }

    pub fn parameter_count(&self) -> usize {
        let dense = |d: &Dense| d.weights.len() + d.bias.len();
        self.hidden
            .iter()
            .map(|b| dense(&b.dense) + 4 * b.norm.gamma.len())
            .sum::<usize>()
            + dense(&self.output)
    }
}
