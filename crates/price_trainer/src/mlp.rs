//! Minibatch training of the feed-forward regressor
//!
//! Backpropagation through `Dense -> ReLU -> BatchNorm -> Dropout` blocks
//! with an Adam optimizer on mean squared error. The trailing share of the
//! rows is held out to report validation loss each epoch.

use anyhow::{ensure, Context, Result};
use ndarray::{s, Array, Array1, Array2, Axis, Dimension, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use realty_price_core::config::NetworkParams;
use realty_price_core::nn::{relu, HiddenBlock, MlpRegressor, NetworkShape};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Per-epoch losses in scaled target units
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub train_loss: Vec<f64>,
    pub val_loss: Vec<f64>,
}

impl TrainingHistory {
    pub fn final_train_loss(&self) -> Option<f64> {
        self.train_loss.last().copied()
    }

    pub fn final_val_loss(&self) -> Option<f64> {
        self.val_loss.last().copied()
    }
}

/// First and second moment estimates for one parameter tensor
#[derive(Debug, Clone)]
struct Moments<D: Dimension> {
    m: Array<f64, D>,
    v: Array<f64, D>,
}

impl<D: Dimension> Moments<D> {
    fn like(param: &Array<f64, D>) -> Self {
        Self {
            m: Array::zeros(param.raw_dim()),
            v: Array::zeros(param.raw_dim()),
        }
    }
}

#[derive(Debug, Clone)]
struct BlockMoments {
    weights: Moments<ndarray::Ix2>,
    bias: Moments<ndarray::Ix1>,
    gamma: Moments<ndarray::Ix1>,
    beta: Moments<ndarray::Ix1>,
}

#[derive(Debug, Clone, Copy)]
struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
}

impl Adam {
    fn step<D: Dimension>(&self, t: i32, param: &mut Array<f64, D>, grad: &Array<f64, D>, moments: &mut Moments<D>) {
        let (b1, b2) = (self.beta1, self.beta2);
        let correction1 = 1.0 - b1.powi(t);
        let correction2 = 1.0 - b2.powi(t);
        let (lr, eps) = (self.learning_rate, self.epsilon);
        Zip::from(param)
            .and(grad)
            .and(&mut moments.m)
            .and(&mut moments.v)
            .for_each(|w, &g, m, v| {
                *m = b1 * *m + (1.0 - b1) * g;
                *v = b2 * *v + (1.0 - b2) * g * g;
                let m_hat = *m / correction1;
                let v_hat = *v / correction2;
                *w -= lr * m_hat / (v_hat.sqrt() + eps);
            });
    }
}

/// Intermediate values of one hidden block kept for the backward pass
struct BlockCache {
    input: Array2<f64>,
    pre_activation: Array2<f64>,
    normalized: Array2<f64>,
    inv_std: Array1<f64>,
    /// Already divided by the keep probability
    dropout_mask: Array2<f64>,
}

struct BlockGrads {
    weights: Array2<f64>,
    bias: Array1<f64>,
    gamma: Array1<f64>,
    beta: Array1<f64>,
}

pub struct MlpTrainer {
    params: NetworkParams,
    seed: u64,
}

impl MlpTrainer {
    pub fn new(params: NetworkParams, seed: u64) -> Self {
        Self { params, seed }
    }

    /// Fit a fresh network on scaled rows and targets
    pub fn train(&self, rows: &[Vec<f64>], targets: &[f64]) -> Result<(MlpRegressor, TrainingHistory)> {
        ensure!(!rows.is_empty(), "Dataset is empty");
        ensure!(rows.len() == targets.len(), "{} rows but {} targets", rows.len(), targets.len());
        ensure!(self.params.batch_size > 0, "batch_size must be positive");

        let width = rows[0].len();
        let flat: Vec<f64> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        let x = Array2::from_shape_vec((rows.len(), width), flat).context("ragged feature rows")?;
        let y = Array1::from_vec(targets.to_vec());

        let n_val = (self.params.validation_split * rows.len() as f64) as usize;
        let n_train = rows.len() - n_val;
        ensure!(n_train > 0, "validation split leaves no training rows");
        let (x_train, x_val) = (x.slice(s![..n_train, ..]), x.slice(s![n_train.., ..]));
        let (y_train, y_val) = (y.slice(s![..n_train]), y.slice(s![n_train..]));

        let mut rng = StdRng::seed_from_u64(self.seed);
        let shape = NetworkShape {
            inputs: width,
            hidden: self.params.hidden.clone(),
            dropout: self.params.dropout,
            momentum: self.params.batch_norm_momentum,
            epsilon: self.params.batch_norm_epsilon,
        };
        let mut net = MlpRegressor::initialize(&shape, &mut rng)?;

        let adam = Adam {
            learning_rate: self.params.learning_rate,
            beta1: self.params.beta1,
            beta2: self.params.beta2,
            epsilon: self.params.adam_epsilon,
        };
        let mut block_moments: Vec<BlockMoments> = net
            .hidden
            .iter()
            .map(|b| BlockMoments {
                weights: Moments::like(&b.dense.weights),
                bias: Moments::like(&b.dense.bias),
                gamma: Moments::like(&b.norm.gamma),
                beta: Moments::like(&b.norm.beta),
            })
            .collect();
        let mut out_w = Moments::like(&net.output.weights);
        let mut out_b = Moments::like(&net.output.bias);

        let mut history = TrainingHistory::default();
        let mut order: Vec<usize> = (0..n_train).collect();
        let mut step = 0i32;

        for epoch in 0..self.params.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(self.params.batch_size) {
                let xb = x_train.select(Axis(0), batch);
                let yb = y_train.select(Axis(0), batch);
                let n = batch.len() as f64;

                // forward
                let mut caches = Vec::with_capacity(net.hidden.len());
                let mut activation = xb;
                for block in net.hidden.iter_mut() {
                    let (out, cache) = forward_train(block, activation, &mut rng);
                    caches.push(cache);
                    activation = out;
                }
                let prediction = net.output.forward(&activation).index_axis_move(Axis(1), 0);
                let residual = &prediction - &yb;
                epoch_loss += residual.mapv(|r| r * r).sum();

                // backward
                let d_out = (residual * (2.0 / n)).insert_axis(Axis(1));
                let out_grad_w = activation.t().dot(&d_out);
                let out_grad_b = d_out.sum_axis(Axis(0));
                let mut upstream = d_out.dot(&net.output.weights.t());

                let mut grads = Vec::with_capacity(net.hidden.len());
                for (block, cache) in net.hidden.iter().zip(caches.iter()).rev() {
                    let (g, d_input) = backward(block, cache, upstream);
                    grads.push(g);
                    upstream = d_input;
                }
                grads.reverse();

                step += 1;
                adam.step(step, &mut net.output.weights, &out_grad_w, &mut out_w);
                adam.step(step, &mut net.output.bias, &out_grad_b, &mut out_b);
                for ((block, g), mom) in net.hidden.iter_mut().zip(&grads).zip(block_moments.iter_mut()) {
                    adam.step(step, &mut block.dense.weights, &g.weights, &mut mom.weights);
                    adam.step(step, &mut block.dense.bias, &g.bias, &mut mom.bias);
                    adam.step(step, &mut block.norm.gamma, &g.gamma, &mut mom.gamma);
                    adam.step(step, &mut block.norm.beta, &g.beta, &mut mom.beta);
                }
            }

            let train_loss = epoch_loss / n_train as f64;
            history.train_loss.push(train_loss);
            if n_val > 0 {
                let val_pred = net.predict_batch(&x_val.to_owned())?;
                let val_loss = (&val_pred - &y_val).mapv(|r| r * r).mean().unwrap_or(0.0);
                history.val_loss.push(val_loss);
                debug!("Epoch {}/{}: loss {:.6}, val_loss {:.6}", epoch + 1, self.params.epochs, train_loss, val_loss);
            } else {
                debug!("Epoch {}/{}: loss {:.6}", epoch + 1, self.params.epochs, train_loss);
            }
        }

        net.validate()?;
        info!(
            "Network trained: {} epochs, {} parameters, final loss {:.6}{}",
            self.params.epochs,
            net.parameter_count(),
            history.final_train_loss().unwrap_or(f64::NAN),
            history
                .final_val_loss()
                .map(|v| format!(", val_loss {v:.6}"))
                .unwrap_or_default()
        );
        Ok((net, history))
    }
}

/// Training-mode forward pass: batch statistics, running-stat update, dropout
fn forward_train<R: Rng>(block: &mut HiddenBlock, input: Array2<f64>, rng: &mut R) -> (Array2<f64>, BlockCache) {
    let pre_activation = block.dense.forward(&input);
    let activated = pre_activation.mapv(relu);

    let norm = &mut block.norm;
    let n = activated.nrows() as f64;
    let mean = activated.sum_axis(Axis(0)) / n;
    let centered = &activated - &mean;
    let var = centered.mapv(|c| c * c).sum_axis(Axis(0)) / n;
    let inv_std = var.mapv(|v| 1.0 / (v + norm.epsilon).sqrt());
    let normalized = &centered * &inv_std;

    let momentum = norm.momentum;
    norm.running_mean = &norm.running_mean * momentum + &mean * (1.0 - momentum);
    norm.running_var = &norm.running_var * momentum + &var * (1.0 - momentum);

    let scaled = &normalized * &norm.gamma + &norm.beta;

    let keep = 1.0 - block.dropout;
    let dropout_mask = if block.dropout > 0.0 {
        Array2::from_shape_fn(scaled.raw_dim(), |_| if rng.gen::<f64>() < keep { 1.0 / keep } else { 0.0 })
    } else {
        Array2::ones(scaled.raw_dim())
    };
    let output = &scaled * &dropout_mask;

    (
        output,
        BlockCache {
            input,
            pre_activation,
            normalized,
            inv_std,
            dropout_mask,
        },
    )
}

/// Gradients for one block given the gradient at its output
fn backward(block: &HiddenBlock, cache: &BlockCache, upstream: Array2<f64>) -> (BlockGrads, Array2<f64>) {
    let d_scaled = upstream * &cache.dropout_mask;

    let gamma_grad = (&d_scaled * &cache.normalized).sum_axis(Axis(0));
    let beta_grad = d_scaled.sum_axis(Axis(0));

    let n = d_scaled.nrows() as f64;
    let d_norm = &d_scaled * &block.norm.gamma;
    let sum_d = d_norm.sum_axis(Axis(0));
    let sum_d_xhat = (&d_norm * &cache.normalized).sum_axis(Axis(0));
    let d_activated =
        ((&d_norm * n) - &sum_d - &(&cache.normalized * &sum_d_xhat)) * &(&cache.inv_std / n);

    let relu_mask = cache.pre_activation.mapv(|z| if z > 0.0 { 1.0 } else { 0.0 });
    let d_pre = d_activated * &relu_mask;

    let grads = BlockGrads {
        weights: cache.input.t().dot(&d_pre),
        bias: d_pre.sum_axis(Axis(0)),
        gamma: gamma_grad,
        beta: beta_grad,
    };
    let d_input = d_pre.dot(&block.dense.weights.t());
    (grads, d_input)
}
