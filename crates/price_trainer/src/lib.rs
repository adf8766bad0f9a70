//! Realty price trainer
//!
//! Offline training for the price models: minibatch backpropagation for the
//! feed-forward network, deterministic fixed-point boosted trees with a
//! cross-validated grid search, the k-NN band classifier, and the pipeline
//! that ties them to the preprocessing and artifact layers of
//! `realty-price-core`.

pub mod cart;
pub mod classify;
pub mod dataset;
pub mod deterministic;
pub mod errors;
pub mod grid;
pub mod mlp;
pub mod pipeline;
pub mod trainer;

pub use dataset::FixedPointSet;
pub use deterministic::{LcgRng, SplitTieBreaker};
pub use errors::TrainerError;
pub use grid::{GridPoint, GridResult, GridSearch};
pub use mlp::{MlpTrainer, TrainingHistory};
pub use pipeline::{load_dataset, load_or_train, train_pipeline, Bootstrap, TrainOutcome};
pub use trainer::{GbdtConfig, GbdtTrainer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
