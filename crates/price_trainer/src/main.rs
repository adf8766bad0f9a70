//! Realty price trainer CLI
//!
//! Trains, tunes, evaluates and queries the price models described by the
//! application configuration.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use realty_price_core::artifact::{self, SchemaTag};
use realty_price_core::config::AppConfig;
use realty_price_core::knn::KnnClassifier;
use realty_price_core::pipeline::Predictor;
use realty_price_trainer::{classify, pipeline};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "price-trainer")]
#[command(author = "Realty Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train and evaluate real-estate price models", long_about = None)]
struct Args {
    /// Configuration file (TOML); defaults to config/realty.toml when present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the dataset path
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Override the artifact path
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train the configured model and save it (skipped if a valid one exists)
    Train {
        /// Retrain and overwrite an existing artifact
        #[arg(long)]
        force: bool,
    },
    /// Run the boosted-tree grid search and report every point
    Tune,
    /// Score the saved model on the held-out split
    Evaluate,
    /// Fit and score the k-NN price band classifier
    Classify {
        #[arg(short, default_value_t = KnnClassifier::DEFAULT_K)]
        k: usize,
    },
    /// Predict one listing with the saved model
    Predict {
        #[arg(long)]
        rooms: u32,
        /// Property type code: h, t or u
        #[arg(long = "type")]
        property_type: String,
        #[arg(long)]
        postcode: u32,
        #[arg(long)]
        distance: f64,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Realty price trainer v{}", realty_price_trainer::VERSION);

    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(data) = args.data {
        config.data.csv_path = data;
    }
    if let Some(model) = args.model {
        config.model.artifact_path = model;
    }

    match args.command {
        Command::Train { force } => {
            let bootstrap = pipeline::load_or_train(&config, force).context("Training failed")?;
            let summary = &bootstrap.predictor.artifact().summary;
            if bootstrap.trained {
                info!("✓ Trained {} model", bootstrap.predictor.schema().model_kind);
            } else {
                info!("Valid model already present, use --force to retrain");
            }
            info!("  Artifact: {}", config.model.artifact_path.display());
            info!("  Digest: {}", bootstrap.digest);
            info!("  Rows: {} train / {} test", summary.train_rows, summary.test_rows);
            if let Some(metrics) = &summary.metrics {
                info!("  Test RMSE: {:.2}  R²: {:.4}", metrics.rmse, metrics.r2);
            }
        }
        Command::Tune => {
            let dataset = pipeline::load_dataset(&config).context("Failed to load dataset")?;
            let result = pipeline::tune(&config, dataset).context("Grid search failed")?;
            for (idx, score) in result.scores.iter().enumerate() {
                info!("  #{:>3} {:?} -> {:.6}", idx, score.point, score.mean_score);
            }
            info!("Best: {:?} (cv score {:.6})", result.best, result.best_score);
        }
        Command::Evaluate => {
            let dataset = pipeline::load_dataset(&config).context("Failed to load dataset")?;
            let expected = SchemaTag::expected(&dataset.numeric_columns, &config.model);
            let loaded = artifact::load(&config.model.artifact_path, &expected)
                .context("Failed to load model")?
                .with_context(|| format!("No model at {}", config.model.artifact_path.display()))?;
            let predictor = Predictor::new(loaded.artifact, config.model.unknown_type_policy);
            let data = pipeline::prepare(&config, dataset)?;
            match pipeline::evaluate(&predictor, &data.test)? {
                Some(m) => info!(
                    "MSE {:.2}  RMSE {:.2}  MAE {:.2}  R² {:.4}  mean actual {:.2}  mean predicted {:.2}",
                    m.mse, m.rmse, m.mae, m.r2, m.mean_actual, m.mean_predicted
                ),
                None => info!("Nothing to evaluate"),
            }
        }
        Command::Classify { k } => {
            let dataset = pipeline::load_dataset(&config).context("Failed to load dataset")?;
            let classify::Classification { report, clean } = classify::classify(&config, &dataset, k)?;
            info!(
                "Removed {} of {} rows outside [{:.2}, {:.2}]",
                clean.removed, clean.before, clean.lower_bound, clean.upper_bound
            );
            info!("Accuracy: {:.4}", report.accuracy);
            for class in &report.classes {
                info!(
                    "  {:<6} precision {:.4} recall {:.4} f1 {:.4} support {}",
                    class.label, class.precision, class.recall, class.f1, class.support
                );
            }
            for (class, row) in report.classes.iter().zip(&report.confusion) {
                info!("  {:<6} {:?}", class.label, row);
            }
        }
        Command::Predict {
            rooms,
            property_type,
            postcode,
            distance,
        } => {
            let bootstrap = pipeline::load_or_train(&config, false).context("Failed to prepare model")?;
            let price = bootstrap
                .predictor
                .predict_price(rooms, &property_type, postcode, distance)?;
            println!("{price:.2}");
        }
    }

    Ok(())
}
