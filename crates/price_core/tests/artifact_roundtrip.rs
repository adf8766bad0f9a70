//! Artifact persistence and inference adapter behaviour

use std::fs;

use chrono::Utc;
use realty_price_core::artifact::{self, sidecar_path, ModelArtifact, PriceModel, SchemaTag, TrainingSummary};
use realty_price_core::cleaner::remove_price_outliers;
use realty_price_core::config::{ModelConfig, ModelKind};
use realty_price_core::gbdt::{Model, Node, Tree, SCALE};
use realty_price_core::nn::{BatchNorm, MlpRegressor, NetworkShape};
use realty_price_core::{
    LoadReport, Listing, NumericColumn, PostcodeEncoding, Predictor, Preprocessor, PricingError,
    PropertyType, TargetTransform, UnknownTypePolicy,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::tempdir;

const NUMERIC: [NumericColumn; 3] = [
    NumericColumn::Rooms,
    NumericColumn::Postcode,
    NumericColumn::Distance,
];

fn listings() -> Vec<Listing> {
    vec![
        Listing::new(2, PropertyType::Unit, 3000, 1.5, 450_000.0),
        Listing::new(3, PropertyType::House, 3000, 5.2, 1_100_000.0),
        Listing::new(4, PropertyType::House, 3121, 8.0, 1_600_000.0),
        Listing::new(3, PropertyType::Townhouse, 3121, 3.1, 900_000.0),
        Listing::new(1, PropertyType::Unit, 3067, 2.4, 380_000.0),
        Listing::new(5, PropertyType::House, 3067, 11.0, 1_900_000.0),
    ]
}

fn model_config(kind: ModelKind) -> ModelConfig {
    ModelConfig {
        kind,
        ..ModelConfig::default()
    }
}

fn summary() -> TrainingSummary {
    let (_, clean) = remove_price_outliers(listings()).unwrap();
    TrainingSummary {
        trained_at: Utc::now(),
        seed: 42,
        train_rows: 6,
        test_rows: 0,
        load: LoadReport::default(),
        clean,
        metrics: None,
        hyperparameters: serde_json::json!({ "n_trees": 1 }),
    }
}

/// One split on scaled Rooms: below-average rooms predict -1 std, else +1 std
fn boosted_artifact() -> ModelArtifact {
    let preprocessor =
        Preprocessor::fit(&NUMERIC, PostcodeEncoding::Raw, TargetTransform::None, &listings()).unwrap();
    let tree = Tree::new(
        vec![Node::internal(0, 0, 0, 1, 2), Node::leaf(1, -SCALE), Node::leaf(2, SCALE)],
        SCALE,
    );
    ModelArtifact {
        schema: SchemaTag::expected(&NUMERIC, &model_config(ModelKind::GradientBoosting)),
        model: PriceModel::GradientBoosting(Model::new(vec![tree], 0, preprocessor.columns().len())),
        preprocessor,
        summary: summary(),
    }
}

fn network_artifact() -> ModelArtifact {
    let preprocessor =
        Preprocessor::fit(&NUMERIC, PostcodeEncoding::Raw, TargetTransform::None, &listings()).unwrap();
    let shape = NetworkShape {
        inputs: preprocessor.columns().len(),
        hidden: vec![8, 4],
        dropout: 0.1,
        momentum: BatchNorm::DEFAULT_MOMENTUM,
        epsilon: BatchNorm::DEFAULT_EPSILON,
    };
    let net = MlpRegressor::initialize(&shape, &mut StdRng::seed_from_u64(42)).unwrap();
    ModelArtifact {
        schema: SchemaTag::expected(&NUMERIC, &model_config(ModelKind::NeuralNet)),
        model: PriceModel::NeuralNet(net),
        preprocessor,
        summary: summary(),
    }
}

#[test]
fn sample_request_yields_positive_price() {
    let predictor = Predictor::new(boosted_artifact(), UnknownTypePolicy::Reference);
    let price = predictor.predict_price(3, "h", 3000, 5.2).unwrap();
    assert!(price.is_finite());
    assert!(price > 0.0);
}

#[test]
fn unknown_type_behaves_like_house_by_default() {
    let predictor = Predictor::new(network_artifact(), UnknownTypePolicy::Reference);
    let house = predictor.predict_price(3, "h", 3000, 5.2).unwrap();
    let unknown = predictor.predict_price(3, "z", 3000, 5.2).unwrap();
    assert_eq!(house, unknown);
    assert_eq!(
        predictor.feature_row(3, "z", 3000, 5.2).unwrap(),
        predictor.feature_row(3, "h", 3000, 5.2).unwrap()
    );
}

#[test]
fn unknown_type_rejected_under_reject_policy() {
    let predictor = Predictor::new(network_artifact(), UnknownTypePolicy::Reject);
    let err = predictor.predict_price(3, "z", 3000, 5.2).unwrap_err();
    assert!(matches!(err, PricingError::UnknownPropertyType(ref code) if code == "z"));
}

#[test]
fn feature_row_matches_training_columns_for_every_type() {
    let predictor = Predictor::new(boosted_artifact(), UnknownTypePolicy::Reference);
    assert_eq!(
        predictor.columns(),
        &["Rooms", "Postcode", "Distance", "Type_t", "Type_u"]
    );
    for (code, expected) in [("h", [0.0, 0.0]), ("t", [1.0, 0.0]), ("u", [0.0, 1.0])] {
        let row = predictor.feature_row(2, code, 3067, 4.5).unwrap();
        assert_eq!(row.len(), predictor.columns().len());
        assert_eq!(&row[..3], &[2.0, 3067.0, 4.5]);
        assert_eq!(&row[3..], &expected);
    }
}

#[test]
fn boosted_prediction_is_exact() {
    let artifact = boosted_artifact();
    let target = artifact.preprocessor.target_scaler;
    let predictor = Predictor::new(artifact, UnknownTypePolicy::Reference);

    // Rooms 5 is above the training mean, so the right leaf (+1 std) fires
    let price = predictor.predict_price(5, "h", 3000, 5.0).unwrap();
    assert_eq!(price, target.inverse_transform(1.0));
    let price = predictor.predict_price(1, "h", 3000, 5.0).unwrap();
    assert_eq!(price, target.inverse_transform(-1.0));
}

#[test]
fn rejects_negative_distance() {
    let predictor = Predictor::new(boosted_artifact(), UnknownTypePolicy::Reference);
    assert!(matches!(
        predictor.predict_price(3, "h", 3000, -1.0),
        Err(PricingError::InvalidParameters(_))
    ));
}

#[test]
fn save_load_preserves_predictions_exactly() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("models").join("price_model.json");

    for original in [boosted_artifact(), network_artifact()] {
        let expected_schema = original.schema.clone();
        let digest = artifact::save(&original, &path).unwrap();
        assert_eq!(fs::read_to_string(sidecar_path(&path)).unwrap(), digest);

        let loaded = artifact::load(&path, &expected_schema).unwrap().unwrap();
        assert_eq!(loaded.digest, digest);
        assert_eq!(loaded.artifact, original);

        let before = Predictor::new(original, UnknownTypePolicy::Reference);
        let after = Predictor::new(loaded.artifact, UnknownTypePolicy::Reference);
        for listing in listings() {
            assert_eq!(
                before.predict_listing(&listing).unwrap(),
                after.predict_listing(&listing).unwrap()
            );
        }
    }
}

#[test]
fn tampered_artifact_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("price_model.json");
    let original = boosted_artifact();
    artifact::save(&original, &path).unwrap();

    let tampered = fs::read_to_string(&path).unwrap().replacen("\"seed\":42", "\"seed\":43", 1);
    fs::write(&path, tampered).unwrap();

    let err = artifact::load(&path, &original.schema).unwrap_err();
    assert!(matches!(err, PricingError::ArtifactCorrupted(_)));
}

#[test]
fn missing_sidecar_still_loads() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("price_model.json");
    let original = boosted_artifact();
    artifact::save(&original, &path).unwrap();
    fs::remove_file(sidecar_path(&path)).unwrap();

    assert!(artifact::load(&path, &original.schema).unwrap().is_some());
}

#[test]
fn schema_mismatch_is_rejected_on_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("price_model.json");
    let original = boosted_artifact();
    artifact::save(&original, &path).unwrap();

    let other = SchemaTag::expected(
        &NUMERIC,
        &ModelConfig {
            postcode_encoding: PostcodeEncoding::TargetMean,
            ..model_config(ModelKind::GradientBoosting)
        },
    );
    let err = artifact::load(&path, &other).unwrap_err();
    assert!(matches!(err, PricingError::SchemaMismatch { .. }));
}

#[test]
fn save_refuses_inconsistent_artifact() {
    let dir = tempdir().unwrap();
    let mut broken = network_artifact();
    broken.schema.model_kind = ModelKind::GradientBoosting;
    assert!(artifact::save(&broken, &dir.path().join("x.json")).is_err());
}
