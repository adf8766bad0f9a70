//! HTTP surface: prediction, raw data passthrough and health

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::HeaderValue;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use realty_price_core::config::{ModelKind, ServerConfig};
use realty_price_core::dataset::{read_raw_records, RawRecord};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::context::SharedContext;
use crate::errors::ApiError;

/// Listing fields of a prediction request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    #[serde(rename = "Rooms")]
    pub rooms: u32,
    #[serde(rename = "Type")]
    pub property_type: String,
    #[serde(rename = "Postcode")]
    pub postcode: u32,
    #[serde(rename = "Distance")]
    pub distance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub predicted_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_kind: ModelKind,
    pub artifact_hash: String,
    pub columns: Vec<String>,
}

pub fn build_router(context: SharedContext) -> Router {
    let cors = cors_layer(&context.config.server);
    Router::new()
        .route("/predict", post(handle_predict))
        .route("/data", get(handle_data))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

/// Configured origins with credentials; methods and headers are mirrored
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| {
            if origin.trim() == "*" {
                warn!("Ignoring wildcard CORS origin; credentials require explicit origins");
                return None;
            }
            match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin {:?}", origin);
                    None
                }
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

async fn handle_predict(
    State(context): State<SharedContext>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
    let predicted_price = context.predictor.predict_price(
        request.rooms,
        &request.property_type,
        request.postcode,
        request.distance,
    )?;
    Ok(Json(PredictResponse { predicted_price }))
}

/// Every CSV row as read from disk right now
async fn handle_data(State(context): State<SharedContext>) -> Result<Json<Vec<RawRecord>>, ApiError> {
    let path = context.dataset_path().to_path_buf();
    let records = tokio::task::spawn_blocking(move || read_raw_records(path)).await??;
    Ok(Json(records))
}

async fn handle_health(State(context): State<SharedContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        model_kind: context.schema().model_kind,
        artifact_hash: context.digest.clone(),
        columns: context.predictor.columns().to_vec(),
    })
}

/// Serve until Ctrl-C
pub async fn start_server(context: SharedContext) -> Result<()> {
    let server = &context.config.server;
    let addr: SocketAddr = format!("{}:{}", server.host, server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", server.host, server.port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind listener on {addr}"))?;
    info!("Listening on http://{}", addr);

    let app = build_router(context.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("price service terminated unexpectedly")
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(err) => {
            warn!("Failed to listen for shutdown signal: {}", err);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_skips_wildcard_origin() {
        let config = ServerConfig {
            allowed_origins: vec!["*".to_string(), "http://localhost:3000".to_string()],
            ..ServerConfig::default()
        };
        // AllowOrigin::list panics on "*"; building the layer must not
        let _layer = cors_layer(&config);
    }
}
