//! Realty price service
//!
//! Serves single-listing price predictions over HTTP from a model loaded
//! (or trained) once at startup.

pub mod context;
pub mod errors;
pub mod server;

pub use context::{PricingContext, SharedContext};
pub use errors::{ApiError, ServiceError};
pub use server::{build_router, start_server, HealthResponse, PredictRequest, PredictResponse};

/// Service version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
