//! Axum HTTP API server for subtitle sync jobs.
//!
//! This crate provides:
//! - Multipart job submission with streamed, size-limited uploads
//! - Status polling and result/backup downloads
//! - Health, readiness and Prometheus endpoints
//! - Request id, logging and security header middleware

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
