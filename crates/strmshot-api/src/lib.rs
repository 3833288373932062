//! Axum HTTP/WebSocket API server.
//!
//! This crate provides:
//! - Directory scanning for `.strm` sources
//! - The streaming batch endpoint (`/ws/batch`)
//! - Queue and cache introspection
//! - Bearer token gate, security headers and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod ws;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
