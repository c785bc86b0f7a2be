//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: the marketplace façade and vendor directory behind the API
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request bodies and response views
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<services::AppServices>) -> Router {
    routes::router().layer(Extension(services))
}
