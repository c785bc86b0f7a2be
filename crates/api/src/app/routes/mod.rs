use axum::{routing::get, Router};

pub mod common;
pub mod orders;
pub mod promo_codes;
pub mod shipping;
pub mod system;
pub mod vendors;

/// Router for every endpoint.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .merge(promo_codes::router())
        .merge(shipping::router())
        .merge(orders::router())
        .merge(vendors::router())
}
