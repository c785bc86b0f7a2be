use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use bazaar_core::ShippingZoneId;

use crate::app::{dto, errors};
use crate::app::routes::common::respond;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/shipping/zones", post(create_zone))
        .route("/shipping/zones/:id", get(get_zone).delete(delete_zone))
        .route("/shipping/zones/:id/methods", post(add_method))
        .route("/shipping/quote", post(quote))
}

pub async fn create_zone(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateZoneRequest>,
) -> axum::response::Response {
    let result = services
        .market
        .create_shipping_zone(&body.name, body.is_active)
        .map(|z| dto::ShippingZoneView::from(&z));
    respond(StatusCode::CREATED, result)
}

pub async fn get_zone(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let zone_id: ShippingZoneId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services
        .market
        .shipping_zone(zone_id)
        .map(|z| dto::ShippingZoneView::from(&z));
    respond(StatusCode::OK, result)
}

/// Only zones without methods can be deleted.
pub async fn delete_zone(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let zone_id: ShippingZoneId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.market.delete_shipping_zone(zone_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn add_method(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::AddMethodRequest>,
) -> axum::response::Response {
    let zone_id: ShippingZoneId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services
        .market
        .add_shipping_method(zone_id, body.terms, body.is_active);
    respond(StatusCode::CREATED, result)
}

pub async fn quote(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::QuoteRequest>,
) -> axum::response::Response {
    let result = services
        .market
        .compute_shipping_cost(body.zone_id, body.method_id, body.subtotal, body.weight);
    respond(StatusCode::OK, result)
}
