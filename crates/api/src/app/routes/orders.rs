use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use bazaar_core::{OrderId, VendorId};

use crate::app::dto;
use crate::app::routes::common::respond;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/orders/price", post(price_order))
        .route("/orders", post(place_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/transition", post(transition_order))
        .route("/orders/:id/vendors/:vendor_id/transition", post(transition_vendor_order))
}

pub async fn price_order(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::PriceOrderRequest>,
) -> axum::response::Response {
    let result = services.market.price_order(
        body.customer_id,
        &body.items,
        body.promo_code.as_deref(),
        &body.shipping,
    );
    respond(StatusCode::OK, result)
}

/// Place an order. Resubmitting the same order id returns the placed order.
pub async fn place_order(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::PlaceOrderRequest>,
) -> axum::response::Response {
    let result = services
        .market
        .place_order(
            body.order_id,
            body.customer_id,
            &body.items,
            body.promo_code.as_deref(),
            &body.shipping,
        )
        .map(|o| dto::OrderView::from(&o));
    respond(StatusCode::CREATED, result)
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services.market.get_order(order_id).map(|o| dto::OrderView::from(&o));
    respond(StatusCode::OK, result)
}

pub async fn transition_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::TransitionRequest>,
) -> axum::response::Response {
    let order_id: OrderId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services
        .market
        .transition_order(order_id, body.status)
        .map(|o| dto::OrderView::from(&o));
    respond(StatusCode::OK, result)
}

pub async fn transition_vendor_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, vendor_id)): Path<(String, String)>,
    Json(body): Json<dto::TransitionRequest>,
) -> axum::response::Response {
    let order_id: OrderId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let vendor_id: VendorId = match dto::parse_id(&vendor_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services
        .market
        .transition_vendor_order(order_id, vendor_id, body.status)
        .map(|o| dto::OrderView::from(&o));
    respond(StatusCode::OK, result)
}
