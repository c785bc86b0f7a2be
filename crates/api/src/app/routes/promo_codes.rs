use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use crate::app::dto;
use crate::app::routes::common::respond;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/promo-codes", post(create_promo_code))
        .route("/promo-codes/evaluate", post(evaluate_promo_code))
        .route("/promo-codes/:code", get(get_promo_code))
        .route("/promo-codes/:code/activate", post(activate_promo_code))
        .route("/promo-codes/:code/deactivate", post(deactivate_promo_code))
}

pub async fn create_promo_code(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreatePromoCodeRequest>,
) -> axum::response::Response {
    let result = services
        .market
        .create_promo_code(&body.code, body.terms, body.is_active)
        .map(|p| dto::PromoCodeView::from(&p));
    respond(StatusCode::CREATED, result)
}

pub async fn get_promo_code(
    Extension(services): Extension<Arc<AppServices>>,
    Path(code): Path<String>,
) -> axum::response::Response {
    let result = services.market.promo_code(&code).map(|p| dto::PromoCodeView::from(&p));
    respond(StatusCode::OK, result)
}

/// Preview a discount; records no usage.
pub async fn evaluate_promo_code(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::EvaluatePromoRequest>,
) -> axum::response::Response {
    let now = body.now.unwrap_or_else(Utc::now);
    let result = services
        .market
        .evaluate_promo_code(&body.code, body.subtotal, body.user_id, now);
    respond(StatusCode::OK, result)
}

pub async fn activate_promo_code(
    Extension(services): Extension<Arc<AppServices>>,
    Path(code): Path<String>,
) -> axum::response::Response {
    set_active(&services, &code, true)
}

pub async fn deactivate_promo_code(
    Extension(services): Extension<Arc<AppServices>>,
    Path(code): Path<String>,
) -> axum::response::Response {
    set_active(&services, &code, false)
}

fn set_active(services: &AppServices, code: &str, is_active: bool) -> axum::response::Response {
    let result = services
        .market
        .set_promo_code_active(code, is_active)
        .map(|p| dto::PromoCodeView::from(&p));
    respond(StatusCode::OK, result)
}
