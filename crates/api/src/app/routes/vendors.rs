use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};

use bazaar_core::{VendorId, WithdrawalId};
use bazaar_infra::{DispatchError, VendorAccount};

use crate::app::dto;
use crate::app::routes::common::respond;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/vendors/:id", put(put_vendor))
        .route("/vendors/:id/balance", get(balance))
        .route("/vendors/:id/transactions", get(transactions))
        .route("/vendors/:id/statement", get(statement))
        .route("/vendors/:id/withdrawals", post(request_withdrawal).get(list_withdrawals))
        .route("/withdrawals/:id/decision", post(decide_withdrawal))
}

fn vendor_id(raw: &str) -> Result<VendorId, axum::response::Response> {
    dto::parse_id(raw)
}

/// Register a vendor or replace its commission rate and status.
pub async fn put_vendor(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::PutVendorRequest>,
) -> axum::response::Response {
    let vendor_id = match vendor_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let account = VendorAccount {
        vendor_id,
        commission_rate: body.commission_rate,
        status: body.status,
    };
    let result = services
        .vendors
        .upsert(account.clone())
        .map(|()| account)
        .map_err(DispatchError::from);
    if result.is_ok() {
        tracing::info!(%vendor_id, commission_rate = %body.commission_rate, status = ?body.status, "vendor account saved");
    }
    respond(StatusCode::OK, result)
}

pub async fn balance(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let vendor_id = match vendor_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services
        .market
        .vendor_balance(vendor_id)
        .map(|balance| dto::BalanceView { vendor_id, balance });
    respond(StatusCode::OK, result)
}

pub async fn transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let vendor_id = match vendor_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.market.vendor_transactions(vendor_id))
}

pub async fn statement(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let vendor_id = match vendor_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.market.vendor_statement(vendor_id))
}

pub async fn request_withdrawal(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::WithdrawalBody>,
) -> axum::response::Response {
    let vendor_id = match vendor_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services
        .market
        .request_withdrawal(vendor_id, body.amount, body.payout);
    respond(StatusCode::CREATED, result)
}

pub async fn list_withdrawals(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let vendor_id = match vendor_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.market.withdrawal_requests(vendor_id))
}

pub async fn decide_withdrawal(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::DecisionRequest>,
) -> axum::response::Response {
    let withdrawal_id: WithdrawalId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services
        .market
        .decide_withdrawal(withdrawal_id, body.decision, body.note);
    respond(StatusCode::OK, result)
}
