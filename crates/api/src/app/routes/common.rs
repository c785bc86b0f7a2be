use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use bazaar_infra::DispatchError;

use crate::app::errors;

/// Render a façade result: `status` with the JSON value, or the mapped error.
pub fn respond<T>(status: StatusCode, result: Result<T, DispatchError>) -> axum::response::Response
where
    T: Serialize,
{
    match result {
        Ok(value) => (status, Json(value)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
