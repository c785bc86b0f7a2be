use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use bazaar_core::{DomainError, ErrorKind};
use bazaar_infra::DispatchError;

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::PolicyViolation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::ConcurrencyConflict => StatusCode::CONFLICT,
        ErrorKind::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    let kind = err.kind();
    if kind == ErrorKind::Infrastructure {
        tracing::error!(code = err.code(), error = %err, "request failed");
    }
    json_error(status_for(kind), kind, err.code(), err.to_string())
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    dispatch_error_to_response(err.into())
}

pub fn json_error(
    status: StatusCode,
    kind: ErrorKind,
    code: &str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": kind.as_str(),
            "code": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
