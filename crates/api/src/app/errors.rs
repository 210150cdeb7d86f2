use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use restock_core::DomainError;
use restock_infra::{ScanError, StoreError};

use crate::app::dto::ScanFailureResponse;

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::NotFound(key) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{key} not found")),
        StoreError::Conflict { .. } => json_error(StatusCode::CONFLICT, "conflict", err.to_string()),
        StoreError::Invalid { .. } => json_error(StatusCode::BAD_REQUEST, "validation_error", err.to_string()),
        StoreError::Transient(_) => json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", err.to_string()),
        StoreError::Poisoned => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", err.to_string()),
    }
}

pub fn scan_error_to_response(err: ScanError) -> axum::response::Response {
    let code = match &err {
        ScanError::Enumeration { .. } => "enumeration_error",
    };
    let body = ScanFailureResponse {
        error: code,
        message: err.to_string(),
        report: err.report().clone(),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
}

pub fn invalid_id(err: DomainError) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_id", err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
