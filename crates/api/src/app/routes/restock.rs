use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use crate::app::{dto, errors, services::AppServices};

/// Apply a batch of raw restock messages.
///
/// The caller owns delivery: ids listed under `retry` should be redelivered,
/// everything else can be acknowledged.
pub async fn handle_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RestockBatchRequest>,
) -> axum::response::Response {
    let updater = services.updater.clone();
    let result = tokio::task::spawn_blocking(move || updater.handle_batch(&body.messages).0).await;

    match result {
        Ok(report) => (StatusCode::OK, Json(dto::RestockBatchResponse::from(report))).into_response(),
        Err(e) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "batch_aborted", e.to_string()),
    }
}
