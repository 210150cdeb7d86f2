use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use restock_core::InventoryKey;
use restock_infra::{InventoryStore, RetryPolicy, ingest_lines};

use crate::app::{dto, errors, services::AppServices};

pub fn router() -> Router {
    Router::new()
        .route("/ingest", post(ingest))
        .route("/:tenant/:product", get(get_record))
}

/// Upsert `ProductId:TenantId:Category:Stock` lines extracted from a document.
pub async fn ingest(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::IngestRequest>,
) -> axum::response::Response {
    // Store writes block, and transient failures back off between attempts.
    let inventory = services.inventory.clone();
    let result = tokio::task::spawn_blocking(move || {
        ingest_lines(&inventory, &body.lines, &RetryPolicy::default())
    })
    .await;

    match result {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "ingest_aborted", e.to_string()),
    }
}

pub async fn get_record(
    Extension(services): Extension<Arc<AppServices>>,
    Path((tenant, product)): Path<(String, String)>,
) -> axum::response::Response {
    let key = match InventoryKey::parse(&product, &tenant) {
        Ok(k) => k,
        Err(e) => return errors::invalid_id(e),
    };

    match services.inventory.get(&key) {
        Ok(Some(record)) => (StatusCode::OK, Json(dto::InventoryResponse::from(&record))).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", format!("{key} not found")),
        Err(e) => errors::store_error_to_response(e),
    }
}
