use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
};

use restock_core::TenantId;
use restock_infra::ScanScope;

use crate::app::{dto, errors, services::AppServices};

/// Run one scan-and-replenish cycle now.
pub async fn run_scan(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ScanQuery>,
) -> axum::response::Response {
    let scope = match query.tenant {
        Some(t) => match TenantId::new(t) {
            Ok(t) => ScanScope::Tenant(t),
            Err(e) => return errors::invalid_id(e),
        },
        None => ScanScope::All,
    };

    // Scans block on store and channel calls (and retry sleeps).
    let coordinator = services.coordinator.clone();
    let result = tokio::task::spawn_blocking(move || coordinator.scan(&scope)).await;

    match result {
        Ok(Ok(report)) => (StatusCode::OK, Json(report)).into_response(),
        Ok(Err(e)) => errors::scan_error_to_response(e),
        Err(e) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "scan_aborted", e.to_string()),
    }
}
