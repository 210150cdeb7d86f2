use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};

use restock_core::InventoryKey;
use restock_infra::FrequencyStore;

use crate::app::{dto, errors, services::AppServices};

pub async fn get_frequency(
    Extension(services): Extension<Arc<AppServices>>,
    Path((tenant, product)): Path<(String, String)>,
) -> axum::response::Response {
    let key = match InventoryKey::parse(&product, &tenant) {
        Ok(k) => k,
        Err(e) => return errors::invalid_id(e),
    };

    match services.frequency.get(&key) {
        Ok(Some(record)) => (StatusCode::OK, Json(dto::FrequencyResponse::from(&record))).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", format!("no depletions recorded for {key}")),
        Err(e) => errors::store_error_to_response(e),
    }
}
