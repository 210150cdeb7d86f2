use axum::{
    Router,
    routing::{get, post},
};

pub mod frequency;
pub mod inventory;
pub mod restock;
pub mod scan;
pub mod system;

/// Router for every endpoint except `/health`.
pub fn router() -> Router {
    Router::new()
        .route("/scan", post(scan::run_scan))
        .route("/restock/batch", post(restock::handle_batch))
        .nest("/inventory", inventory::router())
        .route("/frequency/:tenant/:product", get(frequency::get_frequency))
}
