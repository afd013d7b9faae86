use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::analytics::StatsAggregator;
use crate::storage::Storage;

use super::handlers::{
    create_link, delete_link, get_link, health_check, list_links, AppState,
};
use super::stats::link_stats;

pub fn create_api_router(storage: Arc<dyn Storage>) -> Router {
    let state = Arc::new(AppState {
        stats: StatsAggregator::new(Arc::clone(&storage)),
        storage,
    });

    Router::new()
        .route("/health", get(health_check))
        .route("/api/links", post(create_link).get(list_links))
        .route("/api/links/{code}", get(get_link).delete(delete_link))
        .route("/api/stats/{link_id}", get(link_stats))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
