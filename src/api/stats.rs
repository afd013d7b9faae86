//! Stats API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use super::handlers::{AppState, ErrorResponse};
use crate::analytics::StatsError;

#[derive(Serialize)]
struct TotalClicksResponse {
    total_clicks: i64,
}

/// Get click statistics for a link.
///
/// The literal id `total` short-circuits to an all-links clicks sum and
/// never touches the single-link lookup.
pub async fn link_stats(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Response {
    if raw_id == "total" {
        return match state.stats.total_across_links().await {
            Ok(total_clicks) => Json(TotalClicksResponse { total_clicks }).into_response(),
            Err(err) => {
                tracing::error!(error = %err, "failed to total clicks across links");
                internal_error()
            }
        };
    }

    let link_id = match crate::analytics::StatsAggregator::parse_link_id(&raw_id) {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "Invalid link id".to_string(),
                }),
            )
                .into_response();
        }
    };

    match state.stats.aggregate(link_id).await {
        Ok(report) => Json(report).into_response(),
        Err(StatsError::NotFound) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Link not found".to_string(),
            }),
        )
            .into_response(),
        Err(StatsError::InvalidId) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Invalid link id".to_string(),
            }),
        )
            .into_response(),
        Err(StatsError::Store(err)) => {
            tracing::error!(link_id, error = %err, "stats aggregation failed");
            internal_error()
        }
    }
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Internal server error".to_string(),
        }),
    )
        .into_response()
}
