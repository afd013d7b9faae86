use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::analytics::StatsAggregator;
use crate::models::{CreateLinkRequest, Link};
use crate::storage::{Storage, StorageError};

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub stats: StatsAggregator,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Generate a random short code
fn generate_short_code() -> String {
    use rand::RngExt;
    let mut rng = rand::rng();
    let num: u64 = rng.random_range(100_000_000..10_000_000_000);
    base62::encode(num)
}

fn is_valid_custom_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= 20
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Prefix a scheme when the caller left it off, as the original service did
fn normalize_url(url: &str) -> String {
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

/// Create a new link
pub async fn create_link(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateLinkRequest>,
) -> Result<(StatusCode, Json<Link>), (StatusCode, Json<ErrorResponse>)> {
    if payload.url.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "URL cannot be empty".to_string(),
            }),
        ));
    }

    let original_url = normalize_url(payload.url.trim());

    if let Some(custom) = payload.custom_code {
        if !is_valid_custom_code(&custom) {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "Custom code must be 1-20 characters (alphanumeric, '-', '_')"
                        .to_string(),
                }),
            ));
        }

        return match state.storage.create_with_code(&custom, &original_url).await {
            Ok(link) => Ok((StatusCode::CREATED, Json(link))),
            Err(StorageError::Conflict) => Err((
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: "Short code already exists".to_string(),
                }),
            )),
            Err(StorageError::Other(err)) => {
                tracing::error!(error = %err, "failed to create link");
                Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: "Internal server error".to_string(),
                    }),
                ))
            }
        };
    }

    // Generated codes can collide; retry a few times before giving up
    for _ in 0..10 {
        let code = generate_short_code();
        match state.storage.create_with_code(&code, &original_url).await {
            Ok(link) => return Ok((StatusCode::CREATED, Json(link))),
            Err(StorageError::Conflict) => continue,
            Err(StorageError::Other(err)) => {
                tracing::error!(error = %err, "failed to create link");
                return Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: "Internal server error".to_string(),
                    }),
                ));
            }
        }
    }

    Err((
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Failed to generate a unique short code".to_string(),
        }),
    ))
}

/// Get a link by short code
pub async fn get_link(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<Link>, (StatusCode, Json<ErrorResponse>)> {
    match state.storage.find_by_code(&code).await {
        Ok(Some(link)) => Ok(Json(link)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Link not found".to_string(),
            }),
        )),
        Err(err) => {
            tracing::error!(error = %err, "failed to get link");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Internal server error".to_string(),
                }),
            ))
        }
    }
}

/// List links, newest first
pub async fn list_links(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Link>>, (StatusCode, Json<ErrorResponse>)> {
    let limit = query.limit.clamp(1, 1000);
    let offset = query.offset.max(0);

    match state.storage.list(limit, offset).await {
        Ok(links) => Ok(Json(links)),
        Err(err) => {
            tracing::error!(error = %err, "failed to list links");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Internal server error".to_string(),
                }),
            ))
        }
    }
}

/// Delete a link by id and purge its click history
pub async fn delete_link(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Json<SuccessResponse>, (StatusCode, Json<ErrorResponse>)> {
    let id = raw_id.parse::<i64>().map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Invalid link id".to_string(),
            }),
        )
    })?;

    match state.storage.delete(id).await {
        Ok(true) => Ok(Json(SuccessResponse {
            message: "Link deleted successfully".to_string(),
        })),
        Ok(false) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Link not found".to_string(),
            }),
        )),
        Err(err) => {
            tracing::error!(error = %err, "failed to delete link");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Internal server error".to_string(),
                }),
            ))
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> Json<SuccessResponse> {
    Json(SuccessResponse {
        message: "OK".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_url_adds_scheme_when_missing() {
        assert_eq!(normalize_url("example.com"), "http://example.com");
        assert_eq!(normalize_url("https://example.com"), "https://example.com");
        assert_eq!(normalize_url("HTTP://example.com"), "HTTP://example.com");
    }

    #[test]
    fn custom_code_validation() {
        assert!(is_valid_custom_code("my-code_1"));
        assert!(!is_valid_custom_code(""));
        assert!(!is_valid_custom_code("way-too-long-for-a-short-code"));
        assert!(!is_valid_custom_code("no/slashes"));
    }

    #[test]
    fn generated_codes_are_base62() {
        let code = generate_short_code();
        assert!(!code.is_empty());
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
