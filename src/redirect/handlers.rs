use axum::{
    extract::{ConnectInfo, Path, State},
    http::{
        header::{HeaderMap, HeaderValue, LOCATION, USER_AGENT},
        StatusCode,
    },
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

use super::middleware::RequestStart;
use crate::analytics::{extract_client_ip, ClickRecorder};
use crate::config::AnalyticsConfig;
use crate::storage::Storage;

pub struct RedirectState {
    pub storage: Arc<dyn Storage>,
    pub recorder: Arc<ClickRecorder>,
    pub analytics: AnalyticsConfig,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Resolve a short code and redirect to its destination.
///
/// The click is recorded on a spawned task after the response is built, so
/// redirect latency never includes enrichment or the bucket write, and a
/// recording failure cannot turn a valid redirect into an error.
pub async fn redirect_url(
    State(state): State<Arc<RedirectState>>,
    Path(code): Path<String>,
    Extension(RequestStart(request_start)): Extension<RequestStart>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    match state.storage.find_by_code(&code).await {
        Ok(Some(link)) => {
            let Ok(location) = HeaderValue::from_str(&link.original_url) else {
                tracing::error!(short_code = %code, "stored destination is not a valid header value");
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
            };

            let client_ip = extract_client_ip(&headers, addr.ip(), &state.analytics);
            let user_agent = headers
                .get(USER_AGENT)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            state.recorder.spawn_record(link.id, client_ip, user_agent);

            let mut response_headers = HeaderMap::new();
            response_headers.insert(LOCATION, location);
            if let Ok(timing) =
                HeaderValue::from_str(&request_start.elapsed().as_millis().to_string())
            {
                response_headers.insert("x-tally-timing-ms", timing);
            }

            // 302 Found, matching what clients of the original service expect
            (StatusCode::FOUND, response_headers).into_response()
        }
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Link not found"),
        Err(err) => {
            tracing::error!(short_code = %code, error = %err, "redirect lookup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
    }

    Json(HealthResponse {
        status: "OK".to_string(),
    })
}
