//! Relay routes.
//!
//! Performs the real cross-origin fetch on the player's behalf and streams
//! the response back same-origin with permissive CORS headers. Two forms:
//! `GET /relay?url=<pct-url>` and the safe-path form
//! `GET /relay/<prefix>/<pct-url>` gated by configuration.

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::TryStreamExt;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

const UPSTREAM_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// Segments are immutable once published, so relayed responses can be cached
/// aggressively.
const SEGMENT_CACHE_CONTROL: &str = "public, max-age=31536000";

#[derive(Debug, Deserialize)]
pub struct RelayQuery {
    pub url: Option<String>,
}

/// Create the relay router. Only GET/HEAD/OPTIONS are routed; anything else
/// answers 405.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(relay_query).options(relay_options))
        .route("/{*path}", get(relay_path).options(relay_options))
}

fn cors_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, HEAD, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Origin, Content-Type, Accept, Range"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("Content-Length, Content-Range, Accept-Ranges"),
    );
    headers
}

async fn relay_options() -> impl IntoResponse {
    (StatusCode::NO_CONTENT, cors_headers())
}

/// Query form: `GET /relay?url=<percent-encoded-url>`.
async fn relay_query(
    State(state): State<AppState>,
    Query(query): Query<RelayQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let url = query
        .url
        .filter(|candidate| !candidate.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("URL parameter is required"))?;
    fetch_upstream(&state, &url, &headers).await
}

/// Path form: `GET /relay/<safe-prefix>/<percent-encoded-url>`.
///
/// With safe-path mode enabled, the prefix acts as an allow-list: requests
/// outside it are rejected before any upstream fetch happens.
async fn relay_path(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    if path.trim().is_empty() {
        return Err(ApiError::bad_request("URL is required"));
    }

    let remainder = if state.config.enable_safe_path {
        let prefix = state.config.safe_path_prefix.as_deref().unwrap_or_default();
        match path.strip_prefix(&format!("{prefix}/")) {
            Some(rest) if !rest.is_empty() => rest.to_string(),
            _ => {
                warn!(%path, "Rejected relay path outside the safe prefix");
                return Err(ApiError::forbidden("Invalid relay path"));
            }
        }
    } else {
        path
    };

    let url = decode_target(&remainder)?;
    fetch_upstream(&state, &url, &headers).await
}

/// The router percent-decodes captured path segments; a client that encoded
/// the target URL once arrives here already decoded. Decode a second time
/// only when the remainder clearly is still encoded.
fn decode_target(remainder: &str) -> ApiResult<String> {
    if remainder.contains("://") {
        return Ok(remainder.to_string());
    }
    match urlencoding::decode(remainder) {
        Ok(decoded) => Ok(decoded.into_owned()),
        Err(e) => Err(ApiError::bad_request(format!("Invalid relay path: {e}"))),
    }
}

/// Fetch `url` upstream and stream the response through without buffering.
async fn fetch_upstream(
    state: &AppState,
    url: &str,
    inbound: &HeaderMap,
) -> ApiResult<Response> {
    let target =
        url::Url::parse(url).map_err(|e| ApiError::bad_request(format!("Invalid url: {e}")))?;
    match target.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ApiError::bad_request(format!(
                "Only http/https URLs are allowed, got `{other}`"
            )));
        }
    }

    let mut upstream_headers = reqwest::header::HeaderMap::new();
    upstream_headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_static(UPSTREAM_USER_AGENT),
    );
    upstream_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));

    // Forward Range for partial-content segment streaming.
    if let Some(range) = inbound.get(header::RANGE)
        && let Ok(value) = range.to_str()
        && let Ok(value) = HeaderValue::from_str(value)
    {
        upstream_headers.insert(reqwest::header::RANGE, value);
    }

    debug!(url = %target, "Relaying upstream fetch");

    let upstream = state
        .client
        .get(target.clone())
        .headers(upstream_headers)
        .send()
        .await
        .map_err(|e| {
            warn!(url = %target, error = %e, "Upstream fetch failed");
            ApiError::upstream(format!("Failed to fetch resource: {e}"))
        })?;

    let status = upstream.status();
    if !status.is_success() {
        // Content error, not a transport error: the caller must not retry
        // against the relay for this.
        warn!(url = %target, %status, "Upstream returned non-success status");
        return Err(ApiError::upstream(format!(
            "Upstream request failed with status {status}"
        )));
    }

    let mut out_headers = cors_headers();
    out_headers.insert(
        header::CONTENT_TYPE,
        upstream
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream")),
    );
    for key in [
        header::CONTENT_LENGTH,
        header::CONTENT_RANGE,
        header::ACCEPT_RANGES,
    ] {
        if let Some(value) = upstream.headers().get(key.as_str()) {
            out_headers.insert(key, value.clone());
        }
    }
    out_headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(SEGMENT_CACHE_CONTROL),
    );

    // Stream the upstream body through; large segments must never be fully
    // buffered in the relay.
    let stream = upstream.bytes_stream().map_err(std::io::Error::other);
    let body = axum::body::Body::from_stream(stream);

    let mut response = (status, body).into_response();
    *response.headers_mut() = out_headers;
    Ok(response)
}
