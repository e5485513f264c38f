use axum::{
    extract::{ConnectInfo, Path, RawQuery, State},
    http::{
        header::{self, HeaderMap, HeaderValue},
        StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use super::middleware::RequestStart;
use super::orchestrator::{RedirectRequest, RedirectService};
use crate::analytics::extract_client_ip;
use crate::config::AnalyticsConfig;
use crate::error::AppError;
use crate::models::RedirectKind;

pub struct RedirectState {
    pub service: Arc<RedirectService>,
    pub analytics: AnalyticsConfig,
}

/// Resolve `/{code}` on the request's host and redirect the visitor
pub async fn redirect_url(
    State(state): State<Arc<RedirectState>>,
    Path(code): Path<String>,
    Extension(RequestStart(request_start)): Extension<RequestStart>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    RawQuery(raw_query): RawQuery,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let request = RedirectRequest {
        host: request_host(&headers, &uri),
        short_code: code,
        client_ip: extract_client_ip(&headers, addr.ip(), &state.analytics),
        user_agent: header_str(&headers, header::USER_AGENT).unwrap_or_default(),
        referrer: header_str(&headers, header::REFERER),
        query: parse_query(raw_query.as_deref()),
    };

    let outcome = match state.service.resolve(request).await {
        Ok(outcome) => outcome,
        Err(err) => return err.into_response(),
    };

    let location = match HeaderValue::from_str(&outcome.location) {
        Ok(value) => value,
        Err(err) => {
            return AppError::Internal(anyhow::anyhow!(
                "destination is not a valid header value: {err}"
            ))
            .into_response()
        }
    };

    let status = match outcome.kind {
        RedirectKind::Permanent => StatusCode::MOVED_PERMANENTLY,
        RedirectKind::Temporary => StatusCode::FOUND,
    };

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::LOCATION, location);
    response_headers.insert(
        "x-trackr-cache-hit",
        HeaderValue::from_static(if outcome.cache_hit { "true" } else { "false" }),
    );
    let total_ms = u64::try_from(request_start.elapsed().as_millis()).unwrap_or(u64::MAX);
    response_headers.insert("x-trackr-timing-total-ms", HeaderValue::from(total_ms));

    (status, response_headers).into_response()
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

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

// HTTP/2 requests carry the host in the URI authority instead of a Host header
fn request_host(headers: &HeaderMap, uri: &Uri) -> String {
    header_str(headers, header::HOST)
        .or_else(|| uri.authority().map(|authority| authority.to_string()))
        .unwrap_or_default()
}

/// First value wins for repeated keys; malformed pairs are skipped by the decoder.
fn parse_query(raw: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(raw) = raw {
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            params
                .entry(key.into_owned())
                .or_insert_with(|| value.into_owned());
        }
    }
    params
}
