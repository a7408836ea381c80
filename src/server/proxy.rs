use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use super::error::AppError;
use super::state::AppState;

/// Largest request body forwarded to the backend.
pub const MAX_FORWARD_BODY: usize = 10 * 1024 * 1024;

/// Headers that describe a single hop and must not be forwarded.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "host",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Forward an `/api/...` request to the backend.
///
/// Mounted as: /api/{*path}
///
/// The request goes to `{backend_url}{path}?{query}` with method, headers
/// and body preserved. The backend's response streams back unchanged.
pub async fn forward_to_backend(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, AppError> {
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let target_url = format!("{}{}", state.backend_url(), path_and_query);

    let method = request.method().clone();
    let headers = forwardable_headers(request.headers());
    let body_bytes = axum::body::to_bytes(request.into_body(), MAX_FORWARD_BODY)
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read request body: {}", e)))?;

    log::debug!("[Proxy] {} {}", method, target_url);

    let mut outgoing = state.http().request(method, &target_url).headers(headers);
    if !body_bytes.is_empty() {
        outgoing = outgoing.body(body_bytes);
    }

    let response = outgoing.send().await.map_err(|e| {
        log::warn!("[Proxy] Failed to reach backend at {}: {}", target_url, e);
        AppError::from(e)
    })?;

    let status = StatusCode::from_u16(response.status().as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let response_headers = forwardable_headers(response.headers());
    let body = Body::from_stream(response.bytes_stream());

    Ok((status, response_headers, body).into_response())
}

/// Copy `headers` minus the hop-by-hop ones.
fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        // HeaderName::as_str is always lowercase
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderValue};

    #[test]
    fn strips_hop_by_hop_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("localhost:8619"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer civitai"));

        let out = forwardable_headers(&headers);

        assert_eq!(out.len(), 2);
        assert!(out.contains_key(header::CONTENT_TYPE));
        assert!(out.contains_key(header::AUTHORIZATION));
    }
}
