//! The Request Router (§4.1): auth, backend selection, URL rewrite,
//! header scrub, interceptor install, streaming-transparent proxy.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Extension, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::interceptor::{self, sse::ShadowStream};
use crate::middleware::auth::KeyIdentity;
use crate::state::AppState;

/// Headers stripped before forwarding upstream (§4.1 step 5): hop-by-hop
/// and reverse-proxy forwarding headers that would otherwise leak
/// infrastructure details to the upstream or confuse it.
const SCRUBBED_HEADERS: &[&str] = &[
    "x-forwarded-for",
    "x-forwarded-host",
    "x-forwarded-port",
    "x-forwarded-proto",
    "x-forwarded-scheme",
    "x-real-ip",
    "x-request-id",
    "x-scheme",
    "forwarded",
    "via",
    "client-ip",
    "host",
    "backend",
    "content-length",
];

struct Backend {
    base_url: String,
}

/// §4.1 step 3 — resolve the backend base URL and auth header from the
/// `Backend:` request header (falling back to config), attaching the
/// shared upstream secret. There is no per-backend credential table
/// (§4.1's implementation note): the same `AZURE_API_KEY` secret is
/// reused regardless of which backend is selected.
fn resolve_backend(
    config: &crate::config::Config,
    requested: Option<&str>,
) -> Result<(Backend, HeaderName, HeaderValue), AppError> {
    let name = requested.unwrap_or(&config.default_backend);

    match name {
        "azure" => {
            let value = HeaderValue::from_str(&config.azure_api_key)
                .map_err(|_| AppError::BadRequest("invalid AZURE_API_KEY".into()))?;
            Ok((
                Backend { base_url: config.azure_base() },
                HeaderName::from_static("api-key"),
                value,
            ))
        }
        "openai" => {
            let value = HeaderValue::from_str(&format!("Bearer {}", config.azure_api_key))
                .map_err(|_| AppError::BadRequest("invalid upstream secret".into()))?;
            Ok((
                Backend { base_url: "https://api.openai.com".to_string() },
                header::AUTHORIZATION,
                value,
            ))
        }
        "openrouter" => {
            let value = HeaderValue::from_str(&format!("Bearer {}", config.azure_api_key))
                .map_err(|_| AppError::BadRequest("invalid upstream secret".into()))?;
            Ok((
                Backend { base_url: "https://openrouter.ai/api".to_string() },
                header::AUTHORIZATION,
                value,
            ))
        }
        other => Err(AppError::BadRequest(format!("unsupported backend \"{other}\""))),
    }
}

/// Slash-collapsing join: exactly one `/` separates `base` and `path`.
fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{path}")
    }
}

fn is_sse_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/event-stream") || v.starts_with("text/event"))
        .unwrap_or(false)
}

/// Copies headers from an upstream `reqwest::Response` to the outgoing
/// Axum response, skipping ones that don't make sense to forward
/// verbatim (length/encoding are recomputed by the body we construct).
fn copy_upstream_headers(from: &reqwest::header::HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from.iter() {
        if matches!(
            name.as_str(),
            "content-length" | "transfer-encoding" | "connection"
        ) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            to.append(name, value);
        }
    }
}

fn bad_request(message: impl Into<String>) -> Response {
    AppError::BadRequest(message.into()).into_response()
}

/// §4.1 — handles any `/api/*` request other than the Models Endpoint
/// short-circuit (routed separately in `routes::models`).
async fn proxy_request(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<KeyIdentity>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, Response> {
    let requested_backend = headers
        .get("backend")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let (backend, auth_header_name, auth_header_value) =
        resolve_backend(&state.config, requested_backend.as_deref())
            .map_err(IntoResponse::into_response)?;

    let residual_path = uri.path();
    let mut url = join_url(&backend.base_url, residual_path);
    if let Some(query) = uri.query() {
        url.push('?');
        url.push_str(query);
    }

    let mut upstream_req = state.http_client.request(method, &url);

    let mut forward_headers = HeaderMap::new();
    for (name, value) in headers.iter() {
        if SCRUBBED_HEADERS.contains(&name.as_str()) || name == header::AUTHORIZATION {
            continue;
        }
        forward_headers.append(name.clone(), value.clone());
    }
    forward_headers.insert(auth_header_name, auth_header_value);

    upstream_req = upstream_req.headers(forward_headers);
    if !body.is_empty() {
        upstream_req = upstream_req.body(body);
    }

    let upstream_resp = upstream_req.send().await.map_err(|e| {
        tracing::error!("upstream request to {} failed: {}", url, e);
        bad_request("upstream request failed")
    })?;

    let status =
        StatusCode::from_u16(upstream_resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let upstream_headers = upstream_resp.headers().clone();

    if is_sse_content_type(&upstream_headers) {
        let (tx, rx) = mpsc::unbounded_channel();
        let raw_stream = upstream_resp.bytes_stream();
        let shadow = ShadowStream::new(Box::pin(raw_stream), tx);

        interceptor::spawn_sse_worker(rx, state.usage_sink.clone(), Some(identity.key_id));

        let mut response = Response::builder()
            .status(status)
            .body(Body::from_stream(shadow))
            .unwrap();
        copy_upstream_headers(&upstream_headers, response.headers_mut());
        Ok(response)
    } else {
        let bytes = upstream_resp.bytes().await.map_err(|e| {
            tracing::error!("failed reading upstream response: {}", e);
            bad_request("failed reading upstream response")
        })?;

        interceptor::intercept_non_streaming(&bytes, Some(identity.key_id), state.usage_sink.as_ref());

        let mut response = Response::builder()
            .status(status)
            .body(Body::from(bytes))
            .unwrap();
        copy_upstream_headers(&upstream_headers, response.headers_mut());
        Ok(response)
    }
}

/// Handler for any request axum couldn't route through its typed
/// method/path handlers (kept so `body: Bytes` extraction never fights
/// the router over an unsupported method).
async fn proxy_any(
    state: State<Arc<AppState>>,
    identity: Extension<KeyIdentity>,
    req: Request,
) -> Result<Response, Response> {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let headers = req.headers().clone();
    let body = axum::body::to_bytes(req.into_body(), usize::MAX)
        .await
        .map_err(|_| bad_request("failed reading request body"))?;

    proxy_request(state, identity, method, uri, headers, body).await
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/{*rest}", any(proxy_any))
}
