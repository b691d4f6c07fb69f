//! Streaming reverse proxy to the active worker
//!
//! Every inbound request resolves the active worker through the registry,
//! is forwarded to `http://<worker>:<port><path>` with method, headers and
//! body intact, and the response is streamed back verbatim. The in-flight
//! guard obtained from the registry is held until the response body stream
//! is fully consumed (or dropped), so the drain step of a rotation sees the
//! true request lifetime.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;

use crate::api::AppState;

// Connection-level headers that must not be forwarded; the HTTP layers on
// either side own message framing.
const SKIP_HEADERS: [&str; 5] = [
    "host",
    "connection",
    "transfer-encoding",
    "content-length",
    "keep-alive",
];

fn skip_header(name: &str) -> bool {
    SKIP_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Forward one request to the active worker and stream the response back
pub async fn forward(State(state): State<AppState>, req: Request) -> Response {
    let guard = state.registry.active();

    let path_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let url = format!("http://{}:{}{}", guard.name(), state.worker_port, path_query);

    // axum and reqwest sit on different `http` major versions here, so
    // method and headers cross the boundary by value.
    let method = match reqwest::Method::from_bytes(req.method().as_str().as_bytes()) {
        Ok(method) => method,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create upstream request");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create new request")
                .into_response();
        }
    };

    let mut outbound = state.client.request(method, &url);
    for (name, value) in req.headers() {
        if skip_header(name.as_str()) {
            continue;
        }
        outbound = outbound.header(name.as_str(), value.as_bytes());
    }
    outbound = outbound.body(reqwest::Body::wrap_stream(
        req.into_body().into_data_stream(),
    ));

    let upstream = match outbound.send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(worker = %guard.name(), url = %url, error = %e, "Failed to reach worker");
            return (StatusCode::BAD_GATEWAY, "Failed to forward request").into_response();
        }
    };

    let status = StatusCode::from_u16(upstream.status().as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = Response::builder().status(status);
    for (name, value) in upstream.headers() {
        if skip_header(name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            builder = builder.header(name, value);
        }
    }

    // The guard moves into the stream so the in-flight count stays up for
    // the whole response body, not just this handler call.
    let body = upstream.bytes_stream().map(move |chunk| {
        let _ = &guard;
        chunk
    });

    match builder.body(Body::from_stream(body)) {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Failed to assemble proxied response");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to forward request").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_header_is_case_insensitive() {
        assert!(skip_header("Host"));
        assert!(skip_header("CONNECTION"));
        assert!(skip_header("content-length"));
        assert!(!skip_header("content-type"));
        assert!(!skip_header("authorization"));
    }
}
