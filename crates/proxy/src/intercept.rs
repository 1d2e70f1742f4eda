//! Registry request handling: forward, rewrite, replay.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use npm_bisect_common::{Error, Result};
use npm_bisect_registry_schema::{collect_events, document, rewrite_document};
use serde_json::Value;
use tracing::{debug, warn};

use crate::server::ProxyState;

/// Accept value for the full metadata document, which carries a `time` map.
const FULL_METADATA_ACCEPT: &str = "application/json";
/// Accept value for the compact variant, which does not.
const INSTALL_VARIANT_ACCEPT: &str = "application/vnd.npm.install-v1+json";

const BODY_LIMIT_BYTES: usize = 64 * 1024 * 1024;

pub(crate) async fn handle(State(state): State<Arc<ProxyState>>, request: Request) -> Response {
    match intercept(&state, request).await {
        Ok(response) => response,
        Err(err) => {
            warn!("Registry intercept failed: {err}");
            (StatusCode::BAD_GATEWAY, err.to_string()).into_response()
        }
    }
}

async fn intercept(state: &ProxyState, request: Request) -> Result<Response> {
    let (parts, body) = request.into_parts();
    // The full inbound body must be in hand before any upstream I/O.
    let body = axum::body::to_bytes(body, BODY_LIMIT_BYTES)
        .await
        .map_err(|e| Error::Upstream(format!("failed to read request body: {e}")))?;

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .to_string();
    let wants_compact = header_contains(&parts.headers, header::ACCEPT, INSTALL_VARIANT_ACCEPT);

    let upstream = fetch_upstream(
        state,
        parts.method.clone(),
        &path_and_query,
        Some(&parts.headers),
        body.to_vec(),
    )
    .await?;
    let status = upstream.status();
    let upstream_headers = upstream.headers().clone();
    let body = upstream
        .bytes()
        .await
        .map_err(|e| Error::Upstream(format!("failed to read upstream body: {e}")))?
        .to_vec();

    if !header_contains(&upstream_headers, header::CONTENT_TYPE, "json") {
        return Ok(build_response(status, &upstream_headers, body, false));
    }
    let Ok(mut doc) = serde_json::from_slice::<Value>(&body) else {
        // Unparseable bodies pass through untouched; the install fails on
        // its own terms and aborts the run.
        return Ok(build_response(status, &upstream_headers, body, false));
    };

    if document::time_map(&doc).is_none() && wants_compact {
        // The compact variant the client asked for omits publish times even
        // when the upstream ignores our coerced Accept. Fetch the full
        // document and graft its time map in.
        debug!("Compact metadata for {path_and_query}; refetching full variant");
        let retry = fetch_upstream(state, Method::GET, &path_and_query, None, Vec::new()).await?;
        if retry.status().is_success() {
            if let Ok(full) = retry.json::<Value>().await {
                if let (Some(obj), Some(time)) = (doc.as_object_mut(), full.get("time")) {
                    obj.insert("time".to_string(), time.clone());
                }
            }
        }
    }

    let events = collect_events(&doc);
    if !events.is_empty() {
        record_events(state, events).await?;
    }

    if !rewrite_document(&mut doc, state.config.cutoff) {
        return Ok(build_response(status, &upstream_headers, body, false));
    }
    debug!("Rewrote metadata for {path_and_query} at cutoff {}", state.config.cutoff);
    let body = serde_json::to_vec(&doc)?;
    Ok(build_response(status, &upstream_headers, body, true))
}

/// Forward a request to the real registry.
///
/// With `client_headers`, the inbound request is replayed minus the headers
/// that would defeat rewriting (`Accept-Encoding`, `If-None-Match`) or that
/// belong to the proxy hop, and a compact `Accept` is coerced to the full
/// metadata variant. Without, a bare full-metadata fetch is issued (the
/// compact-variant retry).
async fn fetch_upstream(
    state: &ProxyState,
    method: Method,
    path_and_query: &str,
    client_headers: Option<&HeaderMap>,
    body: Vec<u8>,
) -> Result<reqwest::Response> {
    let url = format!(
        "{}{}",
        state.config.upstream.trim_end_matches('/'),
        path_and_query
    );

    let mut headers = HeaderMap::new();
    match client_headers {
        Some(inbound) => {
            for (name, value) in inbound {
                if skip_request_header(name.as_str()) {
                    continue;
                }
                headers.append(name.clone(), value.clone());
            }
            if header_contains(inbound, header::ACCEPT, INSTALL_VARIANT_ACCEPT) {
                headers.insert(header::ACCEPT, HeaderValue::from_static(FULL_METADATA_ACCEPT));
            }
        }
        None => {
            headers.insert(header::ACCEPT, HeaderValue::from_static(FULL_METADATA_ACCEPT));
        }
    }

    state
        .client
        .request(method, url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| Error::Upstream(e.to_string()))
}

async fn record_events(
    state: &ProxyState,
    events: Vec<npm_bisect_registry_schema::TimelineEvent>,
) -> Result<()> {
    if let Some(dir) = &state.config.timeline_dir {
        let seq = state.fragment_seq.fetch_add(1, Ordering::Relaxed);
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("events-{seq:04}.json"));
        tokio::fs::write(&path, serde_json::to_vec(&events)?).await?;
    }
    state.timeline.lock().await.extend(events);
    Ok(())
}

fn build_response(
    status: StatusCode,
    upstream_headers: &HeaderMap,
    body: Vec<u8>,
    rewritten: bool,
) -> Response {
    let body_len = body.len();
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    for (name, value) in upstream_headers {
        if skip_response_header(name.as_str(), rewritten) {
            continue;
        }
        response.headers_mut().append(name.clone(), value.clone());
    }
    if rewritten {
        // The edited body must stay consistent with its framing headers.
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(body_len));
        response
            .headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("close"));
    }
    response
}

fn header_contains(headers: &HeaderMap, name: header::HeaderName, needle: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains(needle))
}

fn skip_request_header(lowercase_name: &str) -> bool {
    matches!(
        lowercase_name,
        "host" | "content-length" | "accept-encoding" | "if-none-match"
    ) || is_hop_by_hop(lowercase_name)
}

fn skip_response_header(lowercase_name: &str, rewritten: bool) -> bool {
    lowercase_name == "content-length"
        || (rewritten && lowercase_name == "content-encoding")
        || is_hop_by_hop(lowercase_name)
}

fn is_hop_by_hop(lowercase_name: &str) -> bool {
    matches!(
        lowercase_name,
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}
