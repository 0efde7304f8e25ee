//! The frontend's HTTP surface: the two compression routes plus the ambient
//! health/tracing/CORS middleware every production binary in this workspace
//! carries.

use std::time::{Duration, Instant};

use axum::extract::{Path, Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bus::{COMPRESSION_RESPONSE_ROUTING_KEY, COMPRESS_ROUTING_KEY, DECOMPRESSION_RESPONSE_ROUTING_KEY, DECOMPRESS_ROUTING_KEY, Outbound};
use compression_core::{CoreError, RequestBody, RequestKind};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::state::AppState;

/// Request bodies on this service are small JSON requests; this only
/// bounds the request side, not the decompressed archive the frontend
/// reads back and returns.
const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(110);

pub fn router(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/health", get(health))
        .route("/v1/compression/compress/{bucket}/{*key}", get(compress))
        .route("/v1/compression/decompress/{bucket}/{*key}", get(decompress))
        .layer(middleware)
        .layer(middleware::from_fn(trace_request))
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// `GET /v1/compression/compress/:bucket/*key` — publishes a compress
/// request if one isn't already in flight for this `(bucket, key)`, then
/// returns immediately. The reply path for compression is fire-and-forget;
/// the core contract never awaits it (see the pipeline's dual reply
/// routing: `compression_response` is declared but not consumed).
async fn compress(State(state): State<AppState>, Path((bucket, key)): Path<(String, String)>) -> Response {
    let (correlation_id, existed) = state.registry.get_or_create(&bucket, &key, RequestKind::Compress);

    if !existed {
        if let Err(err) = publish_request(&state, &bucket, &key, RequestKind::Compress, &correlation_id).await {
            return FrontendError::from(err).into_response();
        }
    }

    // Wire-compatible body: a JSON string, not a JSON object.
    (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], "\"{'status':'OK'}\"").into_response()
}

/// `GET /v1/compression/decompress/:bucket/*key` — publishes a decompress
/// request if new, waits up to [`AppState::reply_timeout`] for the worker's
/// reply, then streams the file at the reply's `result_address` back to the
/// caller (assumed reachable on a shared filesystem).
async fn decompress(State(state): State<AppState>, Path((bucket, key)): Path<(String, String)>) -> Response {
    let (correlation_id, existed) = state.registry.get_or_create(&bucket, &key, RequestKind::Decompress);

    if !existed {
        if let Err(err) = publish_request(&state, &bucket, &key, RequestKind::Decompress, &correlation_id).await {
            state.registry.remove(&correlation_id);
            return FrontendError::from(err).into_response();
        }
    }

    // The slot is left in the registry rather than removed here: it's shared
    // by every caller coalesced onto this correlation id, and removing it as
    // soon as the first waiter wakes would strand the rest (see `registry`'s
    // `get_or_create` invariant). The source's `reqMap` never deletes entries
    // either — only the worker-side cache reaps.
    let reply = match state.registry.await_reply(&correlation_id, state.reply_timeout).await {
        Ok(reply) => reply,
        Err(err) => return FrontendError::from(err).into_response(),
    };

    match tokio::fs::read(&reply.result_address).await {
        Ok(bytes) => {
            let last_modified = httpdate::fmt_http_date(std::time::SystemTime::now());
            (
                StatusCode::OK,
                [(header::LAST_MODIFIED, HeaderValue::from_str(&last_modified).unwrap_or_else(|_| HeaderValue::from_static(""))),
                 (header::CONTENT_TYPE, HeaderValue::from_static("application/x-tar"))],
                bytes,
            )
                .into_response()
        }
        Err(err) => FrontendError::from(CoreError::transport(format!("read result file {}: {err}", reply.result_address))).into_response(),
    }
}

async fn publish_request(
    state: &AppState,
    bucket: &str,
    key: &str,
    kind: RequestKind,
    correlation_id: &str,
) -> Result<(), CoreError> {
    let body = RequestBody { bucket: bucket.to_string(), key: key.to_string(), kind };
    let payload = serde_json::to_vec(&body).map_err(|err| CoreError::decode(format!("encode request body: {err}")))?;

    let (routing_key, reply_to) = match kind {
        RequestKind::Compress => (COMPRESS_ROUTING_KEY, COMPRESSION_RESPONSE_ROUTING_KEY),
        RequestKind::Decompress => (DECOMPRESS_ROUTING_KEY, DECOMPRESSION_RESPONSE_ROUTING_KEY),
    };

    state
        .bus
        .publish(Outbound {
            routing_key,
            content_type: "application/json",
            correlation_id: Some(correlation_id),
            reply_to: Some(reply_to),
            body: payload,
        })
        .await
        .map_err(|err| CoreError::transport(err.to_string()))
}

/// Any handler failure surfaces as HTTP 500 with a short JSON body. The real
/// error is logged; it never leaks into the response.
struct FrontendError {
    error: CoreError,
}

impl From<CoreError> for FrontendError {
    fn from(error: CoreError) -> Self {
        Self { error }
    }
}

impl IntoResponse for FrontendError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.error, "request failed");
        let message = match &self.error {
            CoreError::Timeout => "timed out waiting for a reply",
            CoreError::Remote { .. } => "worker reported an error",
            _ => "internal error",
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": message }))).into_response()
    }
}

async fn trace_request(request: Request, next: Next) -> Response {
    const REQUEST_ID_HEADER: &str = "x-request-id";
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|id| id.to_str().map(|id| id.to_string()).ok())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let start = Instant::now();
    let url = request.uri().to_string();
    let method = request.method().to_string();

    let span = tracing::info_span!("http.request", %id, %url, %method);
    async move {
        let mut response = next.run(request).await;
        let status = response.status();
        let duration = start.elapsed();
        tracing::info!(%id, %url, %method, %status, ?duration, "http.request.response");

        if let Ok(id) = HeaderValue::from_str(&id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, id);
        }
        response
    }
    .instrument(span)
    .await
}
