use crate::config::RelayServerConfig;
use crate::preamble::{display_name, upstream_body, USER_NAME_HEADER};
use crate::upstream::UpstreamClient;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures::StreamExt;
use localchat_core::frame::{EVENT_STREAM, SENTINEL_FRAME};
use localchat_core::llm::ChatRequest;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

pub struct AppState {
    pub upstream: UpstreamClient,
    pub default_user_name: String,
    pub keep_alive: u64,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn from_config(cfg: &RelayServerConfig) -> Self {
        Self {
            upstream: UpstreamClient::new(&cfg.model_url),
            default_user_name: cfg.default_user_name.clone(),
            keep_alive: cfg.keep_alive,
        }
    }
}

#[derive(serde::Serialize)]
struct Health {
    status: String,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
    })
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/stream", post(stream_chat))
        .route("/api/complete", post(complete_chat))
        .with_state(state)
}

pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(target: "relay", "ignoring invalid CORS origin {:?}", o);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(USER_NAME_HEADER),
        ])
}

// POST /api/stream
pub async fn stream_chat(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Response {
    let name = display_name(&headers, &req, &state.default_user_name);
    let body = upstream_body(&req, &name, true, state.keep_alive);
    info!(target: "relay", "stream request user={} prompt_len={}", name, req.prompt.len());

    let upstream = match state.upstream.open_stream(&body).await {
        Ok(resp) => resp,
        Err(err) => {
            warn!(target: "relay", "model server unreachable at {}: {}", state.upstream.model_url(), err);
            return event_stream(Body::from(SENTINEL_FRAME));
        }
    };
    if !upstream.status().is_success() {
        warn!(target: "relay", "model server answered {}; relaying body as-is", upstream.status());
    }

    let mut chunks = upstream.bytes_stream();
    let relayed = async_stream::stream! {
        let mut forwarded = 0usize;
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(b) => {
                    forwarded += b.len();
                    yield Ok::<Bytes, Infallible>(b);
                }
                Err(err) => {
                    warn!(target: "relay", "upstream stream broke after {} bytes: {}", forwarded, err);
                    yield Ok(Bytes::from_static(SENTINEL_FRAME.as_bytes()));
                    break;
                }
            }
        }
        debug!(target: "relay", "stream closed after {} bytes", forwarded);
    };
    event_stream(Body::from_stream(relayed))
}

fn event_stream(body: Body) -> Response {
    (
        [
            (header::CONTENT_TYPE, EVENT_STREAM),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

// POST /api/complete
pub async fn complete_chat(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Response {
    let name = display_name(&headers, &req, &state.default_user_name);
    let body = upstream_body(&req, &name, false, state.keep_alive);
    info!(target: "relay", "complete request user={} prompt_len={}", name, req.prompt.len());

    let upstream = match state.upstream.complete(&body).await {
        Ok(resp) => resp,
        Err(err) => {
            warn!(target: "relay", "model server unreachable at {}: {}", state.upstream.model_url(), err);
            return error_response(
                StatusCode::BAD_GATEWAY,
                format!("Failed to reach model server: {}", err),
            );
        }
    };
    let status = upstream.status();
    match upstream.json::<serde_json::Value>().await {
        Ok(v) => (status, Json(v)).into_response(),
        Err(err) => error_response(
            StatusCode::BAD_GATEWAY,
            format!("Invalid response from model server ({}): {}", status, err),
        ),
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
