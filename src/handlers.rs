use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        Json, Response,
    },
};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;

use crate::models::{ErrorResponse, SnapshotEvent, SystemStats, UrlInfoResponse, UrlQuery};
use crate::relay::{Relay, RelayHead};
use crate::state::AppState;
use crate::subscribe::{subscribe, SubscriptionEvent};
use crate::transfer::TransferKey;

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub type EventStream = BoxStream<'static, Result<Event, Infallible>>;

fn api_error(status: StatusCode, error: String) -> ApiError {
    (status, Json(ErrorResponse { error }))
}

// relay the target url to the client while publishing its progress
pub async fn proxy(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UrlQuery>,
) -> Result<Response, ApiError> {
    let key = TransferKey::parse(query.url.as_deref().unwrap_or_default()).map_err(|e| {
        tracing::warn!("Rejected proxy request: {}", e);
        api_error(StatusCode::BAD_REQUEST, format!("Error: {}", e))
    })?;

    // register before connecting so observers and speed see the whole transfer
    let tracker = state.publisher.begin(key.clone());

    let Relay { head, chunks } = match state.engine.open(&key).await {
        Ok(relay) => relay,
        Err(e) => {
            tracing::error!("Proxy failed for URL {}. Reason: {}", key, e);
            let error = format!("Proxy error: {}", e);
            tracker.fail(&e);
            return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, error));
        }
    };

    tracing::debug!("Streaming {} to client", key);
    let body = Body::from_stream(tracker.track(chunks, head.content_length));

    Ok(relay_response(body, &head))
}

// answer HEAD on the relay from upstream headers alone, no transfer is started
pub async fn proxy_head(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UrlQuery>,
) -> Result<Response, ApiError> {
    let key = TransferKey::parse(query.url.as_deref().unwrap_or_default())
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Error: {}", e)))?;

    let head = state.engine.probe(&key).await.map_err(|e| {
        tracing::warn!("Proxy HEAD failed for URL {}. Reason: {}", key, e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("Proxy error: {}", e))
    })?;

    Ok(relay_response(Body::empty(), &head))
}

fn relay_response(body: Body, head: &RelayHead) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    if let Some(content_type) = head
        .content_type
        .as_deref()
        .and_then(|v| HeaderValue::from_str(v).ok())
    {
        headers.insert(header::CONTENT_TYPE, content_type);
    }
    if let Some(len) = head.content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
    response
}

// push live progress of a transfer as server-sent events
pub async fn stream_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UrlQuery>,
) -> Sse<EventStream> {
    let events = match TransferKey::parse(query.url.as_deref().unwrap_or_default()) {
        Ok(key) => subscribe(
            state.store.clone(),
            key,
            state.subscribe_options,
            state.shutdown.child_token(),
        )
        .map(|event| match event {
            SubscriptionEvent::Snapshot(snapshot) => sse_event(&SnapshotEvent::from(&snapshot)),
            SubscriptionEvent::NotFound => sse_event(&SnapshotEvent::error("transfer not found")),
        })
        .boxed(),
        Err(e) => {
            tracing::debug!("Rejected event subscription: {}", e);
            stream::once(async move { sse_event(&SnapshotEvent::error(e.to_string())) }).boxed()
        }
    };

    Sse::new(events).keep_alive(KeepAlive::default())
}

fn sse_event(payload: &SnapshotEvent) -> Result<Event, Infallible> {
    Ok(Event::default().json_data(payload).unwrap_or_else(|e| {
        tracing::error!("Failed to encode event: {}", e);
        Event::default().data(r#"{"status":"error","message":"encoding failed"}"#)
    }))
}

// fetch content type and size of a url without downloading it
pub async fn url_info(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UrlQuery>,
) -> Result<Json<UrlInfoResponse>, ApiError> {
    let key = TransferKey::parse(query.url.as_deref().unwrap_or_default())
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let head = state.engine.probe(&key).await.map_err(|e| {
        tracing::warn!("URL info failed for {}: {}", key, e);
        api_error(StatusCode::BAD_REQUEST, format!("Could not reach URL. {}", e))
    })?;

    Ok(Json(head.into()))
}

// host cpu and memory usage
pub async fn system_stats(State(state): State<Arc<AppState>>) -> Json<SystemStats> {
    Json(state.telemetry.sample())
}

// health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "nexus-relay",
        "active_transfers": state.store.len(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
