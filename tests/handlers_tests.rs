mod common;

use axum::body::{to_bytes, Body};
use axum::extract::{Query, State};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{dead_addr, spawn_upstream, test_config, wait_until, MIB};
use futures_util::StreamExt;
use nexus_relay::handlers::{health_check, proxy, system_stats};
use nexus_relay::models::{SystemStats, UrlQuery};
use nexus_relay::server::build_router;
use nexus_relay::state::AppState;
use nexus_relay::telemetry::HostTelemetry;
use nexus_relay::transfer::{TransferKey, TransferStatus};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

fn app() -> (Arc<AppState>, Router) {
    let config = test_config();
    let state = Arc::new(AppState::new(&config).unwrap());
    let router = build_router(state.clone(), &config);
    (state, router)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// `data:` payloads of an event stream body
fn sse_payloads(body: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|l| l.strip_prefix("data:"))
        .map(|d| serde_json::from_str(d.trim()).unwrap())
        .collect()
}

#[tokio::test]
async fn test_health_check() {
    let (state, _) = app();
    let response = health_check(State(state)).await;
    assert_eq!(response.0["status"], "healthy");
    assert_eq!(response.0["active_transfers"], 0);
}

#[tokio::test]
async fn test_proxy_missing_url() {
    let (state, _) = app();
    let result = proxy(State(state.clone()), Query(UrlQuery::default())).await;
    let (status, body) = result.err().unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.0.error.contains("missing"));

    // nothing was registered
    assert!(state.store.is_empty());
}

#[tokio::test]
async fn test_proxy_relays_whole_file() {
    let (addr, _) = spawn_upstream().await;
    let (state, router) = app();
    let target = format!("http://{}/file.bin", addr);

    let response = router
        .oneshot(get(&format!("/proxy?url={}", target)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "video/mp4");
    assert_eq!(response.headers().get("x-accel-buffering").unwrap(), "no");

    let mut body = response.into_body().into_data_stream();
    let mut chunks = 0;
    let mut total = 0;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.unwrap();
        chunks += 1;
        total += chunk.len();
    }
    assert_eq!(chunks, 10);
    assert_eq!(total, 10 * MIB);

    let snapshot = state.store.get(&TransferKey::parse(&target).unwrap()).unwrap();
    assert_eq!(snapshot.status, TransferStatus::Finished);
    assert_eq!(snapshot.progress, Some(100.0));
    assert_eq!(snapshot.bytes_downloaded, (10 * MIB) as u64);
}

#[tokio::test]
async fn test_proxy_without_content_length() {
    let (addr, _) = spawn_upstream().await;
    let (state, router) = app();
    let target = format!("http://{}/nolength.bin", addr);

    let response = router
        .oneshot(get(&format!("/proxy?url={}", target)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::CONTENT_LENGTH).is_none());

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body.len(), 7 * MIB / 2);

    let snapshot = state.store.get(&TransferKey::parse(&target).unwrap()).unwrap();
    assert_eq!(snapshot.status, TransferStatus::Finished);
    assert_eq!(snapshot.total_bytes, None);
    assert_eq!(snapshot.progress, None);
    assert_eq!(snapshot.bytes_downloaded, (7 * MIB / 2) as u64);
}

#[tokio::test]
async fn test_proxy_unreachable_host() {
    let addr = dead_addr().await;
    let (state, router) = app();
    let target = format!("http://{}/file.bin", addr);

    let response = router
        .oneshot(get(&format!("/proxy?url={}", target)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().starts_with("Proxy error:"));

    // observers see an immediate terminal error
    let snapshot = state.store.get(&TransferKey::parse(&target).unwrap()).unwrap();
    assert_eq!(snapshot.status, TransferStatus::Error);
}

#[tokio::test]
async fn test_proxy_upstream_status_error() {
    let (addr, _) = spawn_upstream().await;
    let (_, router) = app();

    let response = router
        .oneshot(get(&format!("/proxy?url=http://{}/missing", addr)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains("404"));
}

#[tokio::test]
async fn test_proxy_client_disconnect_aborts_upstream() {
    let (addr, probe) = spawn_upstream().await;
    let (state, router) = app();
    let target = format!("http://{}/endless", addr);

    let response = router
        .oneshot(get(&format!("/proxy?url={}", target)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    for _ in 0..3 {
        body.next().await.unwrap().unwrap();
    }
    drop(body);

    let k = TransferKey::parse(&target).unwrap();
    let snapshot = state.store.get(&k).unwrap();
    assert_eq!(snapshot.status, TransferStatus::Error);
    assert_eq!(snapshot.bytes_downloaded, (3 * MIB) as u64);

    // the upstream body is dropped once the connection closes
    assert!(wait_until(Duration::from_secs(5), || probe.endless_closed.load(Ordering::SeqCst)).await);
    let sent = probe.frames_sent.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(probe.frames_sent.load(Ordering::SeqCst), sent);
}

#[tokio::test]
async fn test_stream_events_missing_url() {
    let (_, router) = app();

    let response = router.oneshot(get("/api/stream-events")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let events = sse_payloads(&body);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["status"], "error");
    assert!(events[0]["message"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn test_stream_events_unknown_transfer() {
    let (_, router) = app();

    let response = router
        .oneshot(get("/api/stream-events?url=http://host/never.bin"))
        .await
        .unwrap();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let events = sse_payloads(&body);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["status"], "error");
    assert_eq!(events[0]["message"], "transfer not found");
}

#[tokio::test]
async fn test_stream_events_follow_a_relay() {
    let (addr, _) = spawn_upstream().await;
    let (_, router) = app();
    let target = format!("http://{}/file.bin", addr);

    let relay = router
        .clone()
        .oneshot(get(&format!("/proxy?url={}", target)))
        .await
        .unwrap();
    let events = router
        .oneshot(get(&format!("/api/stream-events?url={}", target)))
        .await
        .unwrap();

    let (relayed, events) = tokio::join!(
        to_bytes(relay.into_body(), usize::MAX),
        to_bytes(events.into_body(), usize::MAX)
    );
    assert_eq!(relayed.unwrap().len(), 10 * MIB);

    let events = sse_payloads(&events.unwrap());
    let last = events.last().unwrap();
    assert_eq!(last["status"], "finished");
    assert_eq!(last["progress"], 100.0);
    assert_eq!(last["total_size_mb"], 10.0);
    assert_eq!(last["downloaded_mb"], 10.0);
    assert!(last.get("message").is_none());
}

#[tokio::test]
async fn test_served_relay_with_declared_length_finishes() {
    let (upstream, _) = spawn_upstream().await;
    let config = nexus_relay::config::Config {
        retire_after: Duration::from_secs(5),
        ..test_config()
    };
    let state = Arc::new(AppState::new(&config).unwrap());
    let router = build_router(state.clone(), &config);

    // a real server drops the body once the declared length is written
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let relay_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let target = format!("http://{}/file.bin", upstream);
    let client = reqwest::Client::new();
    let relay = async {
        let response = client
            .get(format!("http://{}/proxy?url={}", relay_addr, target))
            .send()
            .await
            .unwrap();
        assert_eq!(response.content_length(), Some((10 * MIB) as u64));
        response.bytes().await.unwrap()
    };
    let events = async {
        client
            .get(format!("http://{}/api/stream-events?url={}", relay_addr, target))
            .send()
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap()
    };

    let (relayed, events) = tokio::join!(relay, events);
    assert_eq!(relayed.len(), 10 * MIB);

    let k = TransferKey::parse(&target).unwrap();
    assert!(
        wait_until(Duration::from_secs(2), || {
            state.store.get(&k).is_some_and(|s| s.status.is_terminal())
        })
        .await
    );
    let snapshot = state.store.get(&k).unwrap();
    assert_eq!(snapshot.status, TransferStatus::Finished);
    assert_eq!(snapshot.progress, Some(100.0));
    assert_eq!(snapshot.message, None);

    let events = sse_payloads(&events);
    let last = events.last().unwrap();
    assert_eq!(last["status"], "finished");
    assert_eq!(last["progress"], 100.0);
}

#[tokio::test]
async fn test_proxy_head_starts_no_transfer() {
    let (addr, _) = spawn_upstream().await;
    let (state, router) = app();

    let response = router
        .oneshot(
            Request::builder()
                .method("HEAD")
                .uri(format!("/proxy?url=http://{}/file.bin", addr))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "video/mp4");
    assert_eq!(
        response.headers().get(header::CONTENT_LENGTH).unwrap(),
        &(10 * MIB).to_string()
    );

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(body.is_empty());
    assert!(state.store.is_empty());
}

#[tokio::test]
async fn test_url_info() {
    let (addr, _) = spawn_upstream().await;
    let (_, router) = app();

    let response = router
        .clone()
        .oneshot(get(&format!("/api/url-info?url=http://{}/file.bin", addr)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["content_type"], "video/mp4");
    assert_eq!(json["size_mb"], "10.00 MB");

    let response = router.oneshot(get("/api/url-info")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

struct FixedTelemetry;

impl HostTelemetry for FixedTelemetry {
    fn sample(&self) -> SystemStats {
        SystemStats { cpu_percent: 12.5, ram_percent: 40.0 }
    }
}

#[tokio::test]
async fn test_system_stats_uses_telemetry_source() {
    let state = AppState::new(&test_config())
        .unwrap()
        .with_telemetry(Arc::new(FixedTelemetry));

    let response = system_stats(State(Arc::new(state))).await;
    assert_eq!(response.0, SystemStats { cpu_percent: 12.5, ram_percent: 40.0 });
}
