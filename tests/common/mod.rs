#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::stream;
use nexus_relay::config::Config;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const MIB: usize = 1024 * 1024;

/// config with short timers so tests finish quickly
pub fn test_config() -> Config {
    Config {
        retire_after: Duration::from_millis(200),
        poll_interval: Duration::from_millis(20),
        subscribe_grace: Duration::from_millis(200),
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_secs(2),
        ..Config::default()
    }
}

/// observable side effects of the fake upstream
#[derive(Default)]
pub struct UpstreamProbe {
    /// frames produced by the endless endpoint
    pub frames_sent: AtomicUsize,
    /// set once the endless body stream was dropped by the server
    pub endless_closed: AtomicBool,
}

struct CloseFlag(Arc<UpstreamProbe>);

impl Drop for CloseFlag {
    fn drop(&mut self) {
        self.0.endless_closed.store(true, Ordering::SeqCst);
    }
}

/// local http server standing in for the remote resource
///
/// - `/file.bin`: 10 MiB, declared content length
/// - `/nolength.bin`: 3.5 MiB streamed without content length
/// - `/missing`: 404
/// - `/broken`: declares 4 MiB, sends 1 MiB, then fails
/// - `/endless`: 64 KiB frames forever, records when the body is dropped
pub async fn spawn_upstream() -> (SocketAddr, Arc<UpstreamProbe>) {
    let probe = Arc::new(UpstreamProbe::default());
    let endless_probe = probe.clone();

    let app = Router::new()
        .route(
            "/file.bin",
            get(|| async {
                Response::builder()
                    .header(header::CONTENT_TYPE, "video/mp4")
                    .body(Body::from(vec![7u8; 10 * MIB]))
                    .unwrap()
            }),
        )
        .route(
            "/nolength.bin",
            get(|| async {
                let frames = (0..7).map(|_| Ok::<_, std::io::Error>(Bytes::from(vec![1u8; MIB / 2])));
                Response::builder()
                    .header(header::CONTENT_TYPE, "application/octet-stream")
                    .body(Body::from_stream(stream::iter(frames)))
                    .unwrap()
            }),
        )
        .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
        .route(
            "/broken",
            get(|| async {
                let frames = vec![
                    Ok(Bytes::from(vec![2u8; MIB])),
                    Err(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire")),
                ];
                Response::builder()
                    .header(header::CONTENT_LENGTH, 4 * MIB)
                    .body(Body::from_stream(stream::iter(frames)))
                    .unwrap()
            }),
        )
        .route(
            "/endless",
            get(move || {
                let probe = endless_probe.clone();
                async move {
                    let flag = CloseFlag(probe);
                    let frames = stream::unfold(flag, |flag| async move {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        flag.0.frames_sent.fetch_add(1, Ordering::SeqCst);
                        Some((Ok::<_, std::io::Error>(Bytes::from(vec![3u8; 64 * 1024])), flag))
                    });
                    Response::builder()
                        .header(header::CONTENT_TYPE, "video/webm")
                        .body(Body::from_stream(frames))
                        .unwrap()
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, probe)
}

/// an address nothing listens on
pub async fn dead_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// poll `check` until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
