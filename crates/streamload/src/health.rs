//! Liveness and progress endpoints served next to the load test.
//!
//! - `GET /healthz` reports the harness version.
//! - `GET /stats` returns the current [`MetricsSnapshot`] as JSON.

use crate::metrics::{HarnessMetrics, MetricsSnapshot};
use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct HealthStatus {
    pub version: &'static str,
    pub status: &'static str,
}

async fn healthz() -> Json<HealthStatus> {
    Json(HealthStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "OK",
    })
}

async fn stats(State(metrics): State<Arc<HarnessMetrics>>) -> Json<MetricsSnapshot> {
    Json(metrics.snapshot())
}

pub fn router(metrics: Arc<HarnessMetrics>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/stats", get(stats))
        .with_state(metrics)
}

/// Binds the health listener on all interfaces.
///
/// # Errors
///
/// Fails if the port cannot be bound.
pub async fn bind(port: u16) -> anyhow::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "health endpoint listening");
    Ok(listener)
}

/// Serves the health routes until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    metrics: Arc<HarnessMetrics>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

/// Starts the endpoint on `port` in the background.
///
/// The endpoint is optional: if the port cannot be bound the error is logged
/// and `None` is returned, so the load test runs without it.
pub async fn spawn(
    port: u16,
    metrics: Arc<HarnessMetrics>,
    shutdown: CancellationToken,
) -> Option<JoinHandle<anyhow::Result<()>>> {
    match bind(port).await {
        Ok(listener) => Some(tokio::spawn(serve(listener, metrics, shutdown))),
        Err(e) => {
            tracing::error!(port, error = %e, "health endpoint disabled");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsSink;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tower::ServiceExt;

    async fn get(metrics: Arc<HarnessMetrics>, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router(metrics)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn healthz_reports_version() {
        let (status, body) = get(Arc::new(HarnessMetrics::new()), "/healthz").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "OK");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn stats_reflect_metrics() {
        let metrics = Arc::new(HarnessMetrics::new());
        metrics.session_started();
        metrics.message_sent();

        let (status, body) = get(metrics, "/stats").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sessions_started"], 1);
        assert_eq!(body["messages_sent"], 1);
        assert_eq!(body["streams_inflight"], 0);
    }

    #[tokio::test]
    async fn serves_until_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve(
            listener,
            Arc::new(HarnessMetrics::new()),
            shutdown.clone(),
        ));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));

        shutdown.cancel();
        assert!(server.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn port_in_use_disables_the_endpoint() {
        let taken = TcpListener::bind("0.0.0.0:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let task = spawn(port, Arc::new(HarnessMetrics::new()), CancellationToken::new()).await;
        assert!(task.is_none());
    }
}
