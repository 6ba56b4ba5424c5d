pub mod monitoring;
use crate::state::AppState;
use prometheus_client::encoding::text::encode;

use axum::{extract::State, http::StatusCode, routing::get, Router};
use monitoring::INGEST_METRICS;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::error;

async fn health_handler() -> &'static str {
    "Healthy"
}

async fn expose_metrics(state: State<Arc<AppState>>) -> Result<String, StatusCode> {
    let mut buffer = String::new();
    let registry = state.registry.read().await;
    encode(&mut buffer, &registry).map_err(|err| {
        error!(event = "metrics_encode_failed", error = %err, "failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(buffer)
}

/// Registers ingest metrics and starts the health/metrics HTTP server on `addr`.
///
/// The server stops once the state's shutdown token is cancelled.
pub async fn setup_server_with_addr(
    state: Arc<AppState>,
    addr: SocketAddr,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    {
        let mut registry = state.registry.write().await;

        INGEST_METRICS
            .get_or_init(|| async { monitoring::IngestMetrics::register(&mut registry, "ingest") })
            .await;

        monitoring::register_build_info_metric(&mut registry, "newsdesk");
    }

    let shutdown_token = state.shutdown_token.clone();
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(expose_metrics))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;
    let server_handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown_token.cancelled().await;
        })
        .await
        {
            error!(event = "metrics_server_failed", error = %err, "metrics server exited");
        }
    });

    Ok((server_handle, bound_addr))
}
