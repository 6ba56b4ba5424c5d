use newsdesk_lib::{
    cli::{parse_args, Cli},
    config::Config,
    db::{connect_store, DatabaseUrl},
    ingest::{ArticleStore, HnSource, Reconciler},
    logging::{format_error_report, init_logging, LogSettings},
    server::setup_server_with_addr,
    state::AppState,
};
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use dotenv::dotenv;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

/// Cancels the shutdown token on SIGTERM or SIGINT. An in-flight run commits
/// what it has staged and stops.
async fn handle_shutdown_signals(state: Arc<AppState>) {
    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(err), _) | (_, Err(err)) => {
                warn!(
                    event = "signal_handler_unavailable",
                    error = %err,
                    "could not register shutdown signal handlers"
                );
                return;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => {
            info!(event = "shutdown_signal", signal = "SIGTERM", "SIGTERM received, shutting down");
        }
        _ = sigint.recv() => {
            info!(event = "shutdown_signal", signal = "SIGINT", "SIGINT received, shutting down");
        }
    }

    state.shutdown_token.cancel();
}

async fn run(args: Cli) -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = Config::from_env()?;
    let db_url = DatabaseUrl::parse(&config.db_url)?;
    info!(
        event = "store_connecting",
        backend = db_url.backend(),
        run_migrations = !args.skip_migrations,
        "connecting to article store"
    );
    let store = connect_store(&db_url, !args.skip_migrations).await?;

    let state = Arc::new(AppState::new(CancellationToken::new()));
    let shutdown_handle = tokio::spawn(handle_shutdown_signals(state.clone()));

    let server = if args.serve_metrics {
        let (handle, addr) = setup_server_with_addr(state.clone(), config.metrics_addr).await?;
        info!(event = "metrics_server_started", %addr, "serving /health and /metrics");
        Some(handle)
    } else {
        None
    };

    let mut reconcile_config = config.reconcile_config();
    if let Some(endpoint) = args.endpoint {
        reconcile_config.default_endpoint = endpoint;
    }
    let source = HnSource::new(config.hn_api_url.clone(), config.http_timeout)?;
    let mut reconciler = Reconciler::new(source, store.clone(), reconcile_config);

    let start_time = Instant::now();
    let outcome = reconciler
        .reconcile_until(args.ids, &state.shutdown_token)
        .await;
    let elapsed = start_time.elapsed();

    state.shutdown_token.cancel();
    shutdown_handle.abort();
    if let Some(handle) = server {
        if let Err(err) = handle.await {
            warn!(event = "metrics_server_join_failed", error = %err, "metrics server task failed");
        }
    }

    let report = outcome?;
    let article_count = store.article_count().await?;
    info!(
        event = "run_summary",
        total = report.total,
        processed = report.processed,
        upserted = report.upserted,
        absent = report.absent,
        failures = report.failures.len(),
        interrupted = report.interrupted,
        article_count,
        elapsed_ms = elapsed.as_millis() as u64,
        "reconciliation complete"
    );
    for failure in &report.failures {
        warn!(
            event = "run_item_failure",
            external_id = failure.external_id,
            attempts = failure.attempts,
            error = %failure.error,
            "item was skipped and will be retried next run"
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    let args = parse_args();
    let run_context = init_logging(&LogSettings::from_env());

    match run(args).instrument(run_context.span()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(
                event = "newsdesk_failed",
                error = %err,
                report = %format_error_report(&*err),
                "newsdesk run failed"
            );
            ExitCode::FAILURE
        }
    }
}
