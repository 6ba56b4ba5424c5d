use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::models::ArticleUpsert;
use crate::server::monitoring::{IngestMetrics, INGEST_METRICS};

use super::retry::run_with_retry;
use super::source::ItemSource;
use super::store::{dedupe_by_external_id, ArticleStore};
use super::types::{
    ItemFailure, ItemFailurePolicy, ReconcileConfig, ReconcileError, ReconcileReport, Resolution,
};

/// Reconciles an upstream identifier list against the article store.
///
/// Runs are strictly sequential: items are resolved in list order, staged rows
/// are committed every `batch_size` identifiers and the loop pauses every
/// `cooldown_every` identifiers. `reconcile` borrows the reconciler mutably, so
/// a single value never runs twice at once.
pub struct Reconciler<S, P>
where
    S: ItemSource,
    P: ArticleStore,
{
    source: S,
    store: P,
    config: ReconcileConfig,
}

enum Cooldown {
    Elapsed,
    Cancelled,
}

impl<S, P> Reconciler<S, P>
where
    S: ItemSource,
    P: ArticleStore,
{
    pub fn new(source: S, store: P, config: ReconcileConfig) -> Self {
        Self {
            source,
            store,
            config,
        }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    /// Runs one reconciliation to completion.
    ///
    /// With `ids = None` (or an empty list) the identifier snapshot is fetched
    /// from the configured default endpoint.
    pub async fn reconcile(
        &mut self,
        ids: Option<Vec<i64>>,
    ) -> Result<ReconcileReport, ReconcileError> {
        self.reconcile_until(ids, &CancellationToken::new()).await
    }

    /// Like [`Reconciler::reconcile`], but stops early once `shutdown` is
    /// cancelled. Staged rows are committed before returning and the report is
    /// flagged `interrupted`.
    pub async fn reconcile_until(
        &mut self,
        ids: Option<Vec<i64>>,
        shutdown: &CancellationToken,
    ) -> Result<ReconcileReport, ReconcileError> {
        let started = Instant::now();
        let ids = match ids {
            Some(ids) if !ids.is_empty() => ids,
            _ => self.fetch_identifiers().await?,
        };

        let total = ids.len();
        let batch_size = self.config.batch_size.max(1);
        let mut report = ReconcileReport {
            total,
            ..ReconcileReport::default()
        };
        let mut staged: Vec<ArticleUpsert> = Vec::with_capacity(batch_size.min(total));

        info!(
            event = "reconcile_started",
            total,
            batch_size,
            cooldown_every = self.config.cooldown_every,
            cooldown_secs = self.config.cooldown.as_secs_f64(),
            item_failure_policy = ?self.config.item_failure_policy,
            "starting reconciliation run"
        );

        for (index, external_id) in ids.into_iter().enumerate() {
            if shutdown.is_cancelled() {
                report.interrupted = true;
                break;
            }

            let position = index + 1;
            self.process_item(external_id, &mut staged, &mut report)
                .await?;
            report.processed = position;
            if let Some(metrics) = metrics() {
                metrics.identifiers_processed.inc();
            }

            if position % batch_size == 0 {
                self.commit(&mut staged, &mut report).await?;
            }

            if self.cooldown_due(position, total) {
                report.cooldowns += 1;
                if let Some(metrics) = metrics() {
                    metrics.cooldowns.inc();
                }
                if let Cooldown::Cancelled = self.cool_down(position, shutdown).await {
                    report.interrupted = true;
                    break;
                }
            }
        }

        self.commit(&mut staged, &mut report).await?;

        if report.interrupted {
            warn!(
                event = "reconcile_interrupted",
                processed = report.processed,
                total,
                upserted = report.upserted,
                "reconciliation stopped early on shutdown"
            );
        }
        info!(
            event = "reconcile_finished",
            total,
            processed = report.processed,
            upserted = report.upserted,
            absent = report.absent,
            failures = report.failures.len(),
            commits = report.commits,
            cooldowns = report.cooldowns,
            interrupted = report.interrupted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reconciliation run finished"
        );
        Ok(report)
    }

    async fn fetch_identifiers(&self) -> Result<Vec<i64>, ReconcileError> {
        let endpoint = self.config.default_endpoint;
        match self.source.list_identifiers(endpoint).await {
            Ok(ids) => {
                debug!(
                    event = "identifier_list_fetched",
                    endpoint = %endpoint,
                    count = ids.len(),
                    "fetched identifier snapshot"
                );
                Ok(ids)
            }
            Err(err) => {
                error!(
                    event = "identifier_list_unavailable",
                    endpoint = %endpoint,
                    error = %err,
                    "could not fetch identifier list; aborting run"
                );
                Err(ReconcileError::ListUnavailable(err))
            }
        }
    }

    async fn process_item(
        &self,
        external_id: i64,
        staged: &mut Vec<ArticleUpsert>,
        report: &mut ReconcileReport,
    ) -> Result<(), ReconcileError> {
        let outcome = run_with_retry(
            &self.config.retry_policy,
            external_id,
            |_| self.source.resolve_item(external_id),
            |err| err.is_retryable(),
        )
        .await;

        match outcome {
            Ok((Resolution::Found(story), _attempts)) => {
                staged.push(ArticleUpsert::from(story));
            }
            Ok((Resolution::Absent(reason), _attempts)) => {
                debug!(
                    event = "item_absent",
                    external_id,
                    reason = ?reason,
                    "skipping identifier with nothing to persist"
                );
                report.absent += 1;
                if let Some(metrics) = metrics() {
                    metrics.absent_items.inc();
                }
            }
            Err(terminal) => {
                if let Some(metrics) = metrics() {
                    metrics.item_failures.inc();
                }
                match self.config.item_failure_policy {
                    ItemFailurePolicy::Skip => {
                        warn!(
                            event = "item_skipped",
                            external_id,
                            attempts = terminal.attempts,
                            error = %terminal.error,
                            "item fetch failed; continuing"
                        );
                        report.failures.push(ItemFailure {
                            external_id,
                            attempts: terminal.attempts,
                            error: terminal.error,
                        });
                    }
                    ItemFailurePolicy::Abort => {
                        error!(
                            event = "item_aborted",
                            external_id,
                            attempts = terminal.attempts,
                            discarded_rows = staged.len(),
                            error = %terminal.error,
                            "item fetch failed; aborting run"
                        );
                        return Err(ReconcileError::ItemAborted {
                            external_id,
                            attempts: terminal.attempts,
                            source: terminal.error,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Durably writes everything staged since the last commit.
    async fn commit(
        &self,
        staged: &mut Vec<ArticleUpsert>,
        report: &mut ReconcileReport,
    ) -> Result<(), ReconcileError> {
        if staged.is_empty() {
            return Ok(());
        }

        let duplicates = dedupe_by_external_id(staged);
        if duplicates > 0 {
            debug!(
                event = "batch_deduplicated",
                duplicates,
                unique_rows = staged.len(),
                "collapsed repeated identifiers before commit"
            );
        }

        let rows: &[ArticleUpsert] = staged;
        let key = rows.last().map(|row| row.external_id).unwrap_or_default();
        let outcome = run_with_retry(
            &self.config.retry_policy,
            key,
            |_| self.store.upsert_batch(rows),
            |err| err.is_retryable(),
        )
        .await;

        match outcome {
            Ok((written, attempts)) => {
                report.upserted += written;
                report.commits += 1;
                if let Some(metrics) = metrics() {
                    metrics.commits.inc();
                    metrics.articles_committed.inc_by(written as u64);
                }
                info!(
                    event = "batch_committed",
                    rows = written,
                    attempts,
                    processed = report.processed,
                    total = report.total,
                    "committed staged upserts"
                );
                staged.clear();
                Ok(())
            }
            Err(terminal) => {
                error!(
                    event = "batch_commit_failed",
                    pending = rows.len(),
                    committed = report.upserted,
                    attempts = terminal.attempts,
                    error = %terminal.error,
                    "could not commit staged upserts"
                );
                Err(ReconcileError::Store {
                    pending: rows.len(),
                    committed: report.upserted,
                    attempts: terminal.attempts,
                    source: terminal.error,
                })
            }
        }
    }

    fn cooldown_due(&self, position: usize, total: usize) -> bool {
        let every = self.config.cooldown_every;
        every > 0 && position % every == 0 && position < total
    }

    async fn cool_down(&self, position: usize, shutdown: &CancellationToken) -> Cooldown {
        info!(
            event = "cooldown_started",
            position,
            cooldown_ms = self.config.cooldown.as_millis() as u64,
            "pausing to respect upstream rate limits"
        );
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Cooldown::Cancelled,
            _ = tokio::time::sleep(self.config.cooldown) => Cooldown::Elapsed,
        }
    }
}

fn metrics() -> Option<&'static IngestMetrics> {
    INGEST_METRICS.get()
}
