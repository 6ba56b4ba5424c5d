use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::types::{
    ItemFailurePolicy, ReconcileConfig, Resolution, RetryPolicy, SourceErrorKind,
    SourceUnavailable, StoreUnavailable,
};
use super::{ArticleStore, ItemSource, SqliteArticleStore};
use crate::db::models::ArticleUpsert;
use crate::db::open_sqlite_store;
use crate::hn_client::{ListEndpoint, Story};

pub(super) fn test_config(batch_size: usize, cooldown_every: usize) -> ReconcileConfig {
    ReconcileConfig {
        default_endpoint: ListEndpoint::TopStories,
        batch_size,
        cooldown_every,
        cooldown: Duration::from_secs(10),
        item_failure_policy: ItemFailurePolicy::Skip,
        retry_policy: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            jitter: Duration::ZERO,
        },
    }
}

pub(super) fn sqlite_store() -> Arc<SqliteArticleStore> {
    Arc::new(open_sqlite_store(":memory:").expect("failed to open in-memory sqlite store"))
}

pub(super) fn story(id: i64, title: &str) -> Story {
    Story {
        id,
        title: Some(title.to_string()),
        url: Some(format!("https://example.com/{id}")),
    }
}

pub(super) fn found(id: i64, title: &str) -> Result<Resolution, SourceUnavailable> {
    Ok(Resolution::Found(story(id, title)))
}

pub(super) fn unavailable(kind: SourceErrorKind) -> Result<Resolution, SourceUnavailable> {
    Err(SourceUnavailable::new(kind, format!("scripted {kind:?}")))
}

/// Source that answers every id with a story titled `item-{id}` unless a
/// script says otherwise. Scripted responses are consumed in order.
#[derive(Default)]
pub(super) struct ScriptedSource {
    list: Mutex<Option<Result<Vec<i64>, SourceUnavailable>>>,
    scripts: Mutex<HashMap<i64, VecDeque<Result<Resolution, SourceUnavailable>>>>,
    calls: Mutex<HashMap<i64, u32>>,
    list_calls: Mutex<Vec<ListEndpoint>>,
    cancel_after: Mutex<Option<(i64, CancellationToken)>>,
}

impl ScriptedSource {
    pub(super) fn with_list(ids: Vec<i64>) -> Self {
        let source = Self::default();
        *source.list.lock().expect("list mutex poisoned") = Some(Ok(ids));
        source
    }

    pub(super) fn with_failing_list(error: SourceUnavailable) -> Self {
        let source = Self::default();
        *source.list.lock().expect("list mutex poisoned") = Some(Err(error));
        source
    }

    pub(super) fn script(&self, id: i64, responses: Vec<Result<Resolution, SourceUnavailable>>) {
        self.scripts
            .lock()
            .expect("scripts mutex poisoned")
            .entry(id)
            .or_default()
            .extend(responses);
    }

    /// Cancels `token` once `id` has been resolved.
    pub(super) fn cancel_after(&self, id: i64, token: CancellationToken) {
        *self
            .cancel_after
            .lock()
            .expect("cancel_after mutex poisoned") = Some((id, token));
    }

    pub(super) fn calls_for(&self, id: i64) -> u32 {
        *self
            .calls
            .lock()
            .expect("calls mutex poisoned")
            .get(&id)
            .unwrap_or(&0)
    }

    pub(super) fn list_calls(&self) -> Vec<ListEndpoint> {
        self.list_calls
            .lock()
            .expect("list_calls mutex poisoned")
            .clone()
    }
}

impl ItemSource for ScriptedSource {
    fn list_identifiers<'a>(
        &'a self,
        endpoint: ListEndpoint,
    ) -> BoxFuture<'a, Result<Vec<i64>, SourceUnavailable>> {
        Box::pin(async move {
            self.list_calls
                .lock()
                .expect("list_calls mutex poisoned")
                .push(endpoint);
            self.list
                .lock()
                .expect("list mutex poisoned")
                .clone()
                .unwrap_or_else(|| Ok(Vec::new()))
        })
    }

    fn resolve_item<'a>(&'a self, id: i64) -> BoxFuture<'a, Result<Resolution, SourceUnavailable>> {
        Box::pin(async move {
            *self
                .calls
                .lock()
                .expect("calls mutex poisoned")
                .entry(id)
                .or_insert(0) += 1;

            let scripted = self
                .scripts
                .lock()
                .expect("scripts mutex poisoned")
                .get_mut(&id)
                .and_then(VecDeque::pop_front);

            if let Some((cancel_id, token)) = self
                .cancel_after
                .lock()
                .expect("cancel_after mutex poisoned")
                .as_ref()
            {
                if *cancel_id == id {
                    token.cancel();
                }
            }

            scripted.unwrap_or_else(|| found(id, &format!("item-{id}")))
        })
    }
}

/// Wraps a real store, failing chosen `upsert_batch` calls and recording when
/// each successful commit happened on the (paused) tokio clock.
pub(super) struct FlakyStore<P> {
    inner: P,
    failures: Mutex<HashMap<usize, StoreUnavailable>>,
    calls: Mutex<usize>,
    commits: Mutex<Vec<(Instant, Vec<i64>)>>,
}

impl<P: ArticleStore> FlakyStore<P> {
    pub(super) fn new(inner: P) -> Self {
        Self {
            inner,
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(0),
            commits: Mutex::new(Vec::new()),
        }
    }

    /// Fails the `call`-th invocation (1-based) with `error`. Retries count as
    /// fresh invocations.
    pub(super) fn fail_call(&self, call: usize, error: StoreUnavailable) {
        self.failures
            .lock()
            .expect("failures mutex poisoned")
            .insert(call, error);
    }

    pub(super) fn calls(&self) -> usize {
        *self.calls.lock().expect("calls mutex poisoned")
    }

    pub(super) fn commits(&self) -> Vec<(Instant, Vec<i64>)> {
        self.commits.lock().expect("commits mutex poisoned").clone()
    }
}

impl<P: ArticleStore> ArticleStore for FlakyStore<P> {
    fn upsert_batch<'a>(
        &'a self,
        rows: &'a [ArticleUpsert],
    ) -> BoxFuture<'a, Result<usize, StoreUnavailable>> {
        Box::pin(async move {
            let call = {
                let mut calls = self.calls.lock().expect("calls mutex poisoned");
                *calls += 1;
                *calls
            };

            let injected = self
                .failures
                .lock()
                .expect("failures mutex poisoned")
                .remove(&call);
            if let Some(error) = injected {
                return Err(error);
            }

            let written = self.inner.upsert_batch(rows).await?;
            self.commits
                .lock()
                .expect("commits mutex poisoned")
                .push((Instant::now(), rows.iter().map(|row| row.external_id).collect()));
            Ok(written)
        })
    }

    fn article_count<'a>(&'a self) -> BoxFuture<'a, Result<i64, StoreUnavailable>> {
        self.inner.article_count()
    }
}
