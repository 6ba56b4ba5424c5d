use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::hn_client::{ItemKind, ListEndpoint, Story};

/// Configures per-call micro retry for item fetches and batch commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first attempt.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            jitter: Duration::from_millis(50),
        }
    }
}

/// What a run does with an item whose fetch still fails after retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemFailurePolicy {
    /// Log it, record it in the report and keep going.
    #[default]
    Skip,
    /// Stop the run. Rows staged since the last commit are discarded.
    Abort,
}

impl FromStr for ItemFailurePolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "abort" => Ok(Self::Abort),
            other => Err(format!("expected `skip` or `abort`, got `{other}`")),
        }
    }
}

/// Reconciler settings. Passed explicitly so runs are deterministic under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileConfig {
    pub default_endpoint: ListEndpoint,
    /// Commit after every `batch_size`-th processed id (1-based).
    pub batch_size: usize,
    /// Pause after every `cooldown_every`-th processed id; 0 disables pacing.
    /// No pause follows the final id, even when it falls on a boundary.
    pub cooldown_every: usize,
    pub cooldown: Duration,
    pub item_failure_policy: ItemFailurePolicy,
    pub retry_policy: RetryPolicy,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            default_endpoint: ListEndpoint::TopStories,
            batch_size: 100,
            cooldown_every: 50,
            cooldown: Duration::from_secs(10),
            item_failure_policy: ItemFailurePolicy::Skip,
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Normalized source failure classes used by retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Network,
    RateLimited,
    UpstreamUnavailable,
    Unauthorized,
    Forbidden,
    MalformedResponse,
    Other,
}

/// The upstream could not answer: transport failure, non-2xx status or an
/// unparseable body. Distinct from an item that does not exist.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("source unavailable ({kind:?}): {message}")]
pub struct SourceUnavailable {
    pub kind: SourceErrorKind,
    pub message: String,
}

impl SourceUnavailable {
    pub fn new(kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            SourceErrorKind::Network
                | SourceErrorKind::RateLimited
                | SourceErrorKind::UpstreamUnavailable
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    Retryable,
    Fatal,
}

/// The store rejected or could not complete a write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("store unavailable: {message}")]
pub struct StoreUnavailable {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreUnavailable {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            kind: StoreErrorKind::Retryable,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: StoreErrorKind::Fatal,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == StoreErrorKind::Retryable
    }
}

/// Why an identifier produced no row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsentReason {
    /// The API answered `null`.
    NotFound,
    Deleted,
    NotAStory(ItemKind),
}

/// Result of resolving one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(Story),
    Absent(AbsentReason),
}

/// An identifier whose fetch failed and was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub external_id: i64,
    pub attempts: u32,
    pub error: SourceUnavailable,
}

/// Summary of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    /// Size of the identifier snapshot the run started from.
    pub total: usize,
    /// Identifiers handled, including absent and failed ones.
    pub processed: usize,
    /// Rows written by successful commits.
    pub upserted: usize,
    pub absent: usize,
    pub failures: Vec<ItemFailure>,
    pub commits: usize,
    pub cooldowns: usize,
    /// Set when the run stopped early on cancellation.
    pub interrupted: bool,
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("could not fetch the identifier list")]
    ListUnavailable(#[source] SourceUnavailable),

    #[error("aborted at item {external_id} after {attempts} attempt(s)")]
    ItemAborted {
        external_id: i64,
        attempts: u32,
        #[source]
        source: SourceUnavailable,
    },

    #[error("commit of {pending} staged row(s) failed after {attempts} attempt(s); {committed} row(s) were already durable")]
    Store {
        pending: usize,
        committed: usize,
        attempts: u32,
        #[source]
        source: StoreUnavailable,
    },
}
