use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::hn_client::ListEndpoint;
use crate::ingest::{ItemFailurePolicy, ReconcileConfig, RetryPolicy};

pub const DEFAULT_HN_API_URL: &str = "https://hacker-news.firebaseio.com/v0";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_url: String,
    /// HN API base url. Default: the public Firebase mirror.
    pub hn_api_url: String,
    /// List fetched when a run is started without explicit ids.
    pub list_endpoint: ListEndpoint,
    /// Commit every N processed ids. Default: 100
    pub batch_size: usize,
    /// Pause every M processed ids, 0 disables. Default: 50
    pub cooldown_every: usize,
    /// Default: 10s
    pub cooldown: Duration,
    pub item_failure_policy: ItemFailurePolicy,
    /// Attempts per item fetch and per commit. Default: 3
    pub max_attempts: u32,
    pub http_timeout: Duration,
    pub metrics_addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. `from_env` passes the process
    /// environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_url = lookup("DATABASE_URL")
            .or_else(|| lookup("DATABASE_CONNECTION_STRING"))
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let hn_api_url = lookup("HN_API_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_HN_API_URL.to_string());

        let batch_size: usize = parse_var(&lookup, "INGEST_BATCH_SIZE", 100)?;
        if batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                var: "INGEST_BATCH_SIZE",
                value: "0".to_string(),
                reason: "batch size must be at least 1".to_string(),
            });
        }

        let max_attempts: u32 = parse_var(&lookup, "INGEST_MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                var: "INGEST_MAX_ATTEMPTS",
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }

        Ok(Self {
            db_url,
            hn_api_url,
            list_endpoint: parse_var(&lookup, "HN_LIST_ENDPOINT", ListEndpoint::TopStories)?,
            batch_size,
            cooldown_every: parse_var(&lookup, "INGEST_COOLDOWN_EVERY", 50)?,
            cooldown: Duration::from_secs(parse_var(&lookup, "INGEST_COOLDOWN_SECS", 10)?),
            item_failure_policy: parse_var(
                &lookup,
                "INGEST_ITEM_FAILURE_POLICY",
                ItemFailurePolicy::Skip,
            )?,
            max_attempts,
            http_timeout: Duration::from_secs(parse_var(&lookup, "HTTP_TIMEOUT_SECS", 20)?),
            metrics_addr: parse_var(
                &lookup,
                "METRICS_ADDR",
                SocketAddr::from(([0, 0, 0, 0], 3000)),
            )?,
        })
    }

    /// Reconciler settings derived from this config.
    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            default_endpoint: self.list_endpoint,
            batch_size: self.batch_size,
            cooldown_every: self.cooldown_every,
            cooldown: self.cooldown,
            item_failure_policy: self.item_failure_policy,
            retry_policy: RetryPolicy {
                max_attempts: self.max_attempts,
                ..RetryPolicy::default()
            },
        }
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|err| ConfigError::InvalidValue {
                var,
                value: raw.clone(),
                reason: err.to_string(),
            }),
    }
}
