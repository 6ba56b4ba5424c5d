use crate::build_info;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;
use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing_log::LogTracer;
use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

const SERVICE: &str = "newsdesk";
const MODE: &str = "ingest";

/// Output format for runtime logs, selected with `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Newline-delimited JSON with event fields flattened to the top level.
    Json,
    /// Compact single-line text for terminals.
    Text,
}

impl LogFormat {
    /// Unknown values fall back to JSON.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" | "compact" => Self::Text,
            _ => Self::Json,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
        }
    }
}

/// Logging knobs read from the environment before the subscriber exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub format: LogFormat,
    /// `RUST_LOG`-style directives used when `RUST_LOG` is unset.
    pub fallback_directives: String,
    pub environment: String,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let format = lookup("LOG_FORMAT")
            .map(|raw| LogFormat::parse(&raw))
            .unwrap_or(LogFormat::Json);
        let environment = lookup("APP_ENV")
            .or_else(|| lookup("ENVIRONMENT"))
            .filter(|env| !env.trim().is_empty())
            .unwrap_or_else(|| "dev".to_string());

        Self {
            format,
            // hyper and reqwest are noisy below warn.
            fallback_directives: "info,hyper=warn,reqwest=warn".to_string(),
            environment,
        }
    }
}

/// Identity of one ingest process, attached to the root span of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub run_id: String,
    pub environment: String,
    pub format: LogFormat,
}

impl RunContext {
    fn new(settings: &LogSettings, started_at: SystemTime) -> Self {
        Self {
            run_id: run_id_at(started_at),
            environment: settings.environment.clone(),
            format: settings.format,
        }
    }

    /// Root span every event of the run is recorded under.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "ingest_run",
            service = SERVICE,
            environment = %self.environment,
            mode = MODE,
            run_id = %self.run_id
        )
    }
}

/// Installs the global subscriber, bridges `log` records and announces the run.
///
/// A second call keeps the first subscriber and still returns a fresh context.
pub fn init_logging(settings: &LogSettings) -> RunContext {
    let context = RunContext::new(settings, SystemTime::now());

    let _ = LogTracer::init();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.fallback_directives));
    let _ = tracing_subscriber::registry()
        .with(output_layer(settings.format))
        .with(filter)
        .try_init();

    tracing::info!(
        event = "logging_initialized",
        service = SERVICE,
        environment = %context.environment,
        mode = MODE,
        run_id = %context.run_id,
        build_version = build_info::VERSION,
        build_commit = build_info::short_commit_hash(),
        log_format = context.format.as_str(),
        "newsdesk logging ready"
    );

    context
}

fn output_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .flatten_event(true)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .boxed(),
    }
}

/// `<commit>-<pid>-<start millis>`, so runs of the same build sort by start time.
fn run_id_at(started_at: SystemTime) -> String {
    let millis = started_at
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    format!(
        "{}-{}-{millis}",
        build_info::short_commit_hash(),
        std::process::id()
    )
}

/// Renders a failed run's error with every cause on its own indented line.
/// A backtrace is appended only when `RUST_BACKTRACE` enabled capturing.
pub fn format_error_report(err: &(dyn StdError + 'static)) -> String {
    let mut report = err.to_string();
    let causes = std::iter::successors(err.source(), |&cause| cause.source());
    for (depth, cause) in causes.enumerate() {
        let _ = write!(report, "\n  {}: {cause}", depth + 1);
    }

    let backtrace = Backtrace::capture();
    if backtrace.status() == BacktraceStatus::Captured {
        let _ = write!(report, "\nbacktrace:\n{backtrace}");
    }
    report
}
