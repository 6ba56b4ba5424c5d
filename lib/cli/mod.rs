use crate::build_info;
use crate::hn_client::ListEndpoint;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    about = "Reconcile HackerNews stories into the newsdesk article store",
    version = build_info::VERSION_WITH_COMMIT,
    long_version = build_info::VERSION_WITH_COMMIT
)]
pub struct Cli {
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    /// Reconcile these ids instead of fetching a list
    pub ids: Option<Vec<i64>>,

    #[arg(long, value_enum, conflicts_with = "ids")]
    /// List endpoint to snapshot (overrides HN_LIST_ENDPOINT)
    pub endpoint: Option<ListEndpoint>,

    #[arg(long)]
    /// Serve /health and /metrics while the run is in progress
    pub serve_metrics: bool,

    #[arg(long)]
    /// Do not apply pending schema migrations at startup
    pub skip_migrations: bool,
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
