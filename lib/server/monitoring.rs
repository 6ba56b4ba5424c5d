use crate::build_info;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};
use prometheus_client::registry::Registry;
use tokio::sync::OnceCell;

/// Registers immutable build metadata as a labeled gauge with value `1`.
pub fn register_build_info_metric(registry: &mut Registry, prefix: &str) {
    let build_info_metric = Family::<BuildInfoLabels, Gauge>::default();
    build_info_metric
        .get_or_create(&BuildInfoLabels {
            service: "newsdesk",
            version: build_info::VERSION,
            commit: build_info::short_commit_hash(),
        })
        .set(1);
    let sub_registry = registry.sub_registry_with_prefix(prefix);
    sub_registry.register(
        "build_info",
        "Build identity labels for this process",
        build_info_metric,
    );
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct BuildInfoLabels {
    service: &'static str,
    version: &'static str,
    commit: &'static str,
}

#[derive(Clone, Default)]
pub struct IngestMetrics {
    /// Identifiers handled, whatever their outcome.
    pub identifiers_processed: Counter,
    /// Rows written by successful batch commits.
    pub articles_committed: Counter,
    pub absent_items: Counter,
    /// Items whose fetch still failed after retries.
    pub item_failures: Counter,
    pub commits: Counter,
    pub cooldowns: Counter,
}

impl IngestMetrics {
    pub fn register(registry: &mut Registry, prefix: &str) -> Self {
        let metrics = Self::default();
        let sub_registry = registry.sub_registry_with_prefix(prefix);
        sub_registry.register(
            "identifiers_processed",
            "Total number of identifiers handled by reconciliation runs",
            metrics.identifiers_processed.clone(),
        );
        sub_registry.register(
            "articles_committed",
            "Total number of article rows written by batch commits",
            metrics.articles_committed.clone(),
        );
        sub_registry.register(
            "absent_items",
            "Total number of identifiers skipped as absent (missing, deleted or not a story)",
            metrics.absent_items.clone(),
        );
        sub_registry.register(
            "item_failures",
            "Total number of items whose fetch failed after retries",
            metrics.item_failures.clone(),
        );
        sub_registry.register(
            "commits",
            "Total number of successful batch commits",
            metrics.commits.clone(),
        );
        sub_registry.register(
            "cooldowns",
            "Total number of rate-limit cooldown pauses",
            metrics.cooldowns.clone(),
        );
        metrics
    }
}

pub static INGEST_METRICS: OnceCell<IngestMetrics> = OnceCell::const_new();
