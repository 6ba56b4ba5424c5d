mod error_mapping;
mod reconciler;
mod retry;
mod source;
mod store;
pub mod types;

pub use reconciler::Reconciler;
pub use source::{HnSource, ItemSource};
pub use store::{ArticleStore, PgArticleStore, SqliteArticleStore};
pub use types::{
    AbsentReason, ItemFailure, ItemFailurePolicy, ReconcileConfig, ReconcileError,
    ReconcileReport, Resolution, RetryPolicy, SourceErrorKind, SourceUnavailable,
    StoreUnavailable,
};

#[cfg(test)]
mod test_support;
