use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::hn_client::{ExternalItem, HnClient, HnClientError, ListEndpoint};

use super::error_mapping::map_hn_error;
use super::types::{AbsentReason, Resolution, SourceUnavailable};

/// Upstream the reconciler pulls from.
///
/// Kept as a trait so the reconcile loop can be driven by scripted sources in
/// tests.
pub trait ItemSource: Send + Sync {
    /// Snapshot of the identifiers behind `endpoint`, in upstream order.
    fn list_identifiers<'a>(
        &'a self,
        endpoint: ListEndpoint,
    ) -> BoxFuture<'a, Result<Vec<i64>, SourceUnavailable>>;

    /// Resolves one identifier to a story, or to `Absent` when there is nothing to
    /// persist.
    fn resolve_item<'a>(&'a self, id: i64) -> BoxFuture<'a, Result<Resolution, SourceUnavailable>>;
}

impl<T> ItemSource for Arc<T>
where
    T: ItemSource + ?Sized,
{
    fn list_identifiers<'a>(
        &'a self,
        endpoint: ListEndpoint,
    ) -> BoxFuture<'a, Result<Vec<i64>, SourceUnavailable>> {
        (**self).list_identifiers(endpoint)
    }

    fn resolve_item<'a>(&'a self, id: i64) -> BoxFuture<'a, Result<Resolution, SourceUnavailable>> {
        (**self).resolve_item(id)
    }
}

/// HN Firebase API source.
pub struct HnSource {
    client: HnClient,
}

impl HnSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, HnClientError> {
        Ok(Self {
            client: HnClient::new(base_url, timeout)?,
        })
    }
}

impl ItemSource for HnSource {
    fn list_identifiers<'a>(
        &'a self,
        endpoint: ListEndpoint,
    ) -> BoxFuture<'a, Result<Vec<i64>, SourceUnavailable>> {
        Box::pin(async move { self.client.list_ids(endpoint).await.map_err(map_hn_error) })
    }

    fn resolve_item<'a>(&'a self, id: i64) -> BoxFuture<'a, Result<Resolution, SourceUnavailable>> {
        Box::pin(async move {
            let Some(raw) = self.client.get_item(id).await.map_err(map_hn_error)? else {
                return Ok(Resolution::Absent(AbsentReason::NotFound));
            };
            if raw.deleted == Some(true) {
                return Ok(Resolution::Absent(AbsentReason::Deleted));
            }

            Ok(match ExternalItem::from(raw) {
                ExternalItem::Story(story) => Resolution::Found(story),
                other => Resolution::Absent(AbsentReason::NotAStory(other.kind())),
            })
        })
    }
}
