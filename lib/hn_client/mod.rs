pub mod items;

use std::time::Duration;

use log::debug;
use thiserror::Error;

pub use items::{ExternalItem, HnItem, ItemKind, ListEndpoint, Story};

#[derive(Error, Debug)]
pub enum HnClientError {
    #[error("connection error: {0}")]
    ConnectError(String),
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("unexpected HTTP status while fetching {resource}: {status}")]
    UnexpectedStatus { resource: String, status: u16 },
    #[error(transparent)]
    JsonParseError(#[from] serde_json::Error),
    #[error(transparent)]
    RequestError(#[from] reqwest::Error),
}

/// Thin HTTP client over the HN Firebase API.
pub struct HnClient {
    client: reqwest::Client,
    base_url: String,
}

impl HnClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, HnClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("newsdesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| HnClientError::ConnectError(format!("could not build client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches the id list behind `endpoint`. An empty array is a valid answer; a
    /// `null` body is not.
    pub async fn list_ids(&self, endpoint: ListEndpoint) -> Result<Vec<i64>, HnClientError> {
        let url = format!("{}/{}.json", self.base_url, endpoint.as_path());
        let body = self.get_text(&url, endpoint.as_path()).await?;

        let ids: Option<Vec<i64>> = serde_json::from_str(&body)?;
        let ids = ids.ok_or_else(|| {
            HnClientError::ParseError(format!("{} returned null instead of an id list", endpoint))
        })?;
        debug!("{} returned {} ids", endpoint, ids.len());
        Ok(ids)
    }

    /// Fetches one item. `Ok(None)` means the API answered with its `null` marker.
    pub async fn get_item(&self, item_id: i64) -> Result<Option<HnItem>, HnClientError> {
        let url = format!("{}/item/{}.json", self.base_url, item_id);
        let body = self.get_text(&url, &format!("item {item_id}")).await?;

        Ok(serde_json::from_str::<Option<HnItem>>(&body)?)
    }

    async fn get_text(&self, url: &str, resource: &str) -> Result<String, HnClientError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(HnClientError::UnexpectedStatus {
                resource: resource.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}
