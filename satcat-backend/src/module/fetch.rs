//! Source fetching
//!
//! The catalog core works on text that is already in memory. This module is
//! the only place that talks to the network.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use satcat_common::NoradId;

use crate::error::FetchError;

/// Anything that can turn a URL into response text
#[async_trait]
pub trait TextFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;
}

/// reqwest-backed fetcher with a fixed timeout and user agent
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TextFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        tracing::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }
}

/// Fill `{id}` and `{api_key}` in a per-object URL template
pub fn expand_url_template(template: &str, id: NoradId, api_key: Option<&str>) -> String {
    template
        .replace("{id}", &id.to_string())
        .replace("{api_key}", api_key.unwrap_or_default())
}

/// One response body per requested id, in request order. Failed requests
/// are logged and yield `None` so one bad object does not end the batch.
pub async fn fetch_per_object(
    fetcher: &dyn TextFetcher,
    url_template: &str,
    ids: &[NoradId],
    api_key: Option<&str>,
    delay: Duration,
) -> Vec<(NoradId, Option<String>)> {
    let mut bodies = Vec::with_capacity(ids.len());

    for (i, &id) in ids.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let url = expand_url_template(url_template, id, api_key);
        let body = match fetcher.fetch_text(&url).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!("Failed to fetch object {}: {}", id, e);
                None
            }
        };
        bodies.push((id, body));
    }

    tracing::info!(
        "Fetched {} of {} per-object responses",
        bodies.iter().filter(|(_, b)| b.is_some()).count(),
        ids.len()
    );
    bodies
}

/// In-memory fetcher for tests: URL → body, unknown URLs answer 404
#[cfg(test)]
pub(crate) struct StaticFetcher {
    pages: std::collections::HashMap<String, String>,
    requests: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl StaticFetcher {
    pub(crate) fn new<'a>(pages: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|(url, body)| (url.to_string(), body.to_string()))
                .collect(),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl TextFetcher for StaticFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}
