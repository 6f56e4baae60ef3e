use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::app::Result;
use crate::fetcher::Fetcher;

/// Each network fetch is bounded at 30 seconds; a timeout is treated the
/// same as any other network failure upstream.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .gzip(true)
            .brotli(true)
            .user_agent("almanac/0.1.0")
            .build()
            .expect("Failed to build HTTP client");

        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        response.error_for_status_ref()?;
        Ok(response.bytes().await?.to_vec())
    }
}
