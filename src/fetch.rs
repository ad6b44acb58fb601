use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tokio::time::sleep;
use tracing::warn;

use crate::error::{Error, Result};

pub const FEED_TIMEOUT: Duration = Duration::from_secs(30);
pub const PAGE_TIMEOUT: Duration = Duration::from_secs(20);
pub const RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Retrieves listing pages and product feeds as text.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<String>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<String> {
        let res = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .header("User-Agent", "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
            .header("Accept-Language", "en-US,en;q=0.5")
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8")
            .send()
            .await?
            .error_for_status()?;
        let body = res.bytes().await?;
        if body.is_empty() {
            return Err(Error::Fetch {
                url: url.to_string(),
                reason: "empty response body".into(),
            });
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// Fetches `url`, trying once more after a short pause if the first attempt fails.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    url: &Url,
    timeout: Duration,
    pause: Duration,
) -> Result<String> {
    match fetcher.fetch(url, timeout).await {
        Ok(body) => Ok(body),
        Err(e) => {
            warn!("Retrying {} after error: {}", url, e);
            sleep(pause).await;
            fetcher.fetch(url, timeout).await
        }
    }
}
