//! Recipe fetching
//!
//! Reads recipes from the local filesystem or downloads them over HTTP(S),
//! with retry and exponential backoff for the network case.

use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::defaults;
use crate::core::target::RecipeLocator;
use crate::error::FetchError;

/// Fetches recipe snapshots
#[derive(Debug, Clone)]
pub struct RecipeFetcher {
    /// HTTP client used when no proxy is configured
    client: reqwest::Client,
    /// Maximum attempts per fetch
    max_retries: u32,
    /// Base delay for exponential backoff (in milliseconds)
    base_delay_ms: u64,
    /// Size cap for a recipe
    max_bytes: usize,
}

impl RecipeFetcher {
    /// Create a fetcher with default settings
    pub fn new() -> Self {
        Self::with_config(
            defaults::MAX_FETCH_RETRIES,
            defaults::FETCH_RETRY_BASE_DELAY_MS,
        )
    }

    /// Create a fetcher with custom retry settings
    pub fn with_config(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            client: build_client(None).unwrap_or_else(|_| reqwest::Client::new()),
            max_retries: max_retries.max(1),
            base_delay_ms,
            max_bytes: defaults::MAX_RECIPE_BYTES,
        }
    }

    /// Get max retries
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Fetch the recipe behind `locator`, optionally through `proxy`
    pub async fn fetch(
        &self,
        locator: &RecipeLocator,
        proxy: Option<&str>,
    ) -> Result<Vec<u8>, FetchError> {
        match locator {
            RecipeLocator::Local(path) => {
                if path.is_dir() {
                    return Err(FetchError::IsDirectory { path: path.clone() });
                }
                tokio::fs::read(path).await.map_err(|e| FetchError::IoError {
                    path: path.clone(),
                    error: e.to_string(),
                })
            }
            RecipeLocator::Remote(url) => {
                let client = match proxy {
                    Some(proxy) => build_client(Some(proxy))?,
                    None => self.client.clone(),
                };
                self.download(&client, url).await
            }
        }
    }

    async fn download(&self, client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut attempts = 0;
        let mut delay_ms = self.base_delay_ms;

        loop {
            attempts += 1;
            match self.download_once(client, url).await {
                Ok(body) => return Ok(body),
                // A 4xx will not get better by retrying
                Err(e @ FetchError::HttpStatus { status, .. }) if (400..500).contains(&status) => {
                    return Err(e)
                }
                Err(e @ FetchError::TooLarge { .. }) => return Err(e),
                Err(e) if attempts >= self.max_retries => return Err(e),
                Err(e) => {
                    tracing::debug!("fetch attempt {attempts} for {url} failed: {e}");
                    // Exponential backoff with cap at 30 seconds
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = (delay_ms * 2).min(30_000);
                }
            }
        }
    }

    async fn download_once(
        &self,
        client: &reqwest::Client,
        url: &str,
    ) -> Result<Vec<u8>, FetchError> {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::NetworkError {
                url: url.to_string(),
                error: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::NetworkError {
                url: url.to_string(),
                error: e.to_string(),
            })?;
            if body.len() + chunk.len() > self.max_bytes {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    limit: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

impl Default for RecipeFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn build_client(proxy: Option<&str>) -> Result<reqwest::Client, FetchError> {
    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(30));
    if let Some(proxy) = proxy {
        let proxy_config = reqwest::Proxy::all(proxy).map_err(|e| FetchError::Proxy {
            proxy: proxy.to_string(),
            error: e.to_string(),
        })?;
        builder = builder.proxy(proxy_config);
    }
    builder.build().map_err(|e| FetchError::Proxy {
        proxy: proxy.unwrap_or_default().to_string(),
        error: e.to_string(),
    })
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
