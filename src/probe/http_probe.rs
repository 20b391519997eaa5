use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;

use crate::error::FetchError;
use crate::model::Headers;
use crate::target::Target;

#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Retrieves a target's response. Redirects and retries are the fetcher's job.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, target: &Target) -> Result<FetchResponse, FetchError>;

    /// Fetch an arbitrary URL on the same host without the success check.
    async fn fetch_url(&self, url: &str) -> Result<FetchResponse, FetchError>;
}

/// Flatten a `HeaderMap` into lower-cased name -> value. Repeated
/// `set-cookie` values are joined by newlines, other repeats by `", "`.
pub fn collect_headers(map: &HeaderMap) -> Headers {
    let mut out = Headers::new();
    for name in map.keys() {
        let values: Vec<String> = map
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();
        let sep = if name.as_str() == "set-cookie" { "\n" } else { ", " };
        out.insert(name.as_str().to_ascii_lowercase(), values.join(sep));
    }
    out
}

/// First retry delay; doubles after each failed attempt.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    retries: usize,
}

impl HttpFetcher {
    pub fn new(client: Client, retries: usize) -> Self {
        Self {
            client,
            retries: retries.min(10),
        }
    }

    async fn get_with_retries(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let max_attempts = self.retries + 1;
        let mut backoff = INITIAL_BACKOFF;
        for attempt in 1..=max_attempts {
            tracing::debug!(url, attempt, "fetching");
            match self.get_once(url).await {
                Ok(resp) => return Ok(resp),
                Err(e) if attempt >= max_attempts => {
                    return Err(FetchError::Transport {
                        url: url.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    tracing::debug!(url, attempt, error = %e, delay_ms = backoff.as_millis() as u64, "retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
            }
        }
        Err(FetchError::Other(format!("fetch of {} failed after {} attempts", url, max_attempts)))
    }

    async fn get_once(&self, url: &str) -> Result<FetchResponse, reqwest::Error> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status().as_u16();
        let headers = collect_headers(resp.headers());
        let body = resp.bytes().await?.to_vec();
        Ok(FetchResponse { status, headers, body })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, target: &Target) -> Result<FetchResponse, FetchError> {
        let resp = self.get_with_retries(target.url()).await?;
        if !resp.is_success() {
            return Err(FetchError::Status {
                url: target.url().to_string(),
                status: resp.status,
            });
        }
        tracing::debug!(url = target.url(), status = resp.status, "fetched");
        Ok(resp)
    }

    async fn fetch_url(&self, url: &str) -> Result<FetchResponse, FetchError> {
        self.get_with_retries(url).await
    }
}
