//! Retrying HTTP client shared by the Bilibili fetcher.
//!
//! Retries transient failures (timeouts, connect errors, 429 and 5xx gateway statuses) with
//! exponential backoff: `retry_delay * 2^attempt`. After `max_retries + 1` attempts the last
//! error is returned. Non-retryable statuses fail immediately.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, COOKIE, REFERER};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::NetworkSettings;
use crate::error::{AnalyzerError, Result};

const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

pub fn is_retryable_status(status: StatusCode) -> bool {
    RETRY_STATUSES.contains(&status.as_u16())
}

fn is_retryable_error(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect()
}

/// Delay before retry number `attempt + 1`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

#[derive(Clone)]
pub struct RetryClient {
    http: reqwest::Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl RetryClient {
    pub fn new(settings: &NetworkSettings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, HeaderValue::from_static("https://www.bilibili.com"));
        if let Some(sess) = settings.sessdata.as_deref().filter(|s| !s.is_empty()) {
            let cookie = HeaderValue::from_str(&format!("SESSDATA={sess}"))
                .map_err(|e| AnalyzerError::Config(format!("invalid sessdata: {e}")))?;
            headers.insert(COOKIE, cookie);
        }
        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(settings.timeout_secs.min(10)))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| AnalyzerError::Config(format!("building http client: {e}")))?;
        Ok(Self::with_client(
            http,
            settings.max_retries,
            Duration::from_secs_f64(settings.retry_delay_secs),
        ))
    }

    pub fn with_client(http: reqwest::Client, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            http,
            max_retries,
            retry_delay,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// GET with retries. Returns the first successful (2xx) response.
    pub async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Response> {
        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.retry_delay, attempt - 1);
                debug!(target: "http", attempt, delay_ms = delay.as_millis() as u64, "retrying");
                tokio::time::sleep(delay).await;
            }
            match self.http.get(url).query(query).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if is_retryable_status(resp.status()) => {
                    let status = resp.status();
                    warn!(target: "http", %status, attempt, "retryable status");
                    last_err = Some(AnalyzerError::Network {
                        code: format!("HTTP_{}", status.as_u16()),
                        message: format!("{url} answered {status}"),
                    });
                }
                Ok(resp) => {
                    return Err(AnalyzerError::Upstream(format!(
                        "{url} answered {}",
                        resp.status()
                    )));
                }
                Err(e) if is_retryable_error(&e) => {
                    warn!(target: "http", error = %e, attempt, "transient transport error");
                    last_err = Some(e.into());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err.unwrap_or_else(|| AnalyzerError::Network {
            code: "UNKNOWN".to_string(),
            message: format!("no attempt made for {url}"),
        }))
    }

    pub async fn get_bytes(&self, url: &str, query: &[(&str, String)]) -> Result<Vec<u8>> {
        let resp = self.get(url, query).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    pub async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let resp = self.get(url, query).await?;
        Ok(resp.text().await?)
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let bytes = self.get_bytes(url, query).await?;
        serde_json::from_slice(&bytes).map_err(|e| AnalyzerError::Decode(e.to_string()))
    }
}
