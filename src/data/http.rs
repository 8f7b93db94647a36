//! Rate-limited, retrying HTTP fetcher.
//!
//! Every request waits on the injected [`RateLimiter`], carries a
//! per-request timeout, and is retried with exponential backoff on 429,
//! 5xx, and connection/timeout errors. 403 is a permanent access-denied
//! error; any other non-success status fails immediately.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::rate_limit::RateLimiter;
use super::DocumentSource;
use crate::config::FetchConfig;
use crate::types::MonitorError;

/// What to do with a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    Accept,
    Retry,
    Denied,
    Fail,
}

pub fn status_action(status: u16) -> StatusAction {
    match status {
        200..=299 => StatusAction::Accept,
        403 => StatusAction::Denied,
        429 | 500..=599 => StatusAction::Retry,
        _ => StatusAction::Fail,
    }
}

/// Delay before retry `attempt` (1-based): base, 2×base, 4×base, ...
pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(base_ms.saturating_mul(factor))
}

pub struct HttpFetcher {
    http: Client,
    limiter: Arc<RateLimiter>,
    max_retries: u32,
    base_backoff_ms: u64,
}

impl HttpFetcher {
    pub fn new(cfg: &FetchConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(cfg.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            limiter,
            max_retries: cfg.max_retries,
            base_backoff_ms: cfg.base_backoff_ms,
        })
    }

    /// GET `url` and return the body as text.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.base_backoff_ms, attempt);
                debug!(url, attempt, delay_ms = delay.as_millis() as u64, "Retrying request");
                tokio::time::sleep(delay).await;
            }

            self.limiter.acquire().await;
            let resp = self.http.get(url).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    match status_action(status.as_u16()) {
                        StatusAction::Accept => {
                            return response
                                .text()
                                .await
                                .with_context(|| format!("Failed to read body from {url}"));
                        }
                        StatusAction::Retry => {
                            warn!(url, status = %status, attempt, "Retryable HTTP status");
                            last_error = format!("HTTP {status}");
                        }
                        StatusAction::Denied => {
                            return Err(MonitorError::AccessDenied {
                                url: url.to_string(),
                                status: status.as_u16(),
                            }
                            .into());
                        }
                        StatusAction::Fail => {
                            return Err(MonitorError::HttpStatus {
                                url: url.to_string(),
                                status: status.as_u16(),
                            }
                            .into());
                        }
                    }
                }
                Err(e) => {
                    warn!(url, attempt, error = %e, "Request failed");
                    last_error = e.to_string();
                }
            }
        }

        Err(MonitorError::FetchExhausted {
            url: url.to_string(),
            attempts: self.max_retries + 1,
            message: last_error,
        }
        .into())
    }
}

#[async_trait]
impl DocumentSource for HttpFetcher {
    async fn fetch_document(&self, url: &str) -> Result<String> {
        self.get_text(url).await
    }
}

/// Whether an error chain ends in an access-denied response.
pub fn is_access_denied(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<MonitorError>(),
        Some(MonitorError::AccessDenied { .. })
    )
}
