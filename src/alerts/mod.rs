//! Notification sinks for applied holdings changes.
//!
//! Sinks run after the ledger has been persisted. A failing sink is logged
//! and never fails the batch.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{AlertsConfig, AppConfig};
use crate::types::ChangeEvent;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &ChangeEvent) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Log sink
// ---------------------------------------------------------------------------

/// Emits each change as a structured log line.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, event: &ChangeEvent) -> Result<()> {
        info!(
            ticker = %event.ticker,
            token = %event.token,
            before = event.before,
            after = event.after,
            delta = event.delta(),
            source = event.source_url.as_deref().unwrap_or(""),
            "Holdings changed"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Webhook sink
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: String,
    event: &'a ChangeEvent,
}

/// POSTs `{"text": ..., "event": {...}}` to a chat-style incoming webhook.
#[derive(Debug)]
pub struct WebhookSink {
    http: Client,
    url: SecretString,
}

impl WebhookSink {
    pub fn new(url: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self { http, url })
    }

    /// Webhook from the env var named in `[alerts]`, if configured and set.
    pub fn from_config(cfg: &AlertsConfig) -> Result<Option<Self>> {
        let Some(env_name) = cfg.webhook_url_env.as_deref() else {
            return Ok(None);
        };
        match AppConfig::resolve_env(env_name) {
            Ok(url) if !url.trim().is_empty() => Ok(Some(Self::new(SecretString::new(url))?)),
            _ => {
                warn!(env = env_name, "Webhook env var not set; webhook alerts disabled");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn notify(&self, event: &ChangeEvent) -> Result<()> {
        let payload = WebhookPayload {
            text: format!("DAT holdings update: {event}"),
            event,
        };

        let resp = self
            .http
            .post(self.url.expose_secret())
            .json(&payload)
            .send()
            .await
            .context("Webhook request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Webhook rejected event {status}: {body}");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

/// Deliver every event to every sink. Returns the number of failed
/// deliveries.
pub async fn notify_all(sinks: &[Arc<dyn NotificationSink>], events: &[ChangeEvent]) -> usize {
    let mut failures = 0;
    for event in events {
        for (index, sink) in sinks.iter().enumerate() {
            if let Err(e) = sink.notify(event).await {
                failures += 1;
                warn!(sink = index, ticker = %event.ticker, error = %e, "Notification failed");
            }
        }
    }
    failures
}
