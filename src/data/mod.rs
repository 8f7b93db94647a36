//! Document fetchers: the collaborators that turn SEC filings and company
//! web pages into scraped signals, page analytics, and press-release leads.
//!
//! Defines the `DocumentSource` trait; `http::HttpFetcher` is the network
//! implementation, tests substitute in-memory sources.

pub mod edgar;
pub mod http;
pub mod ir;
pub mod rate_limit;
pub mod website;

use anyhow::Result;
use async_trait::async_trait;

/// Raw text for a document, by URL.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch_document(&self, url: &str) -> Result<String>;
}
