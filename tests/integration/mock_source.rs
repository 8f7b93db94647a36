//! In-memory document source for integration testing.
//!
//! Serves canned bodies by exact URL, records every request, and can be
//! told to answer specific URLs with 403.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use dat_monitor::data::DocumentSource;
use dat_monitor::types::MonitorError;

#[derive(Default)]
pub struct MockSource {
    documents: HashMap<String, String>,
    denied: HashSet<String>,
    requests: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: &str) -> Self {
        self.documents.insert(url.to_string(), body.to_string());
        self
    }

    pub fn deny(mut self, url: &str) -> Self {
        self.denied.insert(url.to_string());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentSource for MockSource {
    async fn fetch_document(&self, url: &str) -> Result<String> {
        self.requests.lock().unwrap().push(url.to_string());
        if self.denied.contains(url) {
            return Err(MonitorError::AccessDenied {
                url: url.to_string(),
                status: 403,
            }
            .into());
        }
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("404 Not Found: {url}"))
    }
}

/// EDGAR submissions JSON with one 8-K per `(accession, date, document)`.
pub fn submissions_json(filings: &[(&str, &str, &str)]) -> String {
    serde_json::json!({
        "filings": { "recent": {
            "accessionNumber": filings.iter().map(|f| f.0).collect::<Vec<_>>(),
            "filingDate": filings.iter().map(|f| f.1).collect::<Vec<_>>(),
            "form": filings.iter().map(|_| "8-K").collect::<Vec<_>>(),
            "primaryDocument": filings.iter().map(|f| f.2).collect::<Vec<_>>(),
        }}
    })
    .to_string()
}
