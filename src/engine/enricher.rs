//! Post-batch ledger enrichment.
//!
//! Merges page analytics and purchase rows from the website scrapers and
//! press releases discovered on investor-relations pages into the ledger.
//! None of this touches holdings, totals, or the oscillation history; it
//! runs after the batch and is saved with the same atomic write.

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::storage;
use crate::types::{DiscoveredRelease, Enrichment, Ledger};

/// What one enrichment pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentSummary {
    pub companies: usize,
    pub transactions_added: usize,
    pub not_found: usize,
    pub releases: usize,
}

impl fmt::Display for EnrichmentSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "companies={} transactions_added={} not_found={} releases={}",
            self.companies, self.transactions_added, self.not_found, self.releases
        )
    }
}

/// Replace each target company's analytics and merge its purchase rows.
pub fn apply_enrichments(ledger: &mut Ledger, enrichments: &[Enrichment]) -> EnrichmentSummary {
    let mut summary = EnrichmentSummary::default();
    for enrichment in enrichments {
        let Some(company) = ledger.find_mut(&enrichment.ticker, &enrichment.token) else {
            warn!(ticker = %enrichment.ticker, token = %enrichment.token, "Enrichment target not in ledger");
            summary.not_found += 1;
            continue;
        };
        if !enrichment.metrics.is_empty() {
            company.analytics = Some(enrichment.metrics.clone());
        }
        let added = company.merge_transactions(enrichment.transactions.iter().cloned());
        debug!(
            ticker = %enrichment.ticker,
            metrics = enrichment.metrics.len(),
            added,
            "Enrichment applied"
        );
        summary.companies += 1;
        summary.transactions_added += added;
    }
    summary
}

/// Merge newly discovered releases into the existing list.
///
/// Existing entries win on URL collisions. Dated entries older than
/// `max_age_days` are dropped; undated or unparseable ones are kept. The
/// result is newest first, then by discovery time.
pub fn merge_releases(
    existing: &[DiscoveredRelease],
    incoming: Vec<DiscoveredRelease>,
    today: NaiveDate,
    max_age_days: i64,
) -> Vec<DiscoveredRelease> {
    let cutoff = today - Duration::days(max_age_days);
    let fresh = |r: &DiscoveredRelease| r.parsed_date().map_or(true, |d| d >= cutoff);

    let mut seen = HashSet::new();
    let mut merged: Vec<DiscoveredRelease> = existing
        .iter()
        .chain(incoming.iter())
        .filter(|r| !r.url.is_empty() && fresh(r))
        .filter(|r| seen.insert(r.url.clone()))
        .cloned()
        .collect();

    merged.sort_by(|a, b| {
        let key = |r: &DiscoveredRelease| {
            (r.date.clone().unwrap_or_else(|| "0000-00-00".to_string()), r.discovered_at.clone())
        };
        key(b).cmp(&key(a))
    });
    merged
}

/// Load the ledger, apply enrichments and discovered releases, and save
/// it if anything changed. Returns whether the file was rewritten.
pub fn persist(
    ledger_path: &Path,
    enrichments: &[Enrichment],
    releases: Vec<DiscoveredRelease>,
    today: NaiveDate,
    max_age_days: i64,
) -> Result<bool> {
    if enrichments.is_empty() && releases.is_empty() {
        debug!("No enrichments or releases; ledger untouched");
        return Ok(false);
    }

    let mut ledger = storage::load_ledger(ledger_path)?;
    let before = ledger.clone();

    let mut summary = apply_enrichments(&mut ledger, enrichments);
    let incoming = releases.len();
    ledger.discovered_press_releases =
        merge_releases(&ledger.discovered_press_releases, releases, today, max_age_days);
    summary.releases = ledger.discovered_press_releases.len();

    if ledger == before {
        info!(summary = %summary, "Enrichment produced no changes; nothing written");
        return Ok(false);
    }

    storage::save_ledger(&mut ledger, ledger_path)?;
    info!(summary = %summary, incoming, "Enrichments persisted");
    Ok(true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
