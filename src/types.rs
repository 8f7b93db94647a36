//! Shared types for the DAT monitor.
//!
//! The ledger types mirror the dashboard's `data.json` contract field for
//! field (camelCase on the wire). Keys this crate does not model are kept in
//! `extra` maps so a load/save cycle never drops dashboard data.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

fn is_false(v: &bool) -> bool {
    !*v
}

// ---------------------------------------------------------------------------
// Source kind
// ---------------------------------------------------------------------------

/// Where a scraped signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Edgar,
    Website,
    Manual,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Edgar => write!(f, "edgar"),
            SourceKind::Website => write!(f, "website"),
            SourceKind::Manual => write!(f, "manual"),
        }
    }
}

// ---------------------------------------------------------------------------
// Company
// ---------------------------------------------------------------------------

/// One entry in a company's bounded filing history (newest first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingRef {
    pub url: String,
    pub date: String,
    #[serde(default)]
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SourceKind>,
}

/// One purchase/acquisition row for a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub date: String,
    pub asset: String,
    pub quantity: u64,
    pub price_usd: u64,
    pub total_cost: u64,
    pub cumulative_tokens: u64,
    pub avg_cost_basis: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl Transaction {
    /// Deterministic dedup key: `date:asset:totalCost` unless an explicit
    /// fingerprint was imported with the row.
    pub fn fingerprint(&self) -> String {
        match self.fingerprint.as_deref() {
            Some(fp) if !fp.is_empty() => fp.to_string(),
            _ => format!("{}:{}:{}", self.date, self.asset, self.total_cost),
        }
    }
}

/// A tracked company within one token group.
///
/// Optional attributes are modelled as `Option`s rather than missing keys;
/// empty strings read from older files are treated as absent by the
/// accessor methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub ticker: String,
    pub name: String,
    pub tokens: u64,
    pub last_update: String,
    pub change: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cik: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ir_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_source: Option<SourceKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sec_update: Option<String>,
    /// When set, holdings are maintained by hand and never mutated here.
    #[serde(
        rename = "manual_override",
        alias = "manualOverride",
        default,
        skip_serializing_if = "is_false"
    )]
    pub manual_override: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filings: Vec<FilingRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transactions: Vec<Transaction>,
    /// Dashboard metrics (mNAV, NAV, cost basis, ...) scraped from the
    /// company's own pages. Replaced wholesale on each enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Company {
    /// Minimal company with only the required fields set.
    pub fn new(ticker: &str, name: &str, tokens: u64, last_update: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            name: name.to_string(),
            tokens,
            last_update: last_update.to_string(),
            change: 0,
            notes: None,
            cik: None,
            ir_url: None,
            alert_url: None,
            alert_date: None,
            alert_note: None,
            alert_source: None,
            last_sec_update: None,
            manual_override: false,
            filings: Vec::new(),
            transactions: Vec::new(),
            analytics: None,
            extra: Map::new(),
        }
    }

    /// Regulatory identifier, if one is on file.
    pub fn cik(&self) -> Option<&str> {
        self.cik.as_deref().filter(|c| !c.trim().is_empty())
    }

    pub fn ir_url(&self) -> Option<&str> {
        self.ir_url.as_deref().filter(|u| !u.trim().is_empty())
    }

    /// Insert a filing at the front, dropping any older entry with the same
    /// URL, and cap the list length.
    pub fn record_filing(&mut self, entry: FilingRef, cap: usize) {
        self.filings.retain(|f| f.url != entry.url);
        self.filings.insert(0, entry);
        self.filings.truncate(cap);
    }

    /// Merge transactions, skipping rows whose fingerprint is already
    /// present. Returns how many rows were added.
    pub fn merge_transactions<I>(&mut self, incoming: I) -> usize
    where
        I: IntoIterator<Item = Transaction>,
    {
        let mut known: BTreeSet<String> =
            self.transactions.iter().map(Transaction::fingerprint).collect();
        let mut added = 0;
        for txn in incoming {
            if known.insert(txn.fingerprint()) {
                self.transactions.push(txn);
                added += 1;
            }
        }
        if added > 0 {
            self.transactions.sort_by(|a, b| b.date.cmp(&a.date));
        }
        added
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// One entry in the ledger's bounded recent-change trail (newest first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentChange {
    pub ticker: String,
    pub token: String,
    pub date: String,
    pub tokens: u64,
    pub change: i64,
    pub summary: String,
}

/// The persisted canonical snapshot (`data.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub last_updated_display: String,
    #[serde(default)]
    pub totals: BTreeMap<String, u64>,
    #[serde(default)]
    pub recent_changes: Vec<RecentChange>,
    #[serde(default)]
    pub companies: BTreeMap<String, Vec<Company>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discovered_press_releases: Vec<DiscoveredRelease>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Ledger {
    pub fn find(&self, ticker: &str, token: &str) -> Option<&Company> {
        self.companies
            .get(token)?
            .iter()
            .find(|c| c.ticker == ticker)
    }

    pub fn find_mut(&mut self, ticker: &str, token: &str) -> Option<&mut Company> {
        self.companies
            .get_mut(token)?
            .iter_mut()
            .find(|c| c.ticker == ticker)
    }

    /// Ticker → CIK lookup across all token groups. The first non-blank
    /// CIK on file for the ticker wins.
    pub fn cik_for(&self, ticker: &str) -> Option<&str> {
        self.iter_companies()
            .filter(|(_, c)| c.ticker == ticker)
            .find_map(|(_, c)| c.cik())
    }

    /// Iterate `(token_group, company)` pairs.
    pub fn iter_companies(&self) -> impl Iterator<Item = (&str, &Company)> {
        self.companies
            .iter()
            .flat_map(|(group, list)| list.iter().map(move |c| (group.as_str(), c)))
    }

    pub fn company_count(&self) -> usize {
        self.companies.values().map(Vec::len).sum()
    }

    /// Sum holdings per token group.
    pub fn computed_totals(&self) -> Result<BTreeMap<String, u64>, MonitorError> {
        let mut totals = BTreeMap::new();
        for (group, list) in &self.companies {
            let mut sum: u64 = 0;
            for c in list {
                sum = sum.checked_add(c.tokens).ok_or_else(|| {
                    MonitorError::Overflow(format!("{group} total overflows at {}", c.ticker))
                })?;
            }
            totals.insert(group.clone(), sum);
        }
        Ok(totals)
    }

    /// Recompute the per-group aggregate from member holdings.
    pub fn recompute_totals(&mut self) -> Result<(), MonitorError> {
        self.totals = self.computed_totals()?;
        Ok(())
    }

    /// Check `totals[group] == sum(members)` for every group.
    pub fn verify_totals(&self) -> Result<(), MonitorError> {
        let expected = self.computed_totals()?;
        if expected != self.totals {
            for (group, sum) in &expected {
                let stored = self.totals.get(group).copied();
                if stored != Some(*sum) {
                    return Err(MonitorError::InvariantViolation(format!(
                        "totals[{group}] = {stored:?}, members sum to {sum}"
                    )));
                }
            }
            return Err(MonitorError::InvariantViolation(
                "totals contain groups with no companies".to_string(),
            ));
        }
        Ok(())
    }

    /// Prepend a recent-change entry and cap the trail.
    pub fn push_recent_change(&mut self, entry: RecentChange, cap: usize) {
        self.recent_changes.insert(0, entry);
        self.recent_changes.truncate(cap);
    }

    /// Set `lastUpdated` / `lastUpdatedDisplay`.
    pub fn stamp(&mut self, now: DateTime<Utc>) {
        self.last_updated = now.to_rfc3339();
        self.last_updated_display = now.format("%b %-d, %Y %-I:%M %p UTC").to_string();
    }
}

// ---------------------------------------------------------------------------
// Enrichments
// ---------------------------------------------------------------------------

/// Non-holdings data scraped from a company page, merged into the ledger
/// after the batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub ticker: String,
    pub token: String,
    pub source_url: String,
    pub metrics: Map<String, Value>,
    pub transactions: Vec<Transaction>,
}

/// A press-release link found on a company investor-relations page,
/// queued for manual review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredRelease {
    pub ticker: String,
    pub token: String,
    pub title: String,
    pub url: String,
    /// ISO date when one was found near the link.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub source_page: String,
    #[serde(default)]
    pub discovered_at: String,
}

impl DiscoveredRelease {
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.date.as_deref()?, "%Y-%m-%d").ok()
    }
}

// ---------------------------------------------------------------------------
// Oscillation history
// ---------------------------------------------------------------------------

/// Per-(ticker, token) oscillation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingRecord {
    pub last_confirmed_value: u64,
    /// Every value ever accepted for this entity. Only grows.
    pub seen_values: BTreeSet<u64>,
    pub last_update_date: NaiveDate,
}

/// The persisted history store: `"TICKER:TOKEN"` → record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OscillationHistory(BTreeMap<String, HoldingRecord>);

impl OscillationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(ticker: &str, token: &str) -> String {
        format!("{ticker}:{token}")
    }

    pub fn get(&self, ticker: &str, token: &str) -> Option<&HoldingRecord> {
        self.0.get(&Self::key(ticker, token))
    }

    /// Replace the record for an entity. Records already handed out are
    /// untouched; callers holding a clone keep the old value.
    pub fn commit(&mut self, ticker: &str, token: &str, record: HoldingRecord) {
        self.0.insert(Self::key(ticker, token), record);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &HoldingRecord)> {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// Scraped signals
// ---------------------------------------------------------------------------

/// EDGAR filing metadata attached to a signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingMeta {
    pub accession_number: String,
    pub form: String,
    pub filing_date: NaiveDate,
    pub document: String,
}

/// A candidate holdings update produced by a fetcher. Consumed once per
/// batch; never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedSignal {
    pub ticker: String,
    pub token: String,
    pub new_value: u64,
    pub context_text: String,
    pub source_url: Option<String>,
    pub source_kind: Option<SourceKind>,
    pub filing: Option<FilingMeta>,
}

impl ScrapedSignal {
    pub fn new(ticker: &str, token: &str, new_value: u64, context_text: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            token: token.to_string(),
            new_value,
            context_text: context_text.to_string(),
            source_url: None,
            source_kind: None,
            filing: None,
        }
    }

    pub fn with_source(mut self, url: &str, kind: SourceKind) -> Self {
        self.source_url = Some(url.to_string());
        self.source_kind = Some(kind);
        self
    }

    pub fn with_filing(mut self, filing: FilingMeta) -> Self {
        self.filing = Some(filing);
        self
    }

    /// Source URL if present and non-blank.
    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref().filter(|u| !u.trim().is_empty())
    }
}

impl fmt::Display for ScrapedSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) = {}", self.ticker, self.token, self.new_value)?;
        if let Some(kind) = self.source_kind {
            write!(f, " via {kind}")?;
        }
        Ok(())
    }
}

/// Structured change event handed to notification sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub ticker: String,
    pub token: String,
    pub before: u64,
    pub after: u64,
    pub source_url: Option<String>,
}

impl ChangeEvent {
    pub fn delta(&self) -> i64 {
        self.after as i64 - self.before as i64
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} → {} ({:+})",
            self.ticker,
            self.token,
            self.before,
            self.after,
            self.delta()
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the monitor.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Access denied (HTTP {status}) for {url}")]
    AccessDenied { url: String, status: u16 },

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Fetch failed for {url} after {attempts} attempt(s): {message}")]
    FetchExhausted {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("Extraction setup error: {0}")]
    Extraction(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
