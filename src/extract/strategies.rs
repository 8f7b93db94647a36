//! Pluggable per-source extraction strategies.
//!
//! Each strategy turns a document's plain text into an optional holdings
//! figure, plus whatever dashboard analytics the page publishes.
//! Strategies are registered under a source id (`window:SOL`,
//! `metaplanet`, ...) and looked up by the website collaborator, so adding
//! a company page never means branching on its ticker.

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::{numbers, Extractor};
use crate::config::WebsiteSource;
use crate::types::{MonitorError, Transaction};

/// Analytics scraped alongside the holdings figure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageAnalytics {
    /// camelCase dashboard keys → numbers.
    pub metrics: Map<String, Value>,
    pub purchases: Vec<Transaction>,
}

impl PageAnalytics {
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.purchases.is_empty()
    }
}

/// `extract(document) -> optional value`, keyed by a source id.
pub trait ExtractionStrategy: Send + Sync {
    fn id(&self) -> &str;

    fn extract(&self, text: &str) -> Option<u64>;

    fn analytics(&self, _text: &str) -> PageAnalytics {
        PageAnalytics::default()
    }
}

/// Alias-window extraction for one token symbol.
pub struct WindowStrategy {
    id: String,
    symbol: String,
    extractor: Arc<Extractor>,
}

impl WindowStrategy {
    pub fn new(symbol: &str, extractor: Arc<Extractor>) -> Self {
        Self {
            id: format!("window:{symbol}"),
            symbol: symbol.to_string(),
            extractor,
        }
    }
}

impl ExtractionStrategy for WindowStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn extract(&self, text: &str) -> Option<u64> {
        self.extractor.extract(text, &self.symbol)
    }
}

fn compile(id: &str, pattern: &str, groups: usize) -> Result<Regex, MonitorError> {
    let re = Regex::new(pattern).map_err(|e| MonitorError::Extraction(format!("strategy {id}: {e}")))?;
    if re.captures_len() < groups + 1 {
        return Err(MonitorError::Extraction(format!(
            "strategy {id}: pattern {pattern:?} needs {groups} capture group(s)"
        )));
    }
    Ok(re)
}

/// A purchase-history table rendered as text rows:
/// `date  quantity  avg price  total cost  cumulative`.
struct PurchaseTable {
    row: Regex,
    asset: String,
    source: String,
}

impl PurchaseTable {
    fn rows(&self, text: &str) -> Vec<Transaction> {
        self.row
            .captures_iter(text)
            .filter_map(|caps| {
                let date = purchase_date(caps.get(1)?.as_str())?;
                let quantity = rounded(caps.get(2)?.as_str())?;
                let cumulative_tokens = rounded(caps.get(5)?.as_str())?;
                Some(Transaction {
                    date,
                    asset: self.asset.clone(),
                    quantity,
                    price_usd: rounded(caps.get(3)?.as_str()).unwrap_or(0),
                    total_cost: rounded(caps.get(4)?.as_str()).unwrap_or(0),
                    cumulative_tokens,
                    avg_cost_basis: 0,
                    source: Some(self.source.clone()),
                    fingerprint: None,
                })
            })
            .collect()
    }
}

/// `Dec 30, 2025` → `2025-12-30`
fn purchase_date(raw: &str) -> Option<String> {
    let normalized = raw.replace(',', "");
    let normalized: Vec<&str> = normalized.split_whitespace().collect();
    NaiveDate::parse_from_str(&normalized.join(" "), "%b %d %Y")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

fn rounded(raw: &str) -> Option<u64> {
    let value = numbers::parse_metric(raw)?;
    (value >= 0.0 && value < u64::MAX as f64).then(|| value.round() as u64)
}

fn metric_value(value: f64) -> Option<Value> {
    if value.fract() == 0.0 && value >= 0.0 && value < u64::MAX as f64 {
        return Some(Value::from(value as u64));
    }
    serde_json::Number::from_f64(value).map(Value::Number)
}

/// Ordered regexes; the first capture group of the first match wins.
/// Optional named metric patterns and a purchase table feed
/// [`ExtractionStrategy::analytics`].
pub struct PatternStrategy {
    id: String,
    patterns: Vec<Regex>,
    metrics: Vec<(String, Regex)>,
    purchases: Option<PurchaseTable>,
}

impl PatternStrategy {
    pub fn new(id: &str, patterns: &[&str]) -> Result<Self, MonitorError> {
        let patterns = patterns
            .iter()
            .map(|p| compile(id, p, 1))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            id: id.to_string(),
            patterns,
            metrics: Vec::new(),
            purchases: None,
        })
    }

    /// Add `(json key, pattern)` metrics; each pattern captures one number.
    pub fn with_metrics(mut self, metrics: &[(&str, &str)]) -> Result<Self, MonitorError> {
        for (key, pattern) in metrics {
            self.metrics.push((key.to_string(), compile(&self.id, pattern, 1)?));
        }
        Ok(self)
    }

    /// Add a purchase table whose rows capture date, quantity, average
    /// price, total cost and cumulative holdings, in that order.
    pub fn with_purchase_table(mut self, row: &str, asset: &str, source: &str) -> Result<Self, MonitorError> {
        self.purchases = Some(PurchaseTable {
            row: compile(&self.id, row, 5)?,
            asset: asset.to_string(),
            source: source.to_string(),
        });
        Ok(self)
    }

    /// Metaplanet analytics page: "Total BTC Holdings ... ₿35,102", key
    /// metrics, and the purchase-history table.
    pub fn metaplanet() -> Result<Self, MonitorError> {
        Self::new(
            "metaplanet",
            &[
                r"(?i)Total BTC Holdings.*?₿\s*([\d,]+)",
                r"(?i)BTC Holdings.*?₿\s*([\d,]+)",
                r"₿\s*([\d,]{5,})",
            ],
        )?
        .with_metrics(&[
            ("btcPer1000Shares", r"(?i)BTC per 1,000 Shares.*?₿\s*([\d.,]+)"),
            ("ownershipPct", r"(?i)Bitcoin Ownership.*?([\d.]+)%"),
            ("avgDailyBtc", r"(?i)Average BTC Purchased Daily.*?₿\s*([\d.,]+)"),
            ("bitcoinNavUsd", r"(?i)Bitcoin NAV.*?\$\s*([\d,.]+\s*[BMK])"),
        ])?
        .with_purchase_table(
            r"(?i)((?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\s+\d{1,2},?\s+\d{4})\s+₿\s*([\d,.]+)\s+\$([\d,.]+[MBK]?)\s+\$([\d,.]+[MBK]?)\s+₿\s*([\d,.]+)",
            "BTC",
            "metaplanet",
        )
    }

    /// CEA Industries `data.js`: `totalHoldings: 480000`.
    pub fn bnc() -> Result<Self, MonitorError> {
        Self::new("bnc", &[r"totalHoldings\s*:\s*([\d,]+)"])?.with_metrics(&[
            ("avgCostBasis", r"avgCostBasis\s*:\s*([\d,.]+)"),
            ("mNAV", r"mNAV\s*:\s*([\d,.]+)"),
        ])
    }

    /// DeFi Development dashboard SOL counter.
    pub fn dfdv() -> Result<Self, MonitorError> {
        Self::new(
            "dfdv",
            &[
                r"(?i)SOL\s+Count[^\d]*([\d,]+)",
                r"(?i)Total\s+SOL[^\d]*([\d,]+)",
                r"(?i)([\d,]{6,})\s*SOL\b",
            ],
        )?
        .with_metrics(&[
            ("sharesOutstanding", r"(?i)Shares\s+Outstanding[^\d]*([\d,]+)"),
        ])
    }

    /// Upexi homepage SOL counter.
    pub fn upexi() -> Result<Self, MonitorError> {
        Self::new(
            "upexi",
            &[
                r"(?i)(?:Upexi\s+)?SOL\s+Count[:\s]*([\d,]+)",
                r"(?i)Total\s+SOL[:\s]*([\d,]+)",
                r"(?i)SOL\s+Holdings[:\s]*([\d,]+)",
                r"(?i)([\d,]{7,})\s*SOL",
            ],
        )
    }

    /// Bit Digital homepage ETH counter.
    pub fn bit_digital() -> Result<Self, MonitorError> {
        Self::new(
            "bit-digital",
            &[
                r"(?i)Total\s+ETH\s+Held[:\s]*([\d,]+)",
                r"(?i)ETH\s+Holdings[:\s]*([\d,]+)",
                r"(?i)ETH\s+Treasury[:\s]*([\d,]+)",
                r"(?i)Ethereum\s+Holdings[:\s]*([\d,]+)",
                r"(?i)([\d,]{4,})\s*ETH\s+(?:held|in\s+treasury)",
            ],
        )
    }

    /// Hyperliquid Strategies dashboard, figures usually in millions.
    pub fn purr() -> Result<Self, MonitorError> {
        Self::new(
            "purr",
            &[
                r"(?i)HYPE\s+Tokens?\s+Held[^\d]*([\d,.]+\s*M)\b",
                r"(?i)HYPE\s+Tokens?\s+Held[^\d]*([\d,]+)",
                r"(?i)Total\s+HYPE[^\d]*([\d,.]+\s*M)\b",
                r"(?i)([\d,.]+\s*M)\s*HYPE",
            ],
        )?
        .with_metrics(&[
            ("cashHoldings", r"(?i)Cash\s+Holdings[^\d$]*\$?([\d,.]+\s*M)"),
            ("nav", r"(?i)Net\s+Asset\s+Value[^\d$]*\$?([\d,.]+\s*[MB])"),
            ("sharePrice", r"(?i)Share\s+Price[^\d$]*\$?([\d,.]+)"),
            ("fullyDilutedShares", r"(?i)Fully\s+Diluted\s+Shares[^\d]*([\d,]+)"),
        ])
    }
}

impl ExtractionStrategy for PatternStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn extract(&self, text: &str) -> Option<u64> {
        self.patterns.iter().find_map(|re| {
            let raw = re.captures(text)?.get(1)?.as_str();
            numbers::parse_quantity(raw).filter(|v| *v > 0)
        })
    }

    fn analytics(&self, text: &str) -> PageAnalytics {
        let metrics = self
            .metrics
            .iter()
            .filter_map(|(key, re)| {
                let raw = re.captures(text)?.get(1)?.as_str();
                let value = metric_value(numbers::parse_metric(raw)?)?;
                Some((key.clone(), value))
            })
            .collect();
        let purchases = self
            .purchases
            .as_ref()
            .map(|table| table.rows(text))
            .unwrap_or_default();
        PageAnalytics { metrics, purchases }
    }
}

/// Strategies by source id.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Box<dyn ExtractionStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `window:<SYMBOL>` for every configured token plus the built-in
    /// page-specific patterns.
    pub fn with_builtins(extractor: Arc<Extractor>) -> Result<Self, MonitorError> {
        let mut registry = Self::new();
        let symbols: Vec<String> = extractor.symbols().map(str::to_string).collect();
        for symbol in symbols {
            registry.register(Box::new(WindowStrategy::new(&symbol, Arc::clone(&extractor))));
        }
        registry.register(Box::new(PatternStrategy::metaplanet()?));
        registry.register(Box::new(PatternStrategy::upexi()?));
        registry.register(Box::new(PatternStrategy::bit_digital()?));
        registry.register(Box::new(PatternStrategy::purr()?));
        registry.register(Box::new(PatternStrategy::bnc()?));
        registry.register(Box::new(PatternStrategy::dfdv()?));
        Ok(registry)
    }

    /// Replaces any strategy already registered under the same id.
    pub fn register(&mut self, strategy: Box<dyn ExtractionStrategy>) {
        self.strategies.insert(strategy.id().to_string(), strategy);
    }

    /// Register the user pattern carried by a website entry, if it has one.
    pub fn register_website(&mut self, site: &WebsiteSource) -> Result<(), MonitorError> {
        if let Some(pattern) = site.pattern.as_deref() {
            self.register(Box::new(PatternStrategy::new(&site.strategy, &[pattern])?));
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&dyn ExtractionStrategy> {
        self.strategies.get(id).map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
