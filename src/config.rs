//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every section has defaults, so a minimal (even empty) file loads.
//! Secrets (the webhook URL) are referenced by env-var name in the config
//! and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub monitor: MonitorConfig,
    pub policy: PolicyConfig,
    pub fetch: FetchConfig,
    #[serde(default = "default_tokens")]
    pub tokens: BTreeMap<String, TokenProfile>,
    pub websites: Vec<WebsiteSource>,
    pub alerts: AlertsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MonitorConfig {
    pub data_path: String,
    pub history_path: String,
    pub dry_run: bool,
    /// Companies not updated for this many days are logged as stale.
    pub stale_after_days: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            data_path: "data/dat-data.json".to_string(),
            history_path: "data/history.json".to_string(),
            dry_run: false,
            stale_after_days: 14,
        }
    }
}

/// Tunable reconciliation policy.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PolicyConfig {
    /// Fractional drop from the last confirmed value that counts as suspicious.
    pub large_decrease_threshold: f64,
    /// Non-zero values below this are treated as extraction artifacts.
    pub small_value_floor: u64,
    pub recent_changes_cap: usize,
    pub filings_cap: usize,
    pub summary_chars: usize,
    pub note_chars: usize,
    /// Audit threshold for `stale_data` flags.
    pub audit_stale_days: i64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            large_decrease_threshold: 0.50,
            small_value_floor: 50,
            recent_changes_cap: 10,
            filings_cap: 20,
            summary_chars: 200,
            note_chars: 100,
            audit_stale_days: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    /// Minimum spacing between requests to SEC hosts.
    pub sec_min_interval_ms: u64,
    pub website_min_interval_ms: u64,
    pub lookback_days: i64,
    pub max_documents_per_filing: usize,
    /// Dated IR press releases older than this are not queued.
    pub press_release_max_age_days: i64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "DAT-Monitor-Bot/1.0 (holdings monitor)".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            base_backoff_ms: 500,
            sec_min_interval_ms: 110,
            website_min_interval_ms: 1_000,
            lookback_days: 7,
            max_documents_per_filing: 5,
            press_release_max_age_days: 30,
        }
    }
}

/// Aliases and plausibility band for one tracked token.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenProfile {
    pub aliases: Vec<String>,
    pub min: u64,
    pub max: u64,
}

impl TokenProfile {
    pub fn new(aliases: &[&str], min: u64, max: u64) -> Self {
        Self {
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            min,
            max,
        }
    }

    pub fn in_range(&self, value: u64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// A company web page scraped with a registered strategy.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct WebsiteSource {
    pub ticker: String,
    pub token: String,
    pub url: String,
    /// Strategy id, e.g. `window:SOL` or `metaplanet`.
    pub strategy: String,
    /// Regex with one capture group, for `pattern` strategies.
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AlertsConfig {
    /// Env var holding a webhook URL for change events.
    pub webhook_url_env: Option<String>,
}

/// Built-in token table used when `[tokens]` is absent.
pub fn default_tokens() -> BTreeMap<String, TokenProfile> {
    BTreeMap::from([
        (
            "BTC".to_string(),
            TokenProfile::new(&["BTC", "btc", "Bitcoin"], 1_000, 2_000_000),
        ),
        (
            "ETH".to_string(),
            TokenProfile::new(&["ETH", "eth", "Ether", "Ethereum"], 1_000, 50_000_000),
        ),
        (
            "SOL".to_string(),
            TokenProfile::new(&["SOL", "Solana"], 1_000, 100_000_000),
        ),
        (
            "HYPE".to_string(),
            TokenProfile::new(&["HYPE", "Hyperliquid"], 1_000, 100_000_000),
        ),
        (
            "BNB".to_string(),
            TokenProfile::new(&["BNB", "bnb", "Binance Coin"], 1_000, 10_000_000),
        ),
    ])
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut config: AppConfig = toml::from_str(contents)?;
        if config.tokens.is_empty() {
            config.tokens = default_tokens();
        }
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = AppConfig::from_toml("").unwrap();
        assert_eq!(cfg.policy.small_value_floor, 50);
        assert!((cfg.policy.large_decrease_threshold - 0.50).abs() < f64::EPSILON);
        assert_eq!(cfg.policy.recent_changes_cap, 10);
        assert_eq!(cfg.policy.filings_cap, 20);
        assert_eq!(cfg.fetch.max_retries, 3);
        assert_eq!(cfg.fetch.lookback_days, 7);
        assert_eq!(cfg.fetch.press_release_max_age_days, 30);
        assert_eq!(cfg.tokens.len(), 5);
        assert!(cfg.tokens["BTC"].in_range(687_410));
        assert!(!cfg.tokens["BTC"].in_range(999));
        assert!(cfg.websites.is_empty());
    }

    #[test]
    fn test_partial_sections_override() {
        let cfg = AppConfig::from_toml(
            r#"
            [monitor]
            data_path = "/tmp/ledger.json"
            dry_run = true

            [policy]
            small_value_floor = 100

            [tokens.DOGE]
            aliases = ["DOGE", "Dogecoin"]
            min = 10000
            max = 1000000000

            [[websites]]
            ticker = "FWDI"
            token = "SOL"
            url = "https://example.com/treasury"
            strategy = "window:SOL"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.monitor.data_path, "/tmp/ledger.json");
        assert_eq!(cfg.monitor.history_path, "data/history.json");
        assert!(cfg.monitor.dry_run);
        assert_eq!(cfg.policy.small_value_floor, 100);
        assert_eq!(cfg.policy.note_chars, 100);
        assert_eq!(cfg.tokens.len(), 1);
        assert_eq!(cfg.tokens["DOGE"].aliases, vec!["DOGE", "Dogecoin"]);
        assert_eq!(cfg.websites[0].strategy, "window:SOL");
        assert_eq!(cfg.websites[0].pattern, None);
    }

    #[test]
    fn test_load_config_file() {
        // Present in the repo root; acceptable to be missing elsewhere.
        if let Ok(cfg) = AppConfig::load("config.toml") {
            assert!(cfg.tokens.contains_key("BTC"));
            assert!(cfg.fetch.timeout_secs > 0);
        }
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(AppConfig::load("/nonexistent/config.toml").is_err());
    }
}
