//! Company dashboard collaborator.
//!
//! Each configured page is fetched, reduced to plain text, and handed to
//! the strategy registered under its id. The figure is range-checked
//! against the token profile and wrapped in a signal whose context
//! sentence reads as a treasury-holdings statement. Any analytics the
//! strategy finds on the same page ride along as an [`Enrichment`].

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::DocumentSource;
use crate::config::WebsiteSource;
use crate::extract::documents::strip_html;
use crate::extract::strategies::StrategyRegistry;
use crate::extract::Extractor;
use crate::types::{Enrichment, ScrapedSignal, SourceKind};

/// Outcome of one page.
#[derive(Debug, Default)]
pub struct PageScan {
    pub signal: Option<ScrapedSignal>,
    pub enrichment: Option<Enrichment>,
}

/// Outcome of one pass over every configured page.
#[derive(Debug, Default)]
pub struct WebsiteScan {
    pub signals: Vec<ScrapedSignal>,
    pub enrichments: Vec<Enrichment>,
}

pub struct WebsiteMonitor {
    source: Arc<dyn DocumentSource>,
    registry: Arc<StrategyRegistry>,
    extractor: Arc<Extractor>,
    sites: Vec<WebsiteSource>,
}

impl WebsiteMonitor {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        registry: Arc<StrategyRegistry>,
        extractor: Arc<Extractor>,
        sites: Vec<WebsiteSource>,
    ) -> Self {
        Self {
            source,
            registry,
            extractor,
            sites,
        }
    }

    /// One pass over every configured page. Failures are logged per page.
    pub async fn collect(&self) -> WebsiteScan {
        let mut scan = WebsiteScan::default();
        for site in &self.sites {
            match self.scrape(site).await {
                Ok(page) => {
                    if page.signal.is_none() {
                        debug!(ticker = %site.ticker, url = %site.url, "No figure on page");
                    }
                    scan.signals.extend(page.signal);
                    scan.enrichments.extend(page.enrichment);
                }
                Err(e) => warn!(ticker = %site.ticker, url = %site.url, error = %e, "Website scrape failed"),
            }
        }
        info!(
            sites = self.sites.len(),
            signals = scan.signals.len(),
            enrichments = scan.enrichments.len(),
            "Website scan complete"
        );
        scan
    }

    /// Analytics are kept only for pages whose holdings figure passed.
    pub async fn scrape(&self, site: &WebsiteSource) -> Result<PageScan> {
        let strategy = self
            .registry
            .get(&site.strategy)
            .ok_or_else(|| anyhow!("No extraction strategy registered as {:?}", site.strategy))?;

        let html = self.source.fetch_document(&site.url).await?;
        let text = strip_html(&html);

        let Some(value) = strategy.extract(&text) else {
            return Ok(PageScan::default());
        };

        if let Some(profile) = self.extractor.profile(&site.token) {
            if !profile.in_range(value) {
                warn!(
                    ticker = %site.ticker,
                    token = %site.token,
                    value,
                    min = profile.min,
                    max = profile.max,
                    "Website figure outside plausible range"
                );
                return Ok(PageScan::default());
            }
        }

        let analytics = strategy.analytics(&text);
        debug!(
            ticker = %site.ticker,
            strategy = strategy.id(),
            value,
            metrics = analytics.metrics.len(),
            purchases = analytics.purchases.len(),
            "Website figure extracted"
        );
        let enrichment = (!analytics.is_empty()).then(|| Enrichment {
            ticker: site.ticker.clone(),
            token: site.token.clone(),
            source_url: site.url.clone(),
            metrics: analytics.metrics,
            transactions: analytics.purchases,
        });
        Ok(PageScan {
            signal: Some(
                ScrapedSignal::new(&site.ticker, &site.token, value, &holdings_sentence(site, value))
                    .with_source(&site.url, SourceKind::Website),
            ),
            enrichment,
        })
    }
}

/// Classifier-facing context for a dashboard figure. The page URL stays
/// in `source_url` and out of the keyword-scanned text.
pub fn holdings_sentence(site: &WebsiteSource, value: u64) -> String {
    format!(
        "{} holds {} {} in treasury holdings.",
        site.ticker,
        thousands(value),
        site.token
    )
}

/// `1234567` → `1,234,567`
pub fn thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_tokens;
    use crate::data::MockDocumentSource;
    use crate::pipeline::classifier::{classify, Classification};

    const METAPLANET_URL: &str = "https://metaplanet.jp/en/analytics";
    const FORWARD_URL: &str = "https://www.forwardindustries.com/treasury";

    fn site(ticker: &str, token: &str, url: &str, strategy: &str) -> WebsiteSource {
        WebsiteSource {
            ticker: ticker.to_string(),
            token: token.to_string(),
            url: url.to_string(),
            strategy: strategy.to_string(),
            pattern: None,
        }
    }

    fn monitor(source: MockDocumentSource, sites: Vec<WebsiteSource>) -> WebsiteMonitor {
        let extractor = Arc::new(Extractor::new(&default_tokens()).unwrap());
        let registry = StrategyRegistry::with_builtins(Arc::clone(&extractor)).unwrap();
        WebsiteMonitor::new(Arc::new(source), Arc::new(registry), extractor, sites)
    }

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(35_102), "35,102");
        assert_eq!(thousands(6_900_000), "6,900,000");
    }

    #[test]
    fn test_sentence_classifies_as_token_holding() {
        let s = site("MTPLF", "BTC", METAPLANET_URL, "metaplanet");
        let sentence = holdings_sentence(&s, 35_102);
        assert_eq!(sentence, "MTPLF holds 35,102 BTC in treasury holdings.");
        assert_eq!(classify(&sentence).classification, Classification::TokenHolding);
    }

    #[test]
    fn test_sentence_ignores_keywords_in_url() {
        let s = site(
            "ABTC",
            "BTC",
            "https://example.com/share-stock-equity/8-k-confirmed",
            "window:BTC",
        );
        let sentence = holdings_sentence(&s, 5_000);
        assert!(!sentence.contains("example.com"));
        assert_eq!(classify(&sentence).classification, Classification::TokenHolding);
    }

    #[tokio::test]
    async fn test_pattern_strategy_page() {
        let mut source = MockDocumentSource::new();
        source
            .expect_fetch_document()
            .returning(|_: &str| Ok("<div><h3>Total BTC Holdings</h3><span>&#8383;35,102</span></div>".to_string()));

        let sites = vec![site("MTPLF", "BTC", METAPLANET_URL, "metaplanet")];
        let signals = monitor(source, sites).collect().await.signals;
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].new_value, 35_102);
        assert_eq!(signals[0].source_kind, Some(SourceKind::Website));
        assert_eq!(signals[0].source_url.as_deref(), Some(METAPLANET_URL));
    }

    #[tokio::test]
    async fn test_page_analytics_become_enrichment() {
        let mut source = MockDocumentSource::new();
        source.expect_fetch_document().returning(|_: &str| {
            Ok("<div>Total BTC Holdings <b>&#8383;35,102</b></div>\
                <div>Bitcoin NAV <b>$3.10B</b></div>\
                <table><tr><td>Dec 30, 2025</td><td>&#8383;4,279</td><td>$105,412</td>\
                <td>$451.06M</td><td>&#8383;35,102</td></tr></table>"
                .to_string())
        });

        let sites = vec![site("MTPLF", "BTC", METAPLANET_URL, "metaplanet")];
        let scan = monitor(source, sites).collect().await;
        assert_eq!(scan.signals.len(), 1);
        assert_eq!(scan.enrichments.len(), 1);
        let enrichment = &scan.enrichments[0];
        assert_eq!(enrichment.ticker, "MTPLF");
        assert_eq!(enrichment.metrics["bitcoinNavUsd"], 3_100_000_000u64);
        assert_eq!(enrichment.transactions.len(), 1);
        assert_eq!(enrichment.transactions[0].quantity, 4_279);
    }

    #[tokio::test]
    async fn test_out_of_range_page_drops_analytics() {
        let mut source = MockDocumentSource::new();
        source
            .expect_fetch_document()
            .returning(|_: &str| Ok("Total BTC Holdings ₿ 9,999,999 Bitcoin NAV $3.10B".to_string()));

        let sites = vec![site("MTPLF", "BTC", METAPLANET_URL, "metaplanet")];
        let scan = monitor(source, sites).collect().await;
        assert!(scan.signals.is_empty());
        assert!(scan.enrichments.is_empty());
    }

    #[tokio::test]
    async fn test_window_page_has_no_enrichment() {
        let mut source = MockDocumentSource::new();
        source
            .expect_fetch_document()
            .returning(|_: &str| Ok("Forward Industries holds 6,921,342 SOL".to_string()));

        let sites = vec![site("FWDI", "SOL", FORWARD_URL, "window:SOL")];
        let scan = monitor(source, sites).collect().await;
        assert_eq!(scan.signals.len(), 1);
        assert!(scan.enrichments.is_empty());
    }

    #[tokio::test]
    async fn test_window_strategy_page() {
        let mut source = MockDocumentSource::new();
        source
            .expect_fetch_document()
            .returning(|_: &str| Ok("<p>Treasury update: Forward Industries holds 6,921,342 SOL.</p>".to_string()));

        let sites = vec![site("FWDI", "SOL", FORWARD_URL, "window:SOL")];
        let signals = monitor(source, sites).collect().await.signals;
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].new_value, 6_921_342);
    }

    #[tokio::test]
    async fn test_out_of_range_figure_dropped() {
        let mut source = MockDocumentSource::new();
        source
            .expect_fetch_document()
            .returning(|_: &str| Ok("<p>Total BTC Holdings ₿ 9,999,999</p>".to_string()));

        let sites = vec![site("MTPLF", "BTC", METAPLANET_URL, "metaplanet")];
        assert!(monitor(source, sites).collect().await.signals.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_strategy_is_error_without_fetch() {
        let mut source = MockDocumentSource::new();
        source.expect_fetch_document().never();

        let m = monitor(source, Vec::new());
        let err = m
            .scrape(&site("XYZ", "BTC", "https://xyz.example", "nope"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_site_only() {
        let mut source = MockDocumentSource::new();
        source.expect_fetch_document().returning(|url: &str| {
            if url == METAPLANET_URL {
                Err(anyhow!("timeout"))
            } else {
                Ok("Forward Industries holds 6,921,342 SOL".to_string())
            }
        });

        let sites = vec![
            site("MTPLF", "BTC", METAPLANET_URL, "metaplanet"),
            site("FWDI", "SOL", FORWARD_URL, "window:SOL"),
        ];
        let signals = monitor(source, sites).collect().await.signals;
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].ticker, "FWDI");
    }
}
