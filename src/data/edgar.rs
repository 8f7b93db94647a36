//! SEC EDGAR collaborator.
//!
//! For every ledger company with a CIK: list recent 8-K filings from the
//! submissions API, mine the primary document (then the filing's ex-99
//! press releases) for a holdings figure, and emit at most one signal per
//! company, from the newest filing that yields one.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::http::is_access_denied;
use super::DocumentSource;
use crate::config::FetchConfig;
use crate::extract::documents::{self, exhibit_links, rank_documents};
use crate::extract::Extractor;
use crate::types::{Company, FilingMeta, Ledger, ScrapedSignal, SourceKind};

pub const SUBMISSIONS_BASE: &str = "https://data.sec.gov/submissions";
pub const ARCHIVES_BASE: &str = "https://www.sec.gov/Archives/edgar/data";

/// Forms that announce treasury purchases.
pub const FORMS_OF_INTEREST: &[&str] = &["8-K", "8-K/A"];

// ---------------------------------------------------------------------------
// URLs
// ---------------------------------------------------------------------------

fn cik_number(cik: &str) -> &str {
    let trimmed = cik.trim().trim_start_matches('0');
    if trimmed.is_empty() {
        "0"
    } else {
        trimmed
    }
}

/// `https://data.sec.gov/submissions/CIK0001050446.json`
pub fn submissions_url(cik: &str) -> String {
    format!("{SUBMISSIONS_BASE}/CIK{:0>10}.json", cik_number(cik))
}

/// Directory of one filing: CIK without leading zeros, accession without dashes.
pub fn filing_base_url(cik: &str, accession: &str) -> String {
    format!(
        "{ARCHIVES_BASE}/{}/{}",
        cik_number(cik),
        accession.replace('-', "")
    )
}

pub fn archive_url(cik: &str, accession: &str, document: &str) -> String {
    format!("{}/{document}", filing_base_url(cik, accession))
}

pub fn index_url(cik: &str, accession: &str) -> String {
    format!("{}/{accession}-index.htm", filing_base_url(cik, accession))
}

// ---------------------------------------------------------------------------
// Submissions JSON
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct Submissions {
    #[serde(default)]
    filings: Filings,
}

#[derive(Debug, Deserialize, Default)]
struct Filings {
    #[serde(default)]
    recent: RecentFilings,
}

/// Parallel arrays, one index per filing.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RecentFilings {
    #[serde(default)]
    accession_number: Vec<String>,
    #[serde(default)]
    filing_date: Vec<String>,
    #[serde(default)]
    form: Vec<String>,
    #[serde(default)]
    primary_document: Vec<String>,
}

/// 8-K and 8-K/A filings dated within `lookback_days` of `today`, newest
/// first. Rows with a missing accession, document, or unparseable date
/// are skipped.
pub fn parse_recent_filings(json: &str, today: NaiveDate, lookback_days: i64) -> Result<Vec<FilingMeta>> {
    let submissions: Submissions =
        serde_json::from_str(json).context("Failed to parse EDGAR submissions JSON")?;
    let recent = submissions.filings.recent;
    let cutoff = today - Duration::days(lookback_days);

    let mut filings: Vec<FilingMeta> = recent
        .form
        .iter()
        .enumerate()
        .filter(|(_, form)| FORMS_OF_INTEREST.contains(&form.as_str()))
        .filter_map(|(i, form)| {
            let filing_date = NaiveDate::parse_from_str(recent.filing_date.get(i)?, "%Y-%m-%d").ok()?;
            let accession_number = recent.accession_number.get(i).filter(|a| !a.is_empty())?;
            let document = recent.primary_document.get(i).filter(|d| !d.is_empty())?;
            Some(FilingMeta {
                accession_number: accession_number.clone(),
                form: form.clone(),
                filing_date,
                document: document.clone(),
            })
        })
        .filter(|f| f.filing_date >= cutoff && f.filing_date <= today)
        .collect();

    filings.sort_by(|a, b| b.filing_date.cmp(&a.filing_date));
    Ok(filings)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct EdgarClient {
    source: Arc<dyn DocumentSource>,
    extractor: Arc<Extractor>,
    lookback_days: i64,
    max_documents: usize,
}

impl EdgarClient {
    pub fn new(source: Arc<dyn DocumentSource>, extractor: Arc<Extractor>, cfg: &FetchConfig) -> Self {
        Self {
            source,
            extractor,
            lookback_days: cfg.lookback_days,
            max_documents: cfg.max_documents_per_filing.max(1),
        }
    }

    /// Signals for every company whose ticker has a CIK anywhere in the
    /// ledger.
    /// Per-company failures are logged and skipped.
    pub async fn collect_signals(&self, ledger: &Ledger, today: NaiveDate) -> Vec<ScrapedSignal> {
        let mut signals = Vec::new();

        for (token, company) in ledger.iter_companies() {
            let Some(cik) = ledger.cik_for(&company.ticker) else {
                debug!(ticker = %company.ticker, "No CIK; skipping EDGAR");
                continue;
            };
            match self.scan_company(cik, token, company, today).await {
                Ok(Some(signal)) => signals.push(signal),
                Ok(None) => {}
                Err(e) => warn!(ticker = %company.ticker, error = %e, "EDGAR scan failed, continuing"),
            }
        }

        info!(signals = signals.len(), "EDGAR scan complete");
        signals
    }

    pub async fn recent_filings(&self, cik: &str, today: NaiveDate) -> Result<Vec<FilingMeta>> {
        let url = submissions_url(cik);
        let json = self.source.fetch_document(&url).await?;
        parse_recent_filings(&json, today, self.lookback_days)
    }

    /// Newest-filing signal for one company, if any filing yields a figure.
    pub async fn scan_company(
        &self,
        cik: &str,
        token: &str,
        company: &Company,
        today: NaiveDate,
    ) -> Result<Option<ScrapedSignal>> {
        let filings = self.recent_filings(cik, today).await?;
        if filings.is_empty() {
            debug!(ticker = %company.ticker, "No recent 8-K filings");
            return Ok(None);
        }
        info!(ticker = %company.ticker, count = filings.len(), "Recent 8-K filings found");

        for filing in filings {
            match self.scan_filing(cik, token, company, &filing).await {
                Ok(Some(signal)) => {
                    info!(
                        ticker = %company.ticker,
                        token,
                        value = signal.new_value,
                        accession = %filing.accession_number,
                        "Extracted holdings from filing"
                    );
                    return Ok(Some(signal));
                }
                Ok(None) => debug!(
                    ticker = %company.ticker,
                    accession = %filing.accession_number,
                    "No holdings figure in filing"
                ),
                Err(e) if is_access_denied(&e) => return Err(e),
                Err(e) => warn!(
                    ticker = %company.ticker,
                    accession = %filing.accession_number,
                    error = %e,
                    "Filing scan failed"
                ),
            }
        }
        Ok(None)
    }

    async fn scan_filing(
        &self,
        cik: &str,
        token: &str,
        company: &Company,
        filing: &FilingMeta,
    ) -> Result<Option<ScrapedSignal>> {
        let primary = archive_url(cik, &filing.accession_number, &filing.document);
        if let Some(signal) = self.mine_document(&primary, token, company, filing).await? {
            return Ok(Some(signal));
        }

        let index = match self.source.fetch_document(&index_url(cik, &filing.accession_number)).await {
            Ok(html) => html,
            Err(e) if is_access_denied(&e) => return Err(e),
            Err(e) => {
                debug!(accession = %filing.accession_number, error = %e, "Filing index unavailable");
                return Ok(None);
            }
        };

        let exhibits: Vec<String> = rank_documents(exhibit_links(&index))
            .into_iter()
            .filter(|name| *name != filing.document)
            .take(self.max_documents - 1)
            .collect();

        for name in exhibits {
            let url = archive_url(cik, &filing.accession_number, &name);
            if let Some(signal) = self.mine_document(&url, token, company, filing).await? {
                return Ok(Some(signal));
            }
        }
        Ok(None)
    }

    async fn mine_document(
        &self,
        url: &str,
        token: &str,
        company: &Company,
        filing: &FilingMeta,
    ) -> Result<Option<ScrapedSignal>> {
        let html = match self.source.fetch_document(url).await {
            Ok(html) => html,
            Err(e) if is_access_denied(&e) => return Err(e),
            Err(e) => {
                warn!(url, error = %e, "Failed to fetch filing document");
                return Ok(None);
            }
        };

        let text = documents::strip_html(&html);
        if !documents::is_relevant(&text, token) {
            debug!(url, score = documents::relevance(&text, token), "Document below relevance floor");
            return Ok(None);
        }

        let Some(candidate) = self
            .extractor
            .find_candidate(&text, token, Some(company.tokens))
        else {
            return Ok(None);
        };

        Ok(Some(
            ScrapedSignal::new(&company.ticker, token, candidate.value, &candidate.context)
                .with_source(url, SourceKind::Edgar)
                .with_filing(filing.clone()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_tokens;
    use crate::data::MockDocumentSource;
    use crate::types::MonitorError;

    const CIK: &str = "0001050446";
    const SUBMISSIONS: &str = "https://data.sec.gov/submissions/CIK0001050446.json";
    const PRIMARY: &str = "https://www.sec.gov/Archives/edgar/data/1050446/000119312526061234/d8k.htm";
    const INDEX: &str =
        "https://www.sec.gov/Archives/edgar/data/1050446/000119312526061234/0001193125-26-061234-index.htm";
    const EXHIBIT: &str = "https://www.sec.gov/Archives/edgar/data/1050446/000119312526061234/dex991.htm";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 20).unwrap()
    }

    fn submissions_json() -> String {
        serde_json::json!({
            "cik": "1050446",
            "filings": { "recent": {
                "accessionNumber": [
                    "0001193125-26-061234",
                    "0001193125-26-050000",
                    "0001193125-26-010000",
                    "0001193125-26-061000"
                ],
                "filingDate": ["2026-02-17", "2026-02-18", "2026-01-05", "2026-02-19"],
                "form": ["8-K", "10-Q", "8-K", "8-K/A"],
                "primaryDocument": ["d8k.htm", "d10q.htm", "old8k.htm", ""]
            }}
        })
        .to_string()
    }

    fn strategy() -> Company {
        let mut c = Company::new("MSTR", "Strategy", 687_410, "2026-02-09");
        c.cik = Some(CIK.to_string());
        c
    }

    fn client(source: MockDocumentSource) -> EdgarClient {
        EdgarClient::new(
            Arc::new(source),
            Arc::new(Extractor::new(&default_tokens()).unwrap()),
            &FetchConfig::default(),
        )
    }

    const PRESS_RELEASE: &str = "<html><body><p>Item 8.01 Other Events.</p>\
        <p>Strategy acquired 2,486 BTC during the week. As of February 16, 2026, \
        Strategy holds 714,644 BTC acquired for an aggregate purchase price of $54.35 billion.</p></body></html>";

    #[test]
    fn test_urls() {
        assert_eq!(submissions_url(CIK), SUBMISSIONS);
        assert_eq!(submissions_url("1050446"), SUBMISSIONS);
        assert_eq!(archive_url(CIK, "0001193125-26-061234", "d8k.htm"), PRIMARY);
        assert_eq!(index_url(CIK, "0001193125-26-061234"), INDEX);
    }

    #[test]
    fn test_parse_recent_filings_filters_form_and_window() {
        let filings = parse_recent_filings(&submissions_json(), today(), 7).unwrap();
        // 10-Q dropped, January 8-K outside window, 8-K/A without a document dropped
        assert_eq!(filings.len(), 1);
        assert_eq!(filings[0].accession_number, "0001193125-26-061234");
        assert_eq!(filings[0].form, "8-K");
        assert_eq!(filings[0].document, "d8k.htm");
    }

    #[test]
    fn test_parse_recent_filings_newest_first() {
        let json = serde_json::json!({
            "filings": { "recent": {
                "accessionNumber": ["a-1", "a-2"],
                "filingDate": ["2026-02-14", "2026-02-19"],
                "form": ["8-K", "8-K/A"],
                "primaryDocument": ["one.htm", "two.htm"]
            }}
        })
        .to_string();
        let filings = parse_recent_filings(&json, today(), 7).unwrap();
        let docs: Vec<_> = filings.iter().map(|f| f.document.as_str()).collect();
        assert_eq!(docs, vec!["two.htm", "one.htm"]);
    }

    #[test]
    fn test_parse_tolerates_missing_sections() {
        assert!(parse_recent_filings("{}", today(), 7).unwrap().is_empty());
        assert!(parse_recent_filings("not json", today(), 7).is_err());
    }

    #[tokio::test]
    async fn test_primary_document_signal() {
        let mut source = MockDocumentSource::new();
        source.expect_fetch_document().returning(|url: &str| match url {
            SUBMISSIONS => Ok(submissions_json()),
            PRIMARY => Ok(PRESS_RELEASE.to_string()),
            other => Err(anyhow::anyhow!("unexpected fetch {other}")),
        });

        let signal = client(source)
            .scan_company(CIK, "BTC", &strategy(), today())
            .await
            .unwrap()
            .expect("signal");
        assert_eq!(signal.new_value, 714_644);
        assert_eq!(signal.source_kind, Some(SourceKind::Edgar));
        assert_eq!(signal.source_url.as_deref(), Some(PRIMARY));
        assert_eq!(signal.filing.as_ref().unwrap().accession_number, "0001193125-26-061234");
        assert!(signal.context_text.contains("714,644 BTC"));
    }

    #[tokio::test]
    async fn test_falls_back_to_press_release_exhibit() {
        let mut source = MockDocumentSource::new();
        source.expect_fetch_document().returning(|url: &str| match url {
            SUBMISSIONS => Ok(submissions_json()),
            PRIMARY => Ok("<p>Item 7.01 Regulation FD Disclosure. See Exhibit 99.1.</p>".to_string()),
            INDEX => Ok(r#"<a href="/ix?doc=/Archives/edgar/data/1050446/000119312526061234/d8k.htm">8-K</a>
                <a href="/Archives/edgar/data/1050446/000119312526061234/dex991.htm">EX-99.1</a>"#
                .to_string()),
            EXHIBIT => Ok(PRESS_RELEASE.to_string()),
            other => Err(anyhow::anyhow!("unexpected fetch {other}")),
        });

        let signal = client(source)
            .scan_company(CIK, "BTC", &strategy(), today())
            .await
            .unwrap()
            .expect("signal");
        assert_eq!(signal.new_value, 714_644);
        assert_eq!(signal.source_url.as_deref(), Some(EXHIBIT));
    }

    #[tokio::test]
    async fn test_drop_below_baseline_without_disposal_ignored() {
        let mut source = MockDocumentSource::new();
        source.expect_fetch_document().returning(|url: &str| match url {
            SUBMISSIONS => Ok(submissions_json()),
            PRIMARY => Ok("<p>Annual meeting of shareholders results: 5,000 BTC votes.</p>".to_string()),
            INDEX => Ok(String::new()),
            other => Err(anyhow::anyhow!("unexpected fetch {other}")),
        });

        let signal = client(source).scan_company(CIK, "BTC", &strategy(), today()).await.unwrap();
        assert!(signal.is_none());
    }

    #[tokio::test]
    async fn test_access_denied_stops_company() {
        let mut source = MockDocumentSource::new();
        source.expect_fetch_document().times(1).returning(|url: &str| {
            Err(MonitorError::AccessDenied {
                url: url.to_string(),
                status: 403,
            }
            .into())
        });

        let err = client(source)
            .scan_company(CIK, "BTC", &strategy(), today())
            .await
            .unwrap_err();
        assert!(is_access_denied(&err));
    }

    #[tokio::test]
    async fn test_collect_skips_companies_without_cik() {
        let mut source = MockDocumentSource::new();
        source.expect_fetch_document().never();

        let mut ledger = Ledger::default();
        ledger.companies.insert(
            "ETH".to_string(),
            vec![Company::new("BMNR", "BitMine", 4_167_768, "2026-02-09")],
        );
        let signals = client(source).collect_signals(&ledger, today()).await;
        assert!(signals.is_empty());
    }

    #[tokio::test]
    async fn test_collect_resolves_cik_across_groups() {
        let mut source = MockDocumentSource::new();
        source.expect_fetch_document().returning(|url: &str| match url {
            SUBMISSIONS => Ok(submissions_json()),
            PRIMARY => Ok("<p>Item 8.01 Other Events.</p><p>Strategy holds 14,000 ETH in its treasury.</p>".to_string()),
            INDEX => Ok(String::new()),
            other => Err(anyhow::anyhow!("unexpected fetch {other}")),
        });

        // ETH entry carries no CIK of its own
        let mut ledger = Ledger::default();
        ledger.companies.insert("BTC".to_string(), vec![strategy()]);
        ledger.companies.insert(
            "ETH".to_string(),
            vec![Company::new("MSTR", "Strategy", 12_000, "2026-02-09")],
        );

        let signals = client(source).collect_signals(&ledger, today()).await;
        let eth: Vec<_> = signals.iter().filter(|s| s.token == "ETH").collect();
        assert_eq!(eth.len(), 1);
        assert_eq!(eth[0].new_value, 14_000);
    }

    #[tokio::test]
    async fn test_collect_survives_company_failure() {
        let mut source = MockDocumentSource::new();
        source.expect_fetch_document().returning(|url: &str| match url {
            SUBMISSIONS => Ok(submissions_json()),
            PRIMARY => Ok(PRESS_RELEASE.to_string()),
            other => Err(anyhow::anyhow!("connection reset fetching {other}")),
        });

        let mut broken = Company::new("SBET", "SharpLink", 860_000, "2026-02-09");
        broken.cik = Some("0000981483".to_string());
        let mut ledger = Ledger::default();
        ledger.companies.insert("BTC".to_string(), vec![strategy()]);
        ledger.companies.insert("ETH".to_string(), vec![broken]);

        let signals = client(source).collect_signals(&ledger, today()).await;
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].ticker, "MSTR");
    }
}
