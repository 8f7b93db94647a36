//! Investor-relations page collaborator.
//!
//! Scans each company's `irUrl` for links that look like press releases
//! and queues them for manual review in the ledger's
//! `discoveredPressReleases`. Nothing found here changes holdings.

use anyhow::Result;
use chrono::{Duration, NaiveDate, SecondsFormat, Utc};
use regex::Regex;
use reqwest::Url;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use super::DocumentSource;
use crate::config::FetchConfig;
use crate::extract::documents::strip_html;
use crate::extract::window;
use crate::types::{DiscoveredRelease, Ledger};

/// IR hosts that render their listings client-side; a plain fetch sees an
/// empty shell.
const JS_RENDERED_PLATFORMS: &[&str] = &[
    "q4cdn.com",
    "q4inc.com",
    "investors.strive.com",
    "ir.upexi.com",
    "ir.hyperiondefi.com",
];

const URL_HINTS: &[&str] = &[
    "news",
    "press",
    "release",
    "announce",
    "investor",
    "sec.gov",
    "globenewswire",
    "prnewswire",
    "businesswire",
];

const TITLE_HINTS: &[&str] = &[
    "bitcoin", "btc", "ethereum", "ether", "solana", "hyperliquid", "bnb", "crypto", "treasury",
    "holdings", "acquired", "purchased", "token", "digital asset", "blockchain", "8-k", "filing",
    "acquisition", "announce", "report", "update", "quarter", "annual", "fiscal",
];

const MIN_TITLE_CHARS: usize = 10;
const MAX_TITLE_CHARS: usize = 200;
const DATE_RADIUS: usize = 200;

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a[^>]*href=["']([^"']+)["'][^>]*>([^<]+)</a>"#).expect("link regex")
});

static NAV_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(home|about|contact|privacy|terms|login|sign)|^(read more|learn more|see all|view all|more info)$")
        .expect("nav regex")
});

static ASSET_HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(pdf|jpg|png|gif)$|^#|^javascript:").expect("asset regex")
});

/// Date shapes seen next to release links, tried in order.
static DATE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(?:Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|June?|July?|Aug(?:ust)?|Sep(?:tember)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)\s+\d{1,2},?\s+\d{4}",
        r"\b\d{4}-\d{2}-\d{2}\b",
        r"\b\d{1,2}/\d{1,2}/\d{4}\b",
        r"(?i)\b\d{1,2}\s+(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\s+\d{4}",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("date regex"))
    .collect()
});

const DATE_FORMATS: &[&str] = &["%B %d %Y", "%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%d %B %Y"];

/// A candidate press-release link lifted from a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseLink {
    pub title: String,
    pub url: String,
    pub date: Option<NaiveDate>,
}

pub struct PressReleaseScanner {
    source: Arc<dyn DocumentSource>,
    max_age_days: i64,
}

impl PressReleaseScanner {
    pub fn new(source: Arc<dyn DocumentSource>, fetch: &FetchConfig) -> Self {
        Self {
            source,
            max_age_days: fetch.press_release_max_age_days,
        }
    }

    /// One pass over every company with an IR page. Each page is fetched
    /// once; failures are logged and skipped. Results are unique by URL.
    pub async fn collect(&self, ledger: &Ledger, today: NaiveDate) -> Vec<DiscoveredRelease> {
        let mut pages = HashSet::new();
        let mut seen = HashSet::new();
        let mut releases = Vec::new();

        for (token, company) in ledger.iter_companies() {
            let Some(ir_url) = company.ir_url() else {
                continue;
            };
            if is_js_rendered(ir_url) {
                info!(ticker = %company.ticker, url = %ir_url, "Skipping JS-rendered IR page");
                continue;
            }
            if !pages.insert(ir_url.to_string()) {
                continue;
            }
            match self.scan_page(&company.ticker, token, ir_url, today).await {
                Ok(found) => releases.extend(found.into_iter().filter(|r| seen.insert(r.url.clone()))),
                Err(e) => warn!(ticker = %company.ticker, url = %ir_url, error = %e, "IR page scan failed"),
            }
        }

        info!(pages = pages.len(), releases = releases.len(), "IR scan complete");
        releases
    }

    /// Releases on one page, dropping dated links older than the age limit.
    pub async fn scan_page(
        &self,
        ticker: &str,
        token: &str,
        ir_url: &str,
        today: NaiveDate,
    ) -> Result<Vec<DiscoveredRelease>> {
        let html = self.source.fetch_document(ir_url).await?;
        let links = extract_press_releases(&html, ir_url);
        let cutoff = today - Duration::days(self.max_age_days);
        let discovered_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

        let releases: Vec<DiscoveredRelease> = links
            .into_iter()
            .filter(|link| link.date.map_or(true, |d| d >= cutoff))
            .map(|link| DiscoveredRelease {
                ticker: ticker.to_string(),
                token: token.to_string(),
                title: link.title,
                url: link.url,
                date: link.date.map(|d| d.format("%Y-%m-%d").to_string()),
                source_page: ir_url.to_string(),
                discovered_at: discovered_at.clone(),
            })
            .collect();

        debug!(ticker, url = %ir_url, releases = releases.len(), "IR page scanned");
        Ok(releases)
    }
}

pub fn is_js_rendered(url: &str) -> bool {
    let lower = url.to_lowercase();
    JS_RENDERED_PLATFORMS.iter().any(|p| lower.contains(p))
}

/// Links on `html` that look like press releases, resolved against
/// `base_url`, unique by URL in page order. A date is taken from the text
/// around each link when one is present.
pub fn extract_press_releases(html: &str, base_url: &str) -> Vec<ReleaseLink> {
    let base = Url::parse(base_url).ok();
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for caps in LINK_RE.captures_iter(html) {
        let (Some(whole), Some(href), Some(text)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let href = href.as_str().trim();
        let title = strip_html(text.as_str());
        if title.chars().count() < MIN_TITLE_CHARS || is_navigation(&title, href) {
            continue;
        }
        if !looks_like_release(&title, href) {
            continue;
        }

        let resolved = match &base {
            Some(base) => base.join(href),
            None => Url::parse(href),
        };
        let Ok(url) = resolved else {
            debug!(href, "Unresolvable release link");
            continue;
        };
        let url = url.to_string();
        if !seen.insert(url.clone()) {
            continue;
        }

        let (lo, hi) = window(html, whole.start(), whole.end(), DATE_RADIUS);
        links.push(ReleaseLink {
            title: title.chars().take(MAX_TITLE_CHARS).collect(),
            url,
            date: date_near(&strip_html(&html[lo..hi])),
        });
    }
    links
}

fn is_navigation(title: &str, href: &str) -> bool {
    NAV_TEXT_RE.is_match(title)
        || NAV_TEXT_RE.is_match(href)
        || ASSET_HREF_RE.is_match(title)
        || ASSET_HREF_RE.is_match(href)
}

fn looks_like_release(title: &str, href: &str) -> bool {
    let href = href.to_lowercase();
    let title = title.to_lowercase();
    URL_HINTS.iter().any(|h| href.contains(h)) || TITLE_HINTS.iter().any(|h| title.contains(h))
}

/// First parseable date in `text`.
fn date_near(text: &str) -> Option<NaiveDate> {
    DATE_RES.iter().find_map(|re| {
        let raw = re.find(text)?.as_str().replace(',', "");
        DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(&raw, fmt).ok())
    })
}
