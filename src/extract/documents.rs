//! Document selection for filings: which files in a filing are worth
//! mining, in what order, and whether a fetched text is relevant at all.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Documents scoring below this are not mined.
pub const RELEVANCE_FLOOR: u32 = 10;

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href\s*=\s*["']([^"']+)["']"#).expect("href pattern is valid")
});

static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)\b.*?</(script|style)>").expect("script pattern is valid")
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern is valid"));

static SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("space pattern is valid"));

const SEC_ITEM_KEYWORDS: &[&str] = &[
    "item 8.01",
    "item 7.01",
    "other events",
    "regulation fd disclosure",
];

const ACTION_KEYWORDS: &[&str] = &[
    "purchased",
    "acquired",
    "acquisition",
    "accumulation",
    "allocation",
    "addition",
    "adds",
    "deployment",
    "begins purchases",
    "initial accumulation",
    "scaling holdings",
    "expanding its total holdings",
];

const ASSET_KEYWORDS: &[&str] = &[
    "sol",
    "solana",
    "hype",
    "hyperliquid",
    "eth",
    "ethereum",
    "btc",
    "bitcoin",
    "usdh",
    "native asset",
    "digital asset",
    "token",
    "tokens",
    "cryptocurrency",
];

const STRATEGY_KEYWORDS: &[&str] = &[
    "digital asset treasury",
    "dat",
    "treasury strategy",
    "treasury holdings",
    "treasury reserve asset",
    "treasury vehicle",
    "on-chain yield",
    "staking yield",
    "yield-bearing",
    "revenue-generating",
    "staking",
    "accretive",
];

const FUNDING_KEYWORDS: &[&str] = &[
    "atm",
    "at-the-market",
    "private placement",
    "stapled warrants",
    "gross proceeds",
    "capital markets program",
    "equity offering",
];

const METRIC_ANCHORS: &[&str] = &[
    "average price of",
    "cost basis of",
    "total holdings",
    "consists of",
    "totaling",
    "in excess of",
    "aggregate",
    "amounted to",
    "worth",
    "valued at",
];

/// Kind of a document inside a filing, by filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DocumentKind {
    /// Press-release exhibit (`ex99`, `ex-99`, `ex_99`).
    Ex99 = 0,
    Exhibit = 1,
    EightK = 2,
    Other = 3,
}

impl DocumentKind {
    pub fn of(filename: &str) -> Self {
        let lower = filename.to_ascii_lowercase();
        if ["ex99", "ex-99", "ex_99"].iter().any(|p| lower.contains(p)) {
            Self::Ex99
        } else if lower.contains("8k") || lower.contains("8-k") {
            Self::EightK
        } else if lower.starts_with("ex") {
            Self::Exhibit
        } else {
            Self::Other
        }
    }

    pub fn rank(self) -> u8 {
        self as u8
    }
}

/// Order filenames for mining: press releases first, then other exhibits,
/// the 8-K body, everything else; ties broken by name.
pub fn rank_documents(mut names: Vec<String>) -> Vec<String> {
    names.sort_by(|a, b| {
        DocumentKind::of(a)
            .cmp(&DocumentKind::of(b))
            .then_with(|| a.cmp(b))
    });
    names
}

/// Press-release exhibit filenames linked from a filing index page,
/// deduplicated, in page order.
pub fn exhibit_links(index_html: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    HREF_RE
        .captures_iter(index_html)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .map(|href| href.strip_prefix("/ix?doc=").unwrap_or(href))
        .filter_map(|href| href.rsplit('/').next())
        .filter(|name| !name.is_empty() && DocumentKind::of(name) == DocumentKind::Ex99)
        .filter(|name| seen.insert(name.to_string()))
        .map(str::to_string)
        .collect()
}

/// Keyword relevance of a document for `token`. Higher is more relevant.
pub fn relevance(text: &str, token: &str) -> u32 {
    let lower = text.to_lowercase();
    let count = |keywords: &[&str]| keywords.iter().filter(|kw| lower.contains(*kw)).count() as u32;

    let token_lower = token.to_lowercase();
    let token_coin = format!("{token_lower}coin");
    let asset: u32 = ASSET_KEYWORDS
        .iter()
        .filter(|kw| lower.contains(*kw))
        .map(|kw| if **kw == token_lower || **kw == token_coin { 20 } else { 5 })
        .sum();

    count(SEC_ITEM_KEYWORDS) * 50
        + count(ACTION_KEYWORDS) * 10
        + asset
        + count(STRATEGY_KEYWORDS) * 8
        + count(FUNDING_KEYWORDS) * 5
        + count(METRIC_ANCHORS) * 15
}

pub fn is_relevant(text: &str, token: &str) -> bool {
    relevance(text, token) >= RELEVANCE_FLOOR
}

/// Plain text from an HTML page: scripts and styles dropped, tags replaced
/// by spaces, common entities decoded, whitespace collapsed.
pub fn strip_html(html: &str) -> String {
    let text = SCRIPT_RE.replace_all(html, " ");
    let text = TAG_RE.replace_all(&text, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&amp;", "&")
        .replace("&#8383;", "₿")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">");
    SPACE_RE.replace_all(&text, " ").trim().to_string()
}
