//! Candidate extraction: find the holdings figure for one token in free text.
//!
//! For each alias occurrence the extractor inspects a window of text at
//! increasing radii and proposes numbers in priority order:
//! 1. `from A to B` transitions (larger of the two)
//! 2. metric anchors (`total`, `aggregate`, `holds`, ...)
//! 3. a number immediately adjacent to the label
//! 4. any number inside the token's plausibility range
//!
//! The first proposal that is plausible and respects the caller's baseline
//! wins. Finding nothing is normal and returns `None`.

pub mod documents;
pub mod numbers;
pub mod strategies;

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;

use crate::config::TokenProfile;
use crate::types::MonitorError;

/// Window radii tried around each label match, smallest first.
const WINDOW_RADII: [usize; 2] = [50, 200];

/// Max distance between an anchor word and its number.
const ANCHOR_REACH: usize = 30;

/// Disposal keywords must appear this close to the label.
const DISPOSAL_REACH: usize = 100;

/// Radius of the context returned with a candidate.
const CONTEXT_RADIUS: usize = 200;

pub const DISPOSAL_KEYWORDS: &[&str] = &[
    "sold",
    "disposed",
    "reduced",
    "liquidated",
    "transferred",
    "distributed",
    "divested",
    "decreased",
];

static TRANSITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bfrom\s+(?P<a>\d[\d,]*(?:\.\d+)?(?:\s?(?:million|thousand|m|k)\b)?)\s*(?:[A-Za-z]+\s+){0,2}?to\s+(?P<b>\d[\d,]*(?:\.\d+)?(?:\s?(?:million|thousand|m|k)\b)?)",
    )
    .expect("transition pattern is valid")
});

static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:total(?:ing|s)?|aggregate|holds|holding|holdings)\b")
        .expect("anchor pattern is valid")
});

/// A proposed holdings figure and the text around the label that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub value: u64,
    pub context: String,
}

struct Target {
    profile: TokenProfile,
    aliases: Vec<Regex>,
}

/// Alias-window extractor over a fixed token table.
pub struct Extractor {
    targets: BTreeMap<String, Target>,
}

impl Extractor {
    /// Compile alias patterns. Short aliases (≤ 4 chars) are case-sensitive,
    /// longer names case-insensitive; both are word-bounded.
    pub fn new(profiles: &BTreeMap<String, TokenProfile>) -> Result<Self, MonitorError> {
        let mut targets = BTreeMap::new();
        for (symbol, profile) in profiles {
            if profile.min > profile.max {
                return Err(MonitorError::Config(format!(
                    "{symbol}: plausibility range min {} exceeds max {}",
                    profile.min, profile.max
                )));
            }
            let aliases = profile
                .aliases
                .iter()
                .filter(|a| !a.trim().is_empty())
                .map(|alias| {
                    let flags = if alias.chars().count() > 4 { "(?i)" } else { "" };
                    Regex::new(&format!(r"{flags}\b{}\b", regex::escape(alias)))
                        .map_err(|e| MonitorError::Extraction(format!("alias {alias:?}: {e}")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            targets.insert(
                symbol.clone(),
                Target {
                    profile: profile.clone(),
                    aliases,
                },
            );
        }
        Ok(Self { targets })
    }

    pub fn profile(&self, symbol: &str) -> Option<&TokenProfile> {
        self.targets.get(symbol).map(|t| &t.profile)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// Holdings figure for `symbol` in `text`, if any.
    pub fn extract(&self, text: &str, symbol: &str) -> Option<u64> {
        self.find_candidate(text, symbol, None).map(|c| c.value)
    }

    /// Like [`extract`](Self::extract), also returning supporting context.
    /// A value below `baseline` is only taken when a disposal keyword sits
    /// near the label.
    pub fn find_candidate(&self, text: &str, symbol: &str, baseline: Option<u64>) -> Option<Candidate> {
        let Some(target) = self.targets.get(symbol) else {
            debug!(symbol, "No token profile; skipping extraction");
            return None;
        };

        let cleaned = numbers::strip_noise(text);
        let mut labels: Vec<(usize, usize)> = target
            .aliases
            .iter()
            .flat_map(|re| re.find_iter(&cleaned).map(|m| (m.start(), m.end())))
            .collect();
        labels.sort_unstable();
        labels.dedup();

        for radius in WINDOW_RADII {
            for &(start, end) in &labels {
                let (lo, hi) = window(&cleaned, start, end, radius);
                let proposals = propose(&cleaned[lo..hi], start - lo, end - lo, &target.profile);
                for value in proposals {
                    if !target.profile.in_range(value) {
                        continue;
                    }
                    if let Some(floor) = baseline {
                        if value < floor && !disposal_near(&cleaned, start, end) {
                            debug!(symbol, value, baseline = floor, "Below baseline without disposal wording");
                            continue;
                        }
                    }
                    let (clo, chi) = window(text, start, end, CONTEXT_RADIUS);
                    return Some(Candidate {
                        value,
                        context: text[clo..chi].trim().to_string(),
                    });
                }
            }
        }
        None
    }
}

/// Numbers proposed by one window, best first.
fn propose(span: &str, label_start: usize, label_end: usize, profile: &TokenProfile) -> Vec<u64> {
    let mut out = Vec::new();

    for caps in TRANSITION_RE.captures_iter(span) {
        let a = caps.name("a").and_then(|m| plausible_number(m.as_str()));
        let b = caps.name("b").and_then(|m| plausible_number(m.as_str()));
        if let Some(v) = a.max(b) {
            out.push(v);
        }
    }

    for anchor in ANCHOR_RE.find_iter(span) {
        let (_, reach_end) = window(span, anchor.end(), anchor.end(), ANCHOR_REACH);
        let tail = &span[anchor.end()..reach_end];
        if let Some(token) = numbers::scan_plausible(tail).first() {
            out.push(token.value);
        }
    }

    let tokens = numbers::scan_plausible(span);
    for token in &tokens {
        let before = token.end <= label_start && span[token.end..label_start].trim().is_empty();
        let after = token.start >= label_end
            && span[label_end..token.start]
                .trim_matches(|c: char| c.is_whitespace() || c == ':' || c == '-')
                .is_empty();
        if before || after {
            out.push(token.value);
        }
    }

    if let Some(token) = tokens.iter().find(|t| profile.in_range(t.value)) {
        out.push(token.value);
    }

    out
}

fn plausible_number(raw: &str) -> Option<u64> {
    numbers::scan_plausible(raw).first().map(|t| t.value)
}

fn disposal_near(text: &str, start: usize, end: usize) -> bool {
    let (lo, hi) = window(text, start, end, DISPOSAL_REACH);
    let span = text[lo..hi].to_lowercase();
    DISPOSAL_KEYWORDS.iter().any(|kw| span.contains(kw))
}

/// Byte range `[start - radius, end + radius]` widened to char boundaries.
pub(crate) fn window(text: &str, start: usize, end: usize, radius: usize) -> (usize, usize) {
    let mut lo = start.saturating_sub(radius);
    while !text.is_char_boundary(lo) {
        lo -= 1;
    }
    let mut hi = end.saturating_add(radius).min(text.len());
    while !text.is_char_boundary(hi) {
        hi += 1;
    }
    (lo, hi)
}
