//! Deterministic number parsing for filing and web-page text.
//!
//! Recognises comma-grouped literals (`12,590`), plain integers, decimals,
//! and suffix notation (`6.9M`, `500K`, `4.2 million`). Suffix scaling is
//! done on the decimal string so `2.3M` is exactly `2_300_000`.

use regex::Regex;
use std::sync::LazyLock;

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?P<cur>\$\s?)?\b(?P<num>\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)(?:\s?(?P<suf>million|thousand|m|k)\b)?",
    )
    .expect("number pattern is valid")
});

/// Exhibit and item headers whose numbers look like quantities.
static NOISE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:ex(?:hibit)?[\s\-_.]*\d+(?:[\-_.]\d+)*|item\s+\d+(?:\.\d+)?)")
        .expect("noise pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    /// `6.9M`, `500K`, `4.2 million`
    Suffixed,
    /// `12,590`
    Grouped,
    /// `13627`
    Plain,
    /// `99.1` with no suffix
    Decimal,
}

/// A number found in text, with its byte span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberToken {
    pub value: u64,
    pub kind: NumberKind,
    /// Preceded by `$`: a money amount, not a token count.
    pub currency: bool,
    pub start: usize,
    pub end: usize,
}

impl NumberToken {
    /// Whether this token is almost certainly not a holdings figure:
    /// money amounts, bare decimals, tiny integers and years.
    pub fn is_artifact(&self) -> bool {
        if self.currency {
            return true;
        }
        match self.kind {
            NumberKind::Suffixed | NumberKind::Grouped => false,
            NumberKind::Decimal => true,
            NumberKind::Plain => self.value < 10 || (1900..=2100).contains(&self.value),
        }
    }
}

/// Replace exhibit/item headers (`EX-99.1`, `Item 8.01`) with spaces.
/// Byte offsets are preserved.
pub fn strip_noise(text: &str) -> String {
    NOISE_RE
        .replace_all(text, |caps: &regex::Captures<'_>| " ".repeat(caps[0].len()))
        .into_owned()
}

/// Every number token in `text`, in reading order.
pub fn scan(text: &str) -> Vec<NumberToken> {
    let mut tokens = Vec::new();
    for caps in NUMBER_RE.captures_iter(text) {
        let Some(num) = caps.name("num") else { continue };
        // "1,2345": the grouped alternative stops early; not a real literal.
        if text[num.end()..].starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        let suffix = caps.name("suf").map(|s| s.as_str().to_ascii_lowercase());
        let multiplier = match suffix.as_deref() {
            Some("million") | Some("m") => 1_000_000,
            Some("thousand") | Some("k") => 1_000,
            _ => 1,
        };
        let raw = num.as_str();
        let Some(value) = scale(raw, multiplier) else { continue };
        let kind = if multiplier > 1 {
            NumberKind::Suffixed
        } else if raw.contains(',') {
            NumberKind::Grouped
        } else if raw.contains('.') {
            NumberKind::Decimal
        } else {
            NumberKind::Plain
        };
        let whole = caps.get(0).map(|m| m.end()).unwrap_or(num.end());
        tokens.push(NumberToken {
            value,
            kind,
            currency: caps.name("cur").is_some(),
            start: num.start(),
            end: whole,
        });
    }
    tokens
}

/// Non-artifact number tokens only.
pub fn scan_plausible(text: &str) -> Vec<NumberToken> {
    scan(text).into_iter().filter(|t| !t.is_artifact()).collect()
}

/// First quantity in free text: a suffixed figure wins, then a grouped
/// literal, then the first plain integer that is not an artifact.
pub fn first_quantity(text: &str) -> Option<u64> {
    let cleaned = strip_noise(text);
    let tokens = scan_plausible(&cleaned);
    [NumberKind::Suffixed, NumberKind::Grouped, NumberKind::Plain]
        .iter()
        .find_map(|kind| tokens.iter().find(|t| t.kind == *kind))
        .map(|t| t.value)
}

/// Parse a captured numeric string such as `"4.16M"`, `"12,500"` or
/// `"1.5 million"`. Decimals without a suffix are truncated.
pub fn parse_quantity(raw: &str) -> Option<u64> {
    scan(raw).into_iter().find(|t| !t.currency).map(|t| t.value)
}

/// Dashboard metric such as `"$3.10B"`, `"1.42"` or `"451.06 M"`.
/// Ratios and prices are fractional, so this one is floating point.
pub fn parse_metric(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    let (digits, multiplier) = match cleaned.chars().last()?.to_ascii_uppercase() {
        'B' => (&cleaned[..cleaned.len() - 1], 1e9),
        'M' => (&cleaned[..cleaned.len() - 1], 1e6),
        'K' => (&cleaned[..cleaned.len() - 1], 1e3),
        _ => (cleaned.as_str(), 1.0),
    };
    let value: f64 = digits.parse().ok()?;
    value.is_finite().then_some(value * multiplier)
}

/// `"6.9"` × 1_000_000 without going through floating point.
fn scale(raw: &str, multiplier: u64) -> Option<u64> {
    let digits: String = raw.chars().filter(|c| *c != ',').collect();
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits.as_str(), ""),
    };
    let int: u128 = int_part.parse().ok()?;
    let mut value = int.checked_mul(multiplier as u128)?;
    if !frac_part.is_empty() && multiplier > 1 {
        // Only as many fractional digits as the multiplier can express.
        let places = multiplier.ilog10() as usize;
        let kept: String = frac_part.chars().take(places).collect();
        let frac: u128 = kept.parse().ok()?;
        let pad = 10u128.pow((places - kept.len()) as u32);
        value = value.checked_add(frac * pad)?;
    }
    u64::try_from(value).ok()
}
