//! Keyword classifier: is a piece of text about token holdings, a share
//! buyback, or neither?
//!
//! Counts case-insensitive substring hits against two fixed keyword sets.
//! The set with strictly more hits wins; any tie (including 0–0) is
//! `Unknown`, so a buyback is never mistaken for a token purchase.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::extract::numbers;

const SHARE_KEYWORDS: &[&str] = &[
    "buyback",
    "repurchase",
    "share",
    "stock",
    "equity",
    "common stock",
];

const TOKEN_KEYWORDS: &[&str] = &[
    "holdings",
    "treasury",
    "purchased",
    "acquired",
    "token",
    "coin",
    "wallet",
    "staking",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    TokenHolding,
    ShareBuyback,
    Unknown,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::TokenHolding => "TOKEN_HOLDING",
            Self::ShareBuyback => "SHARE_BUYBACK",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

/// Result of classifying one text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseResult {
    pub classification: Classification,
    /// Display-only; never gates the label.
    pub quantity: Option<u64>,
    pub raw_text: String,
    /// Keywords of the winning set, in list order. For `Unknown`, the
    /// share-side hits followed by the token-side hits.
    pub matched_keywords: Vec<String>,
}

fn hits(lower: &str, keywords: &[&str]) -> Vec<String> {
    keywords
        .iter()
        .filter(|kw| lower.contains(*kw))
        .map(|kw| kw.to_string())
        .collect()
}

pub fn classify(text: &str) -> ParseResult {
    let lower = text.to_lowercase();
    let share = hits(&lower, SHARE_KEYWORDS);
    let token = hits(&lower, TOKEN_KEYWORDS);

    let (classification, matched_keywords) = match share.len().cmp(&token.len()) {
        std::cmp::Ordering::Greater => (Classification::ShareBuyback, share),
        std::cmp::Ordering::Less => (Classification::TokenHolding, token),
        std::cmp::Ordering::Equal => (Classification::Unknown, [share, token].concat()),
    };

    ParseResult {
        classification,
        quantity: numbers::first_quantity(text),
        raw_text: text.to_string(),
        matched_keywords,
    }
}
