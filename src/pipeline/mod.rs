//! Decision pipeline: classifier → oscillation guard.
//!
//! Both stages are pure. `assess` runs them for one signal against the
//! entity's prior history record; the orchestrator decides what to commit.

pub mod classifier;
pub mod guard;

use tracing::debug;

use crate::types::{HoldingRecord, ScrapedSignal};
use classifier::{Classification, ParseResult};
use guard::{GuardReason, OscillationGuard};

/// Outcome of running one signal through both stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assessment {
    /// Text reads as an equity action, not a token purchase.
    ShareBuyback(ParseResult),
    /// Classifier could not decide; fail closed.
    Unclassified(ParseResult),
    Rejected(GuardReason),
    Accepted(GuardReason),
}

impl Assessment {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

pub fn assess(
    signal: &ScrapedSignal,
    prior: Option<&HoldingRecord>,
    guard: &OscillationGuard,
) -> Assessment {
    let parsed = classifier::classify(&signal.context_text);
    debug!(
        ticker = %signal.ticker,
        classification = %parsed.classification,
        keywords = ?parsed.matched_keywords,
        "Classified signal text"
    );
    match parsed.classification {
        Classification::ShareBuyback => return Assessment::ShareBuyback(parsed),
        Classification::Unknown => return Assessment::Unclassified(parsed),
        Classification::TokenHolding => {}
    }

    let verdict = guard.evaluate(signal.new_value, &signal.context_text, prior);
    if verdict.accepted {
        Assessment::Accepted(verdict.reason)
    } else {
        Assessment::Rejected(verdict.reason)
    }
}
