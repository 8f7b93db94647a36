//! Core engine: signal merging, the batch orchestrator, post-batch
//! enrichment, and the auditor.

pub mod auditor;
pub mod enricher;
pub mod updater;

use std::collections::HashSet;
use tracing::debug;

use crate::types::{ScrapedSignal, SourceKind};

/// Combine fetcher outputs for one run. Regulatory filings outrank company
/// websites: a website signal is dropped when EDGAR produced a signal for
/// the same ticker and token. Order is otherwise preserved, EDGAR first.
pub fn merge_signals(edgar: Vec<ScrapedSignal>, website: Vec<ScrapedSignal>) -> Vec<ScrapedSignal> {
    let covered: HashSet<(String, String)> = edgar
        .iter()
        .map(|s| (s.ticker.clone(), s.token.clone()))
        .collect();

    let mut merged = edgar;
    for signal in website {
        if covered.contains(&(signal.ticker.clone(), signal.token.clone())) {
            debug!(
                ticker = %signal.ticker,
                source = ?signal.source_kind.unwrap_or(SourceKind::Website),
                "Dropping website signal; EDGAR signal takes priority"
            );
            continue;
        }
        merged.push(signal);
    }
    merged
}
