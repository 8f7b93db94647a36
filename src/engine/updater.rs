//! Orchestrator: ledger + history → per-signal decisions → atomic save.
//!
//! Signals are processed strictly in order. For each one: find the
//! company, honour manual overrides, classify, run the oscillation guard,
//! and on acceptance mutate the in-memory ledger and commit the new history
//! record. Nothing is written unless at least one signal was applied.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::config::PolicyConfig;
use crate::pipeline::guard::{GuardReason, OscillationGuard};
use crate::pipeline::{assess, Assessment};
use crate::storage;
use crate::types::{
    ChangeEvent, FilingRef, Ledger, MonitorError, OscillationHistory, RecentChange, ScrapedSignal,
    SourceKind,
};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Terminal outcome for one signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalOutcome {
    Applied {
        before: u64,
        after: u64,
        delta: i64,
        reason: GuardReason,
    },
    SkippedOverride,
    SkippedBuyback,
    SkippedUnknown,
    SkippedOscillation(GuardReason),
    NotFound,
}

/// Per-batch outcome counters. Every skip reason is reported separately.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub applied: usize,
    pub skipped_override: usize,
    pub skipped_buyback: usize,
    pub skipped_oscillation: usize,
    pub skipped_unknown: usize,
    pub skipped_not_found: usize,
    pub errors: usize,
    /// Applied changes, in order, for notification after persistence.
    #[serde(skip)]
    pub changes: Vec<ChangeEvent>,
}

impl BatchSummary {
    fn tally(&mut self, outcome: &SignalOutcome) {
        match outcome {
            SignalOutcome::Applied { .. } => self.applied += 1,
            SignalOutcome::SkippedOverride => self.skipped_override += 1,
            SignalOutcome::SkippedBuyback => self.skipped_buyback += 1,
            SignalOutcome::SkippedUnknown => self.skipped_unknown += 1,
            SignalOutcome::SkippedOscillation(_) => self.skipped_oscillation += 1,
            SignalOutcome::NotFound => self.skipped_not_found += 1,
        }
    }

    /// Signals accounted for, including errors.
    pub fn total(&self) -> usize {
        self.applied
            + self.skipped_override
            + self.skipped_buyback
            + self.skipped_oscillation
            + self.skipped_unknown
            + self.skipped_not_found
            + self.errors
    }

    pub fn is_dirty(&self) -> bool {
        self.applied > 0
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "applied={} skipped_override={} skipped_buyback={} skipped_oscillation={} \
             skipped_unknown={} skipped_not_found={} errors={}",
            self.applied,
            self.skipped_override,
            self.skipped_buyback,
            self.skipped_oscillation,
            self.skipped_unknown,
            self.skipped_not_found,
            self.errors
        )
    }
}

// ---------------------------------------------------------------------------
// Updater
// ---------------------------------------------------------------------------

pub struct Updater {
    guard: OscillationGuard,
    policy: PolicyConfig,
}

impl Updater {
    pub fn new(policy: PolicyConfig) -> Result<Self, MonitorError> {
        Ok(Self {
            guard: OscillationGuard::from_policy(&policy)?,
            policy,
        })
    }

    /// Run one signal. On `Err` neither the ledger nor the history has been
    /// touched.
    pub fn process_signal(
        &self,
        ledger: &mut Ledger,
        history: &mut OscillationHistory,
        signal: &ScrapedSignal,
        today: NaiveDate,
    ) -> Result<SignalOutcome, MonitorError> {
        if signal.ticker.trim().is_empty() || signal.token.trim().is_empty() {
            return Err(MonitorError::InvalidSignal(format!(
                "missing ticker or token in {signal}"
            )));
        }

        let Some(company) = ledger.find(&signal.ticker, &signal.token) else {
            warn!(ticker = %signal.ticker, token = %signal.token, "Ticker not found in token group");
            return Ok(SignalOutcome::NotFound);
        };

        if company.manual_override {
            info!(ticker = %signal.ticker, "Skipping: manual override is set");
            return Ok(SignalOutcome::SkippedOverride);
        }

        let prior = history.get(&signal.ticker, &signal.token);
        let reason = match assess(signal, prior, &self.guard) {
            Assessment::ShareBuyback(parsed) => {
                info!(
                    ticker = %signal.ticker,
                    keywords = ?parsed.matched_keywords,
                    "Skipping: classified as SHARE_BUYBACK"
                );
                return Ok(SignalOutcome::SkippedBuyback);
            }
            Assessment::Unclassified(parsed) => {
                warn!(
                    ticker = %signal.ticker,
                    keywords = ?parsed.matched_keywords,
                    text = %truncate(&signal.context_text, 100),
                    "Skipping: classification UNKNOWN"
                );
                return Ok(SignalOutcome::SkippedUnknown);
            }
            Assessment::Rejected(reason) => {
                info!(ticker = %signal.ticker, value = signal.new_value, reason = %reason, "Skipping: guard rejected");
                return Ok(SignalOutcome::SkippedOscillation(reason));
            }
            Assessment::Accepted(reason) => reason,
        };

        // Everything fallible happens before the first mutation.
        let before = company.tokens;
        let after = signal.new_value;
        let delta = signed(after)?
            .checked_sub(signed(before)?)
            .ok_or_else(|| MonitorError::Overflow(format!("{} delta", signal.ticker)))?;
        let mut totals = ledger.computed_totals()?;
        let group_total = totals.entry(signal.token.clone()).or_default();
        *group_total = group_total
            .checked_sub(before)
            .and_then(|t| t.checked_add(after))
            .ok_or_else(|| MonitorError::Overflow(format!("{} total", signal.token)))?;
        let next_record = OscillationGuard::record(prior, after, today);

        let date = today.format("%Y-%m-%d").to_string();
        let company = ledger
            .find_mut(&signal.ticker, &signal.token)
            .ok_or_else(|| MonitorError::InvalidSignal(format!("{} vanished mid-update", signal.ticker)))?;
        company.tokens = after;
        company.change = delta;
        company.last_update = date.clone();

        if let Some(url) = signal.source_url() {
            company.alert_url = Some(url.to_string());
            company.alert_date = Some(date.clone());
            company.alert_note = Some(truncate(&signal.context_text, self.policy.note_chars));
            company.alert_source = signal.source_kind;
            if signal.source_kind == Some(SourceKind::Edgar) {
                company.last_sec_update = Some(date.clone());
            }
            let filed = signal
                .filing
                .as_ref()
                .map(|f| f.filing_date.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| date.clone());
            company.record_filing(
                FilingRef {
                    url: url.to_string(),
                    date: filed,
                    note: truncate(&signal.context_text, self.policy.note_chars),
                    kind: signal.source_kind,
                },
                self.policy.filings_cap,
            );
        }

        ledger.totals = totals;
        ledger.push_recent_change(
            RecentChange {
                ticker: signal.ticker.clone(),
                token: signal.token.clone(),
                date,
                tokens: after,
                change: delta,
                summary: truncate(&signal.context_text, self.policy.summary_chars),
            },
            self.policy.recent_changes_cap,
        );
        history.commit(&signal.ticker, &signal.token, next_record);

        info!(
            ticker = %signal.ticker,
            token = %signal.token,
            before,
            after,
            delta,
            reason = %reason,
            "Applied holdings update"
        );
        Ok(SignalOutcome::Applied {
            before,
            after,
            delta,
            reason,
        })
    }

    /// Process every signal in order against in-memory state. Per-signal
    /// errors are counted and never stop the batch.
    pub fn apply_batch(
        &self,
        ledger: &mut Ledger,
        history: &mut OscillationHistory,
        signals: &[ScrapedSignal],
        today: NaiveDate,
    ) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for signal in signals {
            match self.process_signal(ledger, history, signal, today) {
                Ok(outcome) => {
                    if let SignalOutcome::Applied { before, after, .. } = outcome {
                        summary.changes.push(ChangeEvent {
                            ticker: signal.ticker.clone(),
                            token: signal.token.clone(),
                            before,
                            after,
                            source_url: signal.source_url().map(str::to_string),
                        });
                    }
                    summary.tally(&outcome);
                }
                Err(e) => {
                    error!(ticker = %signal.ticker, error = %e, "Error processing signal");
                    summary.errors += 1;
                }
            }
        }
        summary
    }

    /// Load both stores, apply the batch, and persist both atomically if
    /// anything was applied.
    pub fn run_batch(
        &self,
        signals: &[ScrapedSignal],
        ledger_path: &Path,
        history_path: &Path,
    ) -> Result<BatchSummary> {
        self.run_batch_on(signals, ledger_path, history_path, Utc::now().date_naive())
    }

    pub fn run_batch_on(
        &self,
        signals: &[ScrapedSignal],
        ledger_path: &Path,
        history_path: &Path,
        today: NaiveDate,
    ) -> Result<BatchSummary> {
        let span = info_span!("batch", run_id = %Uuid::new_v4());
        let _enter = span.enter();

        let mut ledger = storage::load_ledger(ledger_path)?;
        let mut history = storage::load_history(history_path)?;

        info!(signals = signals.len(), "Starting batch");
        let summary = self.apply_batch(&mut ledger, &mut history, signals, today);

        if summary.is_dirty() {
            storage::save_batch(&mut ledger, ledger_path, &history, history_path)?;
            info!(applied = summary.applied, "Ledger and history persisted");
        } else {
            info!("No changes applied; nothing written");
        }

        info!(summary = %summary, "Batch complete");
        Ok(summary)
    }
}

fn signed(value: u64) -> Result<i64, MonitorError> {
    i64::try_from(value).map_err(|_| MonitorError::Overflow(format!("{value} exceeds i64")))
}

/// First `max` chars of `text`.
fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
