//! Oscillation guard.
//!
//! Stops noisy re-scrapes from flip-flopping a company between values it
//! has already reported (712k → 709k → 712k). Every accepted value joins
//! the entity's seen-set; a value that reappears needs confirmation wording
//! in its supporting text before it is accepted again.
//!
//! The guard is pure. `evaluate` reads the prior record, `record` returns a
//! new one, and committing it is the caller's job.

use chrono::NaiveDate;
use std::fmt;

use crate::config::PolicyConfig;
use crate::extract::DISPOSAL_KEYWORDS;
use crate::types::{HoldingRecord, MonitorError};

pub const CONFIRMATION_KEYWORDS: &[&str] = &[
    "new filing",
    "confirmed",
    "acquired",
    "purchased",
    "8-k",
    "press release",
];

/// Why the guard accepted or rejected a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardReason {
    FirstObservation,
    NoChange,
    BelowFloor,
    SuspiciousDecrease,
    ConfirmedLargeDecrease,
    NewValue,
    ConfirmedReappearance,
    OscillationSuppressed,
}

impl fmt::Display for GuardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::FirstObservation => "first observation",
            Self::NoChange => "no change from last confirmed value",
            Self::BelowFloor => "artifact floor (value too small to be real)",
            Self::SuspiciousDecrease => "suspicious large decrease without disposal wording",
            Self::ConfirmedLargeDecrease => "large decrease confirmed by disposal wording",
            Self::NewValue => "genuinely new value",
            Self::ConfirmedReappearance => "previously seen value confirmed by keyword",
            Self::OscillationSuppressed => "oscillation suppressed (value seen before, no confirmation)",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub accepted: bool,
    pub reason: GuardReason,
}

impl Verdict {
    fn accept(reason: GuardReason) -> Self {
        Self { accepted: true, reason }
    }

    fn reject(reason: GuardReason) -> Self {
        Self { accepted: false, reason }
    }
}

/// Decision matrix over one `(ticker, token)` history record.
#[derive(Debug, Clone, PartialEq)]
pub struct OscillationGuard {
    large_decrease_threshold: f64,
    small_value_floor: u64,
}

impl Default for OscillationGuard {
    fn default() -> Self {
        Self {
            large_decrease_threshold: 0.50,
            small_value_floor: 50,
        }
    }
}

impl OscillationGuard {
    pub fn new(large_decrease_threshold: f64, small_value_floor: u64) -> Result<Self, MonitorError> {
        if !(0.0..=1.0).contains(&large_decrease_threshold) {
            return Err(MonitorError::Config(format!(
                "large_decrease_threshold must be within 0..=1, got {large_decrease_threshold}"
            )));
        }
        Ok(Self {
            large_decrease_threshold,
            small_value_floor,
        })
    }

    pub fn from_policy(policy: &PolicyConfig) -> Result<Self, MonitorError> {
        Self::new(policy.large_decrease_threshold, policy.small_value_floor)
    }

    fn below_floor(&self, value: u64) -> bool {
        value > 0 && value < self.small_value_floor
    }

    /// Accept or reject `value` given its supporting `text` and the prior
    /// record for the entity, if any.
    pub fn evaluate(&self, value: u64, text: &str, prior: Option<&HoldingRecord>) -> Verdict {
        let Some(record) = prior else {
            if self.below_floor(value) {
                return Verdict::reject(GuardReason::BelowFloor);
            }
            return Verdict::accept(GuardReason::FirstObservation);
        };

        if value == record.last_confirmed_value {
            return Verdict::reject(GuardReason::NoChange);
        }

        if record.seen_values.contains(&value) {
            return if mentions_any(text, CONFIRMATION_KEYWORDS) {
                Verdict::accept(GuardReason::ConfirmedReappearance)
            } else {
                Verdict::reject(GuardReason::OscillationSuppressed)
            };
        }

        if self.below_floor(value) {
            return Verdict::reject(GuardReason::BelowFloor);
        }

        let last = record.last_confirmed_value;
        if last > 0 && value < last {
            let drop = (last - value) as f64 / last as f64;
            if drop > self.large_decrease_threshold {
                return if mentions_any(text, DISPOSAL_KEYWORDS) {
                    Verdict::accept(GuardReason::ConfirmedLargeDecrease)
                } else {
                    Verdict::reject(GuardReason::SuspiciousDecrease)
                };
            }
        }

        Verdict::accept(GuardReason::NewValue)
    }

    /// The record after accepting `value` on `date`. `prior` is untouched;
    /// its seen values are carried over.
    pub fn record(prior: Option<&HoldingRecord>, value: u64, date: NaiveDate) -> HoldingRecord {
        let mut seen_values = prior.map(|r| r.seen_values.clone()).unwrap_or_default();
        seen_values.insert(value);
        HoldingRecord {
            last_confirmed_value: value,
            seen_values,
            last_update_date: date,
        }
    }
}

fn mentions_any(text: &str, keywords: &[&str]) -> bool {
    let lower = text.to_lowercase();
    keywords.iter().any(|kw| lower.contains(kw))
}
