//! Post-batch data-quality audit over the ledger and oscillation history.
//!
//! Read-only. Produces flags with a severity; the binary exits non-zero
//! when any flag is critical.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

use crate::config::PolicyConfig;
use crate::types::{Company, Ledger, OscillationHistory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::Warning => write!(f, "WARNING"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditFlag {
    pub severity: Severity,
    pub ticker: String,
    pub token: String,
    pub check_name: &'static str,
    pub message: String,
}

impl fmt::Display for AuditFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}) {}: {}",
            self.severity, self.ticker, self.token, self.check_name, self.message
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub date: NaiveDate,
    pub companies_checked: usize,
    pub flags: Vec<AuditFlag>,
}

impl AuditReport {
    pub fn critical_count(&self) -> usize {
        self.flags.iter().filter(|f| f.severity == Severity::Critical).count()
    }

    pub fn warning_count(&self) -> usize {
        self.flags.iter().filter(|f| f.severity == Severity::Warning).count()
    }

    pub fn has_critical(&self) -> bool {
        self.critical_count() > 0
    }
}

/// Run every check. `today` anchors the staleness check.
pub fn audit(
    ledger: &Ledger,
    history: &OscillationHistory,
    policy: &PolicyConfig,
    today: NaiveDate,
) -> AuditReport {
    let mut flags = Vec::new();

    for (token, company) in ledger.iter_companies() {
        let flag = |severity, check_name, message| AuditFlag {
            severity,
            ticker: company.ticker.clone(),
            token: token.to_string(),
            check_name,
            message,
        };

        if company.tokens > 0 && company.tokens < policy.small_value_floor {
            flags.push(flag(
                Severity::Critical,
                "artifact_value",
                format!(
                    "Token count {} is below artifact floor ({})",
                    company.tokens, policy.small_value_floor
                ),
            ));
        }

        if let Some((previous, pct)) = drop_of(company.tokens, company.change) {
            if pct > policy.large_decrease_threshold {
                flags.push(flag(
                    Severity::Critical,
                    "magnitude_drop",
                    format!(
                        "Change of {} represents {:.0}% drop (from {previous} to {})",
                        company.change,
                        pct * 100.0,
                        company.tokens
                    ),
                ));
            }
        }

        if let Some(days) = days_since_update(company, today) {
            if days > policy.audit_stale_days {
                flags.push(flag(
                    Severity::Warning,
                    "stale_data",
                    format!("Last updated {} ({days} days ago)", company.last_update),
                ));
            }
        }

        if let Some(record) = history.get(&company.ticker, token) {
            if record.last_confirmed_value != company.tokens {
                flags.push(flag(
                    Severity::Warning,
                    "history_consistency",
                    format!(
                        "Current tokens ({}) != history last_confirmed ({})",
                        company.tokens, record.last_confirmed_value
                    ),
                ));
            }
        }
    }

    for entry in &ledger.recent_changes {
        if let Some((previous, pct)) = drop_of(entry.tokens, entry.change) {
            if pct > policy.large_decrease_threshold {
                flags.push(AuditFlag {
                    severity: Severity::Critical,
                    ticker: entry.ticker.clone(),
                    token: entry.token.clone(),
                    check_name: "suspicious_recent_change",
                    message: format!(
                        "Recent change of {} is a {:.0}% drop (from {previous} to {})",
                        entry.change,
                        pct * 100.0,
                        entry.tokens
                    ),
                });
            }
        }
    }

    match ledger.computed_totals() {
        Ok(expected) => {
            for (group, sum) in &expected {
                let stored = ledger.totals.get(group).copied().unwrap_or(0);
                if stored != *sum {
                    flags.push(AuditFlag {
                        severity: Severity::Critical,
                        ticker: "*".to_string(),
                        token: group.clone(),
                        check_name: "aggregate_mismatch",
                        message: format!("totals[{group}] = {stored}, members sum to {sum}"),
                    });
                }
            }
        }
        Err(e) => flags.push(AuditFlag {
            severity: Severity::Critical,
            ticker: "*".to_string(),
            token: "*".to_string(),
            check_name: "aggregate_mismatch",
            message: e.to_string(),
        }),
    }

    AuditReport {
        date: today,
        companies_checked: ledger.company_count(),
        flags,
    }
}

/// Companies whose `lastUpdate` is more than `days` old, oldest first.
pub fn stale_companies<'a>(
    ledger: &'a Ledger,
    today: NaiveDate,
    days: i64,
) -> Vec<(&'a str, &'a Company, i64)> {
    let mut stale: Vec<_> = ledger
        .iter_companies()
        .filter_map(|(token, c)| {
            days_since_update(c, today)
                .filter(|age| *age > days)
                .map(|age| (token, c, age))
        })
        .collect();
    stale.sort_by(|a, b| b.2.cmp(&a.2));
    stale
}

/// `(previous, fraction dropped)` when `change` is a decrease to a
/// positive `tokens`.
fn drop_of(tokens: u64, change: i64) -> Option<(u64, f64)> {
    if change >= 0 || tokens == 0 {
        return None;
    }
    let previous = tokens.checked_add(change.unsigned_abs())?;
    Some((previous, change.unsigned_abs() as f64 / previous as f64))
}

fn days_since_update(company: &Company, today: NaiveDate) -> Option<i64> {
    let updated = NaiveDate::parse_from_str(&company.last_update, "%Y-%m-%d").ok()?;
    Some((today - updated).num_days())
}
