//! Persistence layer.
//!
//! Loads and saves the ledger (`data.json`) and the oscillation history.
//! Every save writes a temp file in the target's directory and renames it
//! into place, so readers see either the old file or the new one.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::types::{Ledger, MonitorError, OscillationHistory};

const LEDGER_PREFIX: &str = ".data_";
const HISTORY_PREFIX: &str = ".history_";

/// Load the ledger. A missing ledger is an error: there is nothing to
/// reconcile against.
pub fn load_ledger(path: &Path) -> Result<Ledger> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read ledger from {}", path.display()))?;
    let ledger: Ledger = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse ledger from {}", path.display()))?;

    info!(
        path = %path.display(),
        companies = ledger.company_count(),
        groups = ledger.companies.len(),
        "Ledger loaded"
    );
    Ok(ledger)
}

/// Verify totals, stamp `lastUpdated`, and write atomically.
pub fn save_ledger(ledger: &mut Ledger, path: &Path) -> Result<()> {
    save_ledger_at(ledger, path, Utc::now())
}

pub fn save_ledger_at(ledger: &mut Ledger, path: &Path, now: DateTime<Utc>) -> Result<()> {
    ledger
        .verify_totals()
        .context("Refusing to save ledger with inconsistent totals")?;
    ledger.stamp(now);
    stage_json(path, LEDGER_PREFIX, ledger)?.commit()?;
    debug!(path = %path.display(), "Ledger saved");
    Ok(())
}

/// Load the oscillation history. Missing file means first run.
pub fn load_history(path: &Path) -> Result<OscillationHistory> {
    if !path.exists() {
        info!(path = %path.display(), "No oscillation history found, starting fresh");
        return Ok(OscillationHistory::new());
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history from {}", path.display()))?;
    let history: OscillationHistory = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse history from {}", path.display()))?;
    debug!(path = %path.display(), entries = history.len(), "History loaded");
    Ok(history)
}

/// Persist the ledger and history of one batch. Both files are fully
/// staged before either is renamed, so a write fault leaves both prior
/// files in place.
pub fn save_batch(
    ledger: &mut Ledger,
    ledger_path: &Path,
    history: &OscillationHistory,
    history_path: &Path,
) -> Result<()> {
    save_batch_at(ledger, ledger_path, history, history_path, Utc::now())
}

pub fn save_batch_at(
    ledger: &mut Ledger,
    ledger_path: &Path,
    history: &OscillationHistory,
    history_path: &Path,
    now: DateTime<Utc>,
) -> Result<()> {
    ledger
        .verify_totals()
        .context("Refusing to save ledger with inconsistent totals")?;
    ledger.stamp(now);

    let ledger_write = stage_json(ledger_path, LEDGER_PREFIX, ledger)?;
    let history_write = stage_json(history_path, HISTORY_PREFIX, history)?;

    // Ledger first: a history left behind is re-seeded on the next run.
    ledger_write.commit()?;
    history_write.commit()?;
    debug!(
        ledger = %ledger_path.display(),
        history = %history_path.display(),
        "Batch saved"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Atomic writes
// ---------------------------------------------------------------------------

/// A fully written temp file waiting to replace `target`. Dropping it
/// without `commit` deletes the temp file and leaves `target` untouched.
pub struct StagedWrite {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite {
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Rename the temp file over the target.
    pub fn commit(self) -> Result<()> {
        let target = self.target;
        self.temp.persist(&target).map_err(|e| {
            MonitorError::Storage(format!("failed to replace {}: {}", target.display(), e.error))
        })?;
        Ok(())
    }
}

/// Serialize `value` as pretty JSON into a temp file beside `path`.
pub fn stage_json<T: Serialize>(path: &Path, prefix: &str, value: &T) -> Result<StagedWrite> {
    let mut json = serde_json::to_string_pretty(value).context("Failed to serialise JSON")?;
    json.push('\n');
    stage_bytes(path, prefix, json.as_bytes())
}

fn stage_bytes(path: &Path, prefix: &str, bytes: &[u8]) -> Result<StagedWrite> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut temp = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    temp.write_all(bytes)
        .with_context(|| format!("Failed to write temp file for {}", path.display()))?;
    temp.as_file()
        .sync_all()
        .with_context(|| format!("Failed to sync temp file for {}", path.display()))?;
    Ok(StagedWrite {
        temp,
        target: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
