//! DAT Monitor: digital-asset-treasury holdings reconciliation
//!
//! Entry point. Loads configuration, initialises structured logging, then
//! either runs one reconciliation pass (`run`, the default) or audits the
//! stored ledger (`audit`).
//!
//! Usage: `dat-monitor [run|audit] [--dry-run]`

use anyhow::{bail, Result};
use chrono::Utc;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use dat_monitor::alerts::{self, LogSink, NotificationSink, WebhookSink};
use dat_monitor::config::AppConfig;
use dat_monitor::data::edgar::EdgarClient;
use dat_monitor::data::http::HttpFetcher;
use dat_monitor::data::ir::PressReleaseScanner;
use dat_monitor::data::rate_limit::RateLimiter;
use dat_monitor::data::website::WebsiteMonitor;
use dat_monitor::data::DocumentSource;
use dat_monitor::engine::auditor;
use dat_monitor::engine::enricher;
use dat_monitor::engine::merge_signals;
use dat_monitor::engine::updater::Updater;
use dat_monitor::extract::strategies::StrategyRegistry;
use dat_monitor::extract::Extractor;
use dat_monitor::pipeline::classifier::classify;
use dat_monitor::storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Audit,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let (command, dry_run_flag) = parse_args(std::env::args().skip(1))?;

    let config_path = std::env::var("DAT_MONITOR_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    let dry_run = dry_run_flag || cfg.monitor.dry_run;
    info!(
        command = ?command,
        dry_run,
        config = %config_path,
        ledger = %cfg.monitor.data_path,
        "DAT monitor starting"
    );

    match command {
        Command::Run => run(&cfg, dry_run).await,
        Command::Audit => audit(&cfg),
    }
}

fn parse_args<I: Iterator<Item = String>>(args: I) -> Result<(Command, bool)> {
    let mut command = Command::Run;
    let mut dry_run = false;
    for arg in args {
        match arg.as_str() {
            "run" => command = Command::Run,
            "audit" => command = Command::Audit,
            "--dry-run" => dry_run = true,
            other => bail!("Unknown argument: {other} (usage: dat-monitor [run|audit] [--dry-run])"),
        }
    }
    Ok((command, dry_run))
}

/// Fetch → classify → guard → persist → notify → enrich.
async fn run(cfg: &AppConfig, dry_run: bool) -> Result<ExitCode> {
    let ledger_path = Path::new(&cfg.monitor.data_path);
    let history_path = Path::new(&cfg.monitor.history_path);
    let today = Utc::now().date_naive();

    let ledger = storage::load_ledger(ledger_path)?;
    info!(companies = ledger.company_count(), "Ledger loaded");

    // -- Collaborators ---------------------------------------------------

    let extractor = Arc::new(Extractor::new(&cfg.tokens)?);
    let mut registry = StrategyRegistry::with_builtins(Arc::clone(&extractor))?;
    for site in &cfg.websites {
        registry.register_website(site)?;
    }

    let sec_limiter = Arc::new(RateLimiter::from_millis(cfg.fetch.sec_min_interval_ms));
    let web_limiter = Arc::new(RateLimiter::from_millis(cfg.fetch.website_min_interval_ms));
    let sec_source: Arc<dyn DocumentSource> = Arc::new(HttpFetcher::new(&cfg.fetch, sec_limiter)?);
    let web_source: Arc<dyn DocumentSource> = Arc::new(HttpFetcher::new(&cfg.fetch, web_limiter)?);

    let edgar = EdgarClient::new(sec_source, Arc::clone(&extractor), &cfg.fetch);
    let releases = PressReleaseScanner::new(Arc::clone(&web_source), &cfg.fetch);
    let websites = WebsiteMonitor::new(
        web_source,
        Arc::new(registry),
        Arc::clone(&extractor),
        cfg.websites.clone(),
    );

    // -- Fetch -----------------------------------------------------------

    let (edgar_signals, website_scan, discovered) = tokio::join!(
        edgar.collect_signals(&ledger, today),
        websites.collect(),
        releases.collect(&ledger, today),
    );
    info!(
        edgar = edgar_signals.len(),
        website = website_scan.signals.len(),
        enrichments = website_scan.enrichments.len(),
        releases = discovered.len(),
        "Signals collected"
    );

    let signals = merge_signals(edgar_signals, website_scan.signals);
    for signal in &signals {
        let parsed = classify(&signal.context_text);
        info!(
            signal = %signal,
            classification = %parsed.classification,
            keywords = ?parsed.matched_keywords,
            "Signal"
        );
    }

    // -- Reconcile -------------------------------------------------------

    let updater = Updater::new(cfg.policy.clone())?;
    let summary = if dry_run {
        let mut ledger = ledger;
        let mut history = storage::load_history(history_path)?;
        let summary = updater.apply_batch(&mut ledger, &mut history, &signals, today);
        let enriched = enricher::apply_enrichments(&mut ledger, &website_scan.enrichments);
        info!(
            summary = %summary,
            enriched = %enriched,
            releases = discovered.len(),
            "Dry run complete; nothing written"
        );
        summary
    } else {
        let summary = updater.run_batch(&signals, ledger_path, history_path)?;

        let mut sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(LogSink)];
        if let Some(webhook) = WebhookSink::from_config(&cfg.alerts)? {
            sinks.push(Arc::new(webhook));
        }
        let failures = alerts::notify_all(&sinks, &summary.changes).await;
        if failures > 0 {
            warn!(failures, "Some notifications were not delivered");
        }

        let written = enricher::persist(
            ledger_path,
            &website_scan.enrichments,
            discovered,
            today,
            cfg.fetch.press_release_max_age_days,
        )?;
        info!(written, "Enrichment pass done");
        summary
    };

    // -- Staleness report --------------------------------------------------

    let ledger = storage::load_ledger(ledger_path)?;
    for (token, company, age) in auditor::stale_companies(&ledger, today, cfg.monitor.stale_after_days) {
        warn!(
            ticker = %company.ticker,
            token,
            last_update = %company.last_update,
            days = age,
            "Stale holdings"
        );
    }

    if summary.errors > 0 {
        error!(errors = summary.errors, "Batch finished with errors");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Print the data-quality report; non-zero exit on any critical flag.
fn audit(cfg: &AppConfig) -> Result<ExitCode> {
    let ledger = storage::load_ledger(Path::new(&cfg.monitor.data_path))?;
    let history = storage::load_history(Path::new(&cfg.monitor.history_path))?;
    let report = auditor::audit(&ledger, &history, &cfg.policy, Utc::now().date_naive());

    println!(
        "Audit {}: {} companies, {} critical, {} warning",
        report.date,
        report.companies_checked,
        report.critical_count(),
        report.warning_count()
    );
    for flag in &report.flags {
        println!("  {flag}");
    }

    if report.has_critical() {
        error!(critical = report.critical_count(), "Audit found critical issues");
        return Ok(ExitCode::FAILURE);
    }
    info!(warnings = report.warning_count(), "Audit passed");
    Ok(ExitCode::SUCCESS)
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dat_monitor=info"));

    let json_logging = std::env::var("DAT_MONITOR_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
