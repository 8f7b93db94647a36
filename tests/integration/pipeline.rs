use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use dat_monitor::alerts::{notify_all, LogSink, NotificationSink};
use dat_monitor::config::{default_tokens, FetchConfig, PolicyConfig, WebsiteSource};
use dat_monitor::data::edgar::EdgarClient;
use dat_monitor::data::ir::PressReleaseScanner;
use dat_monitor::data::website::WebsiteMonitor;
use dat_monitor::engine::auditor::audit;
use dat_monitor::engine::enricher;
use dat_monitor::engine::merge_signals;
use dat_monitor::engine::updater::Updater;
use dat_monitor::extract::strategies::StrategyRegistry;
use dat_monitor::extract::Extractor;
use dat_monitor::storage;
use dat_monitor::types::{Company, Ledger, ScrapedSignal, SourceKind};

use crate::mock_source::{submissions_json, MockSource};

const MSTR_SUBMISSIONS: &str = "https://data.sec.gov/submissions/CIK0001050446.json";
const MSTR_8K: &str = "https://www.sec.gov/Archives/edgar/data/1050446/000119312526061234/d8k.htm";
const BMNR_SUBMISSIONS: &str = "https://data.sec.gov/submissions/CIK0001829311.json";
const BMNR_8K: &str = "https://www.sec.gov/Archives/edgar/data/1829311/000149315226007777/form8-k.htm";
const METAPLANET: &str = "https://metaplanet.jp/en/analytics";

const MSTR_RELEASE: &str = "<html><body><p>Item 8.01 Other Events.</p>\
    <p>Strategy acquired 2,486 BTC during the week. As of February 16, 2026, \
    Strategy holds 714,644 BTC acquired for an aggregate purchase price of $54.35 billion.</p></body></html>";

const BMNR_RELEASE: &str = "<p>Item 7.01 Regulation FD Disclosure.</p>\
    <p>BitMine Immersion Technologies holds 4,371,497 ETH in its treasury.</p>";

const METAPLANET_PAGE: &str = "<div><h3>Total BTC Holdings</h3><span>&#8383;35,102</span></div>";
const METAPLANET_NEWS: &str = "https://metaplanet.jp/en/news";

const METAPLANET_ANALYTICS_PAGE: &str = "<div>Total BTC Holdings <b>&#8383;35,102</b></div>\
    <div>Bitcoin NAV <b>$3.10B</b></div>\
    <table><tr><td>Dec 30, 2025</td><td>&#8383;4,279</td><td>$105,412</td>\
    <td>$451.06M</td><td>&#8383;35,102</td></tr></table>";

const METAPLANET_NEWS_PAGE: &str = "<ul><li><time>Feb 18, 2026</time> \
    <a href=\"/en/shareholders/disclosures/2026-02-18\">Notice of Additional Purchase of Bitcoin</a></li>\
    <li><a href=\"/en/contact\">Contact the IR team</a></li></ul>";

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, 20).unwrap()
}

struct Workspace {
    _dir: TempDir,
    ledger: PathBuf,
    history: PathBuf,
}

fn workspace(ledger: &mut Ledger) -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("dat-data.json");
    let history_path = dir.path().join("history.json");
    ledger.recompute_totals().unwrap();
    storage::save_ledger(ledger, &ledger_path).unwrap();
    Workspace {
        _dir: dir,
        ledger: ledger_path,
        history: history_path,
    }
}

fn company(ticker: &str, name: &str, tokens: u64, cik: Option<&str>) -> Company {
    let mut c = Company::new(ticker, name, tokens, "2026-02-09");
    c.cik = cik.map(str::to_string);
    c
}

fn btc_ledger() -> Ledger {
    let mut ledger = Ledger::default();
    ledger.companies.insert(
        "BTC".to_string(),
        vec![
            company("MSTR", "Strategy", 687_410, Some("0001050446")),
            company("MTPLF", "Metaplanet", 30_823, None),
        ],
    );
    ledger
}

fn extractor() -> Arc<Extractor> {
    Arc::new(Extractor::new(&default_tokens()).unwrap())
}

fn metaplanet_site() -> WebsiteSource {
    WebsiteSource {
        ticker: "MTPLF".to_string(),
        token: "BTC".to_string(),
        url: METAPLANET.to_string(),
        strategy: "metaplanet".to_string(),
        pattern: None,
    }
}

async fn collect(source: Arc<MockSource>, ledger_path: &Path) -> Vec<ScrapedSignal> {
    let ledger = storage::load_ledger(ledger_path).unwrap();
    let extractor = extractor();
    let registry = StrategyRegistry::with_builtins(Arc::clone(&extractor)).unwrap();

    let edgar = EdgarClient::new(source.clone(), Arc::clone(&extractor), &FetchConfig::default());
    let websites = WebsiteMonitor::new(source, Arc::new(registry), extractor, vec![metaplanet_site()]);

    let edgar_signals = edgar.collect_signals(&ledger, today()).await;
    let website_signals = websites.collect().await.signals;
    merge_signals(edgar_signals, website_signals)
}

fn btc_source() -> Arc<MockSource> {
    Arc::new(
        MockSource::new()
            .with(
                MSTR_SUBMISSIONS,
                &submissions_json(&[("0001193125-26-061234", "2026-02-17", "d8k.htm")]),
            )
            .with(MSTR_8K, MSTR_RELEASE)
            .with(METAPLANET, METAPLANET_PAGE),
    )
}

#[tokio::test]
async fn test_full_run_updates_ledger_and_history() {
    let ws = workspace(&mut btc_ledger());
    let signals = collect(btc_source(), &ws.ledger).await;
    assert_eq!(signals.len(), 2);
    assert_eq!(signals[0].source_kind, Some(SourceKind::Edgar));
    assert_eq!(signals[1].source_kind, Some(SourceKind::Website));

    let updater = Updater::new(PolicyConfig::default()).unwrap();
    let summary = updater
        .run_batch_on(&signals, &ws.ledger, &ws.history, today())
        .unwrap();
    assert_eq!(summary.applied, 2);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.changes.len(), 2);

    let ledger = storage::load_ledger(&ws.ledger).unwrap();
    let mstr = ledger.find("MSTR", "BTC").unwrap();
    assert_eq!(mstr.tokens, 714_644);
    assert_eq!(mstr.change, 27_234);
    assert_eq!(mstr.last_sec_update.as_deref(), Some("2026-02-20"));
    assert_eq!(mstr.filings[0].date, "2026-02-17");
    let mtplf = ledger.find("MTPLF", "BTC").unwrap();
    assert_eq!(mtplf.tokens, 35_102);
    assert_eq!(mtplf.alert_source, Some(SourceKind::Website));
    assert_eq!(ledger.totals["BTC"], 714_644 + 35_102);
    assert_eq!(ledger.recent_changes.len(), 2);
    ledger.verify_totals().unwrap();

    let history = storage::load_history(&ws.history).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.get("MSTR", "BTC").unwrap().last_confirmed_value, 714_644);

    let report = audit(&ledger, &history, &PolicyConfig::default(), today());
    assert!(report.flags.is_empty(), "unexpected flags: {:?}", report.flags);

    let sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(LogSink)];
    assert_eq!(notify_all(&sinks, &summary.changes).await, 0);
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let ws = workspace(&mut btc_ledger());
    let updater = Updater::new(PolicyConfig::default()).unwrap();

    let signals = collect(btc_source(), &ws.ledger).await;
    updater.run_batch_on(&signals, &ws.ledger, &ws.history, today()).unwrap();
    let ledger_bytes = std::fs::read(&ws.ledger).unwrap();
    let history_bytes = std::fs::read(&ws.history).unwrap();

    let signals = collect(btc_source(), &ws.ledger).await;
    let summary = updater
        .run_batch_on(&signals, &ws.ledger, &ws.history, today())
        .unwrap();
    assert_eq!(summary.applied, 0);
    assert_eq!(summary.skipped_oscillation, 2);
    assert_eq!(std::fs::read(&ws.ledger).unwrap(), ledger_bytes);
    assert_eq!(std::fs::read(&ws.history).unwrap(), history_bytes);
}

#[tokio::test]
async fn test_access_denied_company_does_not_block_others() {
    let mut ledger = btc_ledger();
    ledger.companies.insert(
        "ETH".to_string(),
        vec![company("BMNR", "BitMine", 4_167_768, Some("0001829311"))],
    );
    let ws = workspace(&mut ledger);

    let source = Arc::new(
        MockSource::new()
            .deny(MSTR_SUBMISSIONS)
            .with(
                BMNR_SUBMISSIONS,
                &submissions_json(&[("0001493152-26-007777", "2026-02-18", "form8-k.htm")]),
            )
            .with(BMNR_8K, BMNR_RELEASE)
            .with(METAPLANET, METAPLANET_PAGE),
    );

    let signals = collect(Arc::clone(&source), &ws.ledger).await;
    let tickers: Vec<_> = signals.iter().map(|s| s.ticker.as_str()).collect();
    assert_eq!(tickers, vec!["BMNR", "MTPLF"]);
    assert_eq!(signals[0].new_value, 4_371_497);

    let requests = source.requests();
    assert_eq!(requests.iter().filter(|u| u.contains("1050446")).count(), 1);
}

#[test]
fn test_buyback_and_unknown_signals_leave_files_untouched() {
    let ws = workspace(&mut btc_ledger());
    let before = std::fs::read(&ws.ledger).unwrap();

    let signals = vec![
        ScrapedSignal::new("MSTR", "BTC", 9_000_000, "Board approves 9M share buyback of common stock")
            .with_source("https://example.com/pr", SourceKind::Edgar),
        ScrapedSignal::new("MSTR", "BTC", 700_000, "Quarterly results call scheduled")
            .with_source("https://example.com/pr2", SourceKind::Edgar),
        ScrapedSignal::new("NOPE", "BTC", 5_000, "acquired for treasury"),
    ];

    let updater = Updater::new(PolicyConfig::default()).unwrap();
    let summary = updater
        .run_batch_on(&signals, &ws.ledger, &ws.history, today())
        .unwrap();
    assert_eq!(summary.skipped_buyback, 1);
    assert_eq!(summary.skipped_unknown, 1);
    assert_eq!(summary.skipped_not_found, 1);
    assert!(!summary.is_dirty());
    assert_eq!(std::fs::read(&ws.ledger).unwrap(), before);
    assert!(!ws.history.exists());
}

#[test]
fn test_website_monitor_with_blocking_runtime() {
    let source = Arc::new(MockSource::new().with(METAPLANET, METAPLANET_PAGE));
    let extractor = extractor();
    let registry = StrategyRegistry::with_builtins(Arc::clone(&extractor)).unwrap();
    let monitor = WebsiteMonitor::new(source, Arc::new(registry), extractor, vec![metaplanet_site()]);

    let signals = tokio_test::block_on(monitor.collect()).signals;
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].new_value, 35_102);
    assert!(signals[0].context_text.contains("treasury holdings"));
}

#[tokio::test]
async fn test_enrichment_and_release_discovery_persist_after_batch() {
    let mut ledger = Ledger::default();
    let mut mtplf = company("MTPLF", "Metaplanet", 30_823, None);
    mtplf.ir_url = Some(METAPLANET_NEWS.to_string());
    ledger.companies.insert("BTC".to_string(), vec![mtplf]);
    let ws = workspace(&mut ledger);

    let source = Arc::new(
        MockSource::new()
            .with(METAPLANET, METAPLANET_ANALYTICS_PAGE)
            .with(METAPLANET_NEWS, METAPLANET_NEWS_PAGE),
    );
    let extractor = extractor();
    let registry = StrategyRegistry::with_builtins(Arc::clone(&extractor)).unwrap();
    let websites = WebsiteMonitor::new(source.clone(), Arc::new(registry), extractor, vec![metaplanet_site()]);
    let scanner = PressReleaseScanner::new(source, &FetchConfig::default());

    let loaded = storage::load_ledger(&ws.ledger).unwrap();
    let scan = websites.collect().await;
    let discovered = scanner.collect(&loaded, today()).await;
    assert_eq!(scan.enrichments.len(), 1);
    assert_eq!(discovered.len(), 1);

    let updater = Updater::new(PolicyConfig::default()).unwrap();
    let summary = updater
        .run_batch_on(&scan.signals, &ws.ledger, &ws.history, today())
        .unwrap();
    assert_eq!(summary.applied, 1);

    assert!(enricher::persist(&ws.ledger, &scan.enrichments, discovered.clone(), today(), 30).unwrap());

    let saved = storage::load_ledger(&ws.ledger).unwrap();
    let mtplf = saved.find("MTPLF", "BTC").unwrap();
    assert_eq!(mtplf.tokens, 35_102);
    assert_eq!(mtplf.analytics.as_ref().unwrap()["bitcoinNavUsd"], 3_100_000_000u64);
    assert_eq!(mtplf.transactions.len(), 1);
    assert_eq!(saved.discovered_press_releases.len(), 1);
    let release = &saved.discovered_press_releases[0];
    assert_eq!(release.url, "https://metaplanet.jp/en/shareholders/disclosures/2026-02-18");
    assert_eq!(release.date.as_deref(), Some("2026-02-18"));
    assert_eq!(release.source_page, METAPLANET_NEWS);
    saved.verify_totals().unwrap();

    // a repeat of the same findings leaves the file alone
    let bytes = std::fs::read(&ws.ledger).unwrap();
    assert!(!enricher::persist(&ws.ledger, &scan.enrichments, discovered, today(), 30).unwrap());
    assert_eq!(std::fs::read(&ws.ledger).unwrap(), bytes);

    let raw: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(raw["discoveredPressReleases"][0]["sourcePage"], METAPLANET_NEWS);
}
