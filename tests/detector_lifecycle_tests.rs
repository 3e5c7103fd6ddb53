// tests/detector_lifecycle_tests.rs
// End-to-end scan tests over an in-memory store and a canned snapshot feed.

use chrono::{DateTime, FixedOffset, TimeZone};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use oi_monitor::baseline_store::{BaselineStore, MemoryStore};
use oi_monitor::config::MonitorConfig;
use oi_monitor::errors::MonitorError;
use oi_monitor::market_feed::SnapshotSource;
use oi_monitor::scan::run_scan_at;
use oi_monitor::score_log::ScoreLog;
use oi_monitor::telegram_notifier::TelegramNotifier;
use oi_monitor::types::{ContractKey, ExpiryInfo, LifecycleState, OptionQuote, OptionSide, IST};

fn setup_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct StubFeed {
    spot: Mutex<f64>,
    chain: Mutex<Vec<OptionQuote>>,
    expiries: Vec<ExpiryInfo>,
    fail_spot: AtomicBool,
}

impl StubFeed {
    fn new(spot: f64, expiry_epoch: i64, expiry_label: &str) -> Self {
        Self {
            spot: Mutex::new(spot),
            chain: Mutex::new(Vec::new()),
            expiries: vec![ExpiryInfo {
                epoch: expiry_epoch,
                label: expiry_label.to_string(),
            }],
            fail_spot: AtomicBool::new(false),
        }
    }

    fn set_spot(&self, spot: f64) {
        *self.spot.lock().unwrap() = spot;
    }

    fn set_chain(&self, quotes: Vec<OptionQuote>) {
        *self.chain.lock().unwrap() = quotes;
    }
}

impl SnapshotSource for StubFeed {
    async fn fetch_spot(&self) -> Result<f64, MonitorError> {
        if self.fail_spot.load(Ordering::SeqCst) {
            return Err(MonitorError::Feed("stub spot outage".to_string()));
        }
        Ok(*self.spot.lock().unwrap())
    }

    async fn fetch_option_chain(&self) -> Result<Vec<OptionQuote>, MonitorError> {
        Ok(self.chain.lock().unwrap().clone())
    }

    async fn fetch_expiries(&self) -> Result<Vec<ExpiryInfo>, MonitorError> {
        Ok(self.expiries.clone())
    }
}

fn quote(side: OptionSide, strike: u32, oi: i64, ltp: f64, volume: i64) -> OptionQuote {
    OptionQuote {
        symbol: format!("BANKNIFTY 26Jan23 {} {}", strike, side.tag()),
        strike,
        side,
        oi,
        ltp,
        volume,
    }
}

fn test_cfg() -> MonitorConfig {
    MonitorConfig {
        watch_threshold_pct: 70.0,
        exec_threshold_pct: 200.0,
        ..MonitorConfig::default()
    }
}

fn at(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
    IST.with_ymd_and_hms(2026, 1, day, hour, minute, 0).unwrap()
}

/// Expiry three days past Jan 20: mid-cycle thresholds apply.
fn mid_cycle_feed(spot: f64) -> StubFeed {
    let epoch = IST
        .with_ymd_and_hms(2026, 1, 23, 15, 30, 0)
        .unwrap()
        .timestamp();
    StubFeed::new(spot, epoch, "23-01-2026")
}

fn call_key() -> ContractKey {
    ContractKey::new(OptionSide::Call, 48_500)
}

fn put_key() -> ContractKey {
    ContractKey::new(OptionSide::Put, 48_500)
}

#[tokio::test]
async fn test_lifecycle_none_watch_executed_across_scans() {
    setup_test_logging();
    let cfg = test_cfg();
    let store = MemoryStore::new();
    let notifier = TelegramNotifier::new(&cfg, true);
    let score_log = ScoreLog::disabled();
    let feed = mid_cycle_feed(48_500.0);

    // Scan 1: baselines captured, nothing to alert on yet.
    feed.set_chain(vec![
        quote(OptionSide::Call, 48_500, 2000, 150.0, 10_000),
        quote(OptionSide::Put, 48_500, 8000, 120.0, 12_000),
    ]);
    let summary = run_scan_at(&cfg, &feed, &store, &notifier, &score_log, at(20, 11, 0))
        .await
        .unwrap();
    assert_eq!(summary.contracts_scanned, 2);
    assert_eq!(summary.watch_alerts_sent, 0);
    assert_eq!(summary.signals_sent, 0);

    let session = store.load("2026-01-20").unwrap();
    assert!(session.started);
    assert_eq!(session.day_open_price, Some(48_500.0));
    assert_eq!(session.contracts[&call_key()].baseline_oi, 2000);

    // Scan 2: +200% OI crosses both thresholds, but the spot has barely
    // moved, so the contract stops in WATCH.
    feed.set_spot(48_440.0);
    feed.set_chain(vec![
        quote(OptionSide::Call, 48_500, 6000, 150.0, 10_000),
        quote(OptionSide::Put, 48_500, 8000, 120.0, 12_000),
    ]);
    let summary = run_scan_at(&cfg, &feed, &store, &notifier, &score_log, at(20, 11, 5))
        .await
        .unwrap();
    assert_eq!(summary.watch_alerts_sent, 1);
    assert_eq!(summary.signals_sent, 0);

    let session = store.load("2026-01-20").unwrap();
    assert_eq!(
        session.contracts[&call_key()].lifecycle_state,
        LifecycleState::Watch
    );
    assert_eq!(session.contracts[&call_key()].threshold_scan_count, 1);
    // Baselines are immutable after first sight.
    assert_eq!(session.contracts[&call_key()].baseline_oi, 2000);
    // Day open is immutable after the first fetch.
    assert_eq!(session.day_open_price, Some(48_500.0));

    // Scan 3: spot falls 0.62%, volume expands, the put side covers
    // scan-to-scan. All gates pass and the signal goes out.
    feed.set_spot(48_200.0);
    feed.set_chain(vec![
        quote(OptionSide::Call, 48_500, 6200, 148.0, 14_000),
        quote(OptionSide::Put, 48_500, 7500, 120.0, 12_000),
    ]);
    let summary = run_scan_at(&cfg, &feed, &store, &notifier, &score_log, at(20, 11, 10))
        .await
        .unwrap();
    assert_eq!(summary.signals_sent, 1);

    let session = store.load("2026-01-20").unwrap();
    assert_eq!(
        session.contracts[&call_key()].lifecycle_state,
        LifecycleState::Executed
    );
    assert_eq!(session.contracts[&put_key()].decline_streak, 1);
    assert_eq!(session.signals_sent_today, 1);
    assert_eq!(session.accepted_signals.len(), 1);
    assert_eq!(session.accepted_signals[0].key, call_key());
    assert_eq!(session.contracts[&call_key()].baseline_oi, 2000);

    // Scan 4: EXECUTED is terminal for the day.
    feed.set_chain(vec![
        quote(OptionSide::Call, 48_500, 7000, 148.0, 15_000),
        quote(OptionSide::Put, 48_500, 7000, 120.0, 12_000),
    ]);
    let summary = run_scan_at(&cfg, &feed, &store, &notifier, &score_log, at(20, 11, 15))
        .await
        .unwrap();
    assert_eq!(summary.signals_sent, 0);
    assert_eq!(summary.watch_alerts_sent, 0);
}

#[tokio::test]
async fn test_day_reset_clears_state_but_same_day_reload_is_idempotent() {
    setup_test_logging();
    let cfg = test_cfg();
    let store = MemoryStore::new();
    let notifier = TelegramNotifier::new(&cfg, true);
    let score_log = ScoreLog::disabled();
    let feed = mid_cycle_feed(48_500.0);

    feed.set_chain(vec![quote(OptionSide::Call, 48_500, 2000, 150.0, 10_000)]);
    run_scan_at(&cfg, &feed, &store, &notifier, &score_log, at(20, 11, 0))
        .await
        .unwrap();

    // Same-day reloads keep everything.
    let first = store.load("2026-01-20").unwrap();
    let second = store.load("2026-01-20").unwrap();
    assert_eq!(first.contracts.len(), second.contracts.len());
    assert_eq!(first.last_updated, second.last_updated);
    assert!(second.started);

    // Next trading day: contracts and counters reset, baselines re-captured
    // from the new day's first scan.
    feed.set_spot(48_800.0);
    feed.set_chain(vec![quote(OptionSide::Call, 48_800, 5000, 180.0, 9000)]);
    run_scan_at(&cfg, &feed, &store, &notifier, &score_log, at(21, 9, 30))
        .await
        .unwrap();

    let session = store.load("2026-01-21").unwrap();
    assert_eq!(session.trading_date, "2026-01-21");
    assert_eq!(session.day_open_price, Some(48_800.0));
    assert_eq!(session.signals_sent_today, 0);
    assert_eq!(session.contracts.len(), 1);
    let st = &session.contracts[&ContractKey::new(OptionSide::Call, 48_800)];
    assert_eq!(st.baseline_oi, 5000);
    assert_eq!(st.lifecycle_state, LifecycleState::None);
}

#[tokio::test]
async fn test_aborted_spot_fetch_leaves_store_untouched() {
    setup_test_logging();
    let cfg = test_cfg();
    let store = MemoryStore::new();
    let notifier = TelegramNotifier::new(&cfg, true);
    let score_log = ScoreLog::disabled();
    let feed = mid_cycle_feed(48_500.0);

    feed.set_chain(vec![quote(OptionSide::Call, 48_500, 2000, 150.0, 10_000)]);
    run_scan_at(&cfg, &feed, &store, &notifier, &score_log, at(20, 11, 0))
        .await
        .unwrap();
    let before = store.load("2026-01-20").unwrap();

    feed.fail_spot.store(true, Ordering::SeqCst);
    feed.set_chain(vec![quote(OptionSide::Call, 48_500, 9000, 150.0, 30_000)]);
    let result = run_scan_at(&cfg, &feed, &store, &notifier, &score_log, at(20, 11, 5)).await;
    assert!(result.is_err());

    let after = store.load("2026-01-20").unwrap();
    assert_eq!(after.last_updated, before.last_updated);
    assert_eq!(
        after.contracts[&call_key()].previous_oi,
        before.contracts[&call_key()].previous_oi
    );
    assert_eq!(
        after.contracts[&call_key()].lifecycle_state,
        LifecycleState::None
    );
}

#[tokio::test]
async fn test_conflicted_strike_suppresses_both_sides() {
    setup_test_logging();
    let cfg = test_cfg(); // conflict threshold = 200 * 0.6 = 120%
    let store = MemoryStore::new();
    let notifier = TelegramNotifier::new(&cfg, true);
    let score_log = ScoreLog::disabled();
    let feed = mid_cycle_feed(48_500.0);

    feed.set_chain(vec![
        quote(OptionSide::Call, 48_500, 2000, 150.0, 10_000),
        quote(OptionSide::Put, 48_500, 2000, 120.0, 10_000),
    ]);
    run_scan_at(&cfg, &feed, &store, &notifier, &score_log, at(20, 11, 0))
        .await
        .unwrap();

    // Both sides surge past every OI threshold: the strike is a tug-of-war,
    // so watch alerts are suppressed and no execution can fire, on either
    // side, no matter how good the other gates look.
    feed.set_spot(48_200.0);
    feed.set_chain(vec![
        quote(OptionSide::Call, 48_500, 12_000, 148.0, 20_000),
        quote(OptionSide::Put, 48_500, 12_000, 118.0, 20_000),
    ]);
    let summary = run_scan_at(&cfg, &feed, &store, &notifier, &score_log, at(20, 11, 5))
        .await
        .unwrap();
    assert_eq!(summary.watch_alerts_sent, 0);
    assert_eq!(summary.watch_suppressed, 2);
    assert_eq!(summary.signals_sent, 0);

    // The state advance itself is not blocked by the suppression.
    let session = store.load("2026-01-20").unwrap();
    assert_eq!(
        session.contracts[&call_key()].lifecycle_state,
        LifecycleState::Watch
    );
    assert_eq!(
        session.contracts[&put_key()].lifecycle_state,
        LifecycleState::Watch
    );

    feed.set_chain(vec![
        quote(OptionSide::Call, 48_500, 20_000, 148.0, 30_000),
        quote(OptionSide::Put, 48_500, 20_000, 118.0, 30_000),
    ]);
    let summary = run_scan_at(&cfg, &feed, &store, &notifier, &score_log, at(20, 11, 10))
        .await
        .unwrap();
    assert_eq!(summary.signals_sent, 0);
}

#[tokio::test]
async fn test_market_closed_skips_scan() {
    setup_test_logging();
    let cfg = test_cfg();
    let store = MemoryStore::new();
    let notifier = TelegramNotifier::new(&cfg, true);
    let score_log = ScoreLog::disabled();
    let feed = mid_cycle_feed(48_500.0);
    feed.set_chain(vec![quote(OptionSide::Call, 48_500, 2000, 150.0, 10_000)]);

    let summary = run_scan_at(&cfg, &feed, &store, &notifier, &score_log, at(20, 8, 0))
        .await
        .unwrap();
    assert!(summary.skipped_market_closed);
    assert_eq!(summary.contracts_scanned, 0);
}
