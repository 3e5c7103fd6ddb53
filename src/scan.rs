// src/scan.rs
// One full polling pass: fetch, analyze, detect, score, select, dispatch,
// write back. Aborting anywhere before the final save leaves the persisted
// session untouched.

use chrono::{DateTime, FixedOffset};
use log::{info, warn};

use crate::baseline_store::BaselineStore;
use crate::config::MonitorConfig;
use crate::cross_side::CrossSideTable;
use crate::detector::{BuildupDetector, DetectorEvent, ScanContext};
use crate::errors::MonitorError;
use crate::market_feed::SnapshotSource;
use crate::score_log::{ScoreLog, ScoreOutcome};
use crate::selector::SignalSelector;
use crate::telegram_notifier::TelegramNotifier;
use crate::types::{atm_strike, nearest_expiry, now_ist, trade_suggestion};

#[derive(Debug, Default, Clone)]
pub struct ScanSummary {
    pub skipped_market_closed: bool,
    pub skipped_no_chain: bool,
    pub contracts_scanned: usize,
    pub watch_alerts_sent: u32,
    pub watch_suppressed: u32,
    pub signals_sent: u32,
    pub score_rejections: u32,
}

pub async fn run_scan<S: SnapshotSource>(
    cfg: &MonitorConfig,
    source: &S,
    store: &dyn BaselineStore,
    notifier: &TelegramNotifier,
    score_log: &ScoreLog,
) -> Result<ScanSummary, MonitorError> {
    run_scan_at(cfg, source, store, notifier, score_log, now_ist()).await
}

/// The scan body with an explicit clock, so gated time logic is testable.
pub async fn run_scan_at<S: SnapshotSource>(
    cfg: &MonitorConfig,
    source: &S,
    store: &dyn BaselineStore,
    notifier: &TelegramNotifier,
    score_log: &ScoreLog,
    now: DateTime<FixedOffset>,
) -> Result<ScanSummary, MonitorError> {
    info!("▶ [SCAN] BankNifty OI scan started at {}", now.format("%H:%M:%S"));
    let mut summary = ScanSummary::default();

    let t = now.time();
    if cfg.check_market_hours && (t < cfg.market_open || t > cfg.market_close) {
        info!("⏱ [SCAN] Market closed ({} - {})", cfg.market_open, cfg.market_close);
        summary.skipped_market_closed = true;
        return Ok(summary);
    }

    let today = now.format("%Y-%m-%d").to_string();
    let mut session = store.load(&today)?;

    let spot = source.fetch_spot().await?;
    if session.day_open_price.is_none() {
        info!("🌅 [SCAN] Day open captured: {:.2}", spot);
        session.day_open_price = Some(spot);
    }
    let day_open = session.day_open_price.unwrap_or(spot);
    let spot_move_pct = if day_open > 0.0 {
        (spot - day_open) / day_open * 100.0
    } else {
        0.0
    };
    let atm = atm_strike(spot, cfg.strike_step);

    let expiries = source.fetch_expiries().await?;
    let Some((days_to_expiry, expiry)) = nearest_expiry(&expiries, now) else {
        return Err(MonitorError::Feed("no usable expiry in feed".to_string()));
    };

    let raw_quotes = source.fetch_option_chain().await?;
    if raw_quotes.is_empty() {
        info!("⏱ [SCAN] Skipping scan - option chain not available");
        summary.skipped_no_chain = true;
        return Ok(summary);
    }

    let low = atm.saturating_sub(cfg.strike_range_points);
    let high = atm + cfg.strike_range_points;
    let quotes: Vec<_> = raw_quotes
        .into_iter()
        .filter(|q| q.strike >= low && q.strike <= high)
        .collect();
    summary.contracts_scanned = quotes.len();
    info!(
        "📊 [SCAN] Spot {:.0} ({:+.2}% today), ATM {}, {} contracts in range, expiry {} ({}d)",
        spot, spot_move_pct, atm, quotes.len(), expiry.label, days_to_expiry
    );

    let ctx = ScanContext {
        now,
        spot,
        atm,
        spot_move_pct,
        days_to_expiry,
        expiry_label: expiry.label.clone(),
    };

    let table = CrossSideTable::build(&quotes, &session, cfg);
    let detector = BuildupDetector::new(cfg);
    let selector = SignalSelector::new(cfg);

    for quote in &quotes {
        for event in detector.evaluate(&mut session, &table, quote, &ctx) {
            match event {
                DetectorEvent::Watch {
                    key,
                    oi_pct,
                    suppressed: None,
                } => {
                    if let Err(e) = notifier.send_watch_alert(&key, oi_pct, spot).await {
                        warn!("📱 [SCAN] Watch alert for {} failed: {}", key, e);
                    }
                    session.watch_alerts_sent_today += 1;
                    summary.watch_alerts_sent += 1;
                }
                DetectorEvent::Watch {
                    suppressed: Some(_),
                    ..
                } => {
                    summary.watch_suppressed += 1;
                }
                DetectorEvent::Execution(candidate) => {
                    match selector.offer(&mut session, candidate.key, &candidate.breakdown, now) {
                        Ok(_) => {
                            let suggestion = trade_suggestion(
                                atm,
                                candidate.key.side,
                                candidate.key.strike,
                                cfg.strike_step,
                            );
                            if let Err(e) =
                                notifier.send_execution_alert(&candidate, suggestion, &ctx).await
                            {
                                warn!(
                                    "📱 [SCAN] Execution alert for {} failed: {}",
                                    candidate.key, e
                                );
                            }
                            score_log.record(
                                now,
                                &candidate.key,
                                ScoreOutcome::Sent,
                                None,
                                &candidate.breakdown,
                                spot,
                                spot_move_pct,
                                days_to_expiry,
                            );
                            summary.signals_sent += 1;
                        }
                        Err(reason) => {
                            info!(
                                "🚫 [SCAN] Signal {} not dispatched: {}",
                                candidate.key, reason
                            );
                            score_log.record(
                                now,
                                &candidate.key,
                                ScoreOutcome::RejectedBySelector,
                                Some(&reason),
                                &candidate.breakdown,
                                spot,
                                spot_move_pct,
                                days_to_expiry,
                            );
                        }
                    }
                }
                DetectorEvent::ScoreRejected {
                    key,
                    reason,
                    breakdown,
                } => {
                    score_log.record(
                        now,
                        &key,
                        ScoreOutcome::RejectedByScore,
                        Some(&reason),
                        &breakdown,
                        spot,
                        spot_move_pct,
                        days_to_expiry,
                    );
                    summary.score_rejections += 1;
                }
            }
        }
    }

    if !session.started {
        if let Err(e) = notifier.send_startup_message(spot, atm).await {
            warn!("📱 [SCAN] Startup message failed: {}", e);
        }
        session.started = true;
    }

    session.refresh_previous_oi(&quotes);
    session.last_updated = now.to_rfc3339();
    store.save(&session)?;

    info!(
        "✔ [SCAN] Done: {} contracts, {} watch alerts ({} suppressed), {} signals sent",
        summary.contracts_scanned,
        summary.watch_alerts_sent,
        summary.watch_suppressed,
        summary.signals_sent
    );
    Ok(summary)
}
