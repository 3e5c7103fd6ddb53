// src/main.rs
use clap::Parser;
use dotenv::dotenv;
use log::{error, info};
use std::time::Duration;

use oi_monitor::baseline_store::JsonFileStore;
use oi_monitor::config::MonitorConfig;
use oi_monitor::market_feed::FyersFeed;
use oi_monitor::scan::run_scan;
use oi_monitor::score_log::ScoreLog;
use oi_monitor::telegram_notifier::TelegramNotifier;

/// BankNifty option OI buildup monitor. One scan per invocation by default;
/// scheduling is left to cron unless --interval-secs is given.
#[derive(Parser, Debug)]
#[command(name = "oi_monitor", version, about)]
struct Args {
    /// Keep scanning on this interval instead of exiting after one pass
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Render alerts to the log instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// Send a Telegram test message and exit
    #[arg(long)]
    test_telegram: bool,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("oi_monitor=info,info"));

    let args = Args::parse();
    let cfg = MonitorConfig::from_env();
    cfg.log_current_settings();

    let notifier = TelegramNotifier::new(&cfg, args.dry_run);

    if args.test_telegram {
        match notifier.send_test_message().await {
            Ok(()) => info!("📱 Test message sent"),
            Err(e) => error!("📱 Test message failed: {}", e),
        }
        return;
    }

    let store = JsonFileStore::new(&cfg.baseline_file);
    let feed = FyersFeed::new(&cfg);
    let score_log = ScoreLog::new(cfg.score_log_file.as_deref());

    loop {
        // Any scan failure is reported and swallowed: the next scheduled
        // invocation must always get its chance.
        match run_scan(&cfg, &feed, &store, &notifier, &score_log).await {
            Ok(summary) if summary.skipped_market_closed || summary.skipped_no_chain => {}
            Ok(summary) => {
                info!(
                    "📋 [MAIN] Scan complete: {} contracts, {} signals",
                    summary.contracts_scanned, summary.signals_sent
                );
            }
            Err(e) => {
                error!("💥 [MAIN] Scan aborted: {}", e);
                if let Err(send_err) = notifier.send_failure_notice(&e.to_string()).await {
                    error!("📱 [MAIN] Failure notice not delivered: {}", send_err);
                }
            }
        }

        match args.interval_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => break,
        }
    }
}
