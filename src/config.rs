// src/config.rs - Monitor thresholds and tunables, built once from the environment
use chrono::NaiveTime;
use log::info;
use std::env;

use crate::types::parse_hhmm;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    // OI buildup thresholds
    pub watch_threshold_pct: f64,
    pub exec_threshold_pct: f64,
    pub min_base_oi: i64,
    pub strike_range_points: u32,
    pub strike_step: u32,
    pub max_atm_distance: u32,
    pub premium_rise_tolerance_pct: f64,
    pub volume_multiplier: f64,
    pub min_covering_decline_pct: f64,
    pub conflict_fraction: f64,

    // Daily budgets
    pub max_signals_per_day: usize,
    pub improvement_margin: i32,
    pub max_watch_alerts_per_day: u32,

    // Session windows (IST)
    pub entry_time: NaiveTime,
    pub market_open: NaiveTime,
    pub market_close: NaiveTime,
    pub check_market_hours: bool,

    // Spot-move and expiry-phase thresholds
    pub min_spot_move_pct: f64,
    pub edge_spot_move_bump_pct: f64,
    pub dte_near: i64,
    pub dte_far: i64,
    pub min_score_near: i32,
    pub min_score_mid: i32,
    pub min_score_far: i32,

    // Conviction tier cut points
    pub tier_very_high: i32,
    pub tier_high: i32,
    pub tier_medium: i32,

    // Data feed
    pub fetch_retries: u32,
    pub fetch_backoff_secs: u64,
    pub fyers_base_url: String,
    pub fyers_access_token: Option<String>,
    pub spot_symbol: String,
    pub chain_symbol: String,
    pub chain_strike_count: u32,

    // Files
    pub baseline_file: String,
    pub score_log_file: Option<String>,

    // Telegram
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            watch_threshold_pct: 300.0,
            exec_threshold_pct: 500.0,
            min_base_oi: 1000,
            strike_range_points: 300,
            strike_step: 100,
            max_atm_distance: 300,
            premium_rise_tolerance_pct: 5.0,
            volume_multiplier: 1.3,
            min_covering_decline_pct: 3.0,
            conflict_fraction: 0.6,
            max_signals_per_day: 3,
            improvement_margin: 15,
            max_watch_alerts_per_day: 10,
            entry_time: NaiveTime::from_hms_opt(9, 30, 0).expect("valid entry time"),
            market_open: NaiveTime::from_hms_opt(9, 15, 0).expect("valid open time"),
            market_close: NaiveTime::from_hms_opt(15, 30, 0).expect("valid close time"),
            check_market_hours: true,
            min_spot_move_pct: 0.25,
            edge_spot_move_bump_pct: 0.15,
            dte_near: 1,
            dte_far: 6,
            min_score_near: 110,
            min_score_mid: 90,
            min_score_far: 105,
            tier_very_high: 120,
            tier_high: 90,
            tier_medium: 60,
            fetch_retries: 3,
            fetch_backoff_secs: 2,
            fyers_base_url: "https://api-t1.fyers.in".to_string(),
            fyers_access_token: None,
            spot_symbol: "NSE:NIFTYBANK-INDEX".to_string(),
            chain_symbol: "NSE:BANKNIFTY".to_string(),
            chain_strike_count: 40,
            baseline_file: "bn_baseline_oi.json".to_string(),
            score_log_file: Some("score_log.jsonl".to_string()),
            telegram_bot_token: None,
            telegram_chat_id: None,
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(default)
}

fn env_i32(key: &str, default: i32) -> i32 {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<i32>().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|s| s.trim().to_lowercase() == "true")
        .unwrap_or(default)
}

fn env_time(key: &str, default: NaiveTime) -> NaiveTime {
    env::var(key)
        .ok()
        .and_then(|s| parse_hhmm(&s))
        .unwrap_or(default)
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        let d = Self::default();

        Self {
            watch_threshold_pct: env_f64("OI_WATCH_THRESHOLD", d.watch_threshold_pct),
            exec_threshold_pct: env_f64("OI_EXEC_THRESHOLD", d.exec_threshold_pct),
            min_base_oi: env_i64("MIN_BASE_OI", d.min_base_oi),
            strike_range_points: env_u32("STRIKE_RANGE_POINTS", d.strike_range_points),
            strike_step: env_u32("STRIKE_STEP", d.strike_step),
            max_atm_distance: env_u32("MAX_ATM_DISTANCE", d.max_atm_distance),
            premium_rise_tolerance_pct: env_f64(
                "PREMIUM_RISE_TOLERANCE_PCT",
                d.premium_rise_tolerance_pct,
            ),
            volume_multiplier: env_f64("VOLUME_MULTIPLIER", d.volume_multiplier),
            min_covering_decline_pct: env_f64(
                "MIN_COVERING_DECLINE_PCT",
                d.min_covering_decline_pct,
            ),
            conflict_fraction: env_f64("CONFLICT_FRACTION", d.conflict_fraction),
            max_signals_per_day: env_u32("MAX_SIGNALS_PER_DAY", d.max_signals_per_day as u32)
                as usize,
            improvement_margin: env_i32("IMPROVEMENT_MARGIN", d.improvement_margin),
            max_watch_alerts_per_day: env_u32(
                "MAX_WATCH_ALERTS_PER_DAY",
                d.max_watch_alerts_per_day,
            ),
            entry_time: env_time("ENTRY_TIME", d.entry_time),
            market_open: env_time("MARKET_OPEN", d.market_open),
            market_close: env_time("MARKET_CLOSE", d.market_close),
            check_market_hours: env_bool("CHECK_MARKET_HOURS", d.check_market_hours),
            min_spot_move_pct: env_f64("MIN_SPOT_MOVE_PCT", d.min_spot_move_pct),
            edge_spot_move_bump_pct: env_f64(
                "EDGE_SPOT_MOVE_BUMP_PCT",
                d.edge_spot_move_bump_pct,
            ),
            dte_near: env_i64("DTE_NEAR", d.dte_near),
            dte_far: env_i64("DTE_FAR", d.dte_far),
            min_score_near: env_i32("MIN_SCORE_NEAR", d.min_score_near),
            min_score_mid: env_i32("MIN_SCORE_MID", d.min_score_mid),
            min_score_far: env_i32("MIN_SCORE_FAR", d.min_score_far),
            tier_very_high: env_i32("TIER_VERY_HIGH", d.tier_very_high),
            tier_high: env_i32("TIER_HIGH", d.tier_high),
            tier_medium: env_i32("TIER_MEDIUM", d.tier_medium),
            fetch_retries: env_u32("FETCH_RETRIES", d.fetch_retries),
            fetch_backoff_secs: env_u32("FETCH_BACKOFF_SECS", d.fetch_backoff_secs as u32) as u64,
            fyers_base_url: env::var("FYERS_BASE_URL").unwrap_or(d.fyers_base_url),
            fyers_access_token: env::var("FYERS_ACCESS_TOKEN").ok(),
            spot_symbol: env::var("SPOT_SYMBOL").unwrap_or(d.spot_symbol),
            chain_symbol: env::var("CHAIN_SYMBOL").unwrap_or(d.chain_symbol),
            chain_strike_count: env_u32("CHAIN_STRIKE_COUNT", d.chain_strike_count),
            baseline_file: env::var("BASELINE_FILE").unwrap_or(d.baseline_file),
            score_log_file: match env::var("SCORE_LOG_FILE") {
                Ok(s) if s.trim().is_empty() => None,
                Ok(s) => Some(s),
                Err(_) => d.score_log_file,
            },
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_chat_id: env::var("TELEGRAM_CHAT_ID").ok(),
        }
    }

    pub fn log_current_settings(&self) {
        info!("🔧 [CONFIG] OI thresholds: watch {}% / exec {}%", self.watch_threshold_pct, self.exec_threshold_pct);
        info!("🔧 [CONFIG]   Min base OI: {}", self.min_base_oi);
        info!("🔧 [CONFIG]   Strike range: ±{} pts (step {}, max ATM distance {})", self.strike_range_points, self.strike_step, self.max_atm_distance);
        info!("🔧 [CONFIG]   Premium tolerance: {}% | Volume multiplier: {}x", self.premium_rise_tolerance_pct, self.volume_multiplier);
        info!("🔧 [CONFIG]   Covering decline: {}% | Conflict fraction: {}", self.min_covering_decline_pct, self.conflict_fraction);
        info!("🔧 [CONFIG]   Daily budgets: {} signals (margin {}), {} watch alerts", self.max_signals_per_day, self.improvement_margin, self.max_watch_alerts_per_day);
        info!("🔧 [CONFIG]   Session: {} - {} (entry {}), market hours check: {}", self.market_open, self.market_close, self.entry_time, self.check_market_hours);
        info!("🔧 [CONFIG]   Spot move: {}% (+{}% near/far expiry) | DTE bands: <={} / >={}", self.min_spot_move_pct, self.edge_spot_move_bump_pct, self.dte_near, self.dte_far);
        info!("🔧 [CONFIG]   Min scores near/mid/far: {}/{}/{}", self.min_score_near, self.min_score_mid, self.min_score_far);
        info!("🔧 [CONFIG]   Tiers: >={} very high, >={} high, >={} medium", self.tier_very_high, self.tier_high, self.tier_medium);
        info!("🔧 [CONFIG]   Fetch: {} retries, {}s backoff | Baseline file: {}", self.fetch_retries, self.fetch_backoff_secs, self.baseline_file);
    }

    /// Minimum conviction score a candidate must reach, by days to expiry.
    /// Strict close to expiry and far from it, looser in the mid-cycle window.
    pub fn min_score_for_dte(&self, days_to_expiry: i64) -> i32 {
        if days_to_expiry <= self.dte_near {
            self.min_score_near
        } else if days_to_expiry >= self.dte_far {
            self.min_score_far
        } else {
            self.min_score_mid
        }
    }

    /// Required intraday spot move, by days to expiry.
    pub fn min_spot_move_for_dte(&self, days_to_expiry: i64) -> f64 {
        if days_to_expiry <= self.dte_near || days_to_expiry >= self.dte_far {
            self.min_spot_move_pct + self.edge_spot_move_bump_pct
        } else {
            self.min_spot_move_pct
        }
    }

    /// Both-sides buildup above this level marks a strike as conflicted.
    pub fn conflict_threshold_pct(&self) -> f64 {
        self.exec_threshold_pct * self.conflict_fraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_phase_thresholds() {
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.min_score_for_dte(0), 110);
        assert_eq!(cfg.min_score_for_dte(1), 110);
        assert_eq!(cfg.min_score_for_dte(3), 90);
        assert_eq!(cfg.min_score_for_dte(6), 105);
        assert_eq!(cfg.min_score_for_dte(20), 105);

        assert!((cfg.min_spot_move_for_dte(1) - 0.40).abs() < 1e-9);
        assert!((cfg.min_spot_move_for_dte(3) - 0.25).abs() < 1e-9);
        assert!((cfg.min_spot_move_for_dte(10) - 0.40).abs() < 1e-9);
    }

    #[test]
    fn test_conflict_threshold_derived_from_exec() {
        let cfg = MonitorConfig::default();
        assert!((cfg.conflict_threshold_pct() - 300.0).abs() < 1e-9);
    }
}
