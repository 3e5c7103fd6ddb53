// src/baseline_store.rs
// Per-trading-day durable state: contract baselines, lifecycle states and
// day-level counters, persisted as one JSON document.

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::errors::MonitorError;
use crate::scorer::SignalTier;
use crate::types::{ContractKey, LifecycleState, OptionQuote};

/// Per-contract tracking state. Baselines are captured on first observation
/// of the day and never move afterwards.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ContractState {
    pub baseline_oi: i64,
    pub baseline_premium: f64,
    pub baseline_volume: i64,
    pub previous_oi: i64,
    pub lifecycle_state: LifecycleState,
    pub threshold_cross_time: Option<String>,
    pub threshold_scan_count: u32,
    pub decline_streak: u32,
}

impl ContractState {
    pub fn new(oi: i64, ltp: f64, volume: i64) -> Self {
        Self {
            baseline_oi: oi,
            baseline_premium: ltp,
            baseline_volume: volume,
            previous_oi: oi,
            lifecycle_state: LifecycleState::None,
            threshold_cross_time: None,
            threshold_scan_count: 0,
            decline_streak: 0,
        }
    }

    pub fn oi_pct(&self, current_oi: i64) -> f64 {
        (current_oi - self.baseline_oi) as f64 / self.baseline_oi as f64 * 100.0
    }
}

/// An execution signal accepted into today's budget.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AcceptedSignal {
    pub key: ContractKey,
    pub score: i32,
    pub tier: SignalTier,
    pub accepted_at: String,
}

/// The sole unit of durable state: one record per trading day.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DaySession {
    pub trading_date: String,
    pub started: bool,
    pub day_open_price: Option<f64>,
    pub signals_sent_today: u32,
    pub watch_alerts_sent_today: u32,
    pub accepted_signals: Vec<AcceptedSignal>,
    pub contracts: HashMap<ContractKey, ContractState>,
    pub last_updated: String,
}

impl DaySession {
    pub fn new(trading_date: &str) -> Self {
        Self {
            trading_date: trading_date.to_string(),
            started: false,
            day_open_price: None,
            signals_sent_today: 0,
            watch_alerts_sent_today: 0,
            accepted_signals: Vec::new(),
            contracts: HashMap::new(),
            last_updated: Utc::now().to_rfc3339(),
        }
    }

    /// End-of-scan bookkeeping: remember every tracked contract's current OI
    /// so the next scan's covering check compares scan-to-scan, not against
    /// the fixed baseline. Runs for all lifecycle states.
    pub fn refresh_previous_oi(&mut self, quotes: &[OptionQuote]) {
        for quote in quotes {
            if let Some(state) = self.contracts.get_mut(&quote.key()) {
                state.previous_oi = quote.oi;
            }
        }
    }

    /// Resolve a loaded record against today's date: same day passes through
    /// untouched (idempotent reload), a stale date starts a fresh session.
    pub fn for_today(loaded: Option<DaySession>, today: &str) -> DaySession {
        match loaded {
            Some(session) if session.trading_date == today => session,
            Some(session) => {
                info!(
                    "🔄 [STORE] New trading day {} (was {}) - baseline reset",
                    today, session.trading_date
                );
                DaySession::new(today)
            }
            None => {
                info!("🆕 [STORE] Starting fresh session for {}", today);
                DaySession::new(today)
            }
        }
    }
}

/// Swappable persistence seam: one load at scan start, one save at scan end.
pub trait BaselineStore {
    fn load(&self, today: &str) -> Result<DaySession, MonitorError>;
    fn save(&self, session: &DaySession) -> Result<(), MonitorError>;
}

/// Production store: one pretty-printed JSON document on disk. A corrupted
/// document falls back to a fresh session so a bad write never wedges the
/// monitor; the save path goes through a temp file and rename.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl BaselineStore for JsonFileStore {
    fn load(&self, today: &str) -> Result<DaySession, MonitorError> {
        if !self.path.exists() {
            return Ok(DaySession::for_today(None, today));
        }

        let content = fs::read_to_string(&self.path)?;
        match serde_json::from_str::<DaySession>(&content) {
            Ok(session) => {
                debug!(
                    "📂 [STORE] Loaded {} tracked contracts from {:?}",
                    session.contracts.len(),
                    self.path
                );
                Ok(DaySession::for_today(Some(session), today))
            }
            Err(e) => {
                warn!(
                    "⚠️ [STORE] Corrupted baseline file {:?} ({}) - starting fresh",
                    self.path, e
                );
                Ok(DaySession::for_today(None, today))
            }
        }
    }

    fn save(&self, session: &DaySession) -> Result<(), MonitorError> {
        let content = serde_json::to_string_pretty(session)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        debug!(
            "💾 [STORE] Saved {} tracked contracts to {:?}",
            session.contracts.len(),
            self.path
        );
        Ok(())
    }
}

/// In-process store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Option<DaySession>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BaselineStore for MemoryStore {
    fn load(&self, today: &str) -> Result<DaySession, MonitorError> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| MonitorError::Store("memory store poisoned".to_string()))?;
        Ok(DaySession::for_today(guard.clone(), today))
    }

    fn save(&self, session: &DaySession) -> Result<(), MonitorError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| MonitorError::Store("memory store poisoned".to_string()))?;
        *guard = Some(session.clone());
        Ok(())
    }
}
