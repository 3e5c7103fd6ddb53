// src/cross_side.rs
// Per-strike cross-side analysis computed once per scan, ahead of the
// per-contract lifecycle pass: OI% change per side, conflicted strikes,
// scan-to-scan covering and adjacent-strike corroboration.

use log::debug;
use std::collections::{HashMap, HashSet};

use crate::baseline_store::DaySession;
use crate::config::MonitorConfig;
use crate::types::{ContractKey, OptionQuote};

pub struct CrossSideTable {
    /// OI% change vs own baseline, only for sides whose baseline clears the
    /// floor.
    changes: HashMap<ContractKey, f64>,
    /// Current-scan OI per contract, for scan-to-scan covering checks.
    current_oi: HashMap<ContractKey, i64>,
    conflicted: HashSet<u32>,
}

impl CrossSideTable {
    pub fn build(quotes: &[OptionQuote], session: &DaySession, cfg: &MonitorConfig) -> Self {
        let mut changes: HashMap<ContractKey, f64> = HashMap::new();
        let mut current_oi: HashMap<ContractKey, i64> = HashMap::new();

        for quote in quotes {
            let key = quote.key();
            current_oi.insert(key, quote.oi);
            if let Some(state) = session.contracts.get(&key) {
                if state.baseline_oi >= cfg.min_base_oi {
                    changes.insert(key, state.oi_pct(quote.oi));
                }
            }
        }

        let conflict_threshold = cfg.conflict_threshold_pct();
        let mut conflicted = HashSet::new();
        for (key, pct) in &changes {
            if *pct <= conflict_threshold {
                continue;
            }
            if let Some(opp_pct) = changes.get(&key.opposite()) {
                if *opp_pct > conflict_threshold {
                    conflicted.insert(key.strike);
                }
            }
        }
        for strike in &conflicted {
            debug!(
                "⚔️ [CROSS_SIDE] Strike {} conflicted - both sides above {:.0}%",
                strike, conflict_threshold
            );
        }

        Self {
            changes,
            current_oi,
            conflicted,
        }
    }

    pub fn oi_change(&self, key: &ContractKey) -> Option<f64> {
        self.changes.get(key).copied()
    }

    pub fn is_conflicted(&self, strike: u32) -> bool {
        self.conflicted.contains(&strike)
    }

    /// Scan-to-scan OI decline of `key` as a positive percentage of its own
    /// previous-scan OI. None when the contract is missing from the current
    /// snapshot or has no tracked previous value.
    pub fn decline_pct_vs_previous(&self, key: &ContractKey, session: &DaySession) -> Option<f64> {
        let current = *self.current_oi.get(key)?;
        let previous = session.contracts.get(key)?.previous_oi;
        if previous <= 0 {
            return None;
        }
        Some((previous - current) as f64 / previous as f64 * 100.0)
    }

    /// Count of neighbor strikes (one or two steps away) corroborating a
    /// buildup at `key`: same side also building, or opposite side declining
    /// against its baseline.
    pub fn cluster_confirmations(&self, key: &ContractKey, cfg: &MonitorConfig) -> u32 {
        let mut confirmations = 0;
        for offset in [-2i64, -1, 1, 2] {
            let neighbor_strike = key.strike as i64 + offset * cfg.strike_step as i64;
            if neighbor_strike <= 0 {
                continue;
            }
            let neighbor_strike = neighbor_strike as u32;

            let same_side = ContractKey::new(key.side, neighbor_strike);
            let building = self
                .changes
                .get(&same_side)
                .map(|pct| *pct >= cfg.watch_threshold_pct)
                .unwrap_or(false);

            let opp_side = ContractKey::new(key.side.opposite(), neighbor_strike);
            let unwinding = self
                .changes
                .get(&opp_side)
                .map(|pct| *pct <= -cfg.min_covering_decline_pct)
                .unwrap_or(false);

            if building || unwinding {
                confirmations += 1;
            }
        }
        confirmations
    }
}
