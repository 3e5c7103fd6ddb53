// src/detector.rs - Per-contract buildup lifecycle: NONE -> WATCH -> EXECUTED
use chrono::{DateTime, FixedOffset};
use log::{debug, info};

use crate::baseline_store::{ContractState, DaySession};
use crate::config::MonitorConfig;
use crate::cross_side::CrossSideTable;
use crate::scorer::{self, ScoreBreakdown, ScoreInputs};
use crate::types::{ContractKey, LifecycleState, OptionQuote};

/// Market context shared by every contract evaluation within one scan.
#[derive(Debug, Clone)]
pub struct ScanContext {
    pub now: DateTime<FixedOffset>,
    pub spot: f64,
    pub atm: u32,
    pub spot_move_pct: f64,
    pub days_to_expiry: i64,
    pub expiry_label: String,
}

#[derive(Debug, Clone)]
pub struct ExecutionCandidate {
    pub key: ContractKey,
    pub oi_pct: f64,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone)]
pub enum DetectorEvent {
    /// Contract entered WATCH. `suppressed` carries the reason when the
    /// notification gates blocked the alert; the state advance itself is
    /// never blocked by them.
    Watch {
        key: ContractKey,
        oi_pct: f64,
        suppressed: Option<String>,
    },
    /// All execution gates passed; the candidate goes to the selector.
    Execution(ExecutionCandidate),
    /// The conviction score fell short. Earlier gate failures are only
    /// debug-logged; this event exists so scored rejections reach the
    /// calibration log.
    ScoreRejected {
        key: ContractKey,
        reason: String,
        breakdown: ScoreBreakdown,
    },
}

struct GateRejection {
    reason: String,
    breakdown: Option<ScoreBreakdown>,
}

impl GateRejection {
    fn gate(reason: String) -> Self {
        Self {
            reason,
            breakdown: None,
        }
    }
}

pub struct BuildupDetector<'a> {
    cfg: &'a MonitorConfig,
}

impl<'a> BuildupDetector<'a> {
    pub fn new(cfg: &'a MonitorConfig) -> Self {
        Self { cfg }
    }

    /// Evaluate one contract against the current snapshot. Mutates the
    /// session (baseline init, streaks, lifecycle) and returns the events
    /// the caller must act on.
    pub fn evaluate(
        &self,
        session: &mut DaySession,
        table: &CrossSideTable,
        quote: &OptionQuote,
        ctx: &ScanContext,
    ) -> Vec<DetectorEvent> {
        let key = quote.key();

        // First observation of the day: capture baselines, nothing to
        // evaluate until the next scan.
        if !session.contracts.contains_key(&key) {
            debug!(
                "🆕 [DETECTOR] Baseline for {}: OI {} / LTP {:.2} / vol {}",
                key, quote.oi, quote.ltp, quote.volume
            );
            session
                .contracts
                .insert(key, ContractState::new(quote.oi, quote.ltp, quote.volume));
            return Vec::new();
        }

        let (baseline_oi, baseline_premium, baseline_volume, mut state) = {
            let st = &session.contracts[&key];
            (
                st.baseline_oi,
                st.baseline_premium,
                st.baseline_volume,
                st.lifecycle_state,
            )
        };

        // Contracts with negligible open interest never leave NONE.
        if baseline_oi < self.cfg.min_base_oi.max(1) {
            return Vec::new();
        }

        let oi_pct = (quote.oi - baseline_oi) as f64 / baseline_oi as f64 * 100.0;
        self.update_threshold_streak(session, &key, oi_pct, ctx);

        let mut events = Vec::new();

        if state == LifecycleState::None && oi_pct >= self.cfg.watch_threshold_pct {
            if let Some(st) = session.contracts.get_mut(&key) {
                st.lifecycle_state = LifecycleState::Watch;
            }
            state = LifecycleState::Watch;

            let suppressed = self.watch_suppression(session, table, &key, ctx);
            match &suppressed {
                None => info!("👀 [DETECTOR] {} entered WATCH at +{:.0}% OI", key, oi_pct),
                Some(reason) => info!(
                    "👀 [DETECTOR] {} entered WATCH at +{:.0}% OI (alert suppressed: {})",
                    key, oi_pct, reason
                ),
            }
            events.push(DetectorEvent::Watch {
                key,
                oi_pct,
                suppressed,
            });
        }

        if state == LifecycleState::Watch {
            match self.evaluate_execution(
                session,
                table,
                quote,
                oi_pct,
                baseline_premium,
                baseline_volume,
                ctx,
            ) {
                Ok(candidate) => {
                    if let Some(st) = session.contracts.get_mut(&key) {
                        st.lifecycle_state = LifecycleState::Executed;
                    }
                    info!(
                        "🚀 [DETECTOR] {} EXECUTED: +{:.0}% OI, score {} ({})",
                        key, oi_pct, candidate.breakdown.total, candidate.breakdown.tier
                    );
                    events.push(DetectorEvent::Execution(candidate));
                }
                Err(rejection) => {
                    debug!("⛔ [DETECTOR] {} held in WATCH: {}", key, rejection.reason);
                    if let Some(breakdown) = rejection.breakdown {
                        events.push(DetectorEvent::ScoreRejected {
                            key,
                            reason: rejection.reason,
                            breakdown,
                        });
                    }
                }
            }
        }

        events
    }

    /// Execution-threshold streak bookkeeping, run every scan independent of
    /// lifecycle: feeds the velocity and persistence score factors.
    fn update_threshold_streak(
        &self,
        session: &mut DaySession,
        key: &ContractKey,
        oi_pct: f64,
        ctx: &ScanContext,
    ) {
        if let Some(st) = session.contracts.get_mut(key) {
            if oi_pct >= self.cfg.exec_threshold_pct {
                if st.threshold_cross_time.is_none() {
                    st.threshold_cross_time = Some(ctx.now.to_rfc3339());
                    st.threshold_scan_count = 1;
                } else {
                    st.threshold_scan_count += 1;
                }
            } else if st.threshold_cross_time.is_some() {
                st.threshold_cross_time = None;
                st.threshold_scan_count = 0;
            }
        }
    }

    /// Quality gates for the WATCH notification. Failing any suppresses the
    /// alert but not the state transition.
    fn watch_suppression(
        &self,
        session: &DaySession,
        table: &CrossSideTable,
        key: &ContractKey,
        ctx: &ScanContext,
    ) -> Option<String> {
        if table.is_conflicted(key.strike) {
            return Some("strike building on both sides".to_string());
        }
        let distance = key.strike.abs_diff(ctx.atm);
        if distance > self.cfg.max_atm_distance {
            return Some(format!(
                "{} pts from ATM (max {})",
                distance, self.cfg.max_atm_distance
            ));
        }
        if session.watch_alerts_sent_today >= self.cfg.max_watch_alerts_per_day {
            return Some(format!(
                "daily watch-alert cap {} reached",
                self.cfg.max_watch_alerts_per_day
            ));
        }
        None
    }

    /// The ordered WATCH -> EXECUTED gates. Short-circuits on the first
    /// failure; only a score-gate failure carries a breakdown back.
    #[allow(clippy::too_many_arguments)]
    fn evaluate_execution(
        &self,
        session: &mut DaySession,
        table: &CrossSideTable,
        quote: &OptionQuote,
        oi_pct: f64,
        baseline_premium: f64,
        baseline_volume: i64,
        ctx: &ScanContext,
    ) -> Result<ExecutionCandidate, GateRejection> {
        let key = quote.key();

        // Gate 1: OI surge without a premium rise.
        if oi_pct < self.cfg.exec_threshold_pct {
            return Err(GateRejection::gate(format!(
                "OI +{:.0}% below execution threshold {:.0}%",
                oi_pct, self.cfg.exec_threshold_pct
            )));
        }
        let premium_change_pct = if baseline_premium > 0.0 {
            (quote.ltp - baseline_premium) / baseline_premium * 100.0
        } else {
            0.0
        };
        if premium_change_pct > self.cfg.premium_rise_tolerance_pct {
            return Err(GateRejection::gate(format!(
                "premium rose {:.1}% past tolerance {:.1}%",
                premium_change_pct, self.cfg.premium_rise_tolerance_pct
            )));
        }

        // Gate 2: time of day.
        let t = ctx.now.time();
        if t < self.cfg.entry_time {
            return Err(GateRejection::gate(format!(
                "before entry time {}",
                self.cfg.entry_time
            )));
        }
        if t < self.cfg.market_open || t > self.cfg.market_close {
            return Err(GateRejection::gate("outside trading window".to_string()));
        }

        // Gate 3: the index itself must be moving.
        let required_move = self.cfg.min_spot_move_for_dte(ctx.days_to_expiry);
        if ctx.spot_move_pct.abs() < required_move {
            return Err(GateRejection::gate(format!(
                "spot move {:+.2}% under required {:.2}%",
                ctx.spot_move_pct, required_move
            )));
        }

        // Gate 4: volume expansion.
        let required_volume = baseline_volume as f64 * self.cfg.volume_multiplier;
        if (quote.volume as f64) < required_volume {
            return Err(GateRejection::gate(format!(
                "volume {} under {:.0} ({}x baseline)",
                quote.volume, required_volume, self.cfg.volume_multiplier
            )));
        }

        // Gate 5: a two-sided tug-of-war is not a directional buildup.
        if table.is_conflicted(key.strike) {
            return Err(GateRejection::gate(
                "strike building on both sides".to_string(),
            ));
        }

        // Gate 6: the opposite side must be covering scan-to-scan.
        let opposite = key.opposite();
        let Some(decline_pct) = table.decline_pct_vs_previous(&opposite, session) else {
            return Err(GateRejection::gate(format!(
                "no {} data at {} for covering check",
                opposite.side, opposite.strike
            )));
        };
        let Some(opp_state) = session.contracts.get_mut(&opposite) else {
            return Err(GateRejection::gate(format!(
                "{} not tracked for covering check",
                opposite
            )));
        };
        if decline_pct < self.cfg.min_covering_decline_pct {
            opp_state.decline_streak = 0;
            return Err(GateRejection::gate(format!(
                "opposite side not covering ({:+.1}% vs previous scan)",
                -decline_pct
            )));
        }
        opp_state.decline_streak += 1;
        let decline_streak = opp_state.decline_streak;

        // Gate 7: conviction score against the expiry-phase minimum.
        let (threshold_scan_count, minutes_since_cross) = {
            let st = &session.contracts[&key];
            let minutes = st
                .threshold_cross_time
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|cross| ctx.now.signed_duration_since(cross).num_minutes())
                .unwrap_or(0);
            (st.threshold_scan_count, minutes)
        };

        let inputs = ScoreInputs {
            side: key.side,
            strike: key.strike,
            atm: ctx.atm,
            volume_multiple: quote.volume as f64 / baseline_volume.max(1) as f64,
            minutes_since_cross,
            opposite_decline_pct: decline_pct,
            opposite_decline_streak: decline_streak,
            spot_move_pct: ctx.spot_move_pct,
            threshold_scan_count,
            cluster_confirmations: table.cluster_confirmations(&key, self.cfg),
            premium_change_pct,
        };
        let breakdown = scorer::score(&inputs, self.cfg);
        let min_score = self.cfg.min_score_for_dte(ctx.days_to_expiry);
        if breakdown.total < min_score {
            return Err(GateRejection {
                reason: format!(
                    "score {} below minimum {} at {} days to expiry",
                    breakdown.total, min_score, ctx.days_to_expiry
                ),
                breakdown: Some(breakdown),
            });
        }

        Ok(ExecutionCandidate {
            key,
            oi_pct,
            breakdown,
        })
    }
}
