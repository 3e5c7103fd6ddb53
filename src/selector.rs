// src/selector.rs - Daily signal budget with score-based replacement
use chrono::{DateTime, FixedOffset};
use log::{debug, info};

use crate::baseline_store::{AcceptedSignal, DaySession};
use crate::config::MonitorConfig;
use crate::scorer::ScoreBreakdown;
use crate::types::ContractKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acceptance {
    /// Accepted into a free slot.
    Accepted,
    /// Accepted by evicting today's weakest signal.
    ReplacedWeakest { evicted: ContractKey, evicted_score: i32 },
}

pub struct SignalSelector<'a> {
    cfg: &'a MonitorConfig,
}

impl<'a> SignalSelector<'a> {
    pub fn new(cfg: &'a MonitorConfig) -> Self {
        Self { cfg }
    }

    /// Offer a candidate execution signal against today's budget. Under the
    /// cap it is accepted outright; at the cap it must beat the weakest
    /// accepted score by the improvement margin, evicting that entry.
    /// Rejections return the reason for the calibration log.
    pub fn offer(
        &self,
        session: &mut DaySession,
        key: ContractKey,
        breakdown: &ScoreBreakdown,
        now: DateTime<FixedOffset>,
    ) -> Result<Acceptance, String> {
        let cap = self.cfg.max_signals_per_day;

        let outcome = if session.accepted_signals.len() < cap {
            Acceptance::Accepted
        } else {
            // accepted_signals is kept sorted descending, so the weakest is last.
            let weakest = match session.accepted_signals.last() {
                Some(s) => s.clone(),
                None => return Err("signal cap is zero".to_string()),
            };
            if breakdown.total < weakest.score + self.cfg.improvement_margin {
                return Err(format!(
                    "daily cap {} reached and score {} does not beat weakest {} by margin {}",
                    cap, breakdown.total, weakest.score, self.cfg.improvement_margin
                ));
            }
            session.accepted_signals.pop();
            debug!(
                "♻️ [SELECTOR] Evicting weakest signal {} ({} pts) for {} ({} pts)",
                weakest.key, weakest.score, key, breakdown.total
            );
            Acceptance::ReplacedWeakest {
                evicted: weakest.key,
                evicted_score: weakest.score,
            }
        };

        session.accepted_signals.push(AcceptedSignal {
            key,
            score: breakdown.total,
            tier: breakdown.tier,
            accepted_at: now.to_rfc3339(),
        });
        session
            .accepted_signals
            .sort_by(|a, b| b.score.cmp(&a.score));
        session.signals_sent_today += 1;

        info!(
            "✅ [SELECTOR] Accepted {} with {} pts ({}) - {}/{} slots used",
            key,
            breakdown.total,
            breakdown.tier,
            session.accepted_signals.len(),
            cap
        );
        Ok(outcome)
    }
}
