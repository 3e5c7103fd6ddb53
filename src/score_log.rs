// src/score_log.rs - Append-only JSONL sink for offline threshold calibration
use chrono::{DateTime, FixedOffset};
use log::{error, info};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::scorer::{ScoreBreakdown, ScoreItem, SignalTier};
use crate::types::ContractKey;

#[derive(Serialize, Debug)]
pub enum ScoreOutcome {
    Sent,
    RejectedByScore,
    RejectedBySelector,
}

#[derive(Serialize, Debug)]
struct ScoreLogEntry<'a> {
    timestamp: String,
    contract: String,
    outcome: &'a ScoreOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejection_reason: Option<&'a str>,
    total: i32,
    tier: SignalTier,
    factors: &'a [ScoreItem],
    spot: f64,
    spot_move_pct: f64,
    days_to_expiry: i64,
}

/// One record per scored candidate, sent or rejected. Write failures are
/// logged, never propagated: losing a calibration row must not abort a scan.
pub struct ScoreLog {
    writer: Option<Mutex<BufWriter<std::fs::File>>>,
}

impl ScoreLog {
    pub fn new(path: Option<&str>) -> Self {
        let writer = path.and_then(|p| {
            let path = PathBuf::from(p);
            match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => {
                    info!("📝 [SCORE_LOG] Logging scored candidates to {:?}", path);
                    Some(Mutex::new(BufWriter::new(file)))
                }
                Err(e) => {
                    error!("📝 [SCORE_LOG] Cannot open {:?}: {} - disabled", path, e);
                    None
                }
            }
        });
        Self { writer }
    }

    pub fn disabled() -> Self {
        Self { writer: None }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        now: DateTime<FixedOffset>,
        key: &ContractKey,
        outcome: ScoreOutcome,
        rejection_reason: Option<&str>,
        breakdown: &ScoreBreakdown,
        spot: f64,
        spot_move_pct: f64,
        days_to_expiry: i64,
    ) {
        let Some(writer) = &self.writer else {
            return;
        };

        let entry = ScoreLogEntry {
            timestamp: now.to_rfc3339(),
            contract: key.to_string(),
            outcome: &outcome,
            rejection_reason,
            total: breakdown.total,
            tier: breakdown.tier,
            factors: &breakdown.items,
            spot,
            spot_move_pct,
            days_to_expiry,
        };

        match serde_json::to_string(&entry) {
            Ok(line) => {
                let Ok(mut guard) = writer.lock() else {
                    error!("📝 [SCORE_LOG] Writer lock poisoned - entry dropped");
                    return;
                };
                if let Err(e) = writeln!(guard, "{}", line) {
                    error!("📝 [SCORE_LOG] Failed to write entry: {}", e);
                }
                if let Err(e) = guard.flush() {
                    error!("📝 [SCORE_LOG] Failed to flush: {}", e);
                }
            }
            Err(e) => error!("📝 [SCORE_LOG] Failed to serialize entry: {}", e),
        }
    }
}
