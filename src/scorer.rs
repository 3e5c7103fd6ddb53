// src/scorer.rs - Multi-factor conviction scoring for candidate execution signals
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::MonitorConfig;
use crate::types::OptionSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalTier {
    VeryHigh,
    High,
    Medium,
    Low,
}

impl fmt::Display for SignalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalTier::VeryHigh => "VERY HIGH",
            SignalTier::High => "HIGH",
            SignalTier::Medium => "MEDIUM",
            SignalTier::Low => "LOW",
        };
        write!(f, "{}", s)
    }
}

/// One factor's contribution to the total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreItem {
    pub factor: String,
    pub points: i32,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub total: i32,
    pub tier: SignalTier,
    pub items: Vec<ScoreItem>,
}

/// Everything the scorer looks at. Collected by the detector once gates 1-6
/// have passed; the scorer itself has no side effects.
#[derive(Debug, Clone)]
pub struct ScoreInputs {
    pub side: OptionSide,
    pub strike: u32,
    pub atm: u32,
    pub volume_multiple: f64,
    pub minutes_since_cross: i64,
    pub opposite_decline_pct: f64,
    pub opposite_decline_streak: u32,
    pub spot_move_pct: f64,
    pub threshold_scan_count: u32,
    pub cluster_confirmations: u32,
    pub premium_change_pct: f64,
}

fn item(factor: &str, points: i32, detail: String) -> ScoreItem {
    ScoreItem {
        factor: factor.to_string(),
        points,
        detail,
    }
}

pub fn tier_for(total: i32, cfg: &MonitorConfig) -> SignalTier {
    if total >= cfg.tier_very_high {
        SignalTier::VeryHigh
    } else if total >= cfg.tier_high {
        SignalTier::High
    } else if total >= cfg.tier_medium {
        SignalTier::Medium
    } else {
        SignalTier::Low
    }
}

pub fn score(inputs: &ScoreInputs, cfg: &MonitorConfig) -> ScoreBreakdown {
    let mut items = Vec::with_capacity(9);

    // Strike proximity to ATM: closer strikes carry more conviction.
    let distance = inputs.strike.abs_diff(inputs.atm);
    let pts = if distance == 0 {
        30
    } else if distance <= 100 {
        20
    } else if distance <= 200 {
        12
    } else {
        5
    };
    items.push(item(
        "atm_distance",
        pts,
        format!("{} pts from ATM {}", distance, inputs.atm),
    ));

    // Volume expansion vs the day baseline.
    let pts = if inputs.volume_multiple >= 3.0 {
        20
    } else if inputs.volume_multiple >= 2.0 {
        12
    } else if inputs.volume_multiple >= 1.3 {
        6
    } else {
        0
    };
    items.push(item(
        "volume",
        pts,
        format!("{:.1}x baseline volume", inputs.volume_multiple),
    ));

    // Buildup velocity: how fast OI crossed the execution threshold.
    // Inverted bands, a slow grind scores lowest.
    let pts = if inputs.minutes_since_cross <= 15 {
        25
    } else if inputs.minutes_since_cross <= 45 {
        15
    } else {
        5
    };
    items.push(item(
        "velocity",
        pts,
        format!("{} min since threshold cross", inputs.minutes_since_cross),
    ));

    // Opposite-side covering magnitude this scan.
    let pts = if inputs.opposite_decline_pct >= 15.0 {
        25
    } else if inputs.opposite_decline_pct >= 8.0 {
        15
    } else if inputs.opposite_decline_pct >= cfg.min_covering_decline_pct {
        8
    } else {
        0
    };
    items.push(item(
        "covering_magnitude",
        pts,
        format!("opposite OI -{:.1}% this scan", inputs.opposite_decline_pct),
    ));

    // Opposite-side covering streak across scans.
    let pts = match inputs.opposite_decline_streak {
        0 => 0,
        1 => 5,
        2 => 10,
        3 => 15,
        _ => 20,
    };
    items.push(item(
        "covering_streak",
        pts,
        format!("{} consecutive declining scans", inputs.opposite_decline_streak),
    ));

    // Spot alignment: a Call-side buildup is bearish, a Put-side bullish.
    // Spot moving against the buildup direction is penalized.
    let aligned_move = match inputs.side {
        OptionSide::Call => -inputs.spot_move_pct,
        OptionSide::Put => inputs.spot_move_pct,
    };
    let pts = if aligned_move >= 0.50 {
        30
    } else if aligned_move >= 0.25 {
        18
    } else if aligned_move <= -0.25 {
        -20
    } else {
        0
    };
    items.push(item(
        "spot_alignment",
        pts,
        format!(
            "day move {:+.2}% vs {} buildup",
            inputs.spot_move_pct,
            inputs.side.tag()
        ),
    ));

    // Persistence above the execution threshold.
    let pts = if inputs.threshold_scan_count >= 5 {
        15
    } else if inputs.threshold_scan_count >= 3 {
        10
    } else if inputs.threshold_scan_count >= 2 {
        5
    } else {
        0
    };
    items.push(item(
        "persistence",
        pts,
        format!("{} scans above threshold", inputs.threshold_scan_count),
    ));

    // Adjacent strikes confirming the move.
    let pts = match inputs.cluster_confirmations {
        0 => 0,
        1 => 8,
        2 => 14,
        _ => 20,
    };
    items.push(item(
        "cluster",
        pts,
        format!("{} corroborating neighbor strikes", inputs.cluster_confirmations),
    ));

    // Premium behavior: falling or flat premium under an OI surge is the
    // writer's footprint; a rise past tolerance argues against it.
    let pts = if inputs.premium_change_pct <= -10.0 {
        15
    } else if inputs.premium_change_pct <= 0.0 {
        10
    } else if inputs.premium_change_pct <= cfg.premium_rise_tolerance_pct {
        5
    } else {
        -10
    };
    items.push(item(
        "premium",
        pts,
        format!("premium {:+.1}% vs baseline", inputs.premium_change_pct),
    ));

    let total = items.iter().map(|i| i.points).sum();
    ScoreBreakdown {
        total,
        tier: tier_for(total, cfg),
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs() -> ScoreInputs {
        ScoreInputs {
            side: OptionSide::Call,
            strike: 48_500,
            atm: 48_500,
            volume_multiple: 1.0,
            minutes_since_cross: 120,
            opposite_decline_pct: 0.0,
            opposite_decline_streak: 0,
            spot_move_pct: 0.0,
            threshold_scan_count: 1,
            cluster_confirmations: 0,
            premium_change_pct: 2.0,
        }
    }

    #[test]
    fn test_best_case_hits_every_band_top() {
        let cfg = MonitorConfig::default();
        let inputs = ScoreInputs {
            side: OptionSide::Call,
            strike: 48_500,
            atm: 48_500,
            volume_multiple: 3.5,
            minutes_since_cross: 10,
            opposite_decline_pct: 20.0,
            opposite_decline_streak: 5,
            spot_move_pct: -0.8, // falling spot aligns with a Call buildup
            threshold_scan_count: 6,
            cluster_confirmations: 3,
            premium_change_pct: -12.0,
        };
        let breakdown = score(&inputs, &cfg);
        assert_eq!(breakdown.total, 30 + 20 + 25 + 25 + 20 + 30 + 15 + 20 + 15);
        assert_eq!(breakdown.tier, SignalTier::VeryHigh);
        assert_eq!(breakdown.items.len(), 9);
    }

    #[test]
    fn test_misaligned_spot_is_penalized() {
        let cfg = MonitorConfig::default();
        let mut inputs = base_inputs();

        inputs.spot_move_pct = 0.6; // rising spot against a Call buildup
        let bearish = score(&inputs, &cfg);
        let alignment = bearish
            .items
            .iter()
            .find(|i| i.factor == "spot_alignment")
            .unwrap();
        assert_eq!(alignment.points, -20);

        // Same move aligns with a Put buildup.
        inputs.side = OptionSide::Put;
        let bullish = score(&inputs, &cfg);
        let alignment = bullish
            .items
            .iter()
            .find(|i| i.factor == "spot_alignment")
            .unwrap();
        assert_eq!(alignment.points, 30);
    }

    #[test]
    fn test_premium_rise_beyond_tolerance_is_penalized() {
        let cfg = MonitorConfig::default();
        let mut inputs = base_inputs();

        inputs.premium_change_pct = -15.0;
        assert_eq!(
            score(&inputs, &cfg)
                .items
                .iter()
                .find(|i| i.factor == "premium")
                .unwrap()
                .points,
            15
        );

        inputs.premium_change_pct = 8.0;
        assert_eq!(
            score(&inputs, &cfg)
                .items
                .iter()
                .find(|i| i.factor == "premium")
                .unwrap()
                .points,
            -10
        );
    }

    #[test]
    fn test_velocity_is_inverted() {
        let cfg = MonitorConfig::default();
        let mut inputs = base_inputs();

        inputs.minutes_since_cross = 5;
        let fast = score(&inputs, &cfg).total;
        inputs.minutes_since_cross = 30;
        let medium = score(&inputs, &cfg).total;
        inputs.minutes_since_cross = 200;
        let slow = score(&inputs, &cfg).total;
        assert!(fast > medium && medium > slow);
    }

    #[test]
    fn test_tier_cut_points() {
        let cfg = MonitorConfig::default();
        assert_eq!(tier_for(125, &cfg), SignalTier::VeryHigh);
        assert_eq!(tier_for(120, &cfg), SignalTier::VeryHigh);
        assert_eq!(tier_for(119, &cfg), SignalTier::High);
        assert_eq!(tier_for(90, &cfg), SignalTier::High);
        assert_eq!(tier_for(89, &cfg), SignalTier::Medium);
        assert_eq!(tier_for(60, &cfg), SignalTier::Medium);
        assert_eq!(tier_for(59, &cfg), SignalTier::Low);
    }
}
