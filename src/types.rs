// src/types.rs
// Contract identity, chain records and exchange-time helpers.

use chrono::{DateTime, FixedOffset, NaiveTime, TimeZone, Utc};
use lazy_static::lazy_static;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

lazy_static! {
    /// Exchange-local time zone (IST, UTC+05:30).
    pub static ref IST: FixedOffset =
        FixedOffset::east_opt(5 * 3600 + 30 * 60).expect("valid IST offset");
}

pub fn now_ist() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&*IST)
}

pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// ATM strike for the current spot, rounded to the contract strike increment.
pub fn atm_strike(spot: f64, step: u32) -> u32 {
    ((spot / step as f64).round() as u32) * step
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionSide {
    #[serde(rename = "CE")]
    Call,
    #[serde(rename = "PE")]
    Put,
}

impl OptionSide {
    pub fn tag(&self) -> &'static str {
        match self {
            OptionSide::Call => "CE",
            OptionSide::Put => "PE",
        }
    }

    pub fn opposite(&self) -> OptionSide {
        match self {
            OptionSide::Call => OptionSide::Put,
            OptionSide::Put => OptionSide::Call,
        }
    }

    pub fn from_tag(tag: &str) -> Option<OptionSide> {
        match tag {
            "CE" => Some(OptionSide::Call),
            "PE" => Some(OptionSide::Put),
            _ => None,
        }
    }
}

impl fmt::Display for OptionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Identity of one option contract for a trading day: side + strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContractKey {
    pub side: OptionSide,
    pub strike: u32,
}

impl ContractKey {
    pub fn new(side: OptionSide, strike: u32) -> Self {
        Self { side, strike }
    }

    pub fn opposite(&self) -> ContractKey {
        ContractKey::new(self.side.opposite(), self.strike)
    }
}

impl fmt::Display for ContractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.side.tag(), self.strike)
    }
}

impl FromStr for ContractKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, strike) = s
            .split_once('_')
            .ok_or_else(|| format!("bad contract key: {}", s))?;
        let side = OptionSide::from_tag(tag).ok_or_else(|| format!("bad option side: {}", tag))?;
        let strike = strike
            .parse::<u32>()
            .map_err(|_| format!("bad strike in contract key: {}", s))?;
        Ok(ContractKey::new(side, strike))
    }
}

// Serialized as "CE_48500" so the key can index the persisted JSON map.
impl Serialize for ContractKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContractKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl<'de> Visitor<'de> for KeyVisitor {
            type Value = ContractKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a contract key like CE_48500")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ContractKey, E> {
                v.parse().map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(KeyVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LifecycleState {
    None,
    Watch,
    Executed,
}

/// One row of the option chain after parsing.
#[derive(Debug, Clone)]
pub struct OptionQuote {
    pub symbol: String,
    pub strike: u32,
    pub side: OptionSide,
    pub oi: i64,
    pub ltp: f64,
    pub volume: i64,
}

impl OptionQuote {
    pub fn key(&self) -> ContractKey {
        ContractKey::new(self.side, self.strike)
    }
}

/// One entry of the expiry list supplied by the data feed.
#[derive(Debug, Clone)]
pub struct ExpiryInfo {
    pub epoch: i64,
    pub label: String,
}

/// Nearest expiry with non-negative days remaining, with the day count in
/// IST whole days.
pub fn nearest_expiry(
    expiries: &[ExpiryInfo],
    now: DateTime<FixedOffset>,
) -> Option<(i64, ExpiryInfo)> {
    expiries
        .iter()
        .filter_map(|e| {
            let dt = Utc.timestamp_opt(e.epoch, 0).single()?.with_timezone(&*IST);
            let days = (dt.date_naive() - now.date_naive()).num_days();
            if days >= 0 {
                Some((days, e.clone()))
            } else {
                None
            }
        })
        .min_by_key(|(days, _)| *days)
}

/// Opposite-side strike at the same distance from ATM as the buildup strike.
/// A Call-side (bearish) buildup suggests a Put below ATM, a Put-side
/// (bullish) buildup a Call above ATM. An exactly-ATM buildup uses one step.
pub fn trade_suggestion(
    atm: u32,
    buildup_side: OptionSide,
    strike: u32,
    step: u32,
) -> (u32, OptionSide) {
    let distance = strike.abs_diff(atm).max(step);
    match buildup_side {
        OptionSide::Call => (atm.saturating_sub(distance), OptionSide::Put),
        OptionSide::Put => (atm + distance, OptionSide::Call),
    }
}
