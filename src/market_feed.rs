// src/market_feed.rs - Spot, option-chain and expiry data from the broker API
use log::{debug, warn};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::config::MonitorConfig;
use crate::errors::MonitorError;
use crate::types::{ExpiryInfo, OptionQuote, OptionSide};

/// The detector's view of the market-data collaborator. One implementation
/// talks to the broker; tests plug in canned snapshots.
pub trait SnapshotSource {
    fn fetch_spot(&self) -> impl std::future::Future<Output = Result<f64, MonitorError>>;
    fn fetch_option_chain(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<OptionQuote>, MonitorError>>;
    fn fetch_expiries(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<ExpiryInfo>, MonitorError>>;
}

/// FYERS-style REST feed with bounded fixed-backoff retries. Exhausting the
/// retry budget aborts the scan; partial rows are skipped, not fatal.
pub struct FyersFeed {
    client: Client,
    base_url: String,
    access_token: Option<String>,
    spot_symbol: String,
    chain_symbol: String,
    strike_count: u32,
    retries: u32,
    backoff: Duration,
}

impl FyersFeed {
    pub fn new(cfg: &MonitorConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: cfg.fyers_base_url.trim_end_matches('/').to_string(),
            access_token: cfg.fyers_access_token.clone(),
            spot_symbol: cfg.spot_symbol.clone(),
            chain_symbol: cfg.chain_symbol.clone(),
            strike_count: cfg.chain_strike_count,
            retries: cfg.fetch_retries.max(1),
            backoff: Duration::from_secs(cfg.fetch_backoff_secs),
        }
    }

    /// Underlying name used to filter chain rows, e.g. "BANKNIFTY" out of
    /// "NSE:BANKNIFTY".
    fn underlying(&self) -> &str {
        self.chain_symbol
            .rsplit(':')
            .next()
            .unwrap_or(&self.chain_symbol)
    }

    async fn get_json(&self, url: &str) -> Result<Value, MonitorError> {
        let mut last_error = String::new();
        for attempt in 1..=self.retries {
            let mut request = self.client.get(url);
            if let Some(token) = &self.access_token {
                request = request.header("Authorization", token.as_str());
            }
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    return Ok(response.json::<Value>().await?);
                }
                Ok(response) => {
                    last_error = format!("HTTP {}", response.status());
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }
            warn!(
                "🌐 [FEED] Attempt {}/{} failed for {}: {}",
                attempt, self.retries, url, last_error
            );
            if attempt < self.retries {
                tokio::time::sleep(self.backoff).await;
            }
        }
        Err(MonitorError::Feed(format!(
            "{} failed after {} attempts: {}",
            url, self.retries, last_error
        )))
    }

    async fn chain_payload(&self, strike_count: u32) -> Result<Value, MonitorError> {
        let url = format!(
            "{}/data/options-chain-v3?symbol={}&strikecount={}",
            self.base_url, self.chain_symbol, strike_count
        );
        let payload = self.get_json(&url).await?;
        if payload.get("s").and_then(Value::as_str) != Some("ok") {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(MonitorError::Feed(format!(
                "option chain unavailable: {}",
                message
            )));
        }
        Ok(payload)
    }
}

impl SnapshotSource for FyersFeed {
    async fn fetch_spot(&self) -> Result<f64, MonitorError> {
        let url = format!("{}/data/quotes?symbols={}", self.base_url, self.spot_symbol);
        let payload = self.get_json(&url).await?;

        let values = payload
            .get("d")
            .and_then(Value::as_array)
            .and_then(|d| d.first())
            .and_then(|row| row.get("v"))
            .ok_or_else(|| MonitorError::Feed(format!("malformed quote response: {}", payload)))?;

        if values.get("s").and_then(Value::as_str) == Some("error") {
            return Err(MonitorError::Feed(format!("quote error: {}", values)));
        }

        for field in ["lp", "ltp", "last_price"] {
            if let Some(price) = values.get(field).and_then(Value::as_f64) {
                return Ok(price);
            }
        }
        Err(MonitorError::Feed(format!(
            "spot price not found in quote response: {}",
            values
        )))
    }

    async fn fetch_option_chain(&self) -> Result<Vec<OptionQuote>, MonitorError> {
        let payload = self.chain_payload(self.strike_count).await?;
        let rows = payload
            .pointer("/data/optionsChain")
            .and_then(Value::as_array)
            .ok_or_else(|| MonitorError::Feed("option chain payload has no rows".to_string()))?;

        let underlying = self.underlying();
        let mut quotes = Vec::with_capacity(rows.len());
        for row in rows {
            match parse_chain_row(row, underlying) {
                Some(quote) => quotes.push(quote),
                None => debug!("🌐 [FEED] Skipping unparseable chain row: {}", row),
            }
        }
        debug!(
            "🌐 [FEED] Parsed {} of {} chain rows",
            quotes.len(),
            rows.len()
        );
        Ok(quotes)
    }

    async fn fetch_expiries(&self) -> Result<Vec<ExpiryInfo>, MonitorError> {
        let payload = self.chain_payload(1).await?;
        let rows = payload
            .pointer("/data/expiryData")
            .and_then(Value::as_array)
            .ok_or_else(|| MonitorError::Feed("no expiry data in chain payload".to_string()))?;

        let expiries = rows
            .iter()
            .filter_map(|row| {
                let epoch = match row.get("expiry") {
                    Some(Value::Number(n)) => n.as_i64()?,
                    Some(Value::String(s)) => s.parse::<i64>().ok()?,
                    _ => return None,
                };
                let label = row.get("date").and_then(Value::as_str)?.to_string();
                Some(ExpiryInfo { epoch, label })
            })
            .collect();
        Ok(expiries)
    }
}

/// Parse one option-chain row. Symbols look like
/// "BANKNIFTY 26Jan27 48500 CE"; rows for other underlyings, index rows and
/// rows with missing numerics are skipped.
fn parse_chain_row(row: &Value, underlying: &str) -> Option<OptionQuote> {
    let symbol = row.get("symbol").and_then(Value::as_str)?;
    if !symbol.contains(underlying) {
        return None;
    }

    let parts: Vec<&str> = symbol.split_whitespace().collect();
    if parts.len() < 4 {
        return None;
    }
    let strike = parts[2].parse::<u32>().ok()?;
    let side = OptionSide::from_tag(parts[3])?;

    let oi = row.get("oi").and_then(Value::as_i64)?;
    let ltp = row.get("ltp").and_then(Value::as_f64)?;
    let volume = row.get("volume").and_then(Value::as_i64)?;

    Some(OptionQuote {
        symbol: symbol.to_string(),
        strike,
        side,
        oi,
        ltp,
        volume,
    })
}
