//! EOD Historical Data crypto stream

use serde::{Deserialize, Serialize};

use ticker_core::{FeedError, FeedResult, Instrument, PriceSample};

use super::{parse_json, timestamp_from_millis, RawPrice, Venue};

const VENUE_NAME: &str = "eodhd";

/// Connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EodhdConfig {
    pub host: String,
    pub api_token: String,
}

impl Default for EodhdConfig {
    fn default() -> Self {
        Self {
            host: "ws.eodhistoricaldata.com".to_string(),
            api_token: "demo".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthMessage {
    status_code: u16,
    #[serde(default)]
    message: String,
}

/// Trade tick; status and heartbeat frames lack the price fields
#[derive(Debug, Deserialize)]
struct TickMessage {
    #[serde(rename = "s")]
    symbol: Option<String>,
    #[serde(rename = "p")]
    price: Option<RawPrice>,
    #[serde(rename = "t")]
    timestamp_ms: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct Eodhd {
    config: EodhdConfig,
}

impl Eodhd {
    pub fn new(config: EodhdConfig) -> Self {
        Self { config }
    }
}

impl Venue for Eodhd {
    fn name(&self) -> &'static str {
        VENUE_NAME
    }

    fn endpoint(&self) -> String {
        format!(
            "wss://{}/ws/crypto?api_token={}",
            self.config.host, self.config.api_token
        )
    }

    fn symbol_for(&self, instrument: &Instrument) -> Option<&'static str> {
        match instrument.as_str() {
            "BTCUSD" => Some("BTC-USD"),
            "ETHUSD" => Some("ETH-USD"),
            _ => None,
        }
    }

    fn subscribe_message(&self, symbol: &str) -> String {
        serde_json::json!({ "action": "subscribe", "symbols": symbol }).to_string()
    }

    fn requires_auth_ack(&self) -> bool {
        true
    }

    fn check_auth_ack(&self, text: &str) -> FeedResult<()> {
        let ack: AuthMessage = serde_json::from_str(text)
            .map_err(|e| FeedError::AuthenticationFailed(format!("unexpected reply: {e}")))?;

        if ack.status_code != 200 {
            return Err(FeedError::AuthenticationFailed(format!(
                "status {}: {}",
                ack.status_code, ack.message
            )));
        }
        Ok(())
    }

    fn parse_message(&self, text: &str, instrument: &Instrument) -> FeedResult<Option<PriceSample>> {
        let tick: TickMessage = parse_json(VENUE_NAME, text)?;

        let (Some(_), Some(price)) = (tick.symbol, tick.price) else {
            return Ok(None);
        };

        let observed_at = tick
            .timestamp_ms
            .map(timestamp_from_millis)
            .unwrap_or_else(chrono::Utc::now);

        Ok(Some(PriceSample::new(
            instrument.clone(),
            price.into_string()?,
            observed_at,
        )))
    }
}
