//! EXMO public ticker stream

use serde::{Deserialize, Serialize};

use ticker_core::{FeedError, FeedResult, Instrument, PriceSample};

use super::{parse_json, timestamp_from_millis, Venue};

const VENUE_NAME: &str = "exmo";

/// Connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExmoConfig {
    pub host: String,
}

impl Default for ExmoConfig {
    fn default() -> Self {
        Self {
            host: "ws-api.exmo.com:443".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TickerData {
    buy_price: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "ts")]
    timestamp_ms: Option<i64>,
    event: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<TickerData>,
}

#[derive(Debug, Clone, Default)]
pub struct Exmo {
    config: ExmoConfig,
}

impl Exmo {
    pub fn new(config: ExmoConfig) -> Self {
        Self { config }
    }
}

impl Venue for Exmo {
    fn name(&self) -> &'static str {
        VENUE_NAME
    }

    fn endpoint(&self) -> String {
        format!("wss://{}/v1/public", self.config.host)
    }

    fn symbol_for(&self, instrument: &Instrument) -> Option<&'static str> {
        match instrument.as_str() {
            "BTCUSD" => Some("spot/ticker:BTC_USD"),
            "ETHUSD" => Some("spot/ticker:ETH_USD"),
            _ => None,
        }
    }

    fn subscribe_message(&self, symbol: &str) -> String {
        serde_json::json!({ "method": "subscribe", "topics": [symbol] }).to_string()
    }

    fn parse_message(&self, text: &str, instrument: &Instrument) -> FeedResult<Option<PriceSample>> {
        let envelope: Envelope = parse_json(VENUE_NAME, text)?;

        match envelope.event.as_str() {
            "update" => {
                let data = envelope
                    .data
                    .ok_or_else(|| FeedError::Protocol("exmo: update without data".to_string()))?;
                let observed_at = envelope
                    .timestamp_ms
                    .map(timestamp_from_millis)
                    .unwrap_or_else(chrono::Utc::now);

                Ok(Some(PriceSample::new(
                    instrument.clone(),
                    data.buy_price,
                    observed_at,
                )))
            }
            "error" => Err(FeedError::Protocol(format!(
                "exmo: {}",
                envelope.message.unwrap_or_else(|| "unknown error".to_string())
            ))),
            // info, subscribed, unsubscribed
            _ => Ok(None),
        }
    }
}
