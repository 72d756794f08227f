//! Venue descriptions for the WebSocket feed
//!
//! A venue knows its endpoint, its symbol format and its message shapes;
//! connection handling lives in [`crate::feeds::WsPriceFeed`].

mod eodhd;
mod exmo;

pub use eodhd::{Eodhd, EodhdConfig};
pub use exmo::{Exmo, ExmoConfig};

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::value::RawValue;

use ticker_core::{FeedError, FeedResult, Instrument, PriceSample};

/// Wire-level description of one streaming venue
pub trait Venue: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Full WebSocket URL, credentials included
    fn endpoint(&self) -> String;

    /// Venue symbol for an instrument, `None` if the venue does not list it
    fn symbol_for(&self, instrument: &Instrument) -> Option<&'static str>;

    fn subscribe_message(&self, symbol: &str) -> String;

    /// Whether the venue sends an authentication acknowledgement right after connecting
    fn requires_auth_ack(&self) -> bool {
        false
    }

    fn check_auth_ack(&self, _text: &str) -> FeedResult<()> {
        Ok(())
    }

    /// Translate one text frame; control messages yield `Ok(None)`
    fn parse_message(&self, text: &str, instrument: &Instrument) -> FeedResult<Option<PriceSample>>;
}

/// Price field that some venues send as a string and others as a number
///
/// Kept as the raw JSON token so numeric prices never pass through `f64`.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub(crate) struct RawPrice(Box<RawValue>);

impl RawPrice {
    /// Decimal text of the price, unquoted when sent as a JSON string
    pub(crate) fn into_string(self) -> FeedResult<String> {
        let raw = self.0.get();
        if raw.starts_with('"') {
            serde_json::from_str(raw)
                .map_err(|e| FeedError::Protocol(format!("malformed price {raw}: {e}")))
        } else {
            Ok(raw.to_string())
        }
    }
}

pub(crate) fn parse_json<'a, T: Deserialize<'a>>(venue: &str, text: &'a str) -> FeedResult<T> {
    serde_json::from_str(text)
        .map_err(|e| FeedError::Protocol(format!("{venue}: malformed message: {e}")))
}

/// Millisecond venue timestamp, falling back to receipt time when out of range
pub(crate) fn timestamp_from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_else(Utc::now)
}
