//! Core type definitions

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use crate::SampleError;

/// Instrument identifier (e.g. a trading pair symbol such as `BTCUSD`)
///
/// Equality is an exact string match. No normalization happens here; each
/// feed translates the identifier into its own venue symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instrument(String);

impl Instrument {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Instrument {
    fn from(symbol: &str) -> Self {
        Self::new(symbol)
    }
}

impl FromStr for Instrument {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

/// Raw price update as reported by a feed
///
/// The price stays string-encoded until the supervisor ingests it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSample {
    pub instrument: Instrument,
    pub price: String,
    pub observed_at: DateTime<Utc>,
}

impl PriceSample {
    pub fn new(instrument: Instrument, price: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self {
            instrument,
            price: price.into(),
            observed_at,
        }
    }

    /// Parse the price into an exact decimal
    pub fn parse_price(&self) -> Result<Decimal, SampleError> {
        Decimal::from_str(self.price.trim()).map_err(|source| SampleError::InvalidPrice {
            raw: self.price.clone(),
            source,
        })
    }
}

/// Index of a configured feed instance, stable for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeedSlot(usize);

impl FeedSlot {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for FeedSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// Periodic unweighted mean of the last known price of every live slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusSample {
    /// Unix seconds of the period boundary the sample belongs to
    pub timestamp: i64,
    pub mean_price: Decimal,
    /// Number of slots that contributed
    pub sources: usize,
}

impl fmt::Display for ConsensusSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.timestamp, self.mean_price.normalize())
    }
}
