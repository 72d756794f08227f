//! Error types

use thiserror::Error;

use crate::Instrument;

/// Feed-fatal errors
///
/// A feed reports at most one of these and then closes its streams; the
/// supervisor of that slot stops for the rest of the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Instrument {0} is not supported")]
    UnsupportedInstrument(Instrument),

    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Feed disconnected")]
    Disconnected,
}

/// Per-sample errors, recovered locally by the supervisor
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("Invalid price {raw:?}: {source}")]
    InvalidPrice {
        raw: String,
        #[source]
        source: rust_decimal::Error,
    },
}

/// Configuration errors, reported at startup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias
pub type FeedResult<T> = Result<T, FeedError>;
