//! Configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ConfigError;

/// Default sampling cadence: one consensus sample per wall-clock minute
pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_secs(60);

/// Delay after the last supervisor exits, leaving feeds time to close sockets
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Aggregation engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    pub sample_period: Duration,
    pub grace_period: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            sample_period: DEFAULT_SAMPLE_PERIOD,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

impl AggregatorConfig {
    pub fn with_sample_period(mut self, period: Duration) -> Self {
        self.sample_period = period;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Reject settings the sampler cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_period.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "sample period must be greater than zero".to_string(),
            ));
        }
        if self.sample_period.as_millis() > i64::MAX as u128 {
            return Err(ConfigError::InvalidConfig(
                "sample period is too large".to_string(),
            ));
        }
        Ok(())
    }
}
