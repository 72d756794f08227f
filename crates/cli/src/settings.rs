//! Environment-driven settings
//!
//! Every key can be overridden with a `TICKER__`-prefixed variable, nested
//! keys separated by `__` (e.g. `TICKER__EODHD__API_TOKEN`).

use config::{Config, Environment};
use serde::Deserialize;
use std::time::Duration;

use ticker_core::{AggregatorConfig, DEFAULT_GRACE_PERIOD, DEFAULT_SAMPLE_PERIOD};
use ticker_price_feed::venues::{EodhdConfig, ExmoConfig};

const ENV_PREFIX: &str = "TICKER";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub sample_period_secs: u64,
    pub grace_period_secs: u64,
    pub eodhd: EodhdConfig,
    pub exmo: ExmoConfig,
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_env(Environment::with_prefix(ENV_PREFIX))
    }

    fn from_env(env: Environment) -> anyhow::Result<Self> {
        let eodhd = EodhdConfig::default();
        let exmo = ExmoConfig::default();

        let settings: Settings = Config::builder()
            .set_default("sample_period_secs", DEFAULT_SAMPLE_PERIOD.as_secs())?
            .set_default("grace_period_secs", DEFAULT_GRACE_PERIOD.as_secs())?
            .set_default("eodhd.host", eodhd.host)?
            .set_default("eodhd.api_token", eodhd.api_token)?
            .set_default("exmo.host", exmo.host)?
            .add_source(env.separator("__").try_parsing(true))
            .build()?
            .try_deserialize()?;

        settings.aggregator().validate()?;

        Ok(settings)
    }

    pub fn aggregator(&self) -> AggregatorConfig {
        AggregatorConfig::default()
            .with_sample_period(Duration::from_secs(self.sample_period_secs))
            .with_grace_period(Duration::from_secs(self.grace_period_secs))
    }
}
