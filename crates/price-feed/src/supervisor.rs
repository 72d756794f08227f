//! Per-feed supervisor task
//!
//! Drives one subscription and keeps its slot in [`AggregationState`] equal
//! to the feed's latest valid price.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use ticker_core::{FeedError, FeedSlot, Instrument, PriceSample};

use crate::feeds::{FeedStreams, PriceFeed};
use crate::state::AggregationState;

/// Why a supervisor stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorExit {
    Cancelled,
    Failed(FeedError),
    /// Both streams closed without an error being reported
    StreamsClosed,
}

pub struct FeedSupervisor {
    slot: FeedSlot,
    feed: Arc<dyn PriceFeed>,
    instrument: Instrument,
    state: Arc<AggregationState>,
    cancel: CancellationToken,
}

impl FeedSupervisor {
    pub fn new(
        slot: FeedSlot,
        feed: Arc<dyn PriceFeed>,
        instrument: Instrument,
        state: Arc<AggregationState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            slot,
            feed,
            instrument,
            state,
            cancel,
        }
    }

    /// Run until cancellation or a feed-fatal error
    pub async fn run(self) -> SupervisorExit {
        debug!("Starting supervisor for {} ({})", self.slot, self.feed.name());

        let FeedStreams {
            mut prices,
            mut errors,
        } = self.feed.subscribe(self.cancel.clone(), &self.instrument);

        let mut prices_open = true;
        let mut errors_open = true;

        loop {
            tokio::select! {
                biased;

                // Disabled once both streams are closed so `else` can fire
                _ = self.cancel.cancelled(), if prices_open || errors_open => {
                    debug!("Shutting down supervisor for {}", self.slot);
                    return SupervisorExit::Cancelled;
                }
                err = errors.recv(), if errors_open => match err {
                    Some(err) => {
                        self.state.clear(self.slot);
                        error!("Feed {} on {} failed: {}", self.feed.name(), self.slot, err);
                        return SupervisorExit::Failed(err);
                    }
                    None => errors_open = false,
                },
                sample = prices.recv(), if prices_open => match sample {
                    Some(sample) => self.ingest(&sample),
                    None => prices_open = false,
                },
                else => {
                    self.state.clear(self.slot);
                    warn!("Feed {} on {} closed without an error", self.feed.name(), self.slot);
                    return SupervisorExit::StreamsClosed;
                }
            }
        }
    }

    fn ingest(&self, sample: &PriceSample) {
        match sample.parse_price() {
            Ok(price) => {
                trace!("{} {} = {} at {}", self.slot, sample.instrument, price, sample.observed_at);
                self.state.set(self.slot, price);
            }
            Err(e) => {
                // A malformed price must never linger as the last known value
                self.state.clear(self.slot);
                warn!("Invalid value received on {} ({}): {}", self.slot, self.feed.name(), e);
            }
        }
    }
}
