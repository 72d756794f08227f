//! Price aggregator - coordinates feed supervisors and the sampler

use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use ticker_core::{AggregatorConfig, FeedSlot, Instrument};

use crate::feeds::PriceFeed;
use crate::sampler::PeriodicSampler;
use crate::sink::ConsensusSink;
use crate::state::AggregationState;
use crate::supervisor::{FeedSupervisor, SupervisorExit};

/// Main price aggregator
///
/// Slot `i` belongs to the `i`-th feed for the whole run.
pub struct PriceAggregator<S> {
    config: AggregatorConfig,
    instrument: Instrument,
    feeds: Vec<Arc<dyn PriceFeed>>,
    state: Arc<AggregationState>,
    sink: S,
}

impl<S: ConsensusSink> PriceAggregator<S> {
    pub fn new(
        config: AggregatorConfig,
        instrument: Instrument,
        feeds: Vec<Arc<dyn PriceFeed>>,
        sink: S,
    ) -> Self {
        let state = Arc::new(AggregationState::with_slots(feeds.len()));

        Self {
            config,
            instrument,
            feeds,
            state,
            sink,
        }
    }

    /// Get shared state reference
    pub fn state(&self) -> Arc<AggregationState> {
        Arc::clone(&self.state)
    }

    pub fn feed_count(&self) -> usize {
        self.feeds.len()
    }

    /// Run all feeds and the sampler until `cancel` fires or every feed has stopped
    ///
    /// Returns after the grace period that follows the last supervisor exit.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "Starting price aggregator for {} with {} feeds",
            self.instrument,
            self.feeds.len()
        );

        let run_token = cancel.child_token();
        let mut supervisors = JoinSet::new();

        for (index, feed) in self.feeds.into_iter().enumerate() {
            let slot = FeedSlot::new(index);
            debug!("Starting {} feed on {}", feed.name(), slot);

            let supervisor = FeedSupervisor::new(
                slot,
                feed,
                self.instrument.clone(),
                Arc::clone(&self.state),
                run_token.clone(),
            );
            supervisors.spawn(async move { (slot, supervisor.run().await) });
        }

        // Not joined: it observes the same token and stops on its own
        let sampler = PeriodicSampler::new(
            Arc::clone(&self.state),
            self.sink,
            self.config.sample_period,
            run_token.clone(),
        );
        tokio::spawn(sampler.run());

        while let Some(joined) = supervisors.join_next().await {
            match joined {
                Ok((slot, SupervisorExit::Cancelled)) => debug!("Supervisor for {} cancelled", slot),
                Ok((slot, exit)) => info!("Supervisor for {} stopped: {:?}", slot, exit),
                Err(e) => error!("Supervisor task failed: {}", e),
            }
        }

        if !run_token.is_cancelled() {
            info!("All feeds stopped, shutting down");
        }
        run_token.cancel();

        debug!("Waiting {:?} for feeds to close", self.config.grace_period);
        tokio::time::sleep(self.config.grace_period).await;
        info!("Price aggregator shutdown completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    use ticker_core::{ConsensusSample, FeedError, PriceSample};

    use crate::feeds::mock::ManualFeed;

    fn sample(price: &str) -> PriceSample {
        PriceSample::new(Instrument::from("BTCUSD"), price, Utc::now())
    }

    #[test]
    fn test_aggregator_creation() {
        let (a_pub, a) = ManualFeed::new("a");
        let (b_pub, b) = ManualFeed::new("b");
        let (tx, _rx) = mpsc::unbounded_channel::<ConsensusSample>();
        let feeds: Vec<Arc<dyn PriceFeed>> = vec![a as Arc<dyn PriceFeed>, b as Arc<dyn PriceFeed>];

        let aggregator = PriceAggregator::new(AggregatorConfig::default(), Instrument::from("BTCUSD"), feeds, tx);

        assert_eq!(aggregator.feed_count(), 2);
        assert_eq!(aggregator.state().slot_count(), 2);
        assert!(aggregator.state().is_empty());
        drop((a_pub, b_pub));
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_feeds_end_to_end() {
        let (a, feed_a) = ManualFeed::new("a");
        let (b, feed_b) = ManualFeed::new("b");
        let (tx, mut rx) = mpsc::unbounded_channel::<ConsensusSample>();
        let cancel = CancellationToken::new();

        let aggregator = PriceAggregator::new(
            AggregatorConfig::default(),
            Instrument::from("BTCUSD"),
            vec![feed_a as Arc<dyn PriceFeed>, feed_b as Arc<dyn PriceFeed>],
            tx,
        );
        let handle = tokio::spawn(aggregator.run(cancel.clone()));

        assert!(a.publish(sample("100.00")).await);
        assert!(a.publish(sample("102.50")).await);
        assert!(b.publish(sample("101.00")).await);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.mean_price, dec!(101.75));
        assert_eq!(first.sources, 2);
        assert_eq!(first.timestamp % 60, 0);

        b.fail(FeedError::Disconnected);

        let second = rx.recv().await.unwrap();
        assert_eq!(second.mean_price, dec!(102.50));
        assert_eq!(second.sources, 1);
        assert_eq!(second.timestamp - first.timestamp, 60);

        cancel.cancel();
        handle.await.unwrap();

        // Sampler has stopped: the sink is dropped without further output
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_grace_period() {
        let (_a, feed_a) = ManualFeed::new("a");
        let (tx, _rx) = mpsc::unbounded_channel::<ConsensusSample>();
        let cancel = CancellationToken::new();

        let aggregator = PriceAggregator::new(
            AggregatorConfig::default(),
            Instrument::from("BTCUSD"),
            vec![feed_a as Arc<dyn PriceFeed>],
            tx,
        );
        let handle = tokio::spawn(aggregator.run(cancel.clone()));
        tokio::task::yield_now().await;

        let cancelled_at = Instant::now();
        cancel.cancel();
        handle.await.unwrap();

        assert!(cancelled_at.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_feeds_failing_stops_aggregator() {
        let (a, feed_a) = ManualFeed::new("a");
        let (b, feed_b) = ManualFeed::new("b");
        let (tx, mut rx) = mpsc::unbounded_channel::<ConsensusSample>();
        let cancel = CancellationToken::new();

        let aggregator = PriceAggregator::new(
            AggregatorConfig::default(),
            Instrument::from("BTCUSD"),
            vec![feed_a as Arc<dyn PriceFeed>, feed_b as Arc<dyn PriceFeed>],
            tx,
        );
        let state = aggregator.state();
        let handle = tokio::spawn(aggregator.run(cancel.clone()));

        a.publish(sample("1")).await;
        a.fail(FeedError::Protocol("bad frame".to_string()));
        b.fail(FeedError::AuthenticationFailed("status 401".to_string()));

        handle.await.unwrap();
        assert!(state.is_empty());
        assert!(!cancel.is_cancelled());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_feeds() {
        let (tx, _rx) = mpsc::unbounded_channel::<ConsensusSample>();
        let aggregator = PriceAggregator::new(
            AggregatorConfig::default().with_grace_period(Duration::from_secs(1)),
            Instrument::from("BTCUSD"),
            Vec::new(),
            tx,
        );

        let started = Instant::now();
        aggregator.run(CancellationToken::new()).await;
        assert!(started.elapsed() >= Duration::from_secs(1));
    }
}
