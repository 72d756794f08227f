//! Periodic consensus sampler
//!
//! Wakes on wall-clock period boundaries (every `:00` second with the default
//! one minute period), averages the last known price of every live slot and
//! hands the result to a [`ConsensusSink`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ticker_core::ConsensusSample;

use crate::sink::ConsensusSink;
use crate::state::AggregationState;

pub struct PeriodicSampler<S> {
    state: Arc<AggregationState>,
    sink: S,
    period: Duration,
    cancel: CancellationToken,
}

impl<S: ConsensusSink> PeriodicSampler<S> {
    pub fn new(
        state: Arc<AggregationState>,
        sink: S,
        period: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state,
            sink,
            period,
            cancel,
        }
    }

    /// Tick on every period boundary until cancelled
    pub async fn run(mut self) {
        debug!("Starting sampler with period {:?}", self.period);

        let now = Utc::now();
        let delay = delay_until_next_boundary(now, self.period);
        let first_boundary_ms = now.timestamp_millis() + duration_millis(delay);
        debug!("First sample in {:?}", delay);

        let start = Instant::now() + delay;
        let mut ticker = interval_at(start, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("Shutting down sampler");
                    return;
                }
                scheduled = ticker.tick() => {
                    let timestamp = tick_timestamp(first_boundary_ms, scheduled - start, self.period);
                    if let Some(sample) = self.sample(timestamp) {
                        self.sink.emit(&sample);
                    }
                }
            }
        }
    }

    /// Compute the consensus for one tick, `None` when there is nothing to emit
    pub fn sample(&self, timestamp: i64) -> Option<ConsensusSample> {
        // The snapshot releases the read lock before anything below runs
        let prices = self.state.snapshot();

        if prices.is_empty() {
            debug!("No prices known at {}, skipping sample", timestamp);
            return None;
        }

        let stats = self.state.stats();
        debug!(
            "Aggregation state: {}/{} live slots, {} updates, {} clears",
            stats.live_slots, stats.slot_count, stats.update_count, stats.clear_count
        );

        match mean(&prices) {
            Some(mean_price) => Some(ConsensusSample {
                timestamp,
                mean_price,
                sources: prices.len(),
            }),
            None => {
                warn!("Mean of {} prices overflowed, skipping sample", prices.len());
                None
            }
        }
    }
}

/// Exact unweighted mean; `None` for no input or on decimal overflow
pub fn mean(prices: &[Decimal]) -> Option<Decimal> {
    let count = Decimal::from(prices.len());
    if count.is_zero() {
        return None;
    }

    prices
        .iter()
        .try_fold(Decimal::ZERO, |acc, price| acc.checked_add(*price))?
        .checked_div(count)
}

/// Time from `now` to the next period boundary
///
/// At an exact boundary the next one is a full period away.
pub fn delay_until_next_boundary(now: DateTime<Utc>, period: Duration) -> Duration {
    let period_ms = duration_millis(period).max(1);
    let elapsed = now.timestamp_millis().rem_euclid(period_ms);
    Duration::from_millis((period_ms - elapsed) as u64)
}

/// Unix seconds of the boundary a tick was scheduled for
///
/// `since_first` is the tick's scheduled offset from the first boundary,
/// rounded to whole periods.
pub fn tick_timestamp(first_boundary_ms: i64, since_first: Duration, period: Duration) -> i64 {
    let period_ms = duration_millis(period).max(1);
    let offset_ms = duration_millis(since_first);
    let periods = offset_ms.saturating_add(period_ms / 2).div_euclid(period_ms);
    (first_boundary_ms + periods * period_ms).div_euclid(1000)
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;

    use ticker_core::FeedSlot;

    const MINUTE: Duration = Duration::from_secs(60);

    fn at(h: u32, m: u32, s: u32, ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap() + chrono::Duration::milliseconds(ms)
    }

    #[test]
    fn test_first_tick_waits_for_next_minute() {
        assert_eq!(delay_until_next_boundary(at(10, 15, 37, 0), MINUTE), Duration::from_secs(23));
        assert_eq!(
            delay_until_next_boundary(at(10, 15, 59, 750), MINUTE),
            Duration::from_millis(250)
        );
        assert_eq!(delay_until_next_boundary(at(10, 15, 0, 0), MINUTE), MINUTE);
    }

    #[test]
    fn test_tick_timestamp_counts_periods() {
        let first = at(10, 16, 0, 0).timestamp_millis();
        assert_eq!(tick_timestamp(first, Duration::ZERO, MINUTE), first / 1000);
        assert_eq!(tick_timestamp(first, MINUTE * 2, MINUTE), first / 1000 + 120);
        // Scheduling jitter still reports the boundary
        assert_eq!(
            tick_timestamp(first, MINUTE - Duration::from_millis(2), MINUTE),
            first / 1000 + 60
        );
        assert_eq!(tick_timestamp(first, MINUTE, MINUTE) % 60, 0);
    }

    #[test]
    fn test_mean_is_exact() {
        assert_eq!(mean(&[dec!(102.50), dec!(101.00)]), Some(dec!(101.75)));
        assert_eq!(mean(&[dec!(0.1), dec!(0.2)]), Some(dec!(0.15)));
        assert_eq!(mean(&[dec!(7)]), Some(dec!(7)));
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_mean_overflow_is_none() {
        assert_eq!(mean(&[Decimal::MAX, Decimal::MAX]), None);
    }

    proptest! {
        #[test]
        fn prop_mean_matches_exact_average(cents in prop::collection::vec(0i64..1_000_000_000, 1..16)) {
            let prices: Vec<Decimal> = cents.iter().map(|c| Decimal::new(*c, 2)).collect();
            let total: i64 = cents.iter().sum();
            let avg = mean(&prices).unwrap();

            // avg * n reproduces the exact sum, up to the last of 28 digits
            let recomposed = avg * Decimal::from(prices.len());
            let diff = (recomposed - Decimal::new(total, 2)).abs();
            prop_assert!(diff < dec!(0.0000000001));

            let min = prices.iter().min().unwrap();
            let max = prices.iter().max().unwrap();
            prop_assert!(avg >= *min && avg <= *max);
        }
    }

    #[test]
    fn test_empty_state_skips_and_releases_lock() {
        let state = Arc::new(AggregationState::with_slots(2));
        let (tx, _rx) = mpsc::unbounded_channel::<ConsensusSample>();
        let sampler = PeriodicSampler::new(Arc::clone(&state), tx, MINUTE, CancellationToken::new());

        assert!(sampler.sample(0).is_none());

        // A held read lock would block this write forever
        assert!(state.set(FeedSlot::new(0), dec!(1)));
        assert_eq!(sampler.sample(60).unwrap().mean_price, dec!(1));
    }

    #[test]
    fn test_sample_uses_latest_per_slot() {
        let state = Arc::new(AggregationState::with_slots(2));
        let (tx, _rx) = mpsc::unbounded_channel::<ConsensusSample>();
        let sampler = PeriodicSampler::new(Arc::clone(&state), tx, MINUTE, CancellationToken::new());

        state.set(FeedSlot::new(0), dec!(100.00));
        state.set(FeedSlot::new(0), dec!(102.50));
        state.set(FeedSlot::new(1), dec!(101.00));

        let sample = sampler.sample(1_700_000_040).unwrap();
        assert_eq!(sample.timestamp, 1_700_000_040);
        assert_eq!(sample.mean_price, dec!(101.75));
        assert_eq!(sample.sources, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_emits_once_per_period() {
        let state = Arc::new(AggregationState::with_slots(1));
        let (tx, mut rx) = mpsc::unbounded_channel::<ConsensusSample>();
        let cancel = CancellationToken::new();
        state.set(FeedSlot::new(0), dec!(42));

        let handle = tokio::spawn(
            PeriodicSampler::new(Arc::clone(&state), tx, MINUTE, cancel.clone()).run(),
        );

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.mean_price, dec!(42));
        assert_eq!(second.mean_price, dec!(42));

        cancel.cancel();
        handle.await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sample_between_boundaries() {
        let state = Arc::new(AggregationState::with_slots(1));
        let (tx, mut rx) = mpsc::unbounded_channel::<ConsensusSample>();
        let cancel = CancellationToken::new();
        state.set(FeedSlot::new(0), dec!(42));

        let handle = tokio::spawn(
            PeriodicSampler::new(Arc::clone(&state), tx, MINUTE, cancel.clone()).run(),
        );
        let first = rx.recv().await.unwrap();

        tokio::time::advance(MINUTE - Duration::from_secs(1)).await;
        {
            let mut next = tokio_test::task::spawn(rx.recv());
            tokio_test::assert_pending!(next.poll());
        }

        let second = rx.recv().await.unwrap();
        assert_eq!(second.timestamp - first.timestamp, 60);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_skips_empty_ticks() {
        let state = Arc::new(AggregationState::with_slots(1));
        let (tx, mut rx) = mpsc::unbounded_channel::<ConsensusSample>();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(
            PeriodicSampler::new(Arc::clone(&state), tx, MINUTE, cancel.clone()).run(),
        );

        // Two empty boundaries pass without output
        tokio::time::sleep(MINUTE * 2 + Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());

        state.set(FeedSlot::new(0), dec!(3));
        let sample = rx.recv().await.unwrap();
        assert_eq!(sample.mean_price, dec!(3));

        cancel.cancel();
        handle.await.unwrap();
    }
}
