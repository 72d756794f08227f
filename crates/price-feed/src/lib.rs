//! Multi-source price aggregation engine
//!
//! Features:
//! - One supervisor task per configured feed, fanning into shared state
//! - Exact decimal consensus sampled on wall-clock minute boundaries
//! - Cooperative shutdown through a single cancellation token
//! - WebSocket feeds for EOD Historical Data and EXMO

pub mod aggregator;
pub mod feeds;
pub mod sampler;
pub mod sink;
pub mod state;
pub mod supervisor;
pub mod venues;

pub use aggregator::PriceAggregator;
pub use feeds::{feed_channel, FeedPublisher, FeedStreams, PriceFeed, WsPriceFeed};
pub use sink::{ConsensusSink, StdoutSink};
pub use state::AggregationState;
