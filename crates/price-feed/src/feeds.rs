//! Price feed capability and WebSocket feed implementation

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ticker_core::{FeedError, FeedResult, Instrument, PriceSample};

use crate::venues::Venue;

/// Buffer depth between a feed and its supervisor
pub const FEED_CHANNEL_CAPACITY: usize = 1;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Source of live prices for one instrument
///
/// `subscribe` returns immediately; samples and at most one error arrive on
/// the returned streams. Cancelling the token closes the connection and
/// both streams without reporting an error.
pub trait PriceFeed: Send + Sync {
    fn name(&self) -> &str;

    fn subscribe(&self, cancel: CancellationToken, instrument: &Instrument) -> FeedStreams;
}

/// Consuming half of a subscription
#[derive(Debug)]
pub struct FeedStreams {
    pub prices: mpsc::Receiver<PriceSample>,
    pub errors: mpsc::Receiver<FeedError>,
}

/// Producing half of a subscription
///
/// Dropping the publisher closes both streams. `fail` takes the publisher by
/// value so an error can only be reported once.
#[derive(Debug)]
pub struct FeedPublisher {
    prices: mpsc::Sender<PriceSample>,
    errors: mpsc::Sender<FeedError>,
}

/// Create a connected publisher/streams pair
pub fn feed_channel() -> (FeedPublisher, FeedStreams) {
    let (prices_tx, prices_rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
    let (errors_tx, errors_rx) = mpsc::channel(1);

    (
        FeedPublisher {
            prices: prices_tx,
            errors: errors_tx,
        },
        FeedStreams {
            prices: prices_rx,
            errors: errors_rx,
        },
    )
}

impl FeedPublisher {
    /// Push a sample, waiting for buffer space
    ///
    /// Returns `false` once the consumer is gone.
    pub async fn publish(&self, sample: PriceSample) -> bool {
        self.prices.send(sample).await.is_ok()
    }

    /// Report a feed-fatal error and close both streams
    pub fn fail(self, error: FeedError) {
        // The error buffer is empty: this is the only send it ever sees
        if self.errors.try_send(error).is_err() {
            debug!("Feed consumer gone before error could be reported");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.prices.is_closed()
    }
}

/// Generic WebSocket feed driven by a venue description
pub struct WsPriceFeed<V> {
    venue: Arc<V>,
}

impl<V: Venue> WsPriceFeed<V> {
    pub fn new(venue: V) -> Self {
        Self {
            venue: Arc::new(venue),
        }
    }

    async fn run(
        venue: Arc<V>,
        symbol: &'static str,
        instrument: Instrument,
        publisher: FeedPublisher,
        cancel: CancellationToken,
    ) {
        let mut ws = tokio::select! {
            _ = cancel.cancelled() => return,
            connected = Self::connect_and_subscribe(venue.as_ref(), symbol) => match connected {
                Ok(ws) => ws,
                Err(e) => {
                    publisher.fail(e);
                    return;
                }
            },
        };

        match Self::listen(venue.as_ref(), &instrument, &mut ws, &publisher, &cancel).await {
            Ok(()) => {
                info!("Closing {} feed", venue.name());
                if let Err(e) = ws.close(None).await {
                    debug!("Error closing {} socket: {}", venue.name(), e);
                }
            }
            Err(e) => {
                if let Err(close_err) = ws.close(None).await {
                    debug!("Error closing {} socket: {}", venue.name(), close_err);
                }
                publisher.fail(e);
            }
        }
    }

    async fn connect_and_subscribe(venue: &V, symbol: &str) -> FeedResult<WsStream> {
        let url = venue.endpoint();
        info!("Connecting to {}", venue.name());

        let (mut ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;

        if venue.requires_auth_ack() {
            let ack = Self::next_text(&mut ws)
                .await?
                .ok_or_else(|| FeedError::AuthenticationFailed("connection closed before acknowledgement".to_string()))?;
            venue.check_auth_ack(&ack)?;
            debug!("Authenticated with {}", venue.name());
        }

        let subscribe_msg = venue.subscribe_message(symbol);
        debug!("Subscribing to {} on {}", symbol, venue.name());
        ws.send(Message::Text(subscribe_msg))
            .await
            .map_err(|e| FeedError::SubscriptionFailed(e.to_string()))?;

        info!("Subscribed to {} on {}", symbol, venue.name());
        Ok(ws)
    }

    /// Read until cancellation (`Ok`) or a feed-fatal condition (`Err`)
    async fn listen(
        venue: &V,
        instrument: &Instrument,
        ws: &mut WsStream,
        publisher: &FeedPublisher,
        cancel: &CancellationToken,
    ) -> FeedResult<()> {
        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                msg = ws.next() => msg,
            };

            match msg {
                Some(Ok(Message::Text(text))) => {
                    let Some(sample) = venue.parse_message(&text, instrument)? else {
                        continue;
                    };

                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        delivered = publisher.publish(sample) => {
                            if !delivered {
                                debug!("{} consumer dropped", venue.name());
                                return Ok(());
                            }
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    ws.send(Message::Pong(data))
                        .await
                        .map_err(|e| FeedError::ReadFailed(e.to_string()))?;
                }
                Some(Ok(Message::Close(frame))) => {
                    warn!("{} closed the connection: {:?}", venue.name(), frame);
                    return Err(FeedError::Disconnected);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(FeedError::ReadFailed(e.to_string())),
                None => return Err(FeedError::Disconnected),
            }
        }
    }

    async fn next_text(ws: &mut WsStream) -> FeedResult<Option<String>> {
        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Text(text)) => return Ok(Some(text)),
                Ok(Message::Close(_)) => return Ok(None),
                Ok(_) => continue,
                Err(e) => return Err(FeedError::ReadFailed(e.to_string())),
            }
        }
        Ok(None)
    }
}

impl<V: Venue> PriceFeed for WsPriceFeed<V> {
    fn name(&self) -> &str {
        self.venue.name()
    }

    fn subscribe(&self, cancel: CancellationToken, instrument: &Instrument) -> FeedStreams {
        let (publisher, streams) = feed_channel();

        let Some(symbol) = self.venue.symbol_for(instrument) else {
            publisher.fail(FeedError::UnsupportedInstrument(instrument.clone()));
            return streams;
        };

        tokio::spawn(Self::run(
            Arc::clone(&self.venue),
            symbol,
            instrument.clone(),
            publisher,
            cancel,
        ));

        streams
    }
}
