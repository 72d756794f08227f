//! Ticker aggregator
//!
//! Prints one `<unix seconds> <mean price>` line per minute for the given
//! instrument, averaged across every live feed.

mod settings;

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ticker_core::Instrument;
use ticker_price_feed::venues::{Eodhd, Exmo};
use ticker_price_feed::{PriceAggregator, PriceFeed, StdoutSink, WsPriceFeed};

use crate::settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "ticker-aggregator", version)]
#[command(about = "Minute-aligned consensus price from multiple streaming feeds")]
struct Cli {
    /// Instrument to track (e.g. BTCUSD)
    #[arg(value_parser = parse_instrument)]
    instrument: Instrument,

    /// Display debug logs
    #[arg(short, long)]
    debug: bool,
}

fn parse_instrument(raw: &str) -> Result<Instrument, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("you must supply an instrument".to_string());
    }
    Ok(Instrument::new(raw))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.debug)?;

    let settings = Settings::load()?;
    info!(
        "Starting ticker aggregator v{} for {}",
        env!("CARGO_PKG_VERSION"),
        cli.instrument
    );

    let feeds: Vec<Arc<dyn PriceFeed>> = vec![
        Arc::new(WsPriceFeed::new(Eodhd::new(settings.eodhd.clone()))),
        Arc::new(WsPriceFeed::new(Exmo::new(settings.exmo.clone()))),
    ];

    let aggregator = PriceAggregator::new(settings.aggregator(), cli.instrument, feeds, StdoutSink);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    aggregator.run(cancel).await;
    Ok(())
}

/// Logs go to stderr; stdout is reserved for consensus lines
fn init_tracing(debug: bool) -> anyhow::Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(debug)
        .with_line_number(debug)
        .try_init()
        .map_err(|e| anyhow::anyhow!("can't initialize logger: {e}"))
}

async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        }
        _ = terminate => {
            info!("Received termination signal");
        }
    }

    cancel.cancel();
}
