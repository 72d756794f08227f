//! Consensus output sinks

use std::io::{self, Write};
use tokio::sync::mpsc;
use tracing::{error, trace};

use ticker_core::ConsensusSample;

/// Destination of consensus samples
pub trait ConsensusSink: Send + 'static {
    fn emit(&mut self, sample: &ConsensusSample);
}

/// Writes `<unix seconds> <mean>` lines to stdout
#[derive(Debug, Default)]
pub struct StdoutSink;

impl ConsensusSink for StdoutSink {
    fn emit(&mut self, sample: &ConsensusSample) {
        let mut out = io::stdout().lock();
        if let Err(e) = writeln!(out, "{sample}").and_then(|_| out.flush()) {
            error!("Failed to write consensus sample: {}", e);
        }
    }
}

impl ConsensusSink for mpsc::UnboundedSender<ConsensusSample> {
    fn emit(&mut self, sample: &ConsensusSample) {
        if self.send(sample.clone()).is_err() {
            trace!("Consensus receiver dropped");
        }
    }
}
