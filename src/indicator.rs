//! Status indicator collaborator (the on-board LED on real hardware)

use tracing::debug;

/// Events the indicator can show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// A reading was stored
    Sampled,
    /// Waiting for the collector to become reachable
    Connecting,
    /// The collector accepted a record
    Delivered,
    /// A record was kept for the next cycle
    Failed,
}

/// Sink for status signals
pub trait Indicator: Send + Sync {
    fn signal(&self, signal: Signal);
}

/// Indicator that only logs, used when no light is wired up
#[derive(Debug, Default, Clone, Copy)]
pub struct LogIndicator;

impl Indicator for LogIndicator {
    fn signal(&self, signal: Signal) {
        debug!("[LED] {:?}", signal);
    }
}
