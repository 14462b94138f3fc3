//! Probe Shared Protocol Types
//!
//! This crate provides the record schema, the on-device line codec, the
//! collector wire payload and the delivery cycle state machine shared between
//! probe devices and the collector.

pub mod codec;
pub mod record;
pub mod state_machine;
pub mod wire;

// Re-export commonly used types at crate root
pub use codec::SchemaError;
pub use record::{Position, Record, SENTINEL};
pub use state_machine::{CycleEvent, DeliveryState, DeliveryStateMachine, TransitionResult};
pub use wire::MeasurePayload;

/// Delivery parameters for the uplink
pub mod delivery {
    /// Status code the collector returns for an accepted record
    pub const STATUS_ACCEPTED: u16 = 200;

    /// Default number of connectivity attempts per cycle
    pub const CONNECT_ATTEMPTS: u32 = 10;

    /// Default pause between connectivity attempts in milliseconds
    pub const CONNECT_BACKOFF_MS: u64 = 1100;

    /// Default timeout for one HTTP round trip in milliseconds
    pub const REQUEST_TIMEOUT_MS: u64 = 5000;
}

/// Per-record result of one delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Collector acknowledged the record
    Delivered,
    /// Collector answered with a non-success status
    Rejected(u16),
    /// Transport failure or timeout
    Unreachable,
}

impl DeliveryOutcome {
    /// Map an HTTP status code to an outcome
    pub fn from_status(status: u16) -> Self {
        if status == delivery::STATUS_ACCEPTED {
            Self::Delivered
        } else {
            Self::Rejected(status)
        }
    }

    /// Whether the record can be removed from the queue
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

impl std::fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryOutcome::Delivered => write!(f, "delivered"),
            DeliveryOutcome::Rejected(status) => write!(f, "rejected({})", status),
            DeliveryOutcome::Unreachable => write!(f, "unreachable"),
        }
    }
}
