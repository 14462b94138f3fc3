//! Uplink trait abstraction for pluggable collector backends

use anyhow::Result;
use async_trait::async_trait;
use probe_shared::{DeliveryOutcome, Record};

/// Result of trying to reach the collector for a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Connected,
    Unreachable,
}

/// Response of the read-only liveness probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Liveness {
    pub status: u16,
    pub body: String,
}

/// Joins the network the collector lives on
#[async_trait]
pub trait ConnectivityProvisioner: Send + Sync {
    /// Whether the collector's network is currently usable
    async fn ensure_connected(&self) -> bool;

    /// Human-readable name for this provisioner
    fn name(&self) -> &'static str;
}

/// Best-effort link to the remote collector
#[async_trait]
pub trait Uplink: Send + Sync {
    /// Establish reachability, bounded by a retry count and backoff
    async fn connect(&self) -> Connectivity;

    /// Send one record
    async fn deliver(&self, record: &Record) -> DeliveryOutcome;

    /// Read-only request used as a liveness probe before a bulk send
    async fn fetch_latest(&self) -> Result<Liveness>;
}
