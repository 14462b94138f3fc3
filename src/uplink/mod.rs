//! Uplink to the remote collector
//!
//! This module handles:
//! - Bounded connectivity checks with fixed backoff
//! - One HTTP POST per record, mapped to a delivery outcome
//! - The read-only liveness probe

mod client;
mod provisioner;
mod traits;

pub use client::UplinkClient;
pub use provisioner::TcpProvisioner;
pub use traits::{Connectivity, ConnectivityProvisioner, Liveness, Uplink};
