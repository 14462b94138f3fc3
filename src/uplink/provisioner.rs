//! Connectivity provisioners

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::traits::ConnectivityProvisioner;

/// Treats the network as reachable when a TCP handshake with the collector
/// succeeds
pub struct TcpProvisioner {
    address: String,
    connect_timeout: Duration,
}

impl TcpProvisioner {
    pub fn new(address: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            connect_timeout,
        }
    }

    /// Derive `host:port` from the collector's base URL
    pub fn for_url(base_url: &str, connect_timeout: Duration) -> Result<Self> {
        let url = Url::parse(base_url)?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow!("Collector URL has no host: {}", base_url))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| anyhow!("Collector URL has no port: {}", base_url))?;
        Ok(Self::new(format!("{}:{}", host, port), connect_timeout))
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl ConnectivityProvisioner for TcpProvisioner {
    async fn ensure_connected(&self) -> bool {
        match timeout(self.connect_timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("[UPLINK] {} not reachable: {}", self.address, e);
                false
            }
            Err(_) => {
                debug!("[UPLINK] {} connect timed out", self.address);
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "TCP"
    }
}
