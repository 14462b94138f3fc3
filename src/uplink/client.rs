//! HTTP uplink to the collector

use anyhow::Result;
use async_trait::async_trait;
use probe_shared::{DeliveryOutcome, MeasurePayload, Record};
use reqwest::{Client, Url};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::traits::{Connectivity, ConnectivityProvisioner, Liveness, Uplink};
use crate::config::CollectorConfig;

/// Posts records to the collector, one request per record
pub struct UplinkClient<P> {
    http: Client,
    measure_url: Url,
    liveness_url: Url,
    provisioner: P,
    connect_attempts: u32,
    connect_backoff: Duration,
    request_timeout: Duration,
}

impl<P: ConnectivityProvisioner> UplinkClient<P> {
    /// Create a client for the configured collector
    pub fn new(config: &CollectorConfig, provisioner: P) -> Result<Self> {
        let measure_url = Url::parse(&config.base_url)?.join(&config.measure_path)?;
        let mut liveness_url = measure_url.clone();
        if !config.liveness_query.is_empty() {
            liveness_url.set_query(Some(&config.liveness_query));
        }

        let http = Client::builder()
            .connect_timeout(config.request_timeout())
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            measure_url,
            liveness_url,
            provisioner,
            connect_attempts: config.connect_attempts.max(1),
            connect_backoff: config.connect_backoff(),
            request_timeout: config.request_timeout(),
        })
    }

    /// URL records are posted to
    pub fn measure_url(&self) -> &Url {
        &self.measure_url
    }
}

#[async_trait]
impl<P: ConnectivityProvisioner> Uplink for UplinkClient<P> {
    async fn connect(&self) -> Connectivity {
        for attempt in 1..=self.connect_attempts {
            match timeout(self.request_timeout, self.provisioner.ensure_connected()).await {
                Ok(true) => {
                    info!(attempt, "[UPLINK] Connected via {}", self.provisioner.name());
                    return Connectivity::Connected;
                }
                Ok(false) => {
                    debug!(attempt, "[UPLINK] Waiting for connection...");
                }
                Err(_) => {
                    debug!(attempt, "[UPLINK] Connection attempt timed out");
                }
            }

            if attempt < self.connect_attempts {
                sleep(self.connect_backoff).await;
            }
        }

        warn!(
            attempts = self.connect_attempts,
            "[UPLINK] Connection failed, keeping data for later"
        );
        Connectivity::Unreachable
    }

    async fn deliver(&self, record: &Record) -> DeliveryOutcome {
        let payload = MeasurePayload::from(record);

        match self
            .http
            .post(self.measure_url.clone())
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!(measure_id = record.measure_id, status, "[UPLINK] Collector answered");
                DeliveryOutcome::from_status(status)
            }
            Err(e) => {
                debug!(measure_id = record.measure_id, "[UPLINK] Transport error: {}", e);
                DeliveryOutcome::Unreachable
            }
        }
    }

    async fn fetch_latest(&self) -> Result<Liveness> {
        let response = self.http.get(self.liveness_url.clone()).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(Liveness { status, body })
    }
}
