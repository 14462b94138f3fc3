mod config;
mod delivery;
mod indicator;
mod queue;
mod sampler;
mod uplink;

use crate::config::ProbeConfig;
use delivery::DeliveryDriver;
use indicator::{Indicator, LogIndicator, Signal};
use queue::{DurableQueue, MeasureSequence, SharedQueue};
use sampler::{ProbeSampler, Sampler, SimulatedSensor};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use uplink::{TcpProvisioner, Uplink, UplinkClient};

use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = ProbeConfig::load()?;

    info!("Probe {} starting", config.device.probe_id);
    info!("  Queue: {}", config.storage.queue_path.display());

    let mut queue = DurableQueue::open(&config.storage.queue_path)?;
    let sequence = MeasureSequence::open(config.storage.sequence_path(), &mut queue)?;
    info!("  Next measure id: {}", sequence.peek());

    let mut sampler = ProbeSampler::new(
        config.device.probe_id,
        config.device.position(),
        Box::new(SimulatedSensor::thermometer()),
        Box::new(SimulatedSensor::ph_meter()),
        Box::new(SimulatedSensor::tds_sensor()),
        sequence,
    );
    let failed = sampler.self_test();
    if !failed.is_empty() {
        warn!(
            "{} sensor(s) failed self test, their readings will carry the sentinel",
            failed.len()
        );
    }

    let queue: SharedQueue = Arc::new(Mutex::new(queue));
    let indicator: Arc<dyn Indicator> = Arc::new(LogIndicator);

    let provisioner = TcpProvisioner::for_url(
        &config.collector.base_url,
        config.collector.request_timeout(),
    )?;
    info!("  Connectivity check: {}", provisioner.address());
    let uplink = UplinkClient::new(&config.collector, provisioner)?;
    info!("  Collector: {}", uplink.measure_url());
    let driver = DeliveryDriver::new(uplink, queue.clone(), indicator.clone())
        .with_liveness_probe(config.collector.liveness_probe);
    info!("Uplink initialized");

    // Two independent triggers sharing the single-writer queue
    let sampling = tokio::spawn(run_sampling(
        sampler,
        queue.clone(),
        indicator.clone(),
        config.schedule.sample_interval(),
    ));
    let delivery = tokio::spawn(run_delivery(
        driver,
        config.schedule.delivery_offset(),
        config.schedule.delivery_interval(),
    ));

    tokio::select! {
        result = sampling => error!("[MAIN] Sampling task exited: {:?}", result),
        result = delivery => error!("[MAIN] Delivery task exited: {:?}", result),
        _ = tokio::signal::ctrl_c() => info!("[MAIN] Shutting down"),
    }

    Ok(())
}

/// Take one reading per tick and append it to the queue
async fn run_sampling<S: Sampler>(
    mut sampler: S,
    queue: SharedQueue,
    indicator: Arc<dyn Indicator>,
    period: Duration,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let record = sampler.measure();

        let result = queue.lock().await.append(&record);
        match result {
            Ok(()) => indicator.signal(Signal::Sampled),
            Err(e) => error!(
                measure_id = record.measure_id,
                "[QUEUE] Could not store reading: {}", e
            ),
        }
    }
}

/// Run one delivery cycle per tick
async fn run_delivery<U: Uplink>(mut driver: DeliveryDriver<U>, offset: Duration, period: Duration) {
    let mut ticker = interval_at(Instant::now() + offset, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let report = driver.run_cycle().await;
        debug!(
            end = ?report.end,
            drained = report.drained,
            delivered = report.delivered,
            failed = report.failed,
            state = ?driver.state(),
            cycles = driver.completed_cycles(),
            "[MAIN] Delivery cycle done"
        );
    }
}
