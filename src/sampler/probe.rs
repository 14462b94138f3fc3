//! Probe sampler - reads every sensor once per tick

use probe_shared::record::{Position, Record, SENTINEL};
use tracing::{info, warn};

use super::sensors::Sensor;
use crate::queue::MeasureSequence;

/// Produces one record per sampling tick
pub trait Sampler: Send {
    /// Take a full reading; sensor failures become the sentinel value
    fn measure(&mut self) -> Record;
}

/// Sampler for the water-quality probe: thermometer, pH meter, TDS sensor
pub struct ProbeSampler {
    probe_id: u32,
    position: Position,
    thermometer: Box<dyn Sensor>,
    ph_meter: Box<dyn Sensor>,
    tds_sensor: Box<dyn Sensor>,
    sequence: MeasureSequence,
}

impl ProbeSampler {
    pub fn new(
        probe_id: u32,
        position: Position,
        thermometer: Box<dyn Sensor>,
        ph_meter: Box<dyn Sensor>,
        tds_sensor: Box<dyn Sensor>,
        sequence: MeasureSequence,
    ) -> Self {
        Self {
            probe_id,
            position,
            thermometer,
            ph_meter,
            tds_sensor,
            sequence,
        }
    }

    /// Run every sensor's self test, returning the names of those that failed
    pub fn self_test(&mut self) -> Vec<&'static str> {
        let mut failed = Vec::new();
        for sensor in [&mut self.ph_meter, &mut self.thermometer, &mut self.tds_sensor] {
            match sensor.self_test() {
                Ok(()) => info!("[SAMPLER] {} self test passed", sensor.name()),
                Err(e) => {
                    warn!("[SAMPLER] {} self test failed: {:#}", sensor.name(), e);
                    failed.push(sensor.name());
                }
            }
        }
        failed
    }
}

impl Sampler for ProbeSampler {
    fn measure(&mut self) -> Record {
        let temperature = read_or_sentinel(self.thermometer.as_mut());
        let ph = read_or_sentinel(self.ph_meter.as_mut());
        // TDS readings depend on water temperature
        self.tds_sensor.compensate(temperature);
        let turbidity = read_or_sentinel(self.tds_sensor.as_mut());

        let record = Record::new(
            self.sequence.next_id(),
            self.probe_id,
            temperature,
            ph,
            turbidity,
            self.position,
        );

        info!(
            measure_id = record.measure_id,
            "[SAMPLER] pH={} temperature={} turbidity={}",
            record.ph,
            record.temperature,
            record.turbidity
        );
        let failed = record.failed_sensors();
        if !failed.is_empty() {
            warn!(
                measure_id = record.measure_id,
                "[SAMPLER] Stored sentinel for {}",
                failed.join(", ")
            );
        }
        record
    }
}

fn read_or_sentinel(sensor: &mut dyn Sensor) -> f64 {
    match sensor.measure() {
        Ok(value) if value.is_finite() => value,
        Ok(value) => {
            warn!("[SAMPLER] {} returned {}, storing sentinel", sensor.name(), value);
            SENTINEL
        }
        Err(e) => {
            warn!("[SAMPLER] {} failed: {:#}", sensor.name(), e);
            SENTINEL
        }
    }
}
