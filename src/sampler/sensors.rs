//! Sensor abstraction for pluggable hardware drivers

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A single analog probe sensor
pub trait Sensor: Send {
    /// Human-readable name used in logs
    fn name(&self) -> &'static str;

    /// Take one reading
    fn measure(&mut self) -> Result<f64>;

    /// Feed the latest water temperature for compensation
    fn compensate(&mut self, _temperature: f64) {}

    /// Quick check run once at startup
    fn self_test(&mut self) -> Result<()> {
        self.measure().map(|_| ())
    }
}

/// Bounded random-walk sensor used when no hardware is attached
pub struct SimulatedSensor {
    name: &'static str,
    value: f64,
    step: f64,
    min: f64,
    max: f64,
    rng: StdRng,
}

impl SimulatedSensor {
    pub fn new(name: &'static str, start: f64, step: f64, min: f64, max: f64) -> Self {
        Self {
            name,
            value: start.clamp(min, max),
            step,
            min,
            max,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Water thermometer, °C
    pub fn thermometer() -> Self {
        Self::new("thermometer", 18.0, 0.2, 0.0, 35.0)
    }

    /// pH meter
    pub fn ph_meter() -> Self {
        Self::new("pH meter", 7.0, 0.05, 4.0, 10.0)
    }

    /// TDS sensor, ppm
    pub fn tds_sensor() -> Self {
        Self::new("TDS sensor", 300.0, 5.0, 0.0, 1000.0)
    }
}

impl Sensor for SimulatedSensor {
    fn name(&self) -> &'static str {
        self.name
    }

    fn measure(&mut self) -> Result<f64> {
        let delta = self.rng.random_range(-self.step..=self.step);
        self.value = (self.value + delta).clamp(self.min, self.max);
        // Sensors report two decimals
        Ok((self.value * 100.0).round() / 100.0)
    }

    fn self_test(&mut self) -> Result<()> {
        let reading = self.measure()?;
        if !(self.min..=self.max).contains(&reading) {
            bail!("{} out of range: {}", self.name, reading);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_sensor_stays_in_bounds() {
        let mut sensor = SimulatedSensor::new("test", 0.5, 0.4, 0.0, 1.0);
        for _ in 0..1000 {
            let reading = sensor.measure().unwrap();
            assert!((0.0..=1.0).contains(&reading), "reading {reading} out of bounds");
        }
    }

    #[test]
    fn test_start_value_is_clamped() {
        let mut sensor = SimulatedSensor::new("test", 50.0, 0.0, 0.0, 10.0);
        assert_eq!(sensor.measure().unwrap(), 10.0);
    }

    #[test]
    fn test_simulated_self_test_passes() {
        let mut sensor = SimulatedSensor::ph_meter();
        assert!(sensor.self_test().is_ok());
    }
}
