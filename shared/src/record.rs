//! Telemetry record
//!
//! One reading taken by the probe at a sampling tick.

use chrono::{Local, NaiveDateTime, Timelike};

/// Value stored in a field whose sensor failed at capture time
pub const SENTINEL: f64 = -1.0;

/// Textual timestamp format used both on storage and on the wire
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Position of the probe in the water column
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A single timestamped sensor reading
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Monotonic per-device sequence id
    pub measure_id: u64,
    /// Probe that took the reading
    pub probe_id: u32,
    /// Water temperature in °C
    pub temperature: f64,
    pub ph: f64,
    /// Turbidity (TDS) in ppm
    pub turbidity: f64,
    pub position: Position,
    /// Device local time at capture, second precision
    pub timestamp: NaiveDateTime,
}

impl Record {
    /// Build a record stamped with the current local time
    pub fn new(
        measure_id: u64,
        probe_id: u32,
        temperature: f64,
        ph: f64,
        turbidity: f64,
        position: Position,
    ) -> Self {
        Self {
            measure_id,
            probe_id,
            temperature,
            ph,
            turbidity,
            position,
            timestamp: now_local(),
        }
    }

    /// Timestamp rendered in the fixed `YYYY-MM-DD HH:MM:SS` format
    pub fn time_string(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Names of the sensor fields that carry the sentinel value
    pub fn failed_sensors(&self) -> Vec<&'static str> {
        let mut failed = Vec::new();
        if is_sentinel(self.temperature) {
            failed.push("temperature");
        }
        if is_sentinel(self.ph) {
            failed.push("ph");
        }
        if is_sentinel(self.turbidity) {
            failed.push("turbidity");
        }
        failed
    }
}

/// Check whether a reading is the failed-sensor sentinel
pub fn is_sentinel(value: f64) -> bool {
    value == SENTINEL
}

/// Current local time truncated to whole seconds
pub fn now_local() -> NaiveDateTime {
    let now = Local::now().naive_local();
    // Storage keeps second precision only
    now.with_nanosecond(0).unwrap_or(now)
}
