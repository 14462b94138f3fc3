//! Sampling boundary
//!
//! Sensors may fail individually; the sampler masks each failure with the
//! sentinel value so a tick always yields a complete record.

mod probe;
mod sensors;

pub use probe::{ProbeSampler, Sampler};
pub use sensors::{Sensor, SimulatedSensor};
