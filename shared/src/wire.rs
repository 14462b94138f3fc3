//! JSON body posted to the collector for one record

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Key/value body of a single `POST` to the collector's measure endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurePayload {
    pub temperature: f64,
    #[serde(rename = "pH")]
    pub ph: f64,
    pub turbidity: f64,
    pub x_position: f64,
    pub y_position: f64,
    pub z_position: f64,
    pub probe: u32,
    /// `YYYY-MM-DD HH:MM:SS`
    pub time: String,
}

impl From<&Record> for MeasurePayload {
    fn from(record: &Record) -> Self {
        Self {
            temperature: record.temperature,
            ph: record.ph,
            turbidity: record.turbidity,
            x_position: record.position.x,
            y_position: record.position.y,
            z_position: record.position.z,
            probe: record.probe_id,
            time: record.time_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Position, SENTINEL, TIMESTAMP_FORMAT};
    use chrono::NaiveDateTime;

    #[test]
    fn test_payload_keys() {
        let record = Record {
            measure_id: 4,
            probe_id: 1,
            temperature: 18.25,
            ph: SENTINEL,
            turbidity: 250.0,
            position: Position {
                x: 1.5,
                y: 2.5,
                z: 3.5,
            },
            timestamp: NaiveDateTime::parse_from_str("2024-06-01 14:03:22", TIMESTAMP_FORMAT)
                .unwrap(),
        };

        let value = serde_json::to_value(MeasurePayload::from(&record)).expect("encode failed");

        assert_eq!(value["temperature"], 18.25);
        assert_eq!(value["pH"], -1.0);
        assert_eq!(value["turbidity"], 250.0);
        assert_eq!(value["x_position"], 1.5);
        assert_eq!(value["y_position"], 2.5);
        assert_eq!(value["z_position"], 3.5);
        assert_eq!(value["probe"], 1);
        assert_eq!(value["time"], "2024-06-01 14:03:22");
        assert_eq!(value.as_object().unwrap().len(), 8);
    }
}
