//! Line codec for the on-device record store
//!
//! Every record is stored as one comma-separated line in a fixed field order:
//! ```text
//! MeasureId,ProbeID,Temperature,PH,Turbidity,Zposition,XPosition,YPosition,Date
//! 17,0,21.5,7.02,312.4,0,0,0,2024-06-01 14:03:22
//! ```
//!
//! The first line of the store is the schema header above. A store whose
//! first line differs is considered stale.

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::record::{Position, Record, TIMESTAMP_FORMAT};

/// Reserved first line naming the schema
pub const SCHEMA_HEADER: &str =
    "MeasureId,ProbeID,Temperature,PH,Turbidity,Zposition,XPosition,YPosition,Date";

/// Field separator
pub const SEPARATOR: char = ',';

/// Number of fields in one data line
pub const FIELD_COUNT: usize = 9;

/// Errors raised when a line does not match the current schema
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Expected {FIELD_COUNT} fields, found {0}")]
    FieldCount(usize),

    #[error("Invalid value for {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("Header mismatch: {0:?}")]
    HeaderMismatch(String),
}

/// Encode a record into one line, terminator included
pub fn encode(record: &Record) -> String {
    let mut line = String::with_capacity(64);
    encode_into(record, &mut line);
    line
}

/// Encode a record and append the line to a buffer
pub fn encode_into(record: &Record, buf: &mut String) {
    use std::fmt::Write;

    // Writing into a String cannot fail
    let _ = writeln!(
        buf,
        "{},{},{},{},{},{},{},{},{}",
        record.measure_id,
        record.probe_id,
        record.temperature,
        record.ph,
        record.turbidity,
        record.position.z,
        record.position.x,
        record.position.y,
        record.timestamp.format(TIMESTAMP_FORMAT),
    );
}

/// Decode one data line (with or without its terminator)
pub fn decode(line: &str) -> Result<Record, SchemaError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let fields: Vec<&str> = line.split(SEPARATOR).collect();

    if fields.len() != FIELD_COUNT {
        return Err(SchemaError::FieldCount(fields.len()));
    }

    Ok(Record {
        measure_id: parse_field("MeasureId", fields[0])?,
        probe_id: parse_field("ProbeID", fields[1])?,
        temperature: parse_field("Temperature", fields[2])?,
        ph: parse_field("PH", fields[3])?,
        turbidity: parse_field("Turbidity", fields[4])?,
        position: Position {
            z: parse_field("Zposition", fields[5])?,
            x: parse_field("XPosition", fields[6])?,
            y: parse_field("YPosition", fields[7])?,
        },
        timestamp: NaiveDateTime::parse_from_str(fields[8].trim(), TIMESTAMP_FORMAT).map_err(
            |_| SchemaError::InvalidField {
                field: "Date",
                value: fields[8].to_string(),
            },
        )?,
    })
}

/// Check a store's first line against the current schema
pub fn check_header(line: &str) -> Result<(), SchemaError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line == SCHEMA_HEADER {
        Ok(())
    } else {
        Err(SchemaError::HeaderMismatch(line.to_string()))
    }
}

fn parse_field<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, SchemaError> {
    raw.trim().parse().map_err(|_| SchemaError::InvalidField {
        field,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SENTINEL;

    fn create_test_record() -> Record {
        Record {
            measure_id: 17,
            probe_id: 3,
            temperature: 21.5,
            ph: 7.02,
            turbidity: 312.4,
            position: Position {
                x: 1.0,
                y: 2.0,
                z: -0.5,
            },
            timestamp: NaiveDateTime::parse_from_str("2024-06-01 14:03:22", TIMESTAMP_FORMAT)
                .unwrap(),
        }
    }

    #[test]
    fn test_encode_field_order() {
        let line = encode(&create_test_record());
        assert_eq!(line, "17,3,21.5,7.02,312.4,-0.5,1,2,2024-06-01 14:03:22\n");
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let original = create_test_record();
        let decoded = decode(&encode(&original)).expect("decode failed");
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_sentinel_survives_codec() {
        let mut record = create_test_record();
        record.temperature = SENTINEL;
        record.turbidity = SENTINEL;

        let line = encode(&record);
        assert!(line.starts_with("17,3,-1,7.02,-1,"));

        let decoded = decode(&line).expect("decode failed");
        assert_eq!(decoded.temperature, SENTINEL);
        assert_eq!(decoded.turbidity, SENTINEL);
    }

    #[test]
    fn test_decode_accepts_crlf() {
        let decoded = decode("1,0,20,7,300,0,0,0,2024-01-01 00:00:00\r\n").expect("decode failed");
        assert_eq!(decoded.measure_id, 1);
    }

    #[test]
    fn test_decode_field_count_mismatch() {
        assert_eq!(decode("1,0,20,7"), Err(SchemaError::FieldCount(4)));
        assert_eq!(
            decode("1,0,20,7,300,0,0,0,2024-01-01 00:00:00,extra"),
            Err(SchemaError::FieldCount(10))
        );
    }

    #[test]
    fn test_decode_invalid_number() {
        let result = decode("1,0,warm,7,300,0,0,0,2024-01-01 00:00:00");
        assert!(matches!(
            result,
            Err(SchemaError::InvalidField {
                field: "Temperature",
                ..
            })
        ));
    }

    #[test]
    fn test_decode_invalid_timestamp() {
        let result = decode("1,0,20,7,300,0,0,0,yesterday");
        assert!(matches!(
            result,
            Err(SchemaError::InvalidField { field: "Date", .. })
        ));
    }

    #[test]
    fn test_check_header() {
        assert!(check_header(SCHEMA_HEADER).is_ok());
        assert!(check_header(&format!("{SCHEMA_HEADER}\n")).is_ok());
        assert!(matches!(
            check_header("MeasureId,ProbeID,Temperature"),
            Err(SchemaError::HeaderMismatch(_))
        ));
    }
}
