//! JSON device export adapter
//!
//! Reads the JSON export written by the device companion app:
//!
//! ```json
//! {
//!   "recorded_at": "2023-01-01T07:00:00",
//!   "samples": [{ "offset_s": 0, "heart_rate": 92 }]
//! }
//! ```

use crate::error::EtlError;
use crate::types::{HeartRateSample, Recording};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use super::RecordSource;

/// Accepted `recorded_at` layouts
const TIMESTAMP_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d-%H%M%S",
];

/// JSON export adapter
pub struct JsonRecordSource;

impl RecordSource for JsonRecordSource {
    fn read(&self, path: &Path) -> Result<Recording, EtlError> {
        let content = fs::read_to_string(path)?;
        let export: DeviceExport = serde_json::from_str(&content)?;

        let recorded_at = parse_timestamp(&export.recorded_at).ok_or_else(|| {
            EtlError::DateParse(format!(
                "{}: unrecognised recorded_at '{}'",
                path.display(),
                export.recorded_at
            ))
        })?;

        let samples = export
            .samples
            .into_iter()
            .map(|s| HeartRateSample::new(s.offset_s, s.heart_rate))
            .collect();

        Ok(Recording {
            source_path: path.to_path_buf(),
            recorded_at,
            samples,
        })
    }
}

/// Parse a device or export timestamp, dropping a trailing `Z`
pub(crate) fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim().trim_end_matches('Z');
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
}

#[derive(Debug, Deserialize)]
struct DeviceExport {
    recorded_at: String,
    #[serde(default)]
    samples: Vec<DeviceSample>,
}

#[derive(Debug, Deserialize)]
struct DeviceSample {
    offset_s: f64,
    heart_rate: f64,
}
