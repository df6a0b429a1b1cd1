//! Heart-rate trace export
//!
//! Offsets coming out of the device are already elapsed seconds, so exporting
//! a series is validation plus a copy. The device sampling cadence is kept.

use crate::error::EtlError;
use crate::summary::validate_samples;
use crate::types::{Recording, SeriesArtifact};

/// Exports [`SeriesArtifact`]s from recordings
#[derive(Debug, Clone, Copy, Default)]
pub struct SeriesExporter;

impl SeriesExporter {
    pub fn export(&self, recording: &Recording) -> Result<SeriesArtifact, EtlError> {
        validate_samples(
            &recording.samples,
            &recording.source_path.display().to_string(),
        )?;

        Ok(SeriesArtifact {
            recorded_at: recording.recorded_at,
            samples: recording.samples.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HeartRateSample;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn recording(samples: Vec<HeartRateSample>) -> Recording {
        Recording {
            source_path: PathBuf::from("2023-01-03-181500.json"),
            recorded_at: NaiveDate::from_ymd_opt(2023, 1, 3)
                .unwrap()
                .and_hms_opt(18, 15, 0)
                .unwrap(),
            samples,
        }
    }

    #[test]
    fn test_export_preserves_cadence() {
        let samples = vec![
            HeartRateSample::new(0.0, 101.0),
            HeartRateSample::new(0.9, 102.0),
            HeartRateSample::new(3.2, 104.0),
        ];
        let series = SeriesExporter.export(&recording(samples.clone())).unwrap();

        assert_eq!(series.samples, samples);
        assert_eq!(series.key(), "2023-01-03-181500");
    }

    #[test]
    fn test_export_rejects_empty() {
        assert!(matches!(
            SeriesExporter.export(&recording(vec![])),
            Err(EtlError::EmptyRecording(_))
        ));
    }

    #[test]
    fn test_export_rejects_backwards_offsets() {
        let samples = vec![
            HeartRateSample::new(10.0, 101.0),
            HeartRateSample::new(9.0, 102.0),
        ];
        assert!(matches!(
            SeriesExporter.export(&recording(samples)),
            Err(EtlError::MalformedRecording(_))
        ));
    }
}
