//! Summary statistics for a single recording
//!
//! This module reduces a heart-rate trace into the fixed figures shown on the
//! dashboard:
//! - Recovery: the largest drop in heart rate over 60, 120 and 180 seconds
//! - Zone minutes: time spent inside each heart-rate band

use crate::error::EtlError;
use crate::types::{HeartRateSample, Recording, SummaryArtifact, ZoneTime};

/// Recovery windows in seconds, in artifact column order
pub const RECOVERY_WINDOWS_S: [f64; 3] = [60.0, 120.0, 180.0];

/// Tolerance when matching a window end against sample offsets
const OFFSET_TOLERANCE_S: f64 = 1e-6;

/// Ordered heart-rate cutoffs splitting the bpm axis into contiguous bands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneBands {
    thresholds: Vec<u16>,
}

impl ZoneBands {
    /// Create bands from strictly increasing cutoffs
    pub fn new(thresholds: Vec<u16>) -> Result<Self, EtlError> {
        if thresholds.is_empty() {
            return Err(EtlError::Configuration(
                "at least one zone threshold is required".to_string(),
            ));
        }
        if thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(EtlError::Configuration(format!(
                "zone thresholds must be strictly increasing: {:?}",
                thresholds
            )));
        }
        if thresholds[0] == 0 {
            return Err(EtlError::Configuration(
                "zone thresholds must be above 0 bpm".to_string(),
            ));
        }
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> &[u16] {
        &self.thresholds
    }

    /// Band labels from lowest to highest, e.g. `_137`, `138_151`, `152_173`, `174_`
    pub fn labels(&self) -> Vec<String> {
        let mut labels = Vec::with_capacity(self.thresholds.len() + 1);
        labels.push(format!("_{}", self.thresholds[0] - 1));
        for pair in self.thresholds.windows(2) {
            labels.push(format!("{}_{}", pair[0], pair[1] - 1));
        }
        if let Some(last) = self.thresholds.last() {
            labels.push(format!("{}_", last));
        }
        labels
    }

    /// Index of the band containing `heart_rate`
    pub fn band_of(&self, heart_rate: f64) -> usize {
        self.thresholds
            .iter()
            .take_while(|&&t| f64::from(t) <= heart_rate)
            .count()
    }
}

/// Computes [`SummaryArtifact`]s from recordings
#[derive(Debug, Clone)]
pub struct SummaryComputer {
    bands: ZoneBands,
}

impl SummaryComputer {
    pub fn new(bands: ZoneBands) -> Self {
        Self { bands }
    }

    pub fn bands(&self) -> &ZoneBands {
        &self.bands
    }

    /// Compute the summary row for one recording
    pub fn compute(&self, recording: &Recording) -> Result<SummaryArtifact, EtlError> {
        let context = recording.source_path.display().to_string();
        validate_samples(&recording.samples, &context)?;

        let samples = &recording.samples;
        Ok(SummaryArtifact {
            recorded_at: recording.recorded_at,
            recovery_60s: max_recovery(samples, RECOVERY_WINDOWS_S[0]),
            recovery_120s: max_recovery(samples, RECOVERY_WINDOWS_S[1]),
            recovery_180s: max_recovery(samples, RECOVERY_WINDOWS_S[2]),
            zone_minutes: zone_minutes(samples, &self.bands),
        })
    }
}

/// Reject empty traces and traces whose offsets do not strictly increase
pub fn validate_samples(samples: &[HeartRateSample], context: &str) -> Result<(), EtlError> {
    if samples.is_empty() {
        return Err(EtlError::EmptyRecording(context.to_string()));
    }

    for (index, sample) in samples.iter().enumerate() {
        if !sample.offset_s.is_finite() || !sample.heart_rate.is_finite() {
            return Err(EtlError::MalformedRecording(format!(
                "{}: non-finite value at sample {}",
                context, index
            )));
        }
    }

    if let Some(index) = samples
        .windows(2)
        .position(|w| w[1].offset_s <= w[0].offset_s)
    {
        return Err(EtlError::MalformedRecording(format!(
            "{}: offset {} at sample {} does not increase",
            context,
            samples[index + 1].offset_s,
            index + 1
        )));
    }

    Ok(())
}

/// Largest `hr(t) - hr(t + window)` over every sample that has a full window
/// after it. The later reading is the last sample at or before `t + window`.
fn max_recovery(samples: &[HeartRateSample], window_s: f64) -> Option<f64> {
    let last_offset = samples.last()?.offset_s;
    let mut best: Option<f64> = None;
    let mut cursor = 0;

    for sample in samples {
        // Window end, widened so float drift cannot drop a window that ends on a sample
        let target = sample.offset_s + window_s + OFFSET_TOLERANCE_S;
        if target - 2.0 * OFFSET_TOLERANCE_S > last_offset {
            break;
        }

        // Targets only move forward, so the cursor never rewinds
        while cursor + 1 < samples.len() && samples[cursor + 1].offset_s <= target {
            cursor += 1;
        }

        let drop = sample.heart_rate - samples[cursor].heart_rate;
        best = Some(best.map_or(drop, |b: f64| b.max(drop)));
    }

    best
}

/// Minutes per band. Each gap between consecutive samples counts toward the
/// band of the earlier sample.
fn zone_minutes(samples: &[HeartRateSample], bands: &ZoneBands) -> Vec<ZoneTime> {
    let labels = bands.labels();
    let mut seconds = vec![0.0; labels.len()];

    for pair in samples.windows(2) {
        let band = bands.band_of(pair[0].heart_rate);
        seconds[band] += pair[1].offset_s - pair[0].offset_s;
    }

    labels
        .into_iter()
        .zip(seconds)
        .map(|(label, secs)| ZoneTime {
            label,
            minutes: secs / 60.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn recording(samples: Vec<HeartRateSample>) -> Recording {
        Recording {
            source_path: PathBuf::from("2023-01-01-070000.json"),
            recorded_at: NaiveDate::from_ymd_opt(2023, 1, 1)
                .unwrap()
                .and_hms_opt(7, 0, 0)
                .unwrap(),
            samples,
        }
    }

    fn default_computer() -> SummaryComputer {
        SummaryComputer::new(ZoneBands::new(vec![138, 152, 174]).unwrap())
    }

    /// Climb from 100 to 180 bpm over 100 s, then fall 0.5 bpm/s until 300 s
    fn peak_and_recovery() -> Vec<HeartRateSample> {
        (0..=300)
            .map(|t| {
                let t = t as f64;
                let hr = if t <= 100.0 {
                    100.0 + 0.8 * t
                } else {
                    180.0 - 0.5 * (t - 100.0)
                };
                HeartRateSample::new(t, hr)
            })
            .collect()
    }

    #[test]
    fn test_zone_labels() {
        let bands = ZoneBands::new(vec![138, 152, 174]).unwrap();
        assert_eq!(bands.labels(), vec!["_137", "138_151", "152_173", "174_"]);
        assert_eq!(bands.band_of(120.0), 0);
        assert_eq!(bands.band_of(138.0), 1);
        assert_eq!(bands.band_of(173.9), 2);
        assert_eq!(bands.band_of(174.0), 3);
    }

    #[test]
    fn test_zone_bands_reject_bad_thresholds() {
        assert!(ZoneBands::new(vec![]).is_err());
        assert!(ZoneBands::new(vec![150, 150]).is_err());
        assert!(ZoneBands::new(vec![0, 100]).is_err());
    }

    #[test]
    fn test_recovery_peak_shape() {
        let summary = default_computer()
            .compute(&recording(peak_and_recovery()))
            .unwrap();

        // After the peak the trace falls 0.5 bpm/s: 30, 60 and 90 bpm per window
        assert!((summary.recovery_60s.unwrap() - 30.0).abs() < 1e-9);
        assert!((summary.recovery_120s.unwrap() - 60.0).abs() < 1e-9);
        assert!((summary.recovery_180s.unwrap() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_recovery_negative_when_rising() {
        let samples = (0..=120)
            .map(|t| HeartRateSample::new(t as f64, 100.0 + t as f64))
            .collect();
        let summary = default_computer().compute(&recording(samples)).unwrap();

        assert_eq!(summary.recovery_60s, Some(-60.0));
        assert_eq!(summary.recovery_120s, Some(-120.0));
        assert_eq!(summary.recovery_180s, None);
    }

    #[test]
    fn test_recovery_holds_last_sample_on_irregular_cadence() {
        let samples = vec![
            HeartRateSample::new(0.0, 170.0),
            HeartRateSample::new(45.0, 160.0),
            HeartRateSample::new(95.0, 140.0),
        ];
        let summary = default_computer().compute(&recording(samples)).unwrap();

        // t=0 looks up t=60 -> held at 160; t=45 is not followed by a full minute
        assert_eq!(summary.recovery_60s, Some(10.0));
        assert_eq!(summary.recovery_120s, None);
    }

    #[test]
    fn test_recovery_window_ending_on_last_sample_at_tenth_second_cadence() {
        // 68.1 + 60 rounds above 128.1 in f64
        let samples: Vec<HeartRateSample> = (681..=1281)
            .map(|k| {
                let hr = if k == 1281 { 140.0 } else { 170.0 };
                HeartRateSample::new(k as f64 * 0.1, hr)
            })
            .collect();

        assert_eq!(max_recovery(&samples, 60.0), Some(30.0));
        assert_eq!(max_recovery(&samples, 120.0), None);
    }

    #[test]
    fn test_zone_minutes_irregular_intervals() {
        let samples = vec![
            HeartRateSample::new(0.0, 120.0),
            HeartRateSample::new(10.0, 140.0),
            HeartRateSample::new(25.0, 160.0),
            HeartRateSample::new(45.0, 180.0),
            HeartRateSample::new(50.0, 170.0),
            HeartRateSample::new(70.0, 130.0),
        ];
        let rec = recording(samples);
        let summary = default_computer().compute(&rec).unwrap();

        assert!((summary.zone("_137").unwrap() - 10.0 / 60.0).abs() < 1e-12);
        assert!((summary.zone("138_151").unwrap() - 15.0 / 60.0).abs() < 1e-12);
        assert!((summary.zone("152_173").unwrap() - 40.0 / 60.0).abs() < 1e-12);
        assert!((summary.zone("174_").unwrap() - 5.0 / 60.0).abs() < 1e-12);
        assert!((summary.total_zone_minutes() - rec.duration_s() / 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_zone_minutes_sum_to_duration() {
        let rec = recording(peak_and_recovery());
        let summary = default_computer().compute(&rec).unwrap();

        assert_eq!(summary.zone_minutes.len(), 4);
        assert!((summary.total_zone_minutes() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_sample_recording() {
        let summary = default_computer()
            .compute(&recording(vec![HeartRateSample::new(0.0, 150.0)]))
            .unwrap();

        assert_eq!(summary.recovery_60s, None);
        assert_eq!(summary.total_zone_minutes(), 0.0);
        assert_eq!(summary.zone("138_151"), Some(0.0));
    }

    #[test]
    fn test_empty_recording() {
        let result = default_computer().compute(&recording(vec![]));
        assert!(matches!(result, Err(EtlError::EmptyRecording(_))));
    }

    #[test]
    fn test_non_monotonic_offsets() {
        let samples = vec![
            HeartRateSample::new(0.0, 120.0),
            HeartRateSample::new(5.0, 121.0),
            HeartRateSample::new(5.0, 122.0),
        ];
        let result = default_computer().compute(&recording(samples));
        assert!(matches!(result, Err(EtlError::MalformedRecording(_))));
    }

    #[test]
    fn test_non_finite_heart_rate() {
        let samples = vec![
            HeartRateSample::new(0.0, 120.0),
            HeartRateSample::new(1.0, f64::NAN),
        ];
        let result = default_computer().compute(&recording(samples));
        assert!(matches!(result, Err(EtlError::MalformedRecording(_))));
    }
}
