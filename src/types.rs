//! Core types for the heart-rate ETL pipeline
//!
//! This module defines the data structures that flow through each stage:
//! raw recordings, the per-recording artifacts derived from them, and the
//! calendar rows handed to the rendering layer.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Timestamp format used for artifact identities (`2023-01-01-070000`)
pub const ARTIFACT_KEY_FORMAT: &str = "%Y-%m-%d-%H%M%S";

/// Format a recording timestamp as an artifact identity at second precision
pub fn artifact_key(recorded_at: &NaiveDateTime) -> String {
    recorded_at.format(ARTIFACT_KEY_FORMAT).to_string()
}

/// Parse an artifact identity back into a timestamp
pub fn parse_artifact_key(key: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(key, ARTIFACT_KEY_FORMAT).ok()
}

/// A single heart-rate reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartRateSample {
    /// Elapsed seconds since the recording started
    pub offset_s: f64,
    /// Beats per minute
    pub heart_rate: f64,
}

impl HeartRateSample {
    pub fn new(offset_s: f64, heart_rate: f64) -> Self {
        Self {
            offset_s,
            heart_rate,
        }
    }
}

/// One ingested device export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    /// Path the recording was read from
    pub source_path: PathBuf,
    /// Capture time taken from the file content (the canonical identity)
    pub recorded_at: NaiveDateTime,
    /// Samples ordered by offset
    pub samples: Vec<HeartRateSample>,
}

impl Recording {
    /// Artifact identity derived from the content timestamp
    pub fn key(&self) -> String {
        artifact_key(&self.recorded_at)
    }

    /// Elapsed seconds between the first and last sample
    pub fn duration_s(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.offset_s - first.offset_s,
            _ => 0.0,
        }
    }
}

/// Time spent inside one heart-rate band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneTime {
    /// Band label, e.g. `152_173`
    pub label: String,
    pub minutes: f64,
}

/// Derived statistics for one recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryArtifact {
    pub recorded_at: NaiveDateTime,
    /// Largest heart-rate drop over any 60 second window
    pub recovery_60s: Option<f64>,
    /// Largest heart-rate drop over any 120 second window
    pub recovery_120s: Option<f64>,
    /// Largest heart-rate drop over any 180 second window
    pub recovery_180s: Option<f64>,
    /// Minutes per zone, in band order
    pub zone_minutes: Vec<ZoneTime>,
}

impl SummaryArtifact {
    pub fn key(&self) -> String {
        artifact_key(&self.recorded_at)
    }

    /// Minutes for a zone label, if the band exists
    pub fn zone(&self, label: &str) -> Option<f64> {
        self.zone_minutes
            .iter()
            .find(|z| z.label == label)
            .map(|z| z.minutes)
    }

    /// Total minutes across every zone
    pub fn total_zone_minutes(&self) -> f64 {
        self.zone_minutes.iter().map(|z| z.minutes).sum()
    }
}

/// Per-second heart-rate trace for one recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesArtifact {
    pub recorded_at: NaiveDateTime,
    pub samples: Vec<HeartRateSample>,
}

impl SeriesArtifact {
    pub fn key(&self) -> String {
        artifact_key(&self.recorded_at)
    }
}

/// A workout entry scraped from the training log site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkoutRecord {
    /// Session links relative to the workout site
    pub urls: Vec<String>,
    pub title: String,
    pub detail: String,
}

/// Title used for days without a logged workout
pub const REST_DAY_TITLE: &str = "Rest day";

impl WorkoutRecord {
    /// Sentinel entry for a day without a logged workout
    pub fn rest_day() -> Self {
        Self {
            urls: Vec::new(),
            title: REST_DAY_TITLE.to_string(),
            detail: String::new(),
        }
    }

    pub fn is_rest_day(&self) -> bool {
        self.urls.is_empty() && self.title == REST_DAY_TITLE && self.detail.is_empty()
    }
}

/// Workout entries keyed by calendar day
pub type WorkoutLog = BTreeMap<NaiveDate, WorkoutRecord>;

/// One night of sleep from the sleep tracker export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepRecord {
    /// Night the record is attributed to
    pub date: NaiveDate,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub deep_minutes: Option<f64>,
    pub rem_minutes: Option<f64>,
    pub light_minutes: Option<f64>,
    pub awake_minutes: Option<f64>,
}

impl SleepRecord {
    /// Deep + REM + light sleep, or `None` when no stage was recorded
    pub fn time_asleep(&self) -> Option<f64> {
        let stages = [self.deep_minutes, self.rem_minutes, self.light_minutes];
        if stages.iter().all(Option::is_none) {
            return None;
        }
        Some(stages.iter().flatten().sum())
    }
}

/// Sleep figures attached to a calendar row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepSummary {
    pub deep_minutes: Option<f64>,
    pub rem_minutes: Option<f64>,
    pub light_minutes: Option<f64>,
    pub awake_minutes: Option<f64>,
    pub time_asleep_minutes: Option<f64>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    /// Bedtime as a fractional clock hour
    pub start_hour: Option<f64>,
    /// Wake time as a fractional clock hour
    pub end_hour: Option<f64>,
}

/// One calendar day of merged data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedCalendarRow {
    pub date: NaiveDate,
    /// Number of heart-rate recordings captured that day
    pub recording_count: usize,
    pub recovery_60s: Option<f64>,
    pub recovery_120s: Option<f64>,
    pub recovery_180s: Option<f64>,
    /// `None` when no recording exists, zero-minute bands are kept
    pub zone_minutes: Option<Vec<ZoneTime>>,
    /// Zone minutes summed over the seven days ending on this row
    pub zone_minutes_7day: Option<Vec<ZoneTime>>,
    /// Logged workout, or the rest day sentinel
    pub workout: WorkoutRecord,
    pub sleep: Option<SleepSummary>,
    /// Mean time asleep over the seven days ending on this row
    pub sleep_7day_avg: Option<f64>,
    /// Whether a heart-rate trace is available for this day
    pub has_series: bool,
}

/// A heart-rate point prepared for detail display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusPoint {
    pub offset_s: f64,
    pub heart_rate: f64,
    /// Elapsed time as `HH:MM:SS`
    pub clock: String,
}

/// The series selected as the primary detail view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusSeries {
    pub date: NaiveDate,
    pub recorded_at: NaiveDateTime,
    pub points: Vec<FocusPoint>,
}
