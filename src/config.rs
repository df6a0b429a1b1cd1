//! Pipeline configuration
//!
//! Settings are loaded from a JSON document. Every field has a default so a
//! partial file (or none at all) is valid; directories are checked by
//! [`PipelineConfig::validate`] before any work starts.

use crate::error::EtlError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default heart-rate zone cutoffs (bpm)
pub const DEFAULT_ZONE_THRESHOLDS: [u16; 3] = [138, 152, 174];

/// Length of the capture timestamp devices put at the start of file names
pub const DEFAULT_FILENAME_KEY_LEN: usize = 17;

/// Configuration for an ingest + merge run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory the device app syncs exports into
    pub device_dir: PathBuf,
    /// Extension of device export files (without the dot)
    pub device_extension: String,
    /// Output directory for summary artifacts
    pub summary_dir: PathBuf,
    /// Output directory for series artifacts
    pub series_dir: PathBuf,
    /// Ordered zone cutoffs in bpm
    pub zone_thresholds: Vec<u16>,
    /// Number of leading file name characters used as the cache key
    pub filename_key_len: usize,
    /// Worker thread cap, defaults to available parallelism
    pub max_threads: Option<usize>,
    /// First day of the calendar and of workout lookups
    pub observation_start: NaiveDate,
    pub workout_urls_path: PathBuf,
    pub workout_wods_path: PathBuf,
    /// Sleep tracker export, optional
    pub sleep_csv: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            device_dir: PathBuf::from("data/device"),
            device_extension: "json".to_string(),
            summary_dir: PathBuf::from("data/heartrate_sumstat"),
            series_dir: PathBuf::from("data/heartrate_ts"),
            zone_thresholds: DEFAULT_ZONE_THRESHOLDS.to_vec(),
            filename_key_len: DEFAULT_FILENAME_KEY_LEN,
            max_threads: None,
            observation_start: NaiveDate::from_ymd_opt(2020, 9, 1).unwrap_or_default(),
            workout_urls_path: PathBuf::from("data/session_urls.json"),
            workout_wods_path: PathBuf::from("data/session_wods.json"),
            sleep_csv: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, EtlError> {
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Configuration(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, EtlError> {
        serde_json::from_str(json)
            .map_err(|e| EtlError::Configuration(format!("invalid config JSON: {}", e)))
    }

    pub fn to_json(&self) -> Result<String, EtlError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check settings and required directories
    pub fn validate(&self) -> Result<(), EtlError> {
        require_dir("device_dir", &self.device_dir)?;
        require_dir("summary_dir", &self.summary_dir)?;
        require_dir("series_dir", &self.series_dir)?;

        if self.device_extension.is_empty() {
            return Err(EtlError::Configuration(
                "device_extension must not be empty".to_string(),
            ));
        }

        if self.filename_key_len == 0 {
            return Err(EtlError::Configuration(
                "filename_key_len must be positive".to_string(),
            ));
        }

        if self.max_threads == Some(0) {
            return Err(EtlError::Configuration(
                "max_threads must be positive".to_string(),
            ));
        }

        crate::summary::ZoneBands::new(self.zone_thresholds.clone())?;

        Ok(())
    }
}

/// Fail with a configuration error unless `path` is an existing directory
pub fn require_dir(name: &str, path: &Path) -> Result<(), EtlError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(EtlError::Configuration(format!(
            "{} {} is missing or not a directory",
            name,
            path.display()
        )))
    }
}
