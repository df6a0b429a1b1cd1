//! Artifact encoding and storage
//!
//! Each recording produces one summary CSV and one series CSV, both named
//! `<recorded_at:%Y-%m-%d-%H%M%S>.csv`. Files are created with create-new
//! semantics: an artifact is never overwritten, and its presence on disk is
//! the cache signal for later runs.

use crate::error::EtlError;
use crate::series::SeriesExporter;
use crate::summary::SummaryComputer;
use crate::tabular::CsvTable;
use crate::types::{
    parse_artifact_key, HeartRateSample, Recording, SeriesArtifact, SummaryArtifact, ZoneTime,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Extension shared by every artifact
pub const ARTIFACT_EXTENSION: &str = "csv";

/// Timestamp layout of the summary `timestamp` column
const SUMMARY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SUMMARY_TIMESTAMP_COLUMN: &str = "timestamp";
const RECOVERY_COLUMNS: [&str; 3] = ["60_sec_rec", "120_sec_rec", "180_sec_rec"];
const SERIES_COLUMNS: [&str; 2] = ["offset_s", "heart_rate"];

/// Which artifact a pipeline stage produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Summary,
    Series,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Summary => "summary",
            ArtifactKind::Series => "series",
        }
    }
}

/// Turns a recording into the CSV body of one artifact
pub trait ArtifactWriter: Sync {
    fn kind(&self) -> ArtifactKind;

    fn render(&self, recording: &Recording) -> Result<String, EtlError>;
}

impl ArtifactWriter for SummaryComputer {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Summary
    }

    fn render(&self, recording: &Recording) -> Result<String, EtlError> {
        Ok(encode_summary(&self.compute(recording)?))
    }
}

impl ArtifactWriter for SeriesExporter {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Series
    }

    fn render(&self, recording: &Recording) -> Result<String, EtlError> {
        Ok(encode_series(&self.export(recording)?))
    }
}

/// Artifact file path for an identity inside `dir`
pub fn artifact_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.{}", key, ARTIFACT_EXTENSION))
}

/// Write a new artifact. Fails with [`EtlError::ArtifactCollision`] if the
/// file already exists.
pub fn write_new(path: &Path, key: &str, contents: &str) -> Result<(), EtlError> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(EtlError::ArtifactCollision {
                key: key.to_string(),
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    if let Err(e) = file.write_all(contents.as_bytes()).and_then(|_| file.sync_all()) {
        // A half-written file would read as a cache hit next run
        drop(file);
        let _ = fs::remove_file(path);
        return Err(e.into());
    }

    Ok(())
}

fn format_optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn parse_optional(cell: &str, column: &str) -> Result<Option<f64>, EtlError> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    cell.parse::<f64>()
        .map(Some)
        .map_err(|_| EtlError::InvalidArtifact(format!("column {}: '{}' is not a number", column, cell)))
}

fn parse_required(cell: &str, column: &str) -> Result<f64, EtlError> {
    parse_optional(cell, column)?
        .ok_or_else(|| EtlError::InvalidArtifact(format!("column {} is empty", column)))
}

/// Render a summary as a single-row CSV
pub fn encode_summary(summary: &SummaryArtifact) -> String {
    let mut headers = vec![SUMMARY_TIMESTAMP_COLUMN.to_string()];
    headers.extend(RECOVERY_COLUMNS.iter().map(|c| c.to_string()));
    headers.extend(summary.zone_minutes.iter().map(|z| z.label.clone()));

    let mut row = vec![summary
        .recorded_at
        .format(SUMMARY_TIMESTAMP_FORMAT)
        .to_string()];
    row.push(format_optional(summary.recovery_60s));
    row.push(format_optional(summary.recovery_120s));
    row.push(format_optional(summary.recovery_180s));
    row.extend(summary.zone_minutes.iter().map(|z| z.minutes.to_string()));

    let mut table = CsvTable::new(headers);
    table.push_row(row);
    table.to_csv()
}

/// Parse a summary CSV. Columns after the recovery columns are zone labels.
pub fn decode_summary(text: &str) -> Result<SummaryArtifact, EtlError> {
    let table = CsvTable::parse(text)?;

    let ts_col = table
        .column(SUMMARY_TIMESTAMP_COLUMN)
        .ok_or_else(|| EtlError::InvalidArtifact("missing timestamp column".to_string()))?;
    let recovery_cols = RECOVERY_COLUMNS
        .iter()
        .map(|name| {
            table
                .column(name)
                .ok_or_else(|| EtlError::InvalidArtifact(format!("missing column {}", name)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let row = match table.rows.as_slice() {
        [row] => row,
        rows => {
            return Err(EtlError::InvalidArtifact(format!(
                "summary must have exactly one row, found {}",
                rows.len()
            )))
        }
    };

    let recorded_at = NaiveDateTime::parse_from_str(row[ts_col].trim(), SUMMARY_TIMESTAMP_FORMAT)
        .map_err(|e| EtlError::DateParse(format!("summary timestamp '{}': {}", row[ts_col], e)))?;

    let mut zone_minutes = Vec::new();
    for (index, header) in table.headers.iter().enumerate() {
        if index == ts_col || recovery_cols.contains(&index) {
            continue;
        }
        zone_minutes.push(ZoneTime {
            label: header.clone(),
            minutes: parse_required(&row[index], header)?,
        });
    }

    Ok(SummaryArtifact {
        recorded_at,
        recovery_60s: parse_optional(&row[recovery_cols[0]], RECOVERY_COLUMNS[0])?,
        recovery_120s: parse_optional(&row[recovery_cols[1]], RECOVERY_COLUMNS[1])?,
        recovery_180s: parse_optional(&row[recovery_cols[2]], RECOVERY_COLUMNS[2])?,
        zone_minutes,
    })
}

/// Render a series as `offset_s,heart_rate` rows
pub fn encode_series(series: &SeriesArtifact) -> String {
    let mut table = CsvTable::new(SERIES_COLUMNS.iter().map(|c| c.to_string()).collect());
    for sample in &series.samples {
        table.push_row(vec![
            sample.offset_s.to_string(),
            sample.heart_rate.to_string(),
        ]);
    }
    table.to_csv()
}

/// Parse a series CSV. The timestamp is not stored in the body; pass the one
/// taken from the file name.
pub fn decode_series(text: &str, recorded_at: NaiveDateTime) -> Result<SeriesArtifact, EtlError> {
    let table = CsvTable::parse(text)?;

    let offset_col = table
        .column(SERIES_COLUMNS[0])
        .ok_or_else(|| EtlError::InvalidArtifact("missing offset_s column".to_string()))?;
    let hr_col = table
        .column(SERIES_COLUMNS[1])
        .ok_or_else(|| EtlError::InvalidArtifact("missing heart_rate column".to_string()))?;

    let samples = table
        .rows
        .iter()
        .map(|row| {
            Ok(HeartRateSample::new(
                parse_required(&row[offset_col], SERIES_COLUMNS[0])?,
                parse_required(&row[hr_col], SERIES_COLUMNS[1])?,
            ))
        })
        .collect::<Result<Vec<_>, EtlError>>()?;

    Ok(SeriesArtifact {
        recorded_at,
        samples,
    })
}

/// Artifact files in `dir`, sorted by name
pub fn list_artifacts(dir: &Path) -> Result<Vec<PathBuf>, EtlError> {
    let entries = fs::read_dir(dir).map_err(|e| {
        EtlError::Configuration(format!("cannot read {}: {}", dir.display(), e))
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_artifact = path.is_file()
            && path.extension().and_then(|e| e.to_str()) == Some(ARTIFACT_EXTENSION);
        if is_artifact {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Load every summary artifact in `dir`. Invalid files are logged and skipped.
pub fn load_summaries(dir: &Path) -> Result<Vec<SummaryArtifact>, EtlError> {
    let mut summaries = Vec::new();
    for path in list_artifacts(dir)? {
        match fs::read_to_string(&path)
            .map_err(EtlError::from)
            .and_then(|text| decode_summary(&text))
        {
            Ok(summary) => summaries.push(summary),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable summary artifact"),
        }
    }
    summaries.sort_by_key(|s| s.recorded_at);
    Ok(summaries)
}

/// Load every series artifact in `dir`. Invalid files are logged and skipped.
pub fn load_series(dir: &Path) -> Result<Vec<SeriesArtifact>, EtlError> {
    let mut series = Vec::new();
    for path in list_artifacts(dir)? {
        let recorded_at = match path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(parse_artifact_key)
        {
            Some(ts) => ts,
            None => {
                warn!(path = %path.display(), "skipping series artifact with unrecognised name");
                continue;
            }
        };

        match fs::read_to_string(&path)
            .map_err(EtlError::from)
            .and_then(|text| decode_series(&text, recorded_at))
        {
            Ok(artifact) => series.push(artifact),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable series artifact"),
        }
    }
    series.sort_by_key(|s| s.recorded_at);
    Ok(series)
}
