//! Sleep log source
//!
//! Reads the sleep tracker's CSV export: one row per night with stage
//! durations in minutes and bed/wake timestamps. Columns beyond the ones used
//! here are ignored.

use crate::adapters::parse_timestamp;
use crate::error::EtlError;
use crate::tabular::CsvTable;
use crate::types::SleepRecord;
use chrono::NaiveDate;
use std::fs;
use std::path::Path;

const DATE_COLUMN: &str = "date";

/// Load sleep records from a CSV export
pub fn load_sleep_log(path: &Path) -> Result<Vec<SleepRecord>, EtlError> {
    let text = fs::read_to_string(path).map_err(|e| {
        EtlError::ExternalSourceUnavailable(format!("sleep log {}: {}", path.display(), e))
    })?;
    parse_sleep_log(&text)
}

/// Parse sleep records from CSV text
pub fn parse_sleep_log(text: &str) -> Result<Vec<SleepRecord>, EtlError> {
    let table = CsvTable::parse(text)?;

    let date_col = table
        .column(DATE_COLUMN)
        .ok_or_else(|| EtlError::InvalidArtifact("sleep log has no date column".to_string()))?;
    let col = |name: &str| table.column(name);
    let (start_col, end_col) = (col("start"), col("end"));
    let (deep_col, rem_col, light_col, awake_col) =
        (col("deep"), col("rem"), col("light"), col("awake"));

    let mut records = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let cell = move |index: Option<usize>| index.map(|i| row[i].trim()).filter(|c| !c.is_empty());

        records.push(SleepRecord {
            date: parse_night(&row[date_col])?,
            start: cell(start_col).and_then(parse_timestamp),
            end: cell(end_col).and_then(parse_timestamp),
            deep_minutes: parse_minutes(cell(deep_col), "deep")?,
            rem_minutes: parse_minutes(cell(rem_col), "rem")?,
            light_minutes: parse_minutes(cell(light_col), "light")?,
            awake_minutes: parse_minutes(cell(awake_col), "awake")?,
        });
    }

    records.sort_by_key(|r| r.date);
    Ok(records)
}

/// Accepts a bare date or a timestamp whose date part is the night
fn parse_night(raw: &str) -> Result<NaiveDate, EtlError> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(raw).map(|ts| ts.date()))
        .ok_or_else(|| EtlError::DateParse(format!("sleep date '{}'", raw)))
}

fn parse_minutes(cell: Option<&str>, column: &str) -> Result<Option<f64>, EtlError> {
    cell.map(|c| {
        c.parse::<f64>().map_err(|_| {
            EtlError::InvalidArtifact(format!("sleep column {}: '{}' is not a number", column, c))
        })
    })
    .transpose()
}
