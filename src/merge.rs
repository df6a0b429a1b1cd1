//! Calendar merge
//!
//! This module aligns independently produced per-day data onto one calendar:
//! - Summary rows (recovery, zone minutes), several per day allowed
//! - Heart-rate traces, keyed by day, with one selected as the focus series
//! - Workout log entries, with a rest day sentinel for days without one
//! - Sleep records, with a rolling seven day average
//!
//! The calendar is rebuilt from scratch on every run. Missing numeric data is
//! `None`, never zero.

use crate::error::EtlError;
use crate::types::{
    FocusPoint, FocusSeries, MergedCalendarRow, SeriesArtifact, SleepRecord, SleepSummary,
    SummaryArtifact, WorkoutLog, WorkoutRecord, ZoneTime,
};
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Length of the rolling zone and sleep windows, in days
pub const ROLLING_WINDOW_DAYS: i64 = 7;

/// Inclusive range of calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, EtlError> {
        if start > end {
            return Err(EtlError::Configuration(format!(
                "date range starts after it ends: {} > {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of days in the range
    pub fn len(&self) -> usize {
        ((self.end - self.start).num_days() + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Every day from start to end
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

#[derive(Deserialize)]
struct RawDateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = EtlError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        DateRange::new(raw.start, raw.end)
    }
}

/// Which recording's trace becomes the primary detail series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "date")]
pub enum FocusSelection {
    /// The most recent day with a trace
    #[default]
    Latest,
    /// A specific day
    Date(NaiveDate),
}

/// Everything the merger consumes
#[derive(Debug, Clone, Copy)]
pub struct CalendarInputs<'a> {
    pub summaries: &'a [SummaryArtifact],
    pub series: &'a [SeriesArtifact],
    pub workouts: &'a WorkoutLog,
    pub sleep: &'a [SleepRecord],
}

/// Merged dataset handed to the rendering layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedCalendar {
    pub range: DateRange,
    /// One row per day of `range`, in date order
    pub rows: Vec<MergedCalendarRow>,
    pub focus: Option<FocusSeries>,
    /// Traces for every day in range that has one
    pub series_by_date: BTreeMap<NaiveDate, SeriesArtifact>,
}

impl MergedCalendar {
    pub fn row(&self, date: NaiveDate) -> Option<&MergedCalendarRow> {
        if !self.range.contains(date) {
            return None;
        }
        self.rows.get((date - self.range.start).num_days() as usize)
    }

    /// Trace for `date`, for callers switching the detail view
    pub fn series_for(&self, date: NaiveDate) -> Option<&SeriesArtifact> {
        self.series_by_date.get(&date)
    }

    pub fn to_json(&self) -> Result<String, EtlError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Aligns artifacts and external records onto a calendar
#[derive(Debug, Clone)]
pub struct CalendarMerger {
    range: DateRange,
    focus: FocusSelection,
}

impl CalendarMerger {
    pub fn new(range: DateRange, focus: FocusSelection) -> Self {
        Self { range, focus }
    }

    pub fn merge(&self, inputs: CalendarInputs<'_>) -> MergedCalendar {
        let daily_summaries = group_summaries(inputs.summaries);
        let nightly_sleep = group_sleep(inputs.sleep);
        let series_by_date = latest_series_per_day(inputs.series);

        let rows = self
            .range
            .days()
            .map(|date| {
                let day = daily_summaries.get(&date);
                let workout = inputs
                    .workouts
                    .get(&date)
                    .cloned()
                    .unwrap_or_else(WorkoutRecord::rest_day);

                MergedCalendarRow {
                    date,
                    recording_count: day.map_or(0, |d| d.recording_count),
                    recovery_60s: day.and_then(|d| d.recovery[0]),
                    recovery_120s: day.and_then(|d| d.recovery[1]),
                    recovery_180s: day.and_then(|d| d.recovery[2]),
                    zone_minutes: day.map(|d| d.zone_minutes.clone()),
                    zone_minutes_7day: rolling_zone_minutes(&daily_summaries, date),
                    workout,
                    sleep: nightly_sleep.get(&date).map(sleep_summary),
                    sleep_7day_avg: rolling_sleep_average(&nightly_sleep, date),
                    has_series: series_by_date.contains_key(&date),
                }
            })
            .collect();

        let series_by_date: BTreeMap<NaiveDate, SeriesArtifact> = series_by_date
            .into_iter()
            .filter(|(date, _)| self.range.contains(*date))
            .collect();

        let focus = self.select_focus(&series_by_date);

        MergedCalendar {
            range: self.range,
            rows,
            focus,
            series_by_date,
        }
    }

    fn select_focus(&self, series: &BTreeMap<NaiveDate, SeriesArtifact>) -> Option<FocusSeries> {
        let (date, artifact) = match self.focus {
            FocusSelection::Latest => series.iter().next_back()?,
            FocusSelection::Date(date) => series.get_key_value(&date)?,
        };
        Some(focus_series(*date, artifact))
    }
}

/// Summary figures for one day, possibly from several recordings
#[derive(Debug, Clone)]
struct DaySummary {
    recording_count: usize,
    recovery: [Option<f64>; 3],
    zone_minutes: Vec<ZoneTime>,
}

fn max_option(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

/// Add `extra` into `total`, matching bands by label and keeping first-seen order
fn add_zone_minutes(total: &mut Vec<ZoneTime>, extra: &[ZoneTime]) {
    for zone in extra {
        match total.iter_mut().find(|z| z.label == zone.label) {
            Some(existing) => existing.minutes += zone.minutes,
            None => total.push(zone.clone()),
        }
    }
}

fn group_summaries(summaries: &[SummaryArtifact]) -> BTreeMap<NaiveDate, DaySummary> {
    let mut days: BTreeMap<NaiveDate, DaySummary> = BTreeMap::new();

    for summary in summaries {
        let recovery = [
            summary.recovery_60s,
            summary.recovery_120s,
            summary.recovery_180s,
        ];
        let day = days
            .entry(summary.recorded_at.date())
            .or_insert_with(|| DaySummary {
                recording_count: 0,
                recovery: [None; 3],
                zone_minutes: Vec::new(),
            });

        day.recording_count += 1;
        for (slot, value) in day.recovery.iter_mut().zip(recovery) {
            *slot = max_option(*slot, value);
        }
        add_zone_minutes(&mut day.zone_minutes, &summary.zone_minutes);
    }

    days
}

fn rolling_zone_minutes(
    days: &BTreeMap<NaiveDate, DaySummary>,
    date: NaiveDate,
) -> Option<Vec<ZoneTime>> {
    let from = date - Duration::days(ROLLING_WINDOW_DAYS - 1);
    let mut total: Option<Vec<ZoneTime>> = None;

    for day in days.range(from..=date).map(|(_, d)| d) {
        add_zone_minutes(total.get_or_insert_with(Vec::new), &day.zone_minutes);
    }

    total
}

fn add_option(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x + y),
        (x, None) => x,
        (None, y) => y,
    }
}

fn min_time(a: Option<NaiveDateTime>, b: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

fn max_time(a: Option<NaiveDateTime>, b: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

/// Combine records attributed to the same night (naps, split sessions)
fn group_sleep(records: &[SleepRecord]) -> BTreeMap<NaiveDate, SleepRecord> {
    let mut nights: BTreeMap<NaiveDate, SleepRecord> = BTreeMap::new();

    for record in records {
        match nights.get_mut(&record.date) {
            Some(night) => {
                night.start = min_time(night.start, record.start);
                night.end = max_time(night.end, record.end);
                night.deep_minutes = add_option(night.deep_minutes, record.deep_minutes);
                night.rem_minutes = add_option(night.rem_minutes, record.rem_minutes);
                night.light_minutes = add_option(night.light_minutes, record.light_minutes);
                night.awake_minutes = add_option(night.awake_minutes, record.awake_minutes);
            }
            None => {
                nights.insert(record.date, record.clone());
            }
        }
    }

    nights
}

fn clock_hour(ts: NaiveDateTime) -> f64 {
    f64::from(ts.hour()) + f64::from(ts.minute()) / 60.0 + f64::from(ts.second()) / 3600.0
}

fn sleep_summary(night: &SleepRecord) -> SleepSummary {
    SleepSummary {
        deep_minutes: night.deep_minutes,
        rem_minutes: night.rem_minutes,
        light_minutes: night.light_minutes,
        awake_minutes: night.awake_minutes,
        time_asleep_minutes: night.time_asleep(),
        start: night.start,
        end: night.end,
        start_hour: night.start.map(clock_hour),
        end_hour: night.end.map(clock_hour),
    }
}

fn rolling_sleep_average(nights: &BTreeMap<NaiveDate, SleepRecord>, date: NaiveDate) -> Option<f64> {
    let from = date - Duration::days(ROLLING_WINDOW_DAYS - 1);
    let values: Vec<f64> = nights
        .range(from..=date)
        .filter_map(|(_, night)| night.time_asleep())
        .collect();

    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Key traces by day; the latest recording of a day wins
fn latest_series_per_day(series: &[SeriesArtifact]) -> BTreeMap<NaiveDate, SeriesArtifact> {
    let mut by_date: BTreeMap<NaiveDate, SeriesArtifact> = BTreeMap::new();

    for artifact in series {
        let date = artifact.recorded_at.date();
        let replace = by_date
            .get(&date)
            .map_or(true, |current| artifact.recorded_at > current.recorded_at);
        if replace {
            by_date.insert(date, artifact.clone());
        }
    }

    by_date
}

/// Elapsed seconds as `HH:MM:SS`
fn elapsed_clock(offset_s: f64) -> String {
    let total = offset_s.max(0.0).floor() as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

fn focus_series(date: NaiveDate, artifact: &SeriesArtifact) -> FocusSeries {
    FocusSeries {
        date,
        recorded_at: artifact.recorded_at,
        points: artifact
            .samples
            .iter()
            .map(|s| FocusPoint {
                offset_s: s.offset_s,
                heart_rate: s.heart_rate,
                clock: elapsed_clock(s.offset_s),
            })
            .collect(),
    }
}
