//! Pipeline orchestration
//!
//! This module provides the public API for the ETL. It wires the stages
//! together:
//!
//! 1. Discover device exports
//! 2. CacheIndex - skip inputs whose artifact already exists
//! 3. ParallelExecutor - parse, compute and write each pending input
//! 4. Report processed / skipped / failed counts
//!
//! and, for the dashboard, loads every artifact plus the external workout and
//! sleep logs and merges them onto a calendar.

use crate::adapters::RecordSource;
use crate::artifact::{load_series, load_summaries, write_new, ArtifactKind, ArtifactWriter};
use crate::cache::{reconcile, CacheIndex, PendingInput};
use crate::config::{require_dir, PipelineConfig};
use crate::error::EtlError;
use crate::executor::{LogProgress, ParallelExecutor, ProgressObserver, Task};
use crate::merge::{CalendarInputs, CalendarMerger, DateRange, FocusSelection, MergedCalendar};
use crate::series::SeriesExporter;
use crate::sleep::load_sleep_log;
use crate::summary::{SummaryComputer, ZoneBands};
use crate::types::SleepRecord;
use crate::workouts::{refresh_workouts, WorkoutSource, WorkoutStore};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Device exports in `dir` with the given extension, sorted by path
pub fn discover_inputs(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, EtlError> {
    require_dir("device_dir", dir)?;

    let entries = fs::read_dir(dir).map_err(|e| {
        EtlError::Configuration(format!("cannot read {}: {}", dir.display(), e))
    })?;

    let mut inputs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let matches = path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if matches {
            inputs.push(path);
        }
    }

    inputs.sort();
    Ok(inputs)
}

/// What happened to one pending input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// A new artifact was written
    Written { key: String, path: PathBuf },
    /// The content key already had an artifact before this run
    AlreadyPresent { key: String },
}

/// A per-recording failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub input: String,
    pub error: String,
}

/// Result of one pipeline stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub kind: ArtifactKind,
    pub inputs: usize,
    /// Artifacts written this run
    pub processed: usize,
    /// Inputs whose artifact already existed
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<FailureRecord>,
    /// Cache key mismatches
    pub warnings: Vec<String>,
}

/// Result of an ingest run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub run_id: String,
    pub summary: StageReport,
    pub series: StageReport,
}

/// Pending work per stage, without processing anything
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    pub inputs: usize,
    pub summary_artifacts: usize,
    pub summary_pending: usize,
    pub series_artifacts: usize,
    pub series_pending: usize,
}

/// ETL pipeline bound to one configuration and device reader
pub struct Pipeline<'s> {
    config: PipelineConfig,
    source: &'s dyn RecordSource,
    summary: SummaryComputer,
    executor: ParallelExecutor,
}

impl<'s> Pipeline<'s> {
    /// Validate the configuration and build the pipeline
    pub fn new(config: PipelineConfig, source: &'s dyn RecordSource) -> Result<Self, EtlError> {
        config.validate()?;
        let bands = ZoneBands::new(config.zone_thresholds.clone())?;
        let executor = ParallelExecutor::new(config.max_threads);

        Ok(Self {
            config,
            source,
            summary: SummaryComputer::new(bands),
            executor,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn inputs(&self) -> Result<Vec<PathBuf>, EtlError> {
        discover_inputs(&self.config.device_dir, &self.config.device_extension)
    }

    /// Count inputs and pending work for both stages
    pub fn status(&self) -> Result<PipelineStatus, EtlError> {
        let inputs = self.inputs()?;
        let summary_index = CacheIndex::open(&self.config.summary_dir, self.config.filename_key_len)?;
        let series_index = CacheIndex::open(&self.config.series_dir, self.config.filename_key_len)?;

        Ok(PipelineStatus {
            inputs: inputs.len(),
            summary_artifacts: summary_index.len(),
            summary_pending: summary_index.plan(&inputs).pending.len(),
            series_artifacts: series_index.len(),
            series_pending: series_index.plan(&inputs).pending.len(),
        })
    }

    /// Run the summary stage, then the series stage, logging progress
    pub fn ingest(&self) -> Result<IngestReport, EtlError> {
        self.ingest_with(&LogProgress { stage: "summary" }, &LogProgress { stage: "series" })
    }

    /// Run both stages with caller-supplied progress observers
    pub fn ingest_with(
        &self,
        summary_progress: &dyn ProgressObserver,
        series_progress: &dyn ProgressObserver,
    ) -> Result<IngestReport, EtlError> {
        let run_id = Uuid::new_v4().to_string();
        let inputs = self.inputs()?;
        info!(run_id = %run_id, inputs = inputs.len(), "ingest started");

        let summary = self.run_stage(
            &inputs,
            &self.summary,
            &self.config.summary_dir,
            summary_progress,
        )?;
        let series = self.run_stage(
            &inputs,
            &SeriesExporter,
            &self.config.series_dir,
            series_progress,
        )?;

        Ok(IngestReport {
            run_id,
            summary,
            series,
        })
    }

    /// Process every uncached input into `output_dir` with `writer`
    pub fn run_stage(
        &self,
        inputs: &[PathBuf],
        writer: &dyn ArtifactWriter,
        output_dir: &Path,
        progress: &dyn ProgressObserver,
    ) -> Result<StageReport, EtlError> {
        let index = CacheIndex::open(output_dir, self.config.filename_key_len)?;
        let plan = index.plan(inputs);
        let stage = writer.kind();

        info!(
            stage = stage.as_str(),
            pending = plan.pending.len(),
            cached = plan.cached.len(),
            "stage planned"
        );

        let tasks: Vec<Task<'_, StageTaskOutput>> = plan
            .pending
            .iter()
            .map(|pending| {
                let index = &index;
                Task::new(pending.path.display().to_string(), move || {
                    export_one(self.source, writer, index, pending)
                })
            })
            .collect();

        let batch = self.executor.run(tasks, progress);

        let mut report = StageReport {
            kind: stage,
            inputs: inputs.len(),
            processed: 0,
            skipped: plan.cached.len(),
            failed: 0,
            failures: Vec::new(),
            warnings: Vec::new(),
        };

        for result in batch.results {
            match result.outcome {
                Ok(output) => {
                    if let Some(warning) = output.warning {
                        warn!(stage = stage.as_str(), "{}", warning);
                        report.warnings.push(warning);
                    }
                    match output.outcome {
                        ExportOutcome::Written { .. } => report.processed += 1,
                        ExportOutcome::AlreadyPresent { .. } => report.skipped += 1,
                    }
                }
                Err(e) => {
                    warn!(stage = stage.as_str(), input = %result.label, error = %e, "recording failed");
                    report.failed += 1;
                    report.failures.push(FailureRecord {
                        input: result.label,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            stage = stage.as_str(),
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            "stage finished"
        );

        Ok(report)
    }

    /// Load artifacts and external logs and merge them onto `range`
    pub fn build_calendar(
        &self,
        range: DateRange,
        focus: FocusSelection,
        workout_source: Option<&dyn WorkoutSource>,
    ) -> Result<MergedCalendar, EtlError> {
        let summaries = load_summaries(&self.config.summary_dir)?;
        let series = load_series(&self.config.series_dir)?;

        let series_dates: Vec<NaiveDate> = series
            .iter()
            .map(|s| s.recorded_at.date())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let store = WorkoutStore::new(&self.config.workout_urls_path, &self.config.workout_wods_path);
        let workouts = refresh_workouts(
            &store,
            workout_source,
            &series_dates,
            self.config.observation_start,
        );

        let sleep = self.load_sleep();

        let calendar = CalendarMerger::new(range, focus).merge(CalendarInputs {
            summaries: &summaries,
            series: &series,
            workouts: &workouts.log,
            sleep: &sleep,
        });

        info!(
            days = calendar.rows.len(),
            summaries = summaries.len(),
            series = series.len(),
            sleep_nights = sleep.len(),
            "calendar merged"
        );

        Ok(calendar)
    }

    /// Calendar from the observation start through `today`
    pub fn build_dashboard_calendar(
        &self,
        today: NaiveDate,
        focus: FocusSelection,
        workout_source: Option<&dyn WorkoutSource>,
    ) -> Result<MergedCalendar, EtlError> {
        let range = DateRange::new(self.config.observation_start, today)?;
        self.build_calendar(range, focus, workout_source)
    }

    fn load_sleep(&self) -> Vec<SleepRecord> {
        let Some(path) = &self.config.sleep_csv else {
            return Vec::new();
        };

        match load_sleep_log(path) {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "sleep log unavailable, continuing without it");
                Vec::new()
            }
        }
    }
}

/// Task result: the outcome plus an optional cache warning
#[derive(Debug)]
struct StageTaskOutput {
    outcome: ExportOutcome,
    warning: Option<String>,
}

fn export_one(
    source: &dyn RecordSource,
    writer: &dyn ArtifactWriter,
    index: &CacheIndex,
    pending: &PendingInput,
) -> Result<StageTaskOutput, EtlError> {
    let recording = source.read(&pending.path)?;
    let key = recording.key();

    let warning = reconcile(&pending.path, pending.filename_key.as_deref(), &key)
        .err()
        .map(|e| e.to_string());

    // Only reachable when the filename key pointed elsewhere
    if index.contains(&key) {
        return Ok(StageTaskOutput {
            outcome: ExportOutcome::AlreadyPresent { key },
            warning,
        });
    }

    let contents = writer.render(&recording)?;
    let path = index.artifact_path(&key);
    write_new(&path, &key, &contents)?;

    Ok(StageTaskOutput {
        outcome: ExportOutcome::Written { key, path },
        warning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::JsonRecordSource;
    use crate::executor::BatchProgress;
    use crate::types::WorkoutLog;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Workspace {
        _root: TempDir,
        config: PipelineConfig,
    }

    fn workspace() -> Workspace {
        let root = tempfile::tempdir().unwrap();
        let dir = |name: &str| {
            let path = root.path().join(name);
            fs::create_dir_all(&path).unwrap();
            path
        };

        let config = PipelineConfig {
            device_dir: dir("device"),
            summary_dir: dir("sumstat"),
            series_dir: dir("ts"),
            workout_urls_path: root.path().join("session_urls.json"),
            workout_wods_path: root.path().join("session_wods.json"),
            observation_start: NaiveDate::from_ymd_opt(2022, 12, 31).unwrap(),
            max_threads: Some(4),
            ..Default::default()
        };

        Workspace {
            _root: root,
            config,
        }
    }

    /// Write a device export whose content timestamp is `recorded_at`
    fn write_export(config: &PipelineConfig, file_name: &str, recorded_at: &str, peak: f64) {
        let samples: Vec<serde_json::Value> = (0..=240)
            .map(|t| {
                let t = t as f64;
                let hr = if t <= 60.0 { 120.0 + (peak - 120.0) * t / 60.0 } else { peak - 0.25 * (t - 60.0) };
                serde_json::json!({ "offset_s": t, "heart_rate": hr })
            })
            .collect();
        let export = serde_json::json!({ "recorded_at": recorded_at, "samples": samples });
        fs::write(config.device_dir.join(file_name), export.to_string()).unwrap();
    }

    fn dir_snapshot(dir: &Path) -> BTreeMap<String, String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| {
                let path = e.unwrap().path();
                (
                    path.file_name().unwrap().to_string_lossy().to_string(),
                    fs::read_to_string(&path).unwrap(),
                )
            })
            .collect()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, d).unwrap()
    }

    #[test]
    fn test_discover_inputs_filters_extension() {
        let ws = workspace();
        fs::write(ws.config.device_dir.join("b.json"), "{}").unwrap();
        fs::write(ws.config.device_dir.join("a.JSON"), "{}").unwrap();
        fs::write(ws.config.device_dir.join("c.fit"), "").unwrap();

        let inputs = discover_inputs(&ws.config.device_dir, "json").unwrap();
        let names: Vec<String> = inputs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.JSON", "b.json"]);

        assert!(matches!(
            discover_inputs(&ws.config.device_dir.join("nope"), "json"),
            Err(EtlError::Configuration(_))
        ));
    }

    #[test]
    fn test_ingest_is_idempotent() {
        let ws = workspace();
        write_export(&ws.config, "2023-01-01-070000-TICKR.json", "2023-01-01T07:00:00", 180.0);
        write_export(&ws.config, "2023-01-03-181500-TICKR.json", "2023-01-03T18:15:00", 170.0);

        let pipeline = Pipeline::new(ws.config.clone(), &JsonRecordSource).unwrap();

        let first = pipeline.ingest().unwrap();
        assert_eq!(first.summary.processed, 2);
        assert_eq!(first.summary.skipped, 0);
        assert_eq!(first.series.processed, 2);
        assert_eq!(first.summary.failed, 0);
        assert!(first.summary.warnings.is_empty());

        let summaries_before = dir_snapshot(&ws.config.summary_dir);
        let series_before = dir_snapshot(&ws.config.series_dir);
        assert_eq!(
            summaries_before.keys().cloned().collect::<Vec<_>>(),
            vec!["2023-01-01-070000.csv", "2023-01-03-181500.csv"]
        );

        let second = pipeline.ingest().unwrap();
        assert_eq!(second.summary.processed, 0);
        assert_eq!(second.summary.skipped, 2);
        assert_eq!(second.series.processed, 0);
        assert_ne!(first.run_id, second.run_id);

        assert_eq!(dir_snapshot(&ws.config.summary_dir), summaries_before);
        assert_eq!(dir_snapshot(&ws.config.series_dir), series_before);

        let status = pipeline.status().unwrap();
        assert_eq!(status.inputs, 2);
        assert_eq!(status.summary_pending, 0);
        assert_eq!(status.series_artifacts, 2);
    }

    #[test]
    fn test_written_summary_has_expected_recovery() {
        let ws = workspace();
        write_export(&ws.config, "2023-01-01-070000-TICKR.json", "2023-01-01T07:00:00", 180.0);

        let pipeline = Pipeline::new(ws.config.clone(), &JsonRecordSource).unwrap();
        pipeline.ingest().unwrap();

        let summaries = load_summaries(&ws.config.summary_dir).unwrap();
        assert_eq!(summaries.len(), 1);
        // Post-peak slope is 0.25 bpm/s
        assert_eq!(summaries[0].recovery_60s, Some(15.0));
        assert_eq!(summaries[0].recovery_120s, Some(30.0));
        assert_eq!(summaries[0].recovery_180s, Some(45.0));
        assert!((summaries[0].total_zone_minutes() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_bad_recordings_do_not_abort_batch() {
        let ws = workspace();
        write_export(&ws.config, "2023-01-01-070000-TICKR.json", "2023-01-01T07:00:00", 180.0);
        fs::write(
            ws.config.device_dir.join("2023-01-02-070000-TICKR.json"),
            r#"{ "recorded_at": "2023-01-02T07:00:00", "samples": [] }"#,
        )
        .unwrap();
        fs::write(
            ws.config.device_dir.join("2023-01-03-070000-TICKR.json"),
            r#"{ "recorded_at": "2023-01-03T07:00:00",
                 "samples": [{ "offset_s": 5, "heart_rate": 90 }, { "offset_s": 2, "heart_rate": 91 }] }"#,
        )
        .unwrap();
        fs::write(ws.config.device_dir.join("2023-01-04-070000-TICKR.json"), "truncated").unwrap();

        let pipeline = Pipeline::new(ws.config.clone(), &JsonRecordSource).unwrap();
        let report = pipeline.ingest().unwrap();

        assert_eq!(report.summary.processed, 1);
        assert_eq!(report.summary.failed, 3);
        assert_eq!(report.series.processed, 1);
        assert_eq!(report.series.failed, 3);

        let errors: Vec<&str> = report.summary.failures.iter().map(|f| f.error.as_str()).collect();
        assert!(errors[0].starts_with("Recording has no samples"));
        assert!(errors[1].starts_with("Malformed recording"));
        assert!(errors[2].starts_with("Invalid JSON"));

        // Failed inputs stay pending and are retried next run
        let again = pipeline.ingest().unwrap();
        assert_eq!(again.summary.processed, 0);
        assert_eq!(again.summary.skipped, 1);
        assert_eq!(again.summary.failed, 3);
    }

    #[test]
    fn test_filename_and_content_keys_disagree() {
        let ws = workspace();
        write_export(&ws.config, "2023-01-01-070000-TICKR.json", "2023-01-01T07:05:00", 180.0);

        let pipeline = Pipeline::new(ws.config.clone(), &JsonRecordSource).unwrap();

        let first = pipeline.ingest().unwrap();
        assert_eq!(first.summary.processed, 1);
        assert_eq!(first.summary.warnings.len(), 1);
        assert!(first.summary.warnings[0].contains("2023-01-01-070500"));
        assert!(ws.config.summary_dir.join("2023-01-01-070500.csv").exists());
        assert!(!ws.config.summary_dir.join("2023-01-01-070000.csv").exists());

        // The filename key never hits, so the input is parsed again but not rewritten
        let second = pipeline.ingest().unwrap();
        assert_eq!(second.summary.processed, 0);
        assert_eq!(second.summary.skipped, 1);
        assert_eq!(second.summary.failed, 0);
        assert_eq!(second.summary.warnings.len(), 1);
        assert_eq!(pipeline.status().unwrap().summary_pending, 1);
    }

    #[test]
    fn test_content_key_collision_is_an_error() {
        let ws = workspace();
        write_export(&ws.config, "2023-01-01-070000-TICKR.json", "2023-01-01T07:00:00", 180.0);
        write_export(&ws.config, "copy-of-morning-run.json", "2023-01-01T07:00:00", 175.0);

        let pipeline = Pipeline::new(ws.config.clone(), &JsonRecordSource).unwrap();
        let report = pipeline.ingest().unwrap();

        assert_eq!(report.summary.processed, 1);
        assert_eq!(report.summary.failed, 1);
        assert!(report.summary.failures[0].error.contains("already written"));
        assert_eq!(dir_snapshot(&ws.config.summary_dir).len(), 1);
    }

    #[test]
    fn test_progress_observer_sees_every_task() {
        let ws = workspace();
        for d in 1..=5 {
            write_export(
                &ws.config,
                &format!("2023-01-0{d}-070000-TICKR.json"),
                &format!("2023-01-0{d}T07:00:00"),
                170.0,
            );
        }

        let pipeline = Pipeline::new(ws.config.clone(), &JsonRecordSource).unwrap();
        let summary_calls = AtomicUsize::new(0);
        let series_calls = AtomicUsize::new(0);
        let on_summary = |p: BatchProgress| {
            assert_eq!(p.total, 5);
            summary_calls.fetch_add(1, Ordering::SeqCst);
        };
        let on_series = |_: BatchProgress| {
            series_calls.fetch_add(1, Ordering::SeqCst);
        };

        pipeline.ingest_with(&on_summary, &on_series).unwrap();

        assert_eq!(summary_calls.load(Ordering::SeqCst), 5);
        assert_eq!(series_calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_missing_output_dir_is_fatal() {
        let ws = workspace();
        let config = PipelineConfig {
            series_dir: ws.config.series_dir.join("missing"),
            ..ws.config.clone()
        };

        assert!(matches!(
            Pipeline::new(config, &JsonRecordSource),
            Err(EtlError::Configuration(_))
        ));
    }

    struct OfflineSite;

    impl WorkoutSource for OfflineSite {
        fn fetch_missing(&self, _dates: &[NaiveDate]) -> Result<WorkoutLog, EtlError> {
            Err(EtlError::ExternalSourceUnavailable("site unreachable".to_string()))
        }
    }

    struct CountingSite {
        calls: std::cell::RefCell<Vec<Vec<NaiveDate>>>,
    }

    impl WorkoutSource for CountingSite {
        fn fetch_missing(&self, dates: &[NaiveDate]) -> Result<WorkoutLog, EtlError> {
            self.calls.borrow_mut().push(dates.to_vec());
            Ok(dates
                .iter()
                .map(|d| {
                    (
                        *d,
                        crate::types::WorkoutRecord {
                            urls: Vec::new(),
                            title: "Annie".to_string(),
                            detail: "50-40-30-20-10".to_string(),
                        },
                    )
                })
                .collect())
        }
    }

    #[test]
    fn test_workouts_requested_once_per_day() {
        let ws = workspace();
        write_export(&ws.config, "2023-01-03-181500-TICKR.json", "2023-01-03T18:15:00", 170.0);
        write_export(&ws.config, "2023-01-02-070000-TICKR.json", "2023-01-02T07:00:00", 175.0);
        write_export(&ws.config, "2023-01-03-063000-TICKR.json", "2023-01-03T06:30:00", 165.0);

        let pipeline = Pipeline::new(ws.config.clone(), &JsonRecordSource).unwrap();
        pipeline.ingest().unwrap();

        let site = CountingSite {
            calls: std::cell::RefCell::new(Vec::new()),
        };
        let calendar = pipeline
            .build_calendar(
                DateRange::new(day(1), day(3)).unwrap(),
                FocusSelection::Latest,
                Some(&site),
            )
            .unwrap();

        assert_eq!(site.calls.borrow().clone(), vec![vec![day(2), day(3)]]);
        assert_eq!(calendar.rows[2].workout.title, "Annie");
        assert_eq!(calendar.rows[2].recording_count, 2);
    }

    #[test]
    fn test_corrupt_workout_store_does_not_abort_merge() {
        let ws = workspace();
        write_export(&ws.config, "2023-01-01-070000-TICKR.json", "2023-01-01T07:00:00", 180.0);
        fs::write(&ws.config.workout_wods_path, "[not a map").unwrap();

        let pipeline = Pipeline::new(ws.config.clone(), &JsonRecordSource).unwrap();
        pipeline.ingest().unwrap();

        let calendar = pipeline
            .build_calendar(
                DateRange::new(day(1), day(2)).unwrap(),
                FocusSelection::Latest,
                None,
            )
            .unwrap();

        assert!(calendar.rows.iter().all(|r| r.workout.is_rest_day()));
        assert_eq!(calendar.rows[0].recovery_120s, Some(30.0));
    }

    #[test]
    fn test_build_calendar_end_to_end() {
        let ws = workspace();
        write_export(&ws.config, "2023-01-01-070000-TICKR.json", "2023-01-01T07:00:00", 180.0);
        write_export(&ws.config, "2023-01-03-181500-TICKR.json", "2023-01-03T18:15:00", 170.0);
        fs::write(
            &ws.config.workout_wods_path,
            r#"{"2023-01-01": ["Helen", "3 rounds"]}"#,
        )
        .unwrap();

        let pipeline = Pipeline::new(ws.config.clone(), &JsonRecordSource).unwrap();
        pipeline.ingest().unwrap();

        let calendar = pipeline
            .build_calendar(
                DateRange::new(day(1), day(3)).unwrap(),
                FocusSelection::Latest,
                Some(&OfflineSite),
            )
            .unwrap();

        assert_eq!(calendar.rows.len(), 3);
        assert_eq!(calendar.rows[0].workout.title, "Helen");
        assert_eq!(calendar.rows[0].recovery_120s, Some(30.0));

        let gap = &calendar.rows[1];
        assert_eq!(gap.recovery_60s, None);
        assert_eq!(gap.recovery_120s, None);
        assert_eq!(gap.recovery_180s, None);
        assert!(gap.workout.is_rest_day());

        // The site is down, so day 3 falls back to the sentinel
        assert!(calendar.rows[2].workout.is_rest_day());
        assert_eq!(calendar.rows[2].recording_count, 1);
        assert_eq!(calendar.focus.as_ref().unwrap().date, day(3));
        assert!(calendar.rows.iter().all(|r| r.sleep.is_none()));
    }

    #[test]
    fn test_build_calendar_with_sleep_and_no_artifacts() {
        let ws = workspace();
        let sleep_path = ws.config.device_dir.join("sleep.csv");
        fs::write(
            &sleep_path,
            "date,start,end,deep,rem,light,awake\n2023-01-02,2023-01-01 23:00:00,2023-01-02 07:00:00,60,90,270,30\n",
        )
        .unwrap();
        let config = PipelineConfig {
            sleep_csv: Some(sleep_path),
            ..ws.config.clone()
        };

        let pipeline = Pipeline::new(config, &JsonRecordSource).unwrap();
        let calendar = pipeline
            .build_calendar(DateRange::new(day(1), day(3)).unwrap(), FocusSelection::Latest, None)
            .unwrap();

        assert_eq!(calendar.rows.len(), 3);
        assert_eq!(
            calendar.rows[1].sleep.as_ref().unwrap().time_asleep_minutes,
            Some(420.0)
        );
        assert!(calendar.focus.is_none());
    }

    #[test]
    fn test_missing_sleep_file_degrades() {
        let ws = workspace();
        let config = PipelineConfig {
            sleep_csv: Some(ws.config.device_dir.join("absent.csv")),
            ..ws.config.clone()
        };

        let pipeline = Pipeline::new(config, &JsonRecordSource).unwrap();
        let calendar = pipeline
            .build_dashboard_calendar(day(2), FocusSelection::Latest, None)
            .unwrap();

        // Observation start is 2022-12-31
        assert_eq!(calendar.rows.len(), 3);
        assert!(calendar.rows.iter().all(|r| r.sleep.is_none()));
    }
}
