//! Pulse Calendar - incremental heart-rate ETL and calendar merge
//!
//! Device exports flow through a cached, parallel pipeline: discovery →
//! cache check → per-recording summary and series export → artifacts on disk.
//! The artifacts are then merged with workout and sleep logs onto a common
//! daily calendar for the dashboard.
//!
//! ## Modules
//!
//! - **Ingest**: [`pipeline::Pipeline::ingest`] writes one summary and one
//!   series artifact per recording, exactly once
//! - **Merge**: [`pipeline::Pipeline::build_calendar`] aligns everything on a
//!   date range

pub mod adapters;
pub mod artifact;
pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod merge;
pub mod pipeline;
pub mod series;
pub mod sleep;
pub mod summary;
pub mod tabular;
pub mod types;
pub mod workouts;

pub use adapters::{JsonRecordSource, RecordSource};
pub use config::PipelineConfig;
pub use error::EtlError;
pub use merge::{CalendarMerger, DateRange, FocusSelection, MergedCalendar};
pub use pipeline::{IngestReport, Pipeline, PipelineStatus, StageReport};
pub use workouts::{WorkoutSource, WorkoutStore};

/// Crate version, reported by the CLI
pub const PIPELINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "pulse-calendar";
