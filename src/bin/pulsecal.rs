//! Pulse Calendar CLI
//!
//! Commands:
//! - ingest: Process new device exports into summary and series artifacts
//! - merge: Build the merged calendar and write it as JSON
//! - status: Show how many exports are still pending per stage

use clap::{Parser, Subcommand};
use chrono::{Local, NaiveDate};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use pulse_calendar::{
    DateRange, EtlError, FocusSelection, JsonRecordSource, Pipeline, PipelineConfig,
    PIPELINE_VERSION, PRODUCER_NAME,
};

/// Pulse Calendar - incremental heart-rate ETL and calendar merge
#[derive(Parser)]
#[command(name = "pulsecal")]
#[command(author = "Synheart AI Inc")]
#[command(version = PIPELINE_VERSION)]
#[command(about = "Cache heart-rate exports and merge them onto a calendar", long_about = None)]
struct Cli {
    /// Pipeline configuration (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process device exports that have no artifacts yet
    Ingest {
        /// Override the device export directory
        #[arg(long)]
        device_dir: Option<PathBuf>,

        /// Override the summary artifact directory
        #[arg(long)]
        summary_dir: Option<PathBuf>,

        /// Override the series artifact directory
        #[arg(long)]
        series_dir: Option<PathBuf>,

        /// Worker thread cap
        #[arg(long)]
        threads: Option<usize>,

        /// Output the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Merge artifacts, workouts and sleep onto a calendar
    Merge {
        /// First day (defaults to the configured observation start)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day (defaults to today)
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Day whose trace becomes the focus series (defaults to the latest)
        #[arg(long)]
        focus: Option<NaiveDate>,

        /// Sleep tracker export
        #[arg(long)]
        sleep_csv: Option<PathBuf>,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Show pending work without processing anything
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), PulseCliError> {
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest {
            device_dir,
            summary_dir,
            series_dir,
            threads,
            json,
        } => {
            if let Some(dir) = device_dir {
                config.device_dir = dir;
            }
            if let Some(dir) = summary_dir {
                config.summary_dir = dir;
            }
            if let Some(dir) = series_dir {
                config.series_dir = dir;
            }
            if threads.is_some() {
                config.max_threads = threads;
            }
            cmd_ingest(config, json)
        }
        Commands::Merge {
            start,
            end,
            focus,
            sleep_csv,
            output,
            pretty,
        } => {
            if sleep_csv.is_some() {
                config.sleep_csv = sleep_csv;
            }
            cmd_merge(config, start, end, focus, &output, pretty)
        }
        Commands::Status { json } => cmd_status(config, json),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, PulseCliError> {
    match path {
        Some(path) => Ok(PipelineConfig::load(path)?),
        None => Ok(PipelineConfig::default()),
    }
}

fn cmd_ingest(config: PipelineConfig, json: bool) -> Result<(), PulseCliError> {
    let pipeline = Pipeline::new(config, &JsonRecordSource)?;
    let report = pipeline.ingest()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Run {}", report.run_id);
        for stage in [&report.summary, &report.series] {
            println!(
                "  {:<8} processed {:>4}  skipped {:>4}  failed {:>4}",
                stage.kind.as_str(),
                stage.processed,
                stage.skipped,
                stage.failed
            );
            for failure in &stage.failures {
                println!("    [ERR] {}: {}", failure.input, failure.error);
            }
            for warning in &stage.warnings {
                println!("    [WARN] {}", warning);
            }
        }
    }

    Ok(())
}

fn cmd_merge(
    config: PipelineConfig,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    focus: Option<NaiveDate>,
    output: &Path,
    pretty: bool,
) -> Result<(), PulseCliError> {
    let start = start.unwrap_or(config.observation_start);
    let end = end.unwrap_or_else(|| Local::now().date_naive());
    let range = DateRange::new(start, end)?;
    let focus = focus.map_or(FocusSelection::Latest, FocusSelection::Date);

    let pipeline = Pipeline::new(config, &JsonRecordSource)?;
    // The workout site scraper runs out of process; merge uses the stored log
    let calendar = pipeline.build_calendar(range, focus, None)?;

    let output_data = if pretty {
        serde_json::to_string_pretty(&calendar)?
    } else {
        calendar.to_json()?
    };

    if output.to_string_lossy() == "-" {
        println!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_status(config: PipelineConfig, json: bool) -> Result<(), PulseCliError> {
    let pipeline = Pipeline::new(config, &JsonRecordSource)?;
    let status = pipeline.status()?;

    if json {
        let report = StatusReport {
            producer: PRODUCER_NAME.to_string(),
            version: PIPELINE_VERSION.to_string(),
            status,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Pulse Calendar Status");
        println!("=====================");
        println!("Version:  {}", PIPELINE_VERSION);
        println!("Exports:  {}", status.inputs);
        println!(
            "Summary:  {} artifacts, {} pending",
            status.summary_artifacts, status.summary_pending
        );
        println!(
            "Series:   {} artifacts, {} pending",
            status.series_artifacts, status.series_pending
        );
    }

    Ok(())
}

// Error types

#[derive(Debug)]
enum PulseCliError {
    Io(io::Error),
    Pipeline(EtlError),
    Json(serde_json::Error),
}

impl From<io::Error> for PulseCliError {
    fn from(e: io::Error) -> Self {
        PulseCliError::Io(e)
    }
}

impl From<EtlError> for PulseCliError {
    fn from(e: EtlError) -> Self {
        PulseCliError::Pipeline(e)
    }
}

impl From<serde_json::Error> for PulseCliError {
    fn from(e: serde_json::Error) -> Self {
        PulseCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PulseCliError> for CliError {
    fn from(e: PulseCliError) -> Self {
        match e {
            PulseCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PulseCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            PulseCliError::Pipeline(e) => {
                let (code, hint) = match &e {
                    EtlError::Configuration(_) => (
                        "CONFIG_ERROR",
                        Some("Check the config file and that every directory exists"),
                    ),
                    EtlError::DateParse(_) => ("DATE_ERROR", Some("Dates use YYYY-MM-DD")),
                    EtlError::InvalidArtifact(_) => (
                        "ARTIFACT_ERROR",
                        Some("Delete the damaged artifact and run ingest again"),
                    ),
                    EtlError::Json(_) => ("JSON_ERROR", Some("Check JSON syntax")),
                    EtlError::Io(_) => ("IO_ERROR", Some("Check file paths and permissions")),
                    _ => ("PIPELINE_ERROR", None),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: hint.map(str::to_string),
                }
            }
        }
    }
}

#[derive(serde::Serialize)]
struct StatusReport {
    producer: String,
    version: String,
    status: pulse_calendar::PipelineStatus,
}
