//! Workout log source
//!
//! Workouts come from a training log site without an API. The scraper is an
//! injected [`WorkoutSource`]; this module owns the JSON documents it feeds:
//!
//! - `session_urls.json`: `{ "2023-01-01": ["/session/123"] }`
//! - `session_wods.json`: `{ "2023-01-01": ["Title", "Detail"] }`
//!
//! Both are read, extended with any dates missing since the last run, and
//! rewritten in full.

use crate::error::EtlError;
use crate::types::{WorkoutLog, WorkoutRecord};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Fetches workout entries for specific days
pub trait WorkoutSource {
    fn fetch_missing(&self, dates: &[NaiveDate]) -> Result<WorkoutLog, EtlError>;
}

/// Date-keyed lists of strings, the shape of both documents
type Document = BTreeMap<NaiveDate, Vec<String>>;

/// The raw contents of both documents
///
/// Entries are kept exactly as stored so a rewrite never drops extra session
/// links or invents descriptions for days that only have a link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkoutDocuments {
    /// `date -> [url, ...]`
    pub urls: Document,
    /// `date -> [title, detail]`
    pub wods: Document,
}

impl WorkoutDocuments {
    /// Workouts for every day that has a description, with all its links
    pub fn log(&self) -> WorkoutLog {
        self.wods
            .iter()
            .map(|(date, fields)| {
                let mut fields = fields.iter();
                let record = WorkoutRecord {
                    urls: self.urls.get(date).cloned().unwrap_or_default(),
                    title: fields.next().cloned().unwrap_or_default(),
                    detail: fields.next().cloned().unwrap_or_default(),
                };
                (*date, record)
            })
            .collect()
    }

    /// Record fetched workouts. New links are appended after stored ones.
    pub fn extend(&mut self, fetched: &WorkoutLog) {
        for (date, record) in fetched {
            self.wods
                .insert(*date, vec![record.title.clone(), record.detail.clone()]);

            if record.urls.is_empty() {
                continue;
            }
            let links = self.urls.entry(*date).or_default();
            for url in &record.urls {
                if !links.contains(url) {
                    links.push(url.clone());
                }
            }
        }
    }
}

/// The two JSON documents backing the workout log
#[derive(Debug, Clone)]
pub struct WorkoutStore {
    urls_path: PathBuf,
    wods_path: PathBuf,
}

impl WorkoutStore {
    pub fn new(urls_path: impl Into<PathBuf>, wods_path: impl Into<PathBuf>) -> Self {
        Self {
            urls_path: urls_path.into(),
            wods_path: wods_path.into(),
        }
    }

    /// Load both documents. Missing documents load as empty.
    pub fn load(&self) -> Result<WorkoutDocuments, EtlError> {
        Ok(WorkoutDocuments {
            urls: read_document(&self.urls_path)?,
            wods: read_document(&self.wods_path)?,
        })
    }

    /// Rewrite both documents in full
    pub fn save(&self, documents: &WorkoutDocuments) -> Result<(), EtlError> {
        fs::write(&self.urls_path, serde_json::to_string(&documents.urls)?)?;
        fs::write(&self.wods_path, serde_json::to_string(&documents.wods)?)?;
        Ok(())
    }
}

fn read_document(path: &Path) -> Result<Document, EtlError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Document::new()),
        Err(e) => Err(e.into()),
    }
}

/// Outcome of bringing the workout log up to date
#[derive(Debug, Clone)]
pub struct WorkoutRefresh {
    pub log: WorkoutLog,
    /// Dates that were requested from the source
    pub requested: Vec<NaiveDate>,
    /// Entries the source returned
    pub fetched: usize,
    /// Set when the store or the source failed and the result is partial
    pub degraded: Option<String>,
}

impl WorkoutRefresh {
    fn degraded(log: WorkoutLog, requested: Vec<NaiveDate>, fetched: usize, reason: String) -> Self {
        Self {
            log,
            requested,
            fetched,
            degraded: Some(reason),
        }
    }
}

/// Days after `observation_start` that have no workout description in `log`
pub fn missing_dates(
    log: &WorkoutLog,
    wanted: &[NaiveDate],
    observation_start: NaiveDate,
) -> Vec<NaiveDate> {
    let mut missing: Vec<NaiveDate> = wanted
        .iter()
        .copied()
        .filter(|d| *d > observation_start && !log.contains_key(d))
        .collect();
    missing.sort();
    missing.dedup();
    missing
}

/// Load the stored log and fill in `wanted` days that have no description yet.
///
/// Never fails: an unreadable store, a failing or absent source and a failed
/// save all degrade to whatever log is available, with the reason recorded.
pub fn refresh_workouts(
    store: &WorkoutStore,
    source: Option<&dyn WorkoutSource>,
    wanted: &[NaiveDate],
    observation_start: NaiveDate,
) -> WorkoutRefresh {
    let mut documents = match store.load() {
        Ok(documents) => documents,
        Err(e) => {
            // Fetching would overwrite the unreadable documents on save
            warn!(error = %e, "workout store unreadable, continuing without workouts");
            return WorkoutRefresh::degraded(
                WorkoutLog::new(),
                Vec::new(),
                0,
                format!("workout store unreadable: {}", e),
            );
        }
    };
    let requested = missing_dates(&documents.log(), wanted, observation_start);

    if requested.is_empty() {
        return WorkoutRefresh {
            log: documents.log(),
            requested,
            fetched: 0,
            degraded: None,
        };
    }

    let Some(source) = source else {
        warn!(missing = requested.len(), "workout source not configured, using stored log");
        let reason = format!("no workout source configured for {} days", requested.len());
        return WorkoutRefresh::degraded(documents.log(), requested, 0, reason);
    };

    let fetched = match source.fetch_missing(&requested) {
        Ok(fetched) => fetched,
        Err(e) => {
            let err = match e {
                EtlError::ExternalSourceUnavailable(_) => e,
                other => EtlError::ExternalSourceUnavailable(other.to_string()),
            };
            warn!(error = %err, "workout source failed, using stored log");
            return WorkoutRefresh::degraded(documents.log(), requested, 0, err.to_string());
        }
    };

    let count = fetched.len();
    documents.extend(&fetched);
    info!(requested = requested.len(), fetched = count, "workout log extended");

    if let Err(e) = store.save(&documents) {
        warn!(error = %e, "workout store not saved, fetched entries kept for this run only");
        let reason = format!("workout store not saved: {}", e);
        return WorkoutRefresh::degraded(documents.log(), requested, count, reason);
    }

    WorkoutRefresh {
        log: documents.log(),
        requested,
        fetched: count,
        degraded: None,
    }
}
