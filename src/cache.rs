//! Artifact cache index
//!
//! Deciding whether an input needs processing must not require parsing it,
//! so the index works with two identities:
//!
//! - a cheap **filename key**: the leading characters of the input's file
//!   name, which the device writes as the capture timestamp
//! - the authoritative **content key**: the recording's own `recorded_at`,
//!   used to name the artifact
//!
//! A filename key that matches an existing artifact is a cache hit. When the
//! two keys disagree, the artifact is still written under the content key and
//! the mismatch is surfaced through [`reconcile`].

use crate::artifact::{artifact_path, list_artifacts};
use crate::config::require_dir;
use crate::error::EtlError;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// An input that still needs processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInput {
    pub path: PathBuf,
    /// Filename-derived key, `None` if the name is shorter than the key length
    pub filename_key: Option<String>,
}

/// Result of checking a set of inputs against the index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachePlan {
    pub pending: Vec<PendingInput>,
    /// Inputs whose artifact already exists
    pub cached: Vec<PathBuf>,
}

/// Snapshot of the artifacts present in one output directory
#[derive(Debug, Clone)]
pub struct CacheIndex {
    output_dir: PathBuf,
    existing: BTreeSet<String>,
    key_len: usize,
}

impl CacheIndex {
    /// Scan `output_dir`. A missing or unreadable directory is a configuration
    /// error.
    pub fn open(output_dir: &Path, key_len: usize) -> Result<Self, EtlError> {
        require_dir("output directory", output_dir)?;

        let existing = list_artifacts(output_dir)?
            .iter()
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();

        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            existing,
            key_len,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Number of artifacts present when the index was opened
    pub fn len(&self) -> usize {
        self.existing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.existing.is_empty()
    }

    /// Whether an artifact with this key existed when the index was opened
    pub fn contains(&self, key: &str) -> bool {
        self.existing.contains(key)
    }

    /// Where the artifact for `key` lives
    pub fn artifact_path(&self, key: &str) -> PathBuf {
        artifact_path(&self.output_dir, key)
    }

    /// Cheap identity taken from the input's file name
    pub fn filename_key(&self, input: &Path) -> Option<String> {
        filename_key(input, self.key_len)
    }

    /// Split inputs into pending and cached without opening any of them
    pub fn plan(&self, inputs: &[PathBuf]) -> CachePlan {
        let mut plan = CachePlan::default();

        for input in inputs {
            let key = self.filename_key(input);
            if key.as_deref().is_some_and(|k| self.contains(k)) {
                plan.cached.push(input.clone());
            } else {
                plan.pending.push(PendingInput {
                    path: input.clone(),
                    filename_key: key,
                });
            }
        }

        plan
    }
}

/// First `key_len` characters of the file name
pub fn filename_key(input: &Path, key_len: usize) -> Option<String> {
    let name = input.file_name()?.to_str()?;
    if name.chars().count() < key_len {
        return None;
    }
    Some(name.chars().take(key_len).collect())
}

/// Inputs from `inputs` that have no artifact in `output_dir` yet
pub fn pending(
    inputs: &[PathBuf],
    output_dir: &Path,
    key_len: usize,
) -> Result<Vec<PendingInput>, EtlError> {
    Ok(CacheIndex::open(output_dir, key_len)?.plan(inputs).pending)
}

/// Check the filename key against the content key
pub fn reconcile(
    input: &Path,
    filename_key: Option<&str>,
    content_key: &str,
) -> Result<(), EtlError> {
    match filename_key {
        Some(k) if k != content_key => Err(EtlError::CacheInconsistency {
            input: input.to_path_buf(),
            filename_key: k.to_string(),
            content_key: content_key.to_string(),
        }),
        // Inputs without a usable filename key were never cache-checked
        _ => Ok(()),
    }
}
