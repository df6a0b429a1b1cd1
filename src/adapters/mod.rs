//! Device export adapters
//!
//! This module provides adapters that read raw device exports and map them
//! to [`Recording`]s. The binary device formats are owned by external parsers;
//! an adapter only has to hand back a timestamp and an ordered sample list.

mod json;

pub use json::JsonRecordSource;
pub(crate) use json::parse_timestamp;

use crate::error::EtlError;
use crate::types::Recording;
use std::path::Path;

/// Trait for device export readers
pub trait RecordSource: Sync {
    /// Parse one export file into a recording
    fn read(&self, path: &Path) -> Result<Recording, EtlError>;
}
