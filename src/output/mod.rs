//! Export handlers for completed crawl runs
//!
//! Each criteria run ends with one export of its aggregated records. The
//! [`Exporter`] trait is the seam between the coordinator and the concrete
//! output format; [`CsvExporter`] is the shipped implementation.

use crate::aggregate::Record;
use crate::config::Criteria;
use std::path::PathBuf;
use thiserror::Error;

pub mod csv;

pub use csv::CsvExporter;

/// Errors that can occur while exporting records
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to create export directory '{path}': {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to write export file '{path}': {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

/// Result type for export operations
pub type ExportResult<T> = Result<T, ExportError>;

/// Trait for per-run record exporters
///
/// Implementations receive the full record set of one finished criteria
/// run and must be safe to share across runs.
pub trait Exporter: Send + Sync {
    /// Writes the records collected for `criteria`
    ///
    /// # Arguments
    ///
    /// * `criteria` - The filter thresholds the run was driven by
    /// * `records` - Every record that passed the filter, deduplicated
    ///
    /// # Returns
    ///
    /// The path of the written artifact
    fn export(&self, criteria: &Criteria, records: &[Record]) -> ExportResult<PathBuf>;
}
