//! CSV export of aggregated records
//!
//! One file per criteria run, named after the criteria so successive runs
//! with different thresholds never clobber each other.

use crate::aggregate::Record;
use crate::config::Criteria;
use crate::output::{ExportError, ExportResult, Exporter};
use std::io::Write;
use std::path::PathBuf;

const HEADER: &str = "title,score,people,link";

/// Writes one CSV file per criteria run into a fixed directory
pub struct CsvExporter {
    directory: PathBuf,
}

impl CsvExporter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// File name for a criteria run: `{tag}-{min-score}-{min-count}.csv`
    fn file_name(criteria: &Criteria) -> String {
        format!(
            "{}-{}-{}.csv",
            criteria.tag, criteria.min_score, criteria.min_count
        )
    }
}

impl Exporter for CsvExporter {
    fn export(&self, criteria: &Criteria, records: &[Record]) -> ExportResult<PathBuf> {
        std::fs::create_dir_all(&self.directory).map_err(|source| ExportError::CreateDir {
            path: self.directory.display().to_string(),
            source,
        })?;

        let path = self.directory.join(Self::file_name(criteria));
        let write = |path: &PathBuf| -> std::io::Result<()> {
            let mut file = std::fs::File::create(path)?;
            writeln!(file, "{}", HEADER)?;
            for record in records {
                writeln!(
                    file,
                    "{},{},{},{}",
                    escape_field(&record.title),
                    record.score,
                    record.rating_count,
                    escape_field(&record.link),
                )?;
            }
            file.flush()
        };

        write(&path).map_err(|source| ExportError::Write {
            path: path.display().to_string(),
            source,
        })?;

        tracing::info!(
            path = %path.display(),
            records = records.len(),
            "exported run results"
        );
        Ok(path)
    }
}

/// Quotes a field when it contains a delimiter, quote, or line break
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
