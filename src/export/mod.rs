//! Combined output files
//!
//! The [`Exporter`] stamps scraped listings with their site and export time
//! and hands them to every configured [`ListingSink`]:
//! - [`JsonSink`] keeps one growing `listings.json` array
//! - [`CsvSink`] appends flattened rows to `listings.csv`
//! - [`SqliteSink`] stores runs and listings in `listings.db`
//!
//! A failing sink is logged and skipped; it never aborts the run.

mod csv;
mod json;
mod sqlite;

pub use self::csv::{write_row, CsvSink, CSV_FILE};
pub use self::json::{JsonSink, JSON_FILE};
pub use self::sqlite::{SqliteSink, SQLITE_FILE};

use crate::config::OutputFormat;
use crate::dispatch::RunSummary;
use crate::listing::ListingRecord;
use chrono::Utc;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while writing output
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Malformed output file {path}: {message}")]
    Malformed { path: String, message: String },
}

/// Result type for export operations
pub type ExportResult<T> = Result<T, ExportError>;

/// A destination for scraped listings
pub trait ListingSink: Send {
    /// Short name used in log messages
    fn name(&self) -> &'static str;

    /// Appends tagged listings
    fn write_listings(&mut self, listings: &[ListingRecord]) -> ExportResult<()>;

    /// Called once after every site has been attempted
    fn finish(&mut self, _summary: &RunSummary) -> ExportResult<()> {
        Ok(())
    }
}

/// Fans listings out to the configured sinks
pub struct Exporter {
    sinks: Vec<Box<dyn ListingSink>>,
}

impl Exporter {
    pub fn new(sinks: Vec<Box<dyn ListingSink>>) -> Self {
        Self { sinks }
    }

    /// Opens one sink per format inside `output_dir`
    ///
    /// # Arguments
    ///
    /// * `output_dir` - Directory for the combined files, created if missing
    /// * `formats` - Formats to write; duplicates are ignored
    /// * `config_hash` - Configuration digest recorded with the run
    ///
    /// # Returns
    ///
    /// * `Ok(Exporter)` - All sinks opened
    /// * `Err(ExportError)` - The directory or a sink could not be created
    pub fn open(output_dir: &Path, formats: &[OutputFormat], config_hash: &str) -> ExportResult<Self> {
        std::fs::create_dir_all(output_dir)?;

        let mut opened: Vec<OutputFormat> = Vec::new();
        let mut sinks: Vec<Box<dyn ListingSink>> = Vec::new();

        for format in formats {
            if opened.contains(format) {
                continue;
            }
            opened.push(*format);

            let sink: Box<dyn ListingSink> = match format {
                OutputFormat::Json => Box::new(JsonSink::open(&output_dir.join(JSON_FILE))?),
                OutputFormat::Csv => Box::new(CsvSink::new(&output_dir.join(CSV_FILE))),
                OutputFormat::Sqlite => {
                    Box::new(SqliteSink::open(&output_dir.join(SQLITE_FILE), config_hash)?)
                }
            };
            sinks.push(sink);
        }

        tracing::debug!(
            "Writing {} to {}",
            sinks.iter().map(|s| s.name()).collect::<Vec<_>>().join(", "),
            output_dir.display()
        );

        Ok(Self::new(sinks))
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Tags `listings` with `site` and the current time, then writes them
    ///
    /// Returns the number of sinks that failed.
    pub fn export_listings(&mut self, listings: &mut [ListingRecord], site: &str) -> usize {
        if listings.is_empty() {
            tracing::warn!("No listings to export for {}", site);
            return 0;
        }

        let now = Utc::now();
        for listing in listings.iter_mut() {
            listing.tag(site, now);
        }

        let mut failures = 0;
        for sink in &mut self.sinks {
            if let Err(e) = sink.write_listings(listings) {
                failures += 1;
                tracing::error!("Error exporting listings to {}: {}", sink.name(), e);
            }
        }

        if failures == 0 {
            tracing::info!("Exported {} listings from {}", listings.len(), site);
        }

        failures
    }

    /// Lets each sink record the final run summary
    pub fn finish(&mut self, summary: &RunSummary) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.finish(summary) {
                tracing::error!("Error finishing {} output: {}", sink.name(), e);
            }
        }
    }
}
