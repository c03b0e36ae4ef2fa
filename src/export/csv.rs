use crate::export::{ExportResult, ListingSink};
use crate::listing::{ListingRecord, FLAT_COLUMNS};
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const CSV_FILE: &str = "listings.csv";

/// Appends flattened listings to a CSV file
///
/// The header row is written when the file is new or empty.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl ListingSink for CsvSink {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn write_listings(&mut self, listings: &[ListingRecord]) -> ExportResult<()> {
        let needs_header = std::fs::metadata(&self.path)
            .map(|meta| meta.len() == 0)
            .unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);

        if needs_header {
            let header: Vec<String> = FLAT_COLUMNS.iter().map(|c| c.to_string()).collect();
            write_row(&mut writer, &header)?;
        }

        for listing in listings {
            write_row(&mut writer, &listing.flat_row())?;
        }

        writer.flush()?;
        Ok(())
    }
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Writes one comma-separated row terminated by `\r\n`
pub fn write_row<W: Write>(mut w: W, row: &[String]) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            w.write_all(b",")?;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            w.write_all(cell.as_bytes())?;
        }
    }
    w.write_all(b"\r\n")
}
