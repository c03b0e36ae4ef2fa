use crate::export::{ExportError, ExportResult, ListingSink};
use crate::listing::ListingRecord;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

pub const JSON_FILE: &str = "listings.json";

/// Keeps every exported listing in one JSON array
///
/// Each write reads the existing array, extends it and rewrites the file
/// pretty-printed.
pub struct JsonSink {
    path: PathBuf,
}

impl JsonSink {
    /// Opens the sink, creating the file as `[]` when it does not exist
    pub fn open(path: &Path) -> ExportResult<Self> {
        if !path.exists() {
            fs::write(path, "[]")?;
        }

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn read_existing(&self) -> ExportResult<Vec<Value>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Value>(&content)? {
            Value::Array(items) => Ok(items),
            other => Err(ExportError::Malformed {
                path: self.path.display().to_string(),
                message: format!("expected an array, found {}", json_kind(&other)),
            }),
        }
    }
}

impl ListingSink for JsonSink {
    fn name(&self) -> &'static str {
        "json"
    }

    fn write_listings(&mut self, listings: &[ListingRecord]) -> ExportResult<()> {
        let mut items = self.read_existing()?;
        for listing in listings {
            items.push(serde_json::to_value(listing)?);
        }

        let content = serde_json::to_string_pretty(&items)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
