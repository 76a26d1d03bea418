use crate::error::ExportError;
use crate::record::CanonicalRecord;
use derive_more::Display;
use indexmap::IndexSet;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Column used for records that are not JSON objects.
const SCALAR_COLUMN: &str = "value";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ExportFormat {
    #[display("csv")]
    Csv,
    #[display("json")]
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// Serialized export, ready to be written or handed to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub file_name: String,
    pub contents: String,
}

impl ExportFile {
    /// Write into `dir` (created if missing) and return the full path.
    pub fn write_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf, ExportError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let path = dir.join(&self.file_name);
        fs::write(&path, &self.contents)?;

        info!(path = %path.display(), bytes = self.contents.len(), "export written");
        Ok(path)
    }
}

/// Serialize the raw upstream records behind `records`.
///
/// CSV columns are the union of raw keys in first-seen order; nested values
/// are written as JSON text. JSON output is a pretty-printed array.
pub fn export(
    records: &[CanonicalRecord],
    stem: &str,
    format: ExportFormat,
) -> Result<ExportFile, ExportError> {
    let contents = match format {
        ExportFormat::Csv => to_csv(records)?,
        ExportFormat::Json => to_json(records)?,
    };

    Ok(ExportFile {
        file_name: format!("{}.{}", sanitize_stem(stem), format.extension()),
        contents,
    })
}

fn to_json(records: &[CanonicalRecord]) -> Result<String, ExportError> {
    let raws: Vec<&Value> = records.iter().map(CanonicalRecord::raw).collect();
    Ok(serde_json::to_string_pretty(&raws)?)
}

fn to_csv(records: &[CanonicalRecord]) -> Result<String, ExportError> {
    if records.is_empty() {
        return Ok(String::new());
    }

    let columns = columns(records);
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns.iter())?;

    for record in records {
        let row = columns.iter().map(|column| match record.raw() {
            Value::Object(object) => object.get(column.as_str()).map(cell).unwrap_or_default(),
            scalar if column == SCALAR_COLUMN => cell(scalar),
            _ => String::new(),
        });
        writer.write_record(row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|error| io::Error::new(error.error().kind(), error.error().to_string()))?;
    Ok(String::from_utf8(bytes)?)
}

fn columns(records: &[CanonicalRecord]) -> IndexSet<String> {
    let mut columns = IndexSet::new();
    for record in records {
        match record.raw() {
            Value::Object(object) => columns.extend(object.keys().cloned()),
            _ => {
                columns.insert(SCALAR_COLUMN.to_string());
            }
        }
    }
    columns
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn sanitize_stem(stem: &str) -> String {
    let sanitized: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();

    if sanitized.trim_matches('_').is_empty() {
        "export".to_string()
    } else {
        sanitized
    }
}
