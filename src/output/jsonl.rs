//! JSON lines record sink
//!
//! Appends one JSON document per record to a file. The nested format mirrors
//! `ProductRecord`; the flat format writes the dataset row layout with joined
//! lists and the color map as a JSON string.

use crate::config::RecordFormat;
use crate::output::traits::{OutputError, OutputResult, RecordSink};
use crate::record::ProductRecord;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Append-only JSON lines sink
pub struct JsonLinesSink {
    path: PathBuf,
    format: RecordFormat,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Opens (or creates) the record file for appending
    pub fn open(path: &Path, format: RecordFormat) -> OutputResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            format,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn render(&self, record: &ProductRecord) -> OutputResult<String> {
        let line = match self.format {
            RecordFormat::Nested => serde_json::to_string(record)?,
            RecordFormat::Flat => serde_json::to_string(&record.to_flat_row())?,
        };
        Ok(line)
    }
}

impl RecordSink for JsonLinesSink {
    fn emit(&self, record: &ProductRecord) -> OutputResult<bool> {
        let line = self.render(record)?;

        let mut writer = self
            .writer
            .lock()
            .map_err(|e| OutputError::Write(format!("Failed to lock record file: {}", e)))?;

        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        // Emitted records must survive a crash
        writer.flush()?;

        Ok(true)
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(url: &str) -> ProductRecord {
        let mut record = ProductRecord::new(url);
        record.identifier = Some("42".to_string());
        record.colors = vec!["Red".to_string()];
        record.color_images.insert(
            "Red".to_string(),
            vec!["https://cdn.example/product/r.jpg".to_string()],
        );
        record
    }

    #[test]
    fn test_nested_lines_are_appended() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.jsonl");

        let sink = JsonLinesSink::open(&path, RecordFormat::Nested).unwrap();
        assert!(sink.emit(&record("https://shop.example/shop/p/a/1")).unwrap());
        assert!(sink.emit(&record("https://shop.example/shop/p/b/2")).unwrap());

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["sourceUrl"], "https://shop.example/shop/p/a/1");
        assert_eq!(first["colorImages"]["Red"][0], "https://cdn.example/product/r.jpg");
    }

    #[test]
    fn test_reopen_appends_instead_of_truncating() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.jsonl");

        {
            let sink = JsonLinesSink::open(&path, RecordFormat::Nested).unwrap();
            sink.emit(&record("https://shop.example/shop/p/a/1")).unwrap();
        }
        {
            let sink = JsonLinesSink::open(&path, RecordFormat::Nested).unwrap();
            sink.emit(&record("https://shop.example/shop/p/b/2")).unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_flat_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/dir/records.jsonl");

        let sink = JsonLinesSink::open(&path, RecordFormat::Flat).unwrap();
        sink.emit(&record("https://shop.example/shop/p/a/1")).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let row: serde_json::Value = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(row["SKU"], "42");
        assert_eq!(row["Colors"], "Red");
        assert!(row["ColorImage"].is_string());
    }
}
