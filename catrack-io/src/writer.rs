//! Writers for reconstruction results and recorded samples.

use crate::Result;
use catrack_algorithms::{EventDiagnostics, EventResult};
use catrack_core::Record;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Layout of a results file: the summed diagnostics followed by every event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsFile {
    /// Diagnostics summed over all events.
    pub summary: EventDiagnostics,
    /// Per-event results in input order.
    pub events: Vec<EventResult>,
}

#[derive(Serialize)]
struct ResultsView<'a> {
    summary: EventDiagnostics,
    events: &'a [EventResult],
}

/// Writer for reconstruction results.
pub struct ResultWriter {
    writer: BufWriter<File>,
}

impl ResultWriter {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Writes all event results as one pretty-printed JSON document and
    /// returns the summed diagnostics.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_results(&mut self, events: &[EventResult]) -> Result<EventDiagnostics> {
        let mut summary = EventDiagnostics::default();
        for event in events {
            summary.accumulate(&event.diagnostics);
        }
        serde_json::to_writer_pretty(&mut self.writer, &ResultsView { summary, events })?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(summary)
    }
}

/// Writer for training samples, one JSON object per line.
pub struct RecordWriter {
    writer: BufWriter<File>,
    written: usize,
}

impl RecordWriter {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    /// Appends records.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_records(&mut self, records: &[Record]) -> Result<()> {
        for record in records {
            serde_json::to_writer(&mut self.writer, record)?;
            writeln!(self.writer)?;
        }
        self.written += records.len();
        Ok(())
    }

    /// Number of records written so far.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Reads a results file written by [`ResultWriter`].
///
/// # Errors
/// Returns an error if the file cannot be read or is malformed.
pub fn read_results<P: AsRef<Path>>(path: P) -> Result<ResultsFile> {
    let reader = crate::MappedFileReader::open(path)?;
    Ok(serde_json::from_slice(reader.as_bytes())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_write_results_summary() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = ResultWriter::create(file.path()).unwrap();

        let mut first = EventResult {
            event_id: 1,
            ..EventResult::default()
        };
        first.diagnostics.n_hits = 10;
        first.diagnostics.tracks = 1;
        let mut second = EventResult {
            event_id: 2,
            ..EventResult::default()
        };
        second.diagnostics.n_hits = 4;

        let summary = writer.write_results(&[first, second]).unwrap();
        assert_eq!(summary.n_hits, 14);
        assert_eq!(summary.tracks, 1);

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.contains("\"summary\""));
        assert!(content.contains("\"event_id\": 2"));
    }

    #[test]
    fn test_write_records_as_lines() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = RecordWriter::create(file.path()).unwrap();
        let record = Record {
            kind: "facet",
            feature_names: &["span"],
            features: vec![2.0],
            truth: Some(true),
            weight: None,
        };
        writer.write_records(&[record.clone(), record]).unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.written(), 2);

        let content = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["kind"], "facet");
        assert_eq!(value["truth"], true);
        assert!(value["weight"].is_null());
    }
}
