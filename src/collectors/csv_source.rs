use crate::collectors::reading_parser::RawRecord;
use crate::error::SourceError;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// Append-only store of raw reading records
///
/// Implementations return every record currently in the store, in append
/// order. The publisher keeps its own cursor and only ingests the tail it has
/// not seen yet, so a source never needs to remember what it returned.
#[cfg_attr(test, mockall::automock)]
pub trait ReadingSource: Send {
    /// Read all records currently available
    fn read_all(&mut self) -> Result<Vec<RawRecord>, SourceError>;

    /// Human-readable description for log messages
    fn describe(&self) -> String;
}

/// Reading source backed by a CSV file with a header row
///
/// The file is re-read on every call. A trailing line without a newline is
/// treated as still being written and is left for the next read, unless it is
/// byte-for-byte the same tail the previous read deferred: a writer that ended
/// the file without a newline has then stopped, and the row is ingested.
pub struct CsvReadingSource {
    path: PathBuf,
    /// Unterminated tail seen by the last read
    pending_tail: Option<String>,
}

impl CsvReadingSource {
    /// Create a source for the CSV file at `path`
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use ecosync::collectors::{CsvReadingSource, ReadingSource};
    ///
    /// let mut source = CsvReadingSource::new("data/sensors.csv");
    /// let records = source.read_all();
    /// ```
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pending_tail: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Part of `content` that is ready to parse
    ///
    /// Remembers an unterminated tail so that the next read can tell a stalled
    /// writer from one that is still appending.
    fn readable_part<'a>(&mut self, content: &'a str) -> &'a str {
        let (complete, tail) = match content.rfind('\n') {
            Some(last_newline) => content.split_at(last_newline + 1),
            None => ("", content),
        };

        if tail.trim().is_empty() {
            self.pending_tail = None;
            return content;
        }

        if self.pending_tail.as_deref() == Some(tail) {
            debug!("Unterminated last line of {} is stable", self.path.display());
            content
        } else {
            self.pending_tail = Some(tail.to_string());
            complete
        }
    }

    /// Parse CSV text into raw records keyed by the header row
    fn parse_records(complete: &str) -> Result<Vec<RawRecord>, SourceError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(complete.as_bytes());

        let headers = reader.headers()?.clone();
        let mut records = Vec::new();

        for (index, result) in reader.records().enumerate() {
            match result {
                Ok(row) => {
                    let record: RawRecord = headers.iter().zip(row.iter()).collect();
                    records.push(record);
                }
                Err(e) => {
                    debug!("Skipping unreadable CSV row {}: {}", index + 1, e);
                }
            }
        }

        Ok(records)
    }
}

impl ReadingSource for CsvReadingSource {
    fn read_all(&mut self) -> Result<Vec<RawRecord>, SourceError> {
        if !self.path.is_file() {
            return Err(SourceError::Unavailable(format!(
                "{} does not exist",
                self.path.display()
            )));
        }

        let bytes = fs::read(&self.path)?;
        let content = String::from_utf8_lossy(&bytes);
        let readable = self.readable_part(&content);
        Self::parse_records(readable)
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}
