// Extractor - chunked CSV reading
//
// Produces a lazy sequence of fixed-size RawRecord batches covering the
// source file exactly once, in source order, with the last chunk possibly
// smaller. Restartable within a run: calling chunks() again re-reads the
// file from the start, which is how the orchestrator would re-derive a
// chunk after a failure.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{PipelineError, Result};

/// One source row: an ordered column -> value mapping.
/// The header is shared across every row of the file.
#[derive(Debug, Clone)]
pub struct RawRecord {
    header: Arc<Vec<String>>,
    values: Vec<String>,
}

impl RawRecord {
    pub fn new(header: Arc<Vec<String>>, values: Vec<String>) -> Self {
        RawRecord { header, values }
    }

    /// Look up a value by column name. Returns None when the column does
    /// not exist in the source header.
    pub fn get(&self, column: &str) -> Option<&str> {
        let idx = self.header.iter().position(|h| h == column)?;
        self.values.get(idx).map(|v| v.as_str())
    }

    /// Like `get`, but a missing column is an error. An empty value is
    /// still returned; nulls are a quality concern, not an extraction one.
    pub fn require(&self, column: &str) -> Result<&str> {
        self.get(column).ok_or_else(|| PipelineError::MissingColumn {
            column: column.to_string(),
        })
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.header.iter().any(|h| h == column)
    }

    pub fn columns(&self) -> &[String] {
        &self.header
    }
}

/// Chunked reader over one delimited source file.
#[derive(Debug, Clone)]
pub struct CsvExtractor {
    path: PathBuf,
    chunk_size: usize,
}

impl CsvExtractor {
    pub fn new(path: &Path, chunk_size: usize) -> Self {
        CsvExtractor {
            path: path.to_path_buf(),
            chunk_size,
        }
    }

    /// Pre-flight check used by the orchestrator before any domain starts.
    pub fn check_source(&self) -> Result<()> {
        if self.path.is_file() {
            Ok(())
        } else {
            Err(PipelineError::SourceNotFound {
                path: self.path.clone(),
            })
        }
    }

    /// Open the file and return a lazy iterator of record batches.
    pub fn chunks(&self) -> Result<ChunkIter> {
        self.check_source()?;

        let mut reader = csv::Reader::from_path(&self.path)?;
        let header: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

        Ok(ChunkIter {
            records: reader.into_records(),
            header: Arc::new(header),
            chunk_size: self.chunk_size,
        })
    }
}

/// Lazy iterator yielding `Vec<RawRecord>` batches of at most `chunk_size`
/// rows each.
pub struct ChunkIter {
    records: csv::StringRecordsIntoIter<File>,
    header: Arc<Vec<String>>,
    chunk_size: usize,
}

impl Iterator for ChunkIter {
    type Item = Result<Vec<RawRecord>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::with_capacity(self.chunk_size.min(1024));

        while batch.len() < self.chunk_size {
            match self.records.next() {
                Some(Ok(record)) => {
                    let values: Vec<String> = record.iter().map(|v| v.to_string()).collect();
                    batch.push(RawRecord::new(Arc::clone(&self.header), values));
                }
                Some(Err(e)) => return Some(Err(e.into())),
                None => break,
            }
        }

        if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}
