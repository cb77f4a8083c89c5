// Pipeline error taxonomy
//
// Fatal errors (SourceNotFound, ConnectionInit) abort the run during
// pre-flight. ChunkProcessing is caught at the domain boundary by the
// orchestrator so one domain's failure never aborts the others. Quality
// findings are NOT errors; they flow through the report module.

use std::path::PathBuf;
use thiserror::Error;

use crate::transform::Domain;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source file not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("failed to initialize warehouse connection: {0}")]
    ConnectionInit(#[source] rusqlite::Error),

    #[error("failed to process chunk {chunk} of {domain} domain: {source}")]
    ChunkProcessing {
        domain: Domain,
        chunk: usize,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("required column missing from input: {column}")]
    MissingColumn { column: String },

    #[error("invalid date value: {value:?}")]
    InvalidDate { value: String },

    #[error("invalid numeric value in column {column}: {value:?}")]
    InvalidNumber { column: String, value: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("warehouse error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Wrap a per-chunk failure with its domain and chunk index so the
    /// orchestrator can log it with full context before moving on.
    pub fn in_chunk(self, domain: Domain, chunk: usize) -> Self {
        PipelineError::ChunkProcessing {
            domain,
            chunk,
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
