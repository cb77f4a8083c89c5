// Warehouse Pipeline - Core Library
// Extract -> Transform -> Load for the sales, financial, and attendance
// datasets, with an idempotent staging-and-merge load protocol.

pub mod config;
pub mod error;
pub mod extract;
pub mod load;
pub mod pipeline;
pub mod report;
pub mod transform;

// Re-export commonly used types
pub use config::{DomainConfig, PipelineConfig, DEFAULT_CHUNK_SIZE, DEFAULT_STAGING_SUFFIX};
pub use error::{PipelineError, Result};
pub use extract::{CsvExtractor, RawRecord};
pub use load::{open_warehouse, LoadStats, Loader, WarehouseRecord};
pub use pipeline::{check_sources, DomainOutcome, DomainState, Pipeline, RunSummary};
pub use report::{QualityWarning, Reporter, TracingReporter};
pub use transform::{
    attendance_key, transform_attendance, transform_financial, transform_sales, AttendanceRecord,
    AttendanceStatus, Domain, FinancialRecord, FxTable, SalesRecord,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
