// Reporting seam
//
// Transform and load logic never writes to stdout or a logger directly;
// progress and quality findings go through a Reporter handed in at
// construction. Quality warnings are advisory: they are reported, never
// raised, and never block a batch from loading.

use crate::transform::Domain;

/// An advisory signal about a data anomaly in one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityWarning {
    pub domain: Domain,
    pub field: String,
    pub message: String,
    /// Number of rows the finding applies to.
    pub rows: usize,
}

impl QualityWarning {
    pub fn new(domain: Domain, field: &str, message: &str, rows: usize) -> Self {
        QualityWarning {
            domain,
            field: field.to_string(),
            message: message.to_string(),
            rows,
        }
    }
}

/// Progress and quality sink injected into each pipeline component.
pub trait Reporter {
    fn quality_warning(&self, warning: &QualityWarning);

    fn domain_started(&self, domain: Domain) {
        let _ = domain;
    }

    fn chunk_loaded(&self, domain: Domain, chunk: usize, table: &str, inserted: usize) {
        let _ = (domain, chunk, table, inserted);
    }

    fn domain_finished(&self, domain: Domain, chunks: usize, rows: usize) {
        let _ = (domain, chunks, rows);
    }

    fn domain_failed(&self, domain: Domain, message: &str) {
        let _ = (domain, message);
    }
}

/// Production reporter: structured log lines via `tracing`.
/// INFO for progress, WARN for quality issues, ERROR for domain failures.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn quality_warning(&self, warning: &QualityWarning) {
        tracing::warn!(
            domain = warning.domain.name(),
            field = %warning.field,
            rows = warning.rows,
            "Quality warning: {}",
            warning.message
        );
    }

    fn domain_started(&self, domain: Domain) {
        tracing::info!(domain = domain.name(), "Loading dataset");
    }

    fn chunk_loaded(&self, domain: Domain, chunk: usize, table: &str, inserted: usize) {
        tracing::info!(
            domain = domain.name(),
            chunk,
            table,
            inserted,
            "Chunk loaded"
        );
    }

    fn domain_finished(&self, domain: Domain, chunks: usize, rows: usize) {
        tracing::info!(
            domain = domain.name(),
            chunks,
            rows,
            "Dataset loaded successfully"
        );
    }

    fn domain_failed(&self, domain: Domain, message: &str) {
        tracing::error!(domain = domain.name(), "Error loading dataset: {message}");
    }
}

/// Test reporter that collects warnings for assertions.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;

    #[derive(Debug, Default)]
    pub struct CollectingReporter {
        pub warnings: RefCell<Vec<QualityWarning>>,
    }

    impl Reporter for CollectingReporter {
        fn quality_warning(&self, warning: &QualityWarning) {
            self.warnings.borrow_mut().push(warning.clone());
        }
    }

    impl CollectingReporter {
        pub fn warnings_for_field(&self, field: &str) -> usize {
            self.warnings
                .borrow()
                .iter()
                .filter(|w| w.field == field)
                .count()
        }
    }
}
