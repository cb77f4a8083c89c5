// Orchestrator - sequences extract -> transform -> load per chunk per domain
//
// Domains are independent failure domains: a chunk failure moves its
// domain to Failed, is logged, and the run continues with the next
// domain. There is no cross-domain transaction. Fatal pre-flight errors
// (missing source file, no warehouse connection) abort before any domain
// starts.

use rusqlite::Connection;

use crate::config::{DomainConfig, PipelineConfig};
use crate::error::Result;
use crate::extract::{CsvExtractor, RawRecord};
use crate::load::{LoadStats, Loader, WarehouseRecord};
use crate::report::Reporter;
use crate::transform::{
    transform_attendance, transform_financial, transform_sales, Domain, FxTable,
};

/// Per-domain processing state. One chunk is fully extracted, transformed,
/// and loaded before the next begins, re-entering Transforming -> Loading
/// for each chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainState {
    NotStarted,
    Extracting,
    Transforming,
    Loading,
    Done,
    Failed,
}

/// Terminal result for one domain.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainOutcome {
    Done { chunks: usize, rows: usize },
    Failed { chunk: usize, error: String },
}

impl DomainOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, DomainOutcome::Done { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub sales: DomainOutcome,
    pub financial: DomainOutcome,
    pub attendance: DomainOutcome,
}

impl RunSummary {
    pub fn all_done(&self) -> bool {
        self.sales.is_done() && self.financial.is_done() && self.attendance.is_done()
    }
}

/// Every configured source file must exist before any domain starts.
/// Called by the binary before the warehouse connection is opened, and
/// again by `run` as a guard.
pub fn check_sources(config: &PipelineConfig) -> Result<()> {
    for dc in [&config.sales, &config.financial, &config.attendance] {
        CsvExtractor::new(&dc.source, config.chunk_size).check_source()?;
    }
    Ok(())
}

pub struct Pipeline<'a> {
    config: PipelineConfig,
    conn: &'a Connection,
    reporter: &'a dyn Reporter,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: PipelineConfig, conn: &'a Connection, reporter: &'a dyn Reporter) -> Self {
        Pipeline {
            config,
            conn,
            reporter,
        }
    }

    /// Run all three domains sequentially. Per-domain failures are
    /// captured in the summary; only pre-flight failures are errors.
    pub fn run(&self) -> Result<RunSummary> {
        check_sources(&self.config)?;

        let fx = self.config.fx_table();

        let sales = self.run_domain(Domain::Sales, &self.config.sales, |batch, offset| {
            transform_sales(batch, &fx, offset, self.reporter)
        });
        let financial =
            self.run_domain(Domain::Financial, &self.config.financial, |batch, offset| {
                transform_financial(batch, &fx, offset, self.reporter)
            });
        let attendance =
            self.run_domain(Domain::Attendance, &self.config.attendance, |batch, _| {
                transform_attendance(batch, self.reporter)
            });

        Ok(RunSummary {
            sales,
            financial,
            attendance,
        })
    }

    fn run_domain<R, F>(&self, domain: Domain, dc: &DomainConfig, transform: F) -> DomainOutcome
    where
        R: WarehouseRecord,
        F: Fn(&[RawRecord], u64) -> Result<Vec<R>>,
    {
        let extractor = CsvExtractor::new(&dc.source, self.config.chunk_size);
        let loader = Loader::new(self.conn, &self.config.staging_suffix);

        self.reporter.domain_started(domain);
        let mut state = DomainState::NotStarted;
        transition(domain, &mut state, DomainState::Extracting);

        let mut row_offset: u64 = 0;
        let mut chunks = 0usize;
        let mut rows = 0usize;

        let result: Result<()> = (|| {
            for (i, chunk) in extractor.chunks()?.enumerate() {
                let chunk_no = i + 1;
                let batch = chunk.map_err(|e| e.in_chunk(domain, chunk_no))?;

                transition(domain, &mut state, DomainState::Transforming);
                let records =
                    transform(&batch, row_offset).map_err(|e| e.in_chunk(domain, chunk_no))?;

                transition(domain, &mut state, DomainState::Loading);
                let stats: LoadStats = loader
                    .load(&records, &dc.target_table)
                    .map_err(|e| e.in_chunk(domain, chunk_no))?;

                self.reporter
                    .chunk_loaded(domain, chunk_no, &dc.target_table, stats.inserted);

                row_offset += batch.len() as u64;
                chunks += 1;
                rows += batch.len();
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                transition(domain, &mut state, DomainState::Done);
                self.reporter.domain_finished(domain, chunks, rows);
                DomainOutcome::Done { chunks, rows }
            }
            Err(e) => {
                transition(domain, &mut state, DomainState::Failed);
                self.reporter.domain_failed(domain, &e.to_string());
                DomainOutcome::Failed {
                    chunk: chunks + 1,
                    error: e.to_string(),
                }
            }
        }
    }
}

fn transition(domain: Domain, state: &mut DomainState, next: DomainState) {
    tracing::debug!(domain = domain.name(), ?state, ?next, "State transition");
    *state = next;
}
