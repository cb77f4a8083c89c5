// Transformer - per-domain batch normalization
//
// Pure functions mapping a raw batch to a normalized batch: type coercion,
// currency conversion, deterministic identity assignment, and advisory
// quality checks. Coercion failures abort the chunk; quality findings are
// reported through the injected Reporter and never block a batch.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

use crate::error::{PipelineError, Result};
use crate::extract::RawRecord;
use crate::report::{QualityWarning, Reporter};

// ============================================================================
// CORE TYPES
// ============================================================================

/// The three independent datasets the pipeline moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Sales,
    Financial,
    Attendance,
}

impl Domain {
    /// Human-readable name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Domain::Sales => "sales",
            Domain::Financial => "financial",
            Domain::Attendance => "attendance",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable currency -> USD multiplier lookup.
///
/// Every currency present in the input data is expected to have an entry;
/// a missing code converts to NaN for that row and raises a quality
/// warning, it does not abort the chunk.
#[derive(Debug, Clone)]
pub struct FxTable {
    rates: HashMap<String, f64>,
}

impl FxTable {
    pub fn new(rates: HashMap<String, f64>) -> Self {
        FxTable { rates }
    }

    pub fn rate(&self, currency: &str) -> Option<f64> {
        self.rates.get(currency).copied()
    }
}

/// Valid attendance statuses. The stored field stays a string so that an
/// out-of-range status still loads; the check is advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Leave,
}

impl AttendanceStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Present" => Some(AttendanceStatus::Present),
            "Absent" => Some(AttendanceStatus::Absent),
            "Leave" => Some(AttendanceStatus::Leave),
            _ => None,
        }
    }

    pub fn is_valid(value: &str) -> bool {
        Self::parse(value).is_some()
    }
}

// ============================================================================
// NORMALIZED RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SalesRecord {
    pub sales_id: String,
    pub date: NaiveDate,
    pub quantity: i64,
    pub unit_price: f64,
    pub total_sales: f64,
    pub unit_price_usd: f64,
    pub total_sales_usd: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinancialRecord {
    pub transaction_id: String,
    pub date: NaiveDate,
    pub revenue: f64,
    pub expense: f64,
    pub profit: f64,
    pub revenue_usd: f64,
    pub expense_usd: f64,
    pub profit_usd: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub attendance_id: String,
    pub staff_id: String,
    pub date: NaiveDate,
    pub session_id: String,
    pub status: String,
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// Parse a date in ISO (YYYY-MM-DD) or US (MM/DD/YYYY) form.
fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%m/%d/%Y"))
        .map_err(|_| PipelineError::InvalidDate {
            value: value.to_string(),
        })
}

fn parse_f64(record: &RawRecord, column: &str) -> Result<f64> {
    let raw = record.require(column)?;
    let trimmed = raw.trim();
    // An empty cell is a null: the amount is undefined (NaN, stored as
    // SQL NULL) and the null quality check flags it. Only non-empty
    // malformed text is a coercion error.
    if trimmed.is_empty() {
        return Ok(f64::NAN);
    }
    trimmed
        .parse::<f64>()
        .map_err(|_| PipelineError::InvalidNumber {
            column: column.to_string(),
            value: raw.to_string(),
        })
}

fn parse_i64(record: &RawRecord, column: &str) -> Result<i64> {
    let raw = record.require(column)?;
    raw.trim()
        .parse::<i64>()
        .map_err(|_| PipelineError::InvalidNumber {
            column: column.to_string(),
            value: raw.to_string(),
        })
}

/// USD conversion for one amount. Unknown currency -> NaN, counted by the
/// caller for a quality warning.
fn to_usd(amount: f64, currency: &str, fx: &FxTable) -> f64 {
    match fx.rate(currency) {
        Some(rate) => amount * rate,
        None => f64::NAN,
    }
}

/// Deterministic attendance identity: digest of staff id, date, and
/// session id. The same logical attendance event always hashes to the
/// same value regardless of run, which is what the merge upsert keys on.
pub fn attendance_key(staff_id: &str, date: NaiveDate, session_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}_{}_{}", staff_id, date.format("%Y-%m-%d"), session_id));
    format!("{:x}", hasher.finalize())
}

/// Identity for domains with an optional source key column: carried over
/// when present, otherwise derived from the global row index. `row_offset`
/// is the cumulative row count of all prior chunks, so positional ids
/// stay unique across chunk boundaries.
fn positional_id(record: &RawRecord, key_column: &str, row_offset: u64, row: usize) -> String {
    match record.get(key_column) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => (row_offset + row as u64).to_string(),
    }
}

fn null_count(batch: &[RawRecord]) -> usize {
    batch
        .iter()
        .filter(|record| {
            record
                .columns()
                .iter()
                .any(|col| record.get(col).map_or(true, |v| v.trim().is_empty()))
        })
        .count()
}

fn warn_if(reporter: &dyn Reporter, domain: Domain, field: &str, message: &str, rows: usize) {
    if rows > 0 {
        reporter.quality_warning(&QualityWarning::new(domain, field, message, rows));
    }
}

// ============================================================================
// SALES
// ============================================================================

pub fn transform_sales(
    batch: &[RawRecord],
    fx: &FxTable,
    row_offset: u64,
    reporter: &dyn Reporter,
) -> Result<Vec<SalesRecord>> {
    let mut records = Vec::with_capacity(batch.len());
    let mut unknown_currency = 0;

    for (row, raw) in batch.iter().enumerate() {
        let date = parse_date(raw.require("Date")?)?;
        let quantity = parse_i64(raw, "Quantity")?;
        let unit_price = parse_f64(raw, "UnitPrice")?;
        let total_sales = parse_f64(raw, "TotalSales")?;
        let currency = raw.require("Currency")?;

        if fx.rate(currency).is_none() {
            unknown_currency += 1;
        }

        records.push(SalesRecord {
            sales_id: positional_id(raw, "sales_id", row_offset, row),
            date,
            quantity,
            unit_price,
            total_sales,
            unit_price_usd: to_usd(unit_price, currency, fx),
            total_sales_usd: to_usd(total_sales, currency, fx),
        });
    }

    check_sales_quality(batch, &records, reporter);
    warn_if(
        reporter,
        Domain::Sales,
        "Currency",
        "Currency codes without an FX rate; USD amounts are undefined",
        unknown_currency,
    );

    Ok(records)
}

fn check_sales_quality(batch: &[RawRecord], records: &[SalesRecord], reporter: &dyn Reporter) {
    warn_if(
        reporter,
        Domain::Sales,
        "*",
        "Null values detected in sales data",
        null_count(batch),
    );
    warn_if(
        reporter,
        Domain::Sales,
        "Quantity",
        "Negative quantities found in sales data",
        records.iter().filter(|r| r.quantity < 0).count(),
    );
    warn_if(
        reporter,
        Domain::Sales,
        "UnitPrice/TotalSales",
        "Negative sales amounts detected",
        records
            .iter()
            .filter(|r| r.unit_price < 0.0 || r.total_sales < 0.0)
            .count(),
    );
}

// ============================================================================
// FINANCIAL
// ============================================================================

pub fn transform_financial(
    batch: &[RawRecord],
    fx: &FxTable,
    row_offset: u64,
    reporter: &dyn Reporter,
) -> Result<Vec<FinancialRecord>> {
    let mut records = Vec::with_capacity(batch.len());
    let mut unknown_currency = 0;

    for (row, raw) in batch.iter().enumerate() {
        let date = parse_date(raw.require("Date")?)?;
        let revenue = parse_f64(raw, "Revenue")?;
        let expense = parse_f64(raw, "Expense")?;
        let profit = parse_f64(raw, "Profit")?;
        let currency = raw.require("Currency")?;

        if fx.rate(currency).is_none() {
            unknown_currency += 1;
        }

        records.push(FinancialRecord {
            transaction_id: positional_id(raw, "transaction_id", row_offset, row),
            date,
            revenue,
            expense,
            profit,
            revenue_usd: to_usd(revenue, currency, fx),
            expense_usd: to_usd(expense, currency, fx),
            profit_usd: to_usd(profit, currency, fx),
        });
    }

    check_financial_quality(batch, &records, reporter);
    warn_if(
        reporter,
        Domain::Financial,
        "Currency",
        "Currency codes without an FX rate; USD amounts are undefined",
        unknown_currency,
    );

    Ok(records)
}

fn check_financial_quality(
    batch: &[RawRecord],
    records: &[FinancialRecord],
    reporter: &dyn Reporter,
) {
    warn_if(
        reporter,
        Domain::Financial,
        "*",
        "Null values detected in financial data",
        null_count(batch),
    );
    warn_if(
        reporter,
        Domain::Financial,
        "Revenue/Expense/Profit",
        "Negative amounts detected in financial data",
        records
            .iter()
            .filter(|r| r.revenue < 0.0 || r.expense < 0.0 || r.profit < 0.0)
            .count(),
    );
}

// ============================================================================
// ATTENDANCE
// ============================================================================

pub fn transform_attendance(
    batch: &[RawRecord],
    reporter: &dyn Reporter,
) -> Result<Vec<AttendanceRecord>> {
    let mut records = Vec::with_capacity(batch.len());

    for raw in batch {
        let date = parse_date(raw.require("Date")?)?;
        let staff_id = raw.require("StaffID")?.to_string();
        let session_id = raw.require("SessionID")?.to_string();
        let status = raw.require("Status")?.to_string();

        records.push(AttendanceRecord {
            // always derived, never inherited
            attendance_id: attendance_key(&staff_id, date, &session_id),
            staff_id,
            date,
            session_id,
            status,
        });
    }

    check_attendance_quality(batch, &records, reporter);

    Ok(records)
}

fn check_attendance_quality(
    batch: &[RawRecord],
    records: &[AttendanceRecord],
    reporter: &dyn Reporter,
) {
    warn_if(
        reporter,
        Domain::Attendance,
        "*",
        "Null values detected in attendance data",
        null_count(batch),
    );
    warn_if(
        reporter,
        Domain::Attendance,
        "Status",
        "Some attendance statuses are invalid",
        records
            .iter()
            .filter(|r| !AttendanceStatus::is_valid(&r.status))
            .count(),
    );
}

// ============================================================================
// TESTS
// ============================================================================
