// Loader - idempotent staging-and-merge upsert
//
// One batch is written to `<target><suffix>` (fully overwriting any prior
// staging content), merged into the target with a single set-based
// insert-if-absent statement, and the staging table is dropped. The merge
// is the only statement that mutates the target, so a failure anywhere in
// the protocol leaves the target untouched. Re-running the same batch any
// number of times yields the same target content, provided record
// identities are stable.

use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::transform::{AttendanceRecord, FinancialRecord, SalesRecord};

/// The seam between transform and load: how a normalized record maps onto
/// its warehouse table.
pub trait WarehouseRecord {
    /// Column name and SQLite type, in insert order. The key column comes
    /// first.
    const COLUMNS: &'static [(&'static str, &'static str)];

    /// Unique-key column the merge matches on.
    const KEY_COLUMN: &'static str;

    /// Values in `COLUMNS` order.
    fn values(&self) -> Vec<Value>;
}

/// NaN has no SQLite representation; an undefined converted amount is
/// stored as NULL.
fn real(value: f64) -> Value {
    if value.is_nan() {
        Value::Null
    } else {
        Value::Real(value)
    }
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn date(value: NaiveDate) -> Value {
    Value::Text(value.format("%Y-%m-%d").to_string())
}

impl WarehouseRecord for SalesRecord {
    const COLUMNS: &'static [(&'static str, &'static str)] = &[
        ("sales_id", "TEXT PRIMARY KEY"),
        ("date", "TEXT NOT NULL"),
        ("quantity", "INTEGER NOT NULL"),
        ("unit_price", "REAL NOT NULL"),
        ("total_sales", "REAL NOT NULL"),
        ("unit_price_usd", "REAL"),
        ("total_sales_usd", "REAL"),
    ];

    const KEY_COLUMN: &'static str = "sales_id";

    fn values(&self) -> Vec<Value> {
        vec![
            text(&self.sales_id),
            date(self.date),
            Value::Integer(self.quantity),
            Value::Real(self.unit_price),
            Value::Real(self.total_sales),
            real(self.unit_price_usd),
            real(self.total_sales_usd),
        ]
    }
}

impl WarehouseRecord for FinancialRecord {
    const COLUMNS: &'static [(&'static str, &'static str)] = &[
        ("transaction_id", "TEXT PRIMARY KEY"),
        ("date", "TEXT NOT NULL"),
        ("revenue", "REAL NOT NULL"),
        ("expense", "REAL NOT NULL"),
        ("profit", "REAL NOT NULL"),
        ("revenue_usd", "REAL"),
        ("expense_usd", "REAL"),
        ("profit_usd", "REAL"),
    ];

    const KEY_COLUMN: &'static str = "transaction_id";

    fn values(&self) -> Vec<Value> {
        vec![
            text(&self.transaction_id),
            date(self.date),
            Value::Real(self.revenue),
            Value::Real(self.expense),
            Value::Real(self.profit),
            real(self.revenue_usd),
            real(self.expense_usd),
            real(self.profit_usd),
        ]
    }
}

impl WarehouseRecord for AttendanceRecord {
    const COLUMNS: &'static [(&'static str, &'static str)] = &[
        ("attendance_id", "TEXT PRIMARY KEY"),
        ("staff_id", "TEXT NOT NULL"),
        ("date", "TEXT NOT NULL"),
        ("session_id", "TEXT NOT NULL"),
        ("status", "TEXT NOT NULL"),
    ];

    const KEY_COLUMN: &'static str = "attendance_id";

    fn values(&self) -> Vec<Value> {
        vec![
            text(&self.attendance_id),
            text(&self.staff_id),
            date(self.date),
            text(&self.session_id),
            text(&self.status),
        ]
    }
}

/// Counts from one load: rows written to staging, rows the merge inserted,
/// rows skipped because their key already existed in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    pub staged: usize,
    pub inserted: usize,
    pub skipped: usize,
}

/// Open the warehouse database. Failure here is fatal pre-flight.
pub fn open_warehouse(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).map_err(PipelineError::ConnectionInit)?;
    // WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(PipelineError::ConnectionInit)?;
    Ok(conn)
}

pub struct Loader<'a> {
    conn: &'a Connection,
    staging_suffix: String,
}

impl<'a> Loader<'a> {
    pub fn new(conn: &'a Connection, staging_suffix: &str) -> Self {
        Loader {
            conn,
            staging_suffix: staging_suffix.to_string(),
        }
    }

    /// Idempotent upsert of one normalized batch into `target`.
    pub fn load<R: WarehouseRecord>(&self, batch: &[R], target: &str) -> Result<LoadStats> {
        self.create_table::<R>(target)?;

        let staging = format!("{}{}", target, self.staging_suffix);
        let result = self.stage_and_merge(batch, target, &staging);

        // Staging is dropped on the success and failure paths alike; a
        // failed chunk must not leave an orphaned staging artifact.
        let cleanup = self
            .conn
            .execute_batch(&format!(r#"DROP TABLE IF EXISTS "{staging}""#));

        let stats = result?;
        cleanup?;
        Ok(stats)
    }

    fn stage_and_merge<R: WarehouseRecord>(
        &self,
        batch: &[R],
        target: &str,
        staging: &str,
    ) -> Result<LoadStats> {
        // Overwrite any prior staging content so a retried chunk never
        // sees stale rows from a previous attempt.
        self.create_table::<R>(staging)?;
        self.conn
            .execute(&format!(r#"DELETE FROM "{staging}""#), [])?;

        let columns: Vec<&str> = R::COLUMNS.iter().map(|(name, _)| *name).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let insert_sql = format!(
            r#"INSERT INTO "{staging}" ({}) VALUES ({})"#,
            columns.join(", "),
            placeholders.join(", ")
        );

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(&insert_sql)?;
            for record in batch {
                stmt.execute(params_from_iter(record.values()))?;
            }
        }
        tx.commit()?;

        // Set-based insert-if-absent merge. Rows whose key already exists
        // in the target are left untouched. This is the only statement in
        // the crate that mutates a target table.
        let key = R::KEY_COLUMN;
        let select_columns: Vec<String> = columns.iter().map(|c| format!("s.{c}")).collect();
        let merge_sql = format!(
            r#"INSERT INTO "{target}" ({})
               SELECT {} FROM "{staging}" s
               WHERE NOT EXISTS (SELECT 1 FROM "{target}" t WHERE t.{key} = s.{key})"#,
            columns.join(", "),
            select_columns.join(", ")
        );
        let inserted = self.conn.execute(&merge_sql, [])?;

        Ok(LoadStats {
            staged: batch.len(),
            inserted,
            skipped: batch.len() - inserted,
        })
    }

    fn create_table<R: WarehouseRecord>(&self, table: &str) -> Result<()> {
        let columns: Vec<String> = R::COLUMNS
            .iter()
            .map(|(name, ty)| format!("{name} {ty}"))
            .collect();
        self.conn.execute(
            &format!(
                r#"CREATE TABLE IF NOT EXISTS "{table}" ({})"#,
                columns.join(", ")
            ),
            [],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_conn() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    fn sale(id: &str, quantity: i64) -> SalesRecord {
        SalesRecord {
            sales_id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            quantity,
            unit_price: 9.99,
            total_sales: 9.99 * quantity as f64,
            unit_price_usd: 9.99,
            total_sales_usd: 9.99 * quantity as f64,
        }
    }

    fn count_rows(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!(r#"SELECT COUNT(*) FROM "{table}""#), [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    fn table_exists(conn: &Connection, table: &str) -> bool {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .unwrap();
        count > 0
    }

    #[test]
    fn test_load_is_idempotent() {
        let conn = memory_conn();
        let loader = Loader::new(&conn, "_staging");
        let batch = vec![sale("1", 2), sale("2", 3), sale("3", 1)];

        let first = loader.load(&batch, "sales").unwrap();
        assert_eq!(first.inserted, 3);
        assert_eq!(first.skipped, 0);
        assert_eq!(count_rows(&conn, "sales"), 3);

        // same batch again: no duplicates, nothing inserted
        let second = loader.load(&batch, "sales").unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped, 3);
        assert_eq!(count_rows(&conn, "sales"), 3);
    }

    #[test]
    fn test_merge_inserts_only_absent_keys() {
        let conn = memory_conn();
        let loader = Loader::new(&conn, "_staging");

        loader.load(&[sale("1", 2), sale("2", 3)], "sales").unwrap();

        // overlapping batch: key "2" exists, only "3" is new
        let stats = loader.load(&[sale("2", 3), sale("3", 5)], "sales").unwrap();
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(count_rows(&conn, "sales"), 3);
    }

    #[test]
    fn test_existing_rows_left_untouched() {
        let conn = memory_conn();
        let loader = Loader::new(&conn, "_staging");

        loader.load(&[sale("1", 2)], "sales").unwrap();
        // same key, different quantity: insert-only semantics keep the old row
        loader.load(&[sale("1", 99)], "sales").unwrap();

        let quantity: i64 = conn
            .query_row("SELECT quantity FROM sales WHERE sales_id = '1'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(quantity, 2);
    }

    #[test]
    fn test_staging_dropped_after_success() {
        let conn = memory_conn();
        let loader = Loader::new(&conn, "_staging");
        loader.load(&[sale("1", 2)], "sales").unwrap();
        assert!(table_exists(&conn, "sales"));
        assert!(!table_exists(&conn, "sales_staging"));
    }

    #[test]
    fn test_failed_load_leaves_target_untouched_and_no_staging() {
        let conn = memory_conn();
        let loader = Loader::new(&conn, "_staging");
        loader.load(&[sale("1", 2)], "sales").unwrap();

        // duplicate key inside one batch violates the staging primary key
        let result = loader.load(&[sale("2", 1), sale("2", 1)], "sales");
        assert!(result.is_err());

        // target untouched, staging cleaned up even on the failure path
        assert_eq!(count_rows(&conn, "sales"), 1);
        assert!(!table_exists(&conn, "sales_staging"));
    }

    #[test]
    fn test_retry_after_failure_succeeds() {
        let conn = memory_conn();
        let loader = Loader::new(&conn, "_staging");

        let _ = loader.load(&[sale("1", 1), sale("1", 1)], "sales");
        // retried chunk sees no stale staging rows from the failed attempt
        let stats = loader.load(&[sale("1", 1), sale("2", 2)], "sales").unwrap();
        assert_eq!(stats.inserted, 2);
        assert_eq!(count_rows(&conn, "sales"), 2);
    }

    #[test]
    fn test_nan_amounts_stored_as_null() {
        let conn = memory_conn();
        let loader = Loader::new(&conn, "_staging");
        let mut record = sale("1", 2);
        record.unit_price_usd = f64::NAN;
        loader.load(&[record], "sales").unwrap();

        let usd: Option<f64> = conn
            .query_row("SELECT unit_price_usd FROM sales WHERE sales_id = '1'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(usd, None);
    }

    #[test]
    fn test_attendance_and_financial_tables() {
        let conn = memory_conn();
        let loader = Loader::new(&conn, "_staging");

        let attendance = AttendanceRecord {
            attendance_id: "abc".to_string(),
            staff_id: "E1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            session_id: "S1".to_string(),
            status: "Present".to_string(),
        };
        let financial = FinancialRecord {
            transaction_id: "0".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            revenue: 10.0,
            expense: 4.0,
            profit: 6.0,
            revenue_usd: 10.0,
            expense_usd: 4.0,
            profit_usd: 6.0,
        };

        loader.load(&[attendance], "attendance").unwrap();
        loader.load(&[financial], "financial").unwrap();
        assert_eq!(count_rows(&conn, "attendance"), 1);
        assert_eq!(count_rows(&conn, "financial"), 1);
    }

    #[test]
    fn test_custom_staging_suffix() {
        let conn = memory_conn();
        let loader = Loader::new(&conn, "_tmp");
        loader.load(&[sale("1", 1)], "sales").unwrap();
        assert!(!table_exists(&conn, "sales_tmp"));
        assert!(!table_exists(&conn, "sales_staging"));
        assert_eq!(count_rows(&conn, "sales"), 1);
    }
}
