//! Batched table loading with append and truncate-then-append modes.
//!
//! All tables of one job load as a single unit: truncation, inserts and the
//! referential check share one transaction, which commits only if every step
//! succeeds. Readers keep seeing the previous contents until the commit.

use crate::error::{EtlError, Result};
use crate::types::Frame;
use crate::util::format_int;
use crate::warehouse::{foreign_key_violations, qualified, quote_ident, referencing_tables, Warehouse};
use rusqlite::{params_from_iter, Connection};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Upper bound on bound parameters per statement for the bundled SQLite.
pub const MAX_BIND_PARAMS: usize = 32_766;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Add rows, leave existing ones alone
    Append,
    /// Remove existing rows (and rows of tables referencing them) first
    TruncateAppend,
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadMode::Append => write!(f, "append"),
            LoadMode::TruncateAppend => write!(f, "truncate+append"),
        }
    }
}

/// Behaviour on primary/unique key collisions during insert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Abort the load (default)
    #[default]
    Fail,
    /// Skip conflicting rows
    Ignore,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail" => Ok(ConflictPolicy::Fail),
            "ignore" => Ok(ConflictPolicy::Ignore),
            _ => Err(format!(
                "Invalid conflict policy: {}. Expected: fail, ignore",
                s
            )),
        }
    }
}

/// One destination table and the rows to write into it.
#[derive(Debug, Clone)]
pub struct TableLoad {
    pub table: String,
    pub frame: Frame,
    pub mode: LoadMode,
}

impl TableLoad {
    pub fn new(table: &str, frame: Frame, mode: LoadMode) -> Self {
        Self {
            table: table.to_string(),
            frame,
            mode,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub batch_size: usize,
    pub on_conflict: ConflictPolicy,
}

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub table: String,
    pub mode: LoadMode,
    pub rows_submitted: usize,
    pub rows_inserted: usize,
    pub elapsed: Duration,
}

impl LoadReport {
    pub fn rows_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.rows_inserted as f64 / secs
        } else {
            0.0
        }
    }
}

/// Load `plans` in order (dimensions before facts) as one atomic unit.
pub fn load_tables(
    warehouse: &mut Warehouse,
    plans: &[TableLoad],
    options: LoadOptions,
) -> Result<Vec<LoadReport>> {
    let schema = warehouse.schema().to_string();
    let tx = warehouse
        .connection_mut()
        .transaction()
        .map_err(|e| EtlError::Connection(e.to_string()))?;
    tx.execute_batch("PRAGMA defer_foreign_keys = ON;")
        .map_err(|e| EtlError::Connection(e.to_string()))?;

    for table in truncation_order(&tx, &schema, plans)? {
        let n = tx
            .execute(&format!("DELETE FROM {}", qualified(&schema, &table)), [])
            .map_err(|e| EtlError::load(&table, e))?;
        info!(table = %table, rows = n, "truncated");
    }

    let mut reports = Vec::with_capacity(plans.len());
    for plan in plans {
        reports.push(insert_frame(&tx, &schema, plan, options)?);
    }

    for plan in plans {
        let violations = foreign_key_violations(&tx, &schema, &plan.table)
            .map_err(|e| EtlError::load(&plan.table, e))?;
        if violations > 0 {
            return Err(EtlError::ReferentialIntegrity {
                table: plan.table.clone(),
                violations,
            });
        }
    }

    tx.commit()
        .map_err(|e| EtlError::load(plans.last().map_or("", |p| p.table.as_str()), e))?;
    Ok(reports)
}

/// Tables to clear, dependents before the tables they reference.
fn truncation_order(conn: &Connection, schema: &str, plans: &[TableLoad]) -> Result<Vec<String>> {
    fn visit(
        conn: &Connection,
        schema: &str,
        table: &str,
        visiting: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        if order.iter().any(|t| t == table) || !visiting.insert(table.to_string()) {
            return Ok(());
        }
        let dependents =
            referencing_tables(conn, schema, table).map_err(|e| EtlError::load(table, e))?;
        for dependent in dependents {
            visit(conn, schema, &dependent, visiting, order)?;
        }
        order.push(table.to_string());
        Ok(())
    }

    let mut visiting = HashSet::new();
    let mut order = Vec::new();
    for plan in plans.iter().rev() {
        if plan.mode == LoadMode::TruncateAppend {
            visit(conn, schema, &plan.table, &mut visiting, &mut order)?;
        }
    }
    Ok(order)
}

fn insert_sql(schema: &str, table: &str, columns: &[String], rows: usize, on_conflict: ConflictPolicy) -> String {
    let verb = match on_conflict {
        ConflictPolicy::Fail => "INSERT INTO",
        ConflictPolicy::Ignore => "INSERT OR IGNORE INTO",
    };
    let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let tuple = format!("({})", vec!["?"; columns.len()].join(", "));
    format!(
        "{} {} ({}) VALUES {}",
        verb,
        qualified(schema, table),
        cols.join(", "),
        vec![tuple.as_str(); rows].join(", ")
    )
}

fn insert_frame(
    conn: &Connection,
    schema: &str,
    plan: &TableLoad,
    options: LoadOptions,
) -> Result<LoadReport> {
    let start = Instant::now();
    let frame = &plan.frame;
    if frame.width() == 0 {
        return Err(EtlError::load(&plan.table, "frame has no columns"));
    }
    let per_stmt = options
        .batch_size
        .min(MAX_BIND_PARAMS / frame.width())
        .max(1);

    let mut inserted = 0usize;
    for (i, chunk) in frame.rows().chunks(per_stmt).enumerate() {
        let sql = insert_sql(schema, &plan.table, frame.columns(), chunk.len(), options.on_conflict);
        let mut stmt = conn
            .prepare_cached(&sql)
            .map_err(|e| EtlError::load(&plan.table, e))?;
        let n = stmt
            .execute(params_from_iter(chunk.iter().flatten()))
            .map_err(|e| EtlError::load(&plan.table, format!("batch {}: {}", i + 1, e)))?;
        inserted += n;
        debug!(table = %plan.table, batch = i + 1, rows = chunk.len(), "inserted batch");
    }

    let report = LoadReport {
        table: plan.table.clone(),
        mode: plan.mode,
        rows_submitted: frame.len(),
        rows_inserted: inserted,
        elapsed: start.elapsed(),
    };
    info!(
        table = %report.table,
        mode = %report.mode,
        rows = %format_int(report.rows_inserted),
        secs = %format!("{:.2}", report.elapsed.as_secs_f64()),
        rows_per_sec = %format!("{:.0}", report.rows_per_sec()),
        "loaded"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WarehouseConfig;
    use crate::types::{TableSchema, Value};

    fn warehouse() -> Warehouse {
        let wh = Warehouse::connect(&WarehouseConfig::in_memory()).unwrap();
        wh.create_table(
            &TableSchema::new("dim_user")
                .key("user_sk", "TEXT")
                .column("userid", "INTEGER"),
        )
        .unwrap();
        wh.create_table(
            &TableSchema::new("fact_app_events")
                .column("user_sk", "TEXT")
                .column("amount", "REAL")
                .references("user_sk", "dim_user", "user_sk"),
        )
        .unwrap();
        wh
    }

    fn users(n: usize) -> Frame {
        let rows = (1..=n)
            .map(|i| vec![Value::Text(format!("CLK_U{}", i)), Value::Int(i as i64)])
            .collect();
        Frame::from_rows(vec!["user_sk".into(), "userid".into()], rows).unwrap()
    }

    fn events(keys: &[&str]) -> Frame {
        let rows = keys
            .iter()
            .map(|k| vec![Value::text(*k), Value::Float(1.5)])
            .collect();
        Frame::from_rows(vec!["user_sk".into(), "amount".into()], rows).unwrap()
    }

    fn options(batch_size: usize) -> LoadOptions {
        LoadOptions {
            batch_size,
            on_conflict: ConflictPolicy::Fail,
        }
    }

    #[test]
    fn test_truncate_append_is_idempotent() {
        let mut wh = warehouse();
        for _ in 0..2 {
            let plans = vec![
                TableLoad::new("dim_user", users(3), LoadMode::TruncateAppend),
                TableLoad::new("fact_app_events", events(&["CLK_U1", "CLK_U2"]), LoadMode::Append),
            ];
            load_tables(&mut wh, &plans, options(1000)).unwrap();
            assert_eq!(wh.count_rows("dim_user").unwrap(), 3);
            assert_eq!(wh.count_rows("fact_app_events").unwrap(), 2);
        }
    }

    #[test]
    fn test_append_without_key_doubles() {
        let mut wh = warehouse();
        load_tables(
            &mut wh,
            &[TableLoad::new("dim_user", users(2), LoadMode::TruncateAppend)],
            options(1000),
        )
        .unwrap();
        for expected in [3, 6] {
            let plans = [TableLoad::new(
                "fact_app_events",
                events(&["CLK_U1", "CLK_U2", "CLK_U2"]),
                LoadMode::Append,
            )];
            load_tables(&mut wh, &plans, options(1000)).unwrap();
            assert_eq!(wh.count_rows("fact_app_events").unwrap(), expected);
        }
    }

    #[test]
    fn test_append_with_key_fails_on_second_run_and_rolls_back() {
        let mut wh = warehouse();
        let plans = [TableLoad::new("dim_user", users(3), LoadMode::Append)];
        load_tables(&mut wh, &plans, options(2)).unwrap();
        let err = load_tables(&mut wh, &plans, options(2)).unwrap_err();
        assert!(matches!(err, EtlError::Load { ref table, .. } if table == "dim_user"));
        assert_eq!(wh.count_rows("dim_user").unwrap(), 3);

        let ignore = LoadOptions {
            batch_size: 2,
            on_conflict: ConflictPolicy::Ignore,
        };
        let reports = load_tables(&mut wh, &plans, ignore).unwrap();
        assert_eq!(reports[0].rows_submitted, 3);
        assert_eq!(reports[0].rows_inserted, 0);
        assert_eq!(wh.count_rows("dim_user").unwrap(), 3);
    }

    #[test]
    fn test_orphan_reference_rolls_back_truncation() {
        let mut wh = warehouse();
        let good = vec![
            TableLoad::new("dim_user", users(2), LoadMode::TruncateAppend),
            TableLoad::new("fact_app_events", events(&["CLK_U1"]), LoadMode::Append),
        ];
        load_tables(&mut wh, &good, options(1000)).unwrap();

        let bad = vec![
            TableLoad::new("dim_user", users(1), LoadMode::TruncateAppend),
            TableLoad::new("fact_app_events", events(&["CLK_U9"]), LoadMode::Append),
        ];
        let err = load_tables(&mut wh, &bad, options(1000)).unwrap_err();
        match err {
            EtlError::ReferentialIntegrity { table, violations } => {
                assert_eq!(table, "fact_app_events");
                assert_eq!(violations, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(wh.count_rows("dim_user").unwrap(), 2);
        assert_eq!(wh.count_rows("fact_app_events").unwrap(), 1);
    }

    #[test]
    fn test_truncating_dimension_cascades_to_facts() {
        let mut wh = warehouse();
        load_tables(
            &mut wh,
            &[
                TableLoad::new("dim_user", users(2), LoadMode::TruncateAppend),
                TableLoad::new("fact_app_events", events(&["CLK_U1", "CLK_U2"]), LoadMode::Append),
            ],
            options(1000),
        )
        .unwrap();
        load_tables(
            &mut wh,
            &[TableLoad::new("dim_user", users(5), LoadMode::TruncateAppend)],
            options(1000),
        )
        .unwrap();
        assert_eq!(wh.count_rows("dim_user").unwrap(), 5);
        assert_eq!(wh.count_rows("fact_app_events").unwrap(), 0);
    }

    #[test]
    fn test_batches_cover_every_row() {
        let mut wh = warehouse();
        let reports = load_tables(
            &mut wh,
            &[TableLoad::new("dim_user", users(7), LoadMode::TruncateAppend)],
            options(3),
        )
        .unwrap();
        assert_eq!(reports[0].rows_inserted, 7);
        assert_eq!(wh.count_rows("dim_user").unwrap(), 7);
    }

    #[test]
    fn test_insert_sql_shape() {
        let sql = insert_sql(
            "main",
            "dim_user",
            &["user_sk".to_string(), "userid".to_string()],
            2,
            ConflictPolicy::Ignore,
        );
        assert_eq!(
            sql,
            "INSERT OR IGNORE INTO \"main\".\"dim_user\" (\"user_sk\", \"userid\") VALUES (?, ?), (?, ?)"
        );
    }
}
