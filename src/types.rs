use crate::error::{EtlError, Result};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use tabled::Tabled;

/// A single cell. Timestamps, dates and times travel as ISO text.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Textual identity used for joins and deduplication. `None` for null.
    pub fn key(&self) -> Option<String> {
        if self.is_null() {
            None
        } else {
            Some(self.to_string())
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Int(_) | Value::Float(_) => 1,
            Value::Text(_) => 2,
            Value::Null => 3,
        }
    }

    /// Total order with nulls sorting after every other value.
    pub fn cmp_nulls_last(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// In-memory table: ordered column labels and rows of equal width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Frame {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut frame = Frame::new(columns);
        for row in rows {
            frame.push_row(row)?;
        }
        Ok(frame)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| {
            EtlError::Transform(format!(
                "column '{}' not found (have: {})",
                name,
                self.columns.join(", ")
            ))
        })
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(EtlError::Transform(format!(
                "row has {} values, frame has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    #[cfg(test)]
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    pub fn column_values(&self, column: &str) -> Result<Vec<&Value>> {
        let idx = self.require_column(column)?;
        Ok(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Returns `false` when `from` is not a column.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.column_index(from) {
            Some(idx) => {
                self.columns[idx] = to.to_string();
                true
            }
            None => false,
        }
    }

    /// Insert a column at `position`, one value per existing row.
    pub fn insert_column(&mut self, position: usize, name: &str, values: Vec<Value>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(EtlError::Transform(format!(
                "column '{}' has {} values for {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }
        if self.column_index(name).is_some() {
            return Err(EtlError::Transform(format!("column '{}' already exists", name)));
        }
        let position = position.min(self.columns.len());
        self.columns.insert(position, name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.insert(position, value);
        }
        Ok(())
    }

    pub fn push_column(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        self.insert_column(self.columns.len(), name, values)
    }

    pub fn map_column<F>(&mut self, column: &str, mut f: F) -> Result<()>
    where
        F: FnMut(&Value) -> Value,
    {
        let idx = self.require_column(column)?;
        for row in &mut self.rows {
            row[idx] = f(&row[idx]);
        }
        Ok(())
    }

    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[Value]) -> bool,
    {
        self.rows.retain(|r| keep(r));
    }

    /// New frame with exactly `names`, in that order.
    pub fn select(&self, names: &[&str]) -> Result<Frame> {
        let idxs = names
            .iter()
            .map(|n| self.require_column(n))
            .collect::<Result<Vec<_>>>()?;
        let rows = self
            .rows
            .iter()
            .map(|r| idxs.iter().map(|&i| r[i].clone()).collect())
            .collect();
        Ok(Frame {
            columns: names.iter().map(|n| n.to_string()).collect(),
            rows,
        })
    }

    /// Drop exact duplicate rows, keeping the first occurrence.
    pub fn distinct(&self) -> Frame {
        let mut seen = std::collections::HashSet::new();
        let rows = self
            .rows
            .iter()
            .filter(|r| {
                let key: Vec<Option<String>> = r.iter().map(Value::key).collect();
                seen.insert(key)
            })
            .cloned()
            .collect();
        Frame {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Build a frame of text cells; empty strings become null.
    #[cfg(test)]
    pub fn from_text(columns: &[&str], rows: &[&[&str]]) -> Frame {
        let columns = columns.iter().map(|c| c.to_string()).collect();
        let rows = rows
            .iter()
            .map(|r| {
                r.iter()
                    .map(|s| if s.is_empty() { Value::Null } else { Value::text(*s) })
                    .collect()
            })
            .collect();
        Frame::from_rows(columns, rows).expect("rows match header width")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

/// Destination table shape, either declared by a job or reflected from the warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableSchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Add a nullable column
    pub fn column(mut self, name: &str, sql_type: &str) -> Self {
        self.columns.push(ColumnSpec {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            nullable: true,
            primary_key: false,
        });
        self
    }

    /// Add a non-null column
    pub fn required(mut self, name: &str, sql_type: &str) -> Self {
        self.columns.push(ColumnSpec {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            nullable: false,
            primary_key: false,
        });
        self
    }

    /// Add a primary key column
    pub fn key(mut self, name: &str, sql_type: &str) -> Self {
        self.columns.push(ColumnSpec {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            nullable: false,
            primary_key: true,
        });
        self
    }

    pub fn references(mut self, column: &str, table: &str, references_column: &str) -> Self {
        self.foreign_keys.push(ForeignKey {
            column: column.to_string(),
            references_table: table.to_string(),
            references_column: references_column.to_string(),
        });
        self
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// One line of the end-of-run summary table and JSON file.
#[derive(Debug, Serialize, Tabled, Clone)]
pub struct JobSummaryRow {
    #[serde(rename = "Job")]
    #[tabled(rename = "Job")]
    pub job: String,
    #[serde(rename = "Status")]
    #[tabled(rename = "Status")]
    pub status: String,
    #[serde(rename = "RowsExtracted")]
    #[tabled(rename = "RowsExtracted")]
    pub rows_extracted: usize,
    #[serde(rename = "RowsLoaded")]
    #[tabled(rename = "RowsLoaded")]
    pub rows_loaded: usize,
    #[serde(rename = "Tables")]
    #[tabled(rename = "Tables")]
    pub tables: String,
    #[serde(rename = "ElapsedSecs")]
    #[tabled(rename = "ElapsedSecs")]
    pub elapsed_secs: String,
    #[serde(rename = "Error")]
    #[tabled(rename = "Error")]
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub started_at: String,
    pub jobs_total: usize,
    pub jobs_failed: usize,
    pub jobs: Vec<JobSummaryRow>,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.jobs_failed == 0
    }
}
