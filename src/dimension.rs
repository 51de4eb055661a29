//! Deduplicated dimension tables and surrogate key assignment.

use crate::error::{EtlError, Result};
use crate::types::{Frame, Value};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

/// Which row survives when several share a natural key, and in what order
/// the dimension is emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupOrder {
    /// First occurrence in source order.
    #[cfg(test)]
    FirstSeen,
    /// Sort by natural key then `tie_break` (nulls last), keep the first per key.
    Sorted { tie_break: Vec<String> },
}

impl DedupOrder {
    pub fn sorted() -> Self {
        DedupOrder::Sorted {
            tie_break: Vec::new(),
        }
    }

    pub fn sorted_by(tie_break: &[&str]) -> Self {
        DedupOrder::Sorted {
            tie_break: tie_break.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurrogateKey {
    /// The natural key is the key; nothing is generated.
    Natural,
    /// `prefix` + 1-based index, as text.
    Prefixed { column: String, prefix: String },
    /// 1-based integer.
    Sequence { column: String },
}

impl SurrogateKey {
    pub fn prefixed(column: &str, prefix: &str) -> Self {
        SurrogateKey::Prefixed {
            column: column.to_string(),
            prefix: prefix.to_string(),
        }
    }

    pub fn sequence(column: &str) -> Self {
        SurrogateKey::Sequence {
            column: column.to_string(),
        }
    }

    fn generate(&self, count: usize) -> Option<(&str, Vec<Value>)> {
        match self {
            SurrogateKey::Natural => None,
            SurrogateKey::Prefixed { column, prefix } => Some((
                column.as_str(),
                (1..=count)
                    .map(|i| Value::Text(format!("{}{}", prefix, i)))
                    .collect(),
            )),
            SurrogateKey::Sequence { column } => Some((
                column.as_str(),
                (1..=count).map(|i| Value::Int(i as i64)).collect(),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DimensionSpec<'a> {
    pub name: &'a str,
    pub natural_key: &'a [&'a str],
    pub attributes: &'a [&'a str],
    pub order: DedupOrder,
    pub surrogate: SurrogateKey,
}

/// Build the distinct rows of a dimension from a record set.
///
/// Output columns: surrogate key (if generated), natural key, attributes.
/// Rows with a null in any natural-key column are left out.
pub fn build_dimension(frame: &Frame, spec: &DimensionSpec) -> Result<Frame> {
    if spec.natural_key.is_empty() {
        return Err(EtlError::Transform(format!(
            "dimension '{}' has no natural key",
            spec.name
        )));
    }
    let columns: Vec<&str> = spec
        .natural_key
        .iter()
        .chain(spec.attributes.iter())
        .copied()
        .collect();
    let projected = frame.select(&columns)?;
    let key_width = spec.natural_key.len();

    let mut rows: Vec<&Vec<Value>> = projected
        .rows()
        .iter()
        .filter(|r| r[..key_width].iter().all(|v| !v.is_null()))
        .collect();

    match &spec.order {
        DedupOrder::Sorted { tie_break } => {
            let tie_idxs = tie_break
                .iter()
                .map(|c| projected.require_column(c))
                .collect::<Result<Vec<_>>>()?;
            // stable: equal rows keep source order
            rows.sort_by(|a, b| {
                (0..key_width)
                    .chain(tie_idxs.iter().copied())
                    .map(|i| a[i].cmp_nulls_last(&b[i]))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }
        #[cfg(test)]
        DedupOrder::FirstSeen => {}
    }

    let mut seen = HashSet::new();
    let kept: Vec<Vec<Value>> = rows
        .into_iter()
        .filter(|r| {
            let key: Vec<Option<String>> = r[..key_width].iter().map(Value::key).collect();
            seen.insert(key)
        })
        .cloned()
        .collect();

    let mut dim = Frame::from_rows(projected.columns().to_vec(), kept)?;
    if let Some((column, keys)) = spec.surrogate.generate(dim.len()) {
        dim.insert_column(0, column, keys)?;
    }
    debug!(dimension = spec.name, rows = dim.len(), source_rows = frame.len(), "built dimension");
    Ok(dim)
}

/// Give every source row its own generated key, prepended as the first column.
pub fn assign_row_keys(mut frame: Frame, surrogate: &SurrogateKey) -> Result<Frame> {
    if let Some((column, keys)) = surrogate.generate(frame.len()) {
        frame.insert_column(0, column, keys)?;
    }
    Ok(frame)
}
