//! Fact table assembly: surrogate key lookups and final column selection.

use crate::error::{EtlError, Result};
use crate::types::{Frame, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Left-join `dimension` into `frame` on `(frame column, dimension column)`
/// pairs and append the dimension's `key_column` as a new column.
///
/// Unmatched rows, and rows with a null join value, get a null key.
pub fn attach_key(
    mut frame: Frame,
    dimension: &Frame,
    on: &[(&str, &str)],
    key_column: &str,
) -> Result<Frame> {
    if on.is_empty() {
        return Err(EtlError::Transform(format!(
            "join for '{}' has no key columns",
            key_column
        )));
    }
    let dim_key = dimension.require_column(key_column)?;
    let dim_on = on
        .iter()
        .map(|(_, d)| dimension.require_column(d))
        .collect::<Result<Vec<_>>>()?;
    let frame_on = on
        .iter()
        .map(|(f, _)| frame.require_column(f))
        .collect::<Result<Vec<_>>>()?;

    let mut lookup: HashMap<Vec<String>, Value> = HashMap::with_capacity(dimension.len());
    for row in dimension.rows() {
        let key: Option<Vec<String>> = dim_on.iter().map(|&i| row[i].key()).collect();
        if let Some(key) = key {
            lookup.entry(key).or_insert_with(|| row[dim_key].clone());
        }
    }

    let keys: Vec<Value> = frame
        .rows()
        .iter()
        .map(|row| {
            frame_on
                .iter()
                .map(|&i| row[i].key())
                .collect::<Option<Vec<String>>>()
                .and_then(|k| lookup.get(&k).cloned())
                .unwrap_or(Value::Null)
        })
        .collect();

    let unmatched = keys.iter().filter(|v| v.is_null()).count();
    if unmatched > 0 {
        warn!(key = key_column, unmatched, "rows without a matching dimension entry");
    }
    frame.push_column(key_column, keys)?;
    debug!(key = key_column, rows = frame.len(), "attached dimension key");
    Ok(frame)
}

/// Fixed output column order for a fact table.
pub fn select_columns(frame: &Frame, columns: &[&str]) -> Result<Frame> {
    frame.select(columns)
}

/// Prefix every non-null value of `column`, e.g. `ORD_` + customer id.
pub fn prefix_values(mut frame: Frame, column: &str, prefix: &str) -> Result<Frame> {
    frame.map_column(column, |v| match v {
        Value::Null => Value::Null,
        other => Value::Text(format!("{}{}", prefix, other)),
    })?;
    Ok(frame)
}
