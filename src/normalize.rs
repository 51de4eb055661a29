//! Column renaming and reconciliation against a warehouse table schema.

use crate::error::{EtlError, Result};
use crate::types::{Frame, TableSchema, Value};
use serde::Deserialize;
use std::str::FromStr;
use tracing::{info, warn};

/// What to do when a mapping entry names a source column that is not present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingPolicy {
    /// Fail the job
    Strict,
    /// Log a warning and skip the entry (default)
    #[default]
    #[serde(alias = "skip")]
    Warn,
}

impl FromStr for MappingPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(MappingPolicy::Strict),
            "warn" | "skip" => Ok(MappingPolicy::Warn),
            _ => Err(format!(
                "Invalid mapping policy: {}. Expected: strict, warn",
                s
            )),
        }
    }
}

/// Rename columns per `(source, target)` pairs.
pub fn rename_columns(
    mut frame: Frame,
    mapping: &[(&str, &str)],
    policy: MappingPolicy,
) -> Result<Frame> {
    for (source, target) in mapping {
        if frame.column_index(source).is_some() {
            if source != target && frame.column_index(target).is_some() {
                return Err(EtlError::Transform(format!(
                    "renaming '{}' would duplicate existing column '{}'",
                    source, target
                )));
            }
            frame.rename_column(source, target);
            continue;
        }
        match policy {
            MappingPolicy::Strict => {
                return Err(EtlError::Transform(format!(
                    "mapped source column '{}' (-> '{}') is missing",
                    source, target
                )));
            }
            MappingPolicy::Warn => {
                warn!(source = %source, target = %target, "mapped source column missing, skipping");
            }
        }
    }
    Ok(frame)
}

/// Reshape `frame` to exactly the schema's columns, in schema order.
///
/// Schema columns missing from the frame are null-filled; frame columns the
/// schema does not declare are dropped.
pub fn reconcile(frame: &Frame, schema: &TableSchema) -> Frame {
    let missing: Vec<&str> = schema
        .column_names()
        .into_iter()
        .filter(|c| frame.column_index(c).is_none())
        .collect();
    if !missing.is_empty() {
        info!(table = %schema.name, columns = ?missing, "adding missing columns");
    }
    let extra: Vec<&str> = frame
        .columns()
        .iter()
        .map(String::as_str)
        .filter(|c| !schema.has_column(c))
        .collect();
    if !extra.is_empty() {
        info!(table = %schema.name, columns = ?extra, "dropping extra columns");
    }

    let idxs: Vec<Option<usize>> = schema
        .columns
        .iter()
        .map(|c| frame.column_index(&c.name))
        .collect();
    let rows = frame
        .rows()
        .iter()
        .map(|r| {
            idxs.iter()
                .map(|i| i.map(|i| r[i].clone()).unwrap_or(Value::Null))
                .collect()
        })
        .collect();
    let columns = schema.columns.iter().map(|c| c.name.clone()).collect();
    // widths agree by construction
    Frame::from_rows(columns, rows).unwrap_or_default()
}

pub fn normalize(
    frame: Frame,
    mapping: &[(&str, &str)],
    schema: &TableSchema,
    policy: MappingPolicy,
) -> Result<Frame> {
    let renamed = rename_columns(frame, mapping, policy)?;
    Ok(reconcile(&renamed, schema))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TableSchema {
        TableSchema::new("fact_app_events")
            .column("user_sk", "TEXT")
            .column("sessionid", "INTEGER")
            .column("event_name", "TEXT")
    }

    #[test]
    fn test_normalize_renames_adds_and_drops() {
        let frame = Frame::from_text(
            &["EventType", "SessionID", "Junk"],
            &[&["click", "7", "zzz"]],
        );
        let out = normalize(
            frame,
            &[("EventType", "event_name"), ("SessionID", "sessionid")],
            &schema(),
            MappingPolicy::Warn,
        )
        .unwrap();
        assert_eq!(out.columns(), &["user_sk", "sessionid", "event_name"]);
        assert_eq!(out.value(0, "user_sk"), Some(&Value::Null));
        assert_eq!(out.value(0, "sessionid"), Some(&Value::text("7")));
        assert_eq!(out.value(0, "event_name"), Some(&Value::text("click")));
    }

    #[test]
    fn test_missing_mapping_source_is_skipped_when_lenient() {
        let frame = Frame::from_text(&["SessionID"], &[&["1"]]);
        let out = rename_columns(
            frame,
            &[("EventType", "event_name"), ("SessionID", "sessionid")],
            MappingPolicy::Warn,
        )
        .unwrap();
        assert_eq!(out.columns(), &["sessionid"]);
    }

    #[test]
    fn test_missing_mapping_source_fails_when_strict() {
        let frame = Frame::from_text(&["SessionID"], &[&["1"]]);
        let err = rename_columns(frame, &[("EventType", "event_name")], MappingPolicy::Strict)
            .unwrap_err();
        assert!(err.to_string().contains("EventType"));
    }

    #[test]
    fn test_rename_onto_existing_column_fails() {
        let frame = Frame::from_text(&["Age", "age"], &[&["25", "31"]]);
        for policy in [MappingPolicy::Strict, MappingPolicy::Warn] {
            let err = rename_columns(frame.clone(), &[("Age", "age")], policy).unwrap_err();
            assert_eq!(err.stage(), "transform");
        }
        let same = rename_columns(frame, &[("age", "age")], MappingPolicy::Warn).unwrap();
        assert_eq!(same.columns(), &["Age", "age"]);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("strict".parse::<MappingPolicy>().unwrap(), MappingPolicy::Strict);
        assert_eq!("WARN".parse::<MappingPolicy>().unwrap(), MappingPolicy::Warn);
        assert_eq!("skip".parse::<MappingPolicy>().unwrap(), MappingPolicy::Warn);
        assert!("loose".parse::<MappingPolicy>().is_err());
    }
}
