use crate::error::Result;
use crate::types::{Frame, Value};
use serde::Serialize;
use std::path::Path;
use tabled::{builder::Builder, settings::Style, Table, Tabled};

/// Write a frame as CSV with a header row; nulls are empty fields.
pub fn write_csv(path: &Path, frame: &Frame) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(frame.columns())?;
    for row in frame.rows() {
        wtr.write_record(row.iter().map(Value::to_string))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

/// Markdown rendering of the first `max_rows` rows of a frame.
pub fn preview_frame(frame: &Frame, max_rows: usize) -> String {
    if frame.is_empty() {
        return "(no rows)".to_string();
    }
    let mut builder = Builder::default();
    builder.push_record(frame.columns().iter().cloned());
    for row in frame.rows().iter().take(max_rows) {
        builder.push_record(row.iter().map(Value::to_string));
    }
    builder.build().with(Style::markdown()).to_string()
}

pub fn preview_table_rows<T>(rows: &[T]) -> String
where
    T: Tabled + Clone,
{
    if rows.is_empty() {
        return "(no rows)".to_string();
    }
    Table::new(rows.to_vec()).with(Style::markdown()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_csv_renders_nulls_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staging").join("dim_user_staging.csv");
        let frame = Frame::from_rows(
            vec!["user_sk".into(), "userid".into(), "active".into()],
            vec![vec![Value::text("CLK_U1"), Value::Null, Value::Bool(true)]],
        )
        .unwrap();
        write_csv(&path, &frame).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "user_sk,userid,active\nCLK_U1,,true\n");
    }

    #[test]
    fn test_preview_frame_limits_rows() {
        let frame = Frame::from_text(&["a"], &[&["x1"], &["x2"], &["x3"]]);
        let preview = preview_frame(&frame, 2);
        assert!(preview.contains("x1"));
        assert!(preview.contains("x2"));
        assert!(!preview.contains("x3"));
        assert_eq!(preview_frame(&Frame::new(vec!["a".into()]), 2), "(no rows)");
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        write_json(&path, &serde_json::json!({"jobs": 4})).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"jobs\": 4"));
    }
}
