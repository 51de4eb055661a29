use crate::error::{EtlError, Result};
use crate::types::{Frame, Value};
use csv::{ByteRecord, ReaderBuilder};
use encoding_rs::Encoding;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Look up a WHATWG encoding label such as `utf-8` or `latin1`.
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| EtlError::Config(format!("unknown input encoding '{}'", label)))
}

fn decode_field(
    bytes: &[u8],
    encoding: &'static Encoding,
    path: &Path,
    line: u64,
) -> Result<String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|s| s.into_owned())
        .ok_or_else(|| EtlError::InputMalformed {
            path: path.to_path_buf(),
            line,
            reason: format!("invalid {} byte sequence", encoding.name()),
        })
}

/// Read a delimited file with a header row into a [`Frame`].
///
/// Every non-empty cell is kept as raw text; empty cells become null.
/// Short rows are padded with nulls, rows wider than the header are rejected.
pub fn read_csv(path: &Path, encoding_label: &str) -> Result<Frame> {
    if !path.is_file() {
        return Err(EtlError::InputNotFound(path.to_path_buf()));
    }
    let encoding = resolve_encoding(encoding_label)?;
    let mut rdr = ReaderBuilder::new().flexible(true).from_path(path)?;

    let header_record = rdr.byte_headers()?.clone();
    if header_record.is_empty() {
        return Err(EtlError::InputMalformed {
            path: path.to_path_buf(),
            line: 1,
            reason: "missing header row".to_string(),
        });
    }
    let mut headers = Vec::with_capacity(header_record.len());
    for (i, field) in header_record.iter().enumerate() {
        let mut name = decode_field(field, encoding, path, 1)?;
        if i == 0 {
            name = name.trim_start_matches('\u{feff}').to_string();
        }
        headers.push(name);
    }
    let mut seen = HashSet::new();
    if let Some(dup) = headers.iter().find(|h| !seen.insert(h.as_str())) {
        return Err(EtlError::InputMalformed {
            path: path.to_path_buf(),
            line: 1,
            reason: format!("duplicate column '{}'", dup),
        });
    }

    let width = headers.len();
    let mut frame = Frame::new(headers);
    let mut record = ByteRecord::new();
    while rdr.read_byte_record(&mut record)? {
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if record.len() > width {
            return Err(EtlError::InputMalformed {
                path: path.to_path_buf(),
                line,
                reason: format!("expected {} fields, found {}", width, record.len()),
            });
        }
        let mut row = Vec::with_capacity(width);
        for field in record.iter() {
            if field.is_empty() {
                row.push(Value::Null);
            } else {
                row.push(Value::Text(decode_field(field, encoding, path, line)?));
            }
        }
        row.resize(width, Value::Null);
        frame.push_row(row)?;
    }

    debug!(path = %path.display(), rows = frame.len(), columns = width, "extracted csv");
    Ok(frame)
}
