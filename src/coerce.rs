//! Column type coercion and the required-column row filter.

use crate::error::Result;
use crate::types::{Frame, Value};
use crate::util::{parse_f64_safe, parse_i64_safe};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use tracing::info;

/// Neutral midpoint of the agreement scale.
pub const SCALE_NEUTRAL: i64 = 3;

static AGREEMENT_SCALE: Lazy<HashMap<&'static str, i64>> = Lazy::new(|| {
    HashMap::from([
        ("strongly agree", 5),
        ("agree", 4),
        ("neutral", 3),
        ("disagree", 2),
        ("strongly disagree", 1),
    ])
});

const TRUTHY: [&str; 3] = ["yes", "true", "1"];

/// Which columns get which coercion. Steps run in field order.
#[derive(Debug, Clone, Default)]
pub struct CoercionPlan<'a> {
    pub integer: &'a [&'a str],
    pub decimal: &'a [&'a str],
    pub text: &'a [&'a str],
    pub scale: &'a [&'a str],
    pub boolean: &'a [&'a str],
    pub required: &'a [&'a str],
}

fn raw_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

pub fn to_integer(v: &Value) -> Value {
    match v {
        Value::Int(n) => Value::Int(*n),
        Value::Float(x) if x.is_finite() => Value::Int(x.trunc() as i64),
        Value::Bool(b) => Value::Int(*b as i64),
        other => parse_i64_safe(raw_text(other).as_deref())
            .map(Value::Int)
            .unwrap_or(Value::Null),
    }
}

pub fn to_decimal(v: &Value) -> Value {
    match v {
        Value::Int(n) => Value::Float(*n as f64),
        Value::Float(x) if x.is_finite() => Value::Float(*x),
        other => parse_f64_safe(raw_text(other).as_deref())
            .map(Value::Float)
            .unwrap_or(Value::Null),
    }
}

pub fn to_text(v: &Value) -> Value {
    match raw_text(v) {
        Some(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
                Value::Null
            } else {
                Value::text(trimmed)
            }
        }
        None => Value::Null,
    }
}

pub fn to_scale(v: &Value) -> Value {
    let level = raw_text(v)
        .and_then(|s| AGREEMENT_SCALE.get(s.trim().to_lowercase().as_str()).copied())
        .unwrap_or(SCALE_NEUTRAL);
    Value::Int(level)
}

pub fn to_boolean(v: &Value) -> Value {
    let truthy = match v {
        Value::Bool(b) => *b,
        other => raw_text(other)
            .map(|s| TRUTHY.contains(&s.trim().to_lowercase().as_str()))
            .unwrap_or(false),
    };
    Value::Bool(truthy)
}

/// Apply `plan` to `frame`. Cell-level parse failures become null (or the
/// scale midpoint); only a missing column is an error.
pub fn apply(mut frame: Frame, plan: &CoercionPlan) -> Result<Frame> {
    let steps: [(&[&str], fn(&Value) -> Value); 5] = [
        (plan.integer, to_integer),
        (plan.decimal, to_decimal),
        (plan.text, to_text),
        (plan.scale, to_scale),
        (plan.boolean, to_boolean),
    ];
    for (columns, f) in steps {
        for column in columns {
            frame.map_column(column, f)?;
        }
    }

    if !plan.required.is_empty() {
        let idxs = plan
            .required
            .iter()
            .map(|c| frame.require_column(c))
            .collect::<Result<Vec<_>>>()?;
        let before = frame.len();
        frame.retain_rows(|row| idxs.iter().all(|&i| !row[i].is_null()));
        let dropped = before - frame.len();
        if dropped > 0 {
            info!(dropped, required = ?plan.required, "dropped rows missing required values");
        }
    }
    Ok(frame)
}
