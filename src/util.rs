// Utility helpers for parsing raw CSV cells and formatting console output.
//
// This module centralizes the forgiving number/date handling so the
// coercion and dimension code can stay focused on column semantics.
use chrono::NaiveDateTime;
use num_format::{Locale, ToFormattedString};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a string-like value into `f64` without ever failing loudly.
///
/// - Accepts `Option<&str>` so callers can pass through optional fields.
/// - Trims whitespace.
/// - Returns `None` for empty input, unparseable text and non-finite
///   values such as `nan` or `inf`.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integer parse that also accepts decimal text and truncates toward zero,
/// so `"25.0"` and `"25"` both give `25`.
pub fn parse_i64_safe(s: Option<&str>) -> Option<i64> {
    let v = parse_f64_safe(s)?;
    let t = v.trunc();
    if t < i64::MIN as f64 || t > i64::MAX as f64 {
        return None;
    }
    Some(t as i64)
}

/// Parse a timestamp with an explicit `chrono` format, `None` on failure.
pub fn parse_timestamp_safe(s: Option<&str>, format: &str) -> Option<NaiveDateTime> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(s, format).ok()
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimals with locale-aware thousands separators (`1,234.50`).
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_val: i64 = parts.next().unwrap_or("0").parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = parts.next() {
        res.push('.');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Row counts in log lines, e.g. `21,321 rows`.
    n.to_formatted_string(&Locale::en)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_f64_safe() {
        assert_eq!(parse_f64_safe(Some(" 12.5 ")), Some(12.5));
        assert_eq!(parse_f64_safe(Some("abc")), None);
        assert_eq!(parse_f64_safe(Some("")), None);
        assert_eq!(parse_f64_safe(Some("nan")), None);
        assert_eq!(parse_f64_safe(None), None);
    }

    #[test]
    fn test_parse_i64_safe_truncates() {
        assert_eq!(parse_i64_safe(Some("25")), Some(25));
        assert_eq!(parse_i64_safe(Some("25.9")), Some(25));
        assert_eq!(parse_i64_safe(Some("-3.5")), Some(-3));
        assert_eq!(parse_i64_safe(Some("x")), None);
    }

    #[test]
    fn test_parse_order_timestamp() {
        let ts = parse_timestamp_safe(Some("11:38 PM, September 10 2024"), "%I:%M %p, %B %d %Y")
            .unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2024, 9, 10));
        assert_eq!((ts.hour(), ts.minute()), (23, 38));
        assert!(parse_timestamp_safe(Some("yesterday"), "%I:%M %p, %B %d %Y").is_none());
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_int(1234567usize), "1,234,567");
        assert_eq!(format_number(1234.5, 2), "1,234.50");
        assert_eq!(format_number(-0.25, 2), "-0.25");
        assert_eq!(format_number(3.0, 0), "3");
    }
}
