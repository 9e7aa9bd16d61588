use std::path::{Path, PathBuf};

use anyhow::Result;
use serde_json::{Number, Value};

use crate::models::{DataType, PeriodSpec};

/// Best-effort conversion of an untyped JSON scalar.
///
/// The provider sends numbers as JSON numbers, numeric strings, empty strings
/// or nulls depending on the field and the day. Missing, null, blank and
/// unparseable values all coerce to `None`; nothing here panics.
pub fn coerce<T: Coerce>(value: Option<&Value>) -> Option<T> {
    match value? {
        Value::Null => None,
        Value::Bool(b) => T::from_bool(*b),
        Value::Number(n) => T::from_number(n),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                T::from_text(s)
            }
        }
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Target types for [`coerce`]
pub trait Coerce: Sized {
    fn from_number(n: &Number) -> Option<Self>;
    fn from_text(s: &str) -> Option<Self>;
    fn from_bool(b: bool) -> Option<Self>;
}

impl Coerce for i64 {
    fn from_number(n: &Number) -> Option<Self> {
        n.as_i64().or_else(|| n.as_f64().and_then(float_to_int))
    }

    // Integer parse first, then through f64 so "12.5" and "1e3" still land
    fn from_text(s: &str) -> Option<Self> {
        s.parse::<i64>()
            .ok()
            .or_else(|| s.parse::<f64>().ok().and_then(float_to_int))
    }

    fn from_bool(b: bool) -> Option<Self> {
        Some(b as i64)
    }
}

impl Coerce for f64 {
    fn from_number(n: &Number) -> Option<Self> {
        n.as_f64().filter(|f| f.is_finite())
    }

    fn from_text(s: &str) -> Option<Self> {
        s.parse::<f64>().ok().filter(|f| f.is_finite())
    }

    fn from_bool(b: bool) -> Option<Self> {
        Some(if b { 1.0 } else { 0.0 })
    }
}

/// Truncates toward zero; non-finite or out-of-range values are rejected
fn float_to_int(f: f64) -> Option<i64> {
    if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

/// Text form of a scalar field (the provider sends `time` as either kind)
pub fn field_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Keep the records whose `date` falls inside `period`, preserving order
pub fn filter_records(records: Vec<Value>, period: &PeriodSpec) -> Vec<Value> {
    records
        .into_iter()
        .filter(|record| record_in_period(record, period))
        .collect()
}

pub fn record_in_period(record: &Value, period: &PeriodSpec) -> bool {
    match record.get("date").and_then(Value::as_str) {
        Some(date) => date_in_period(date, period),
        None => false,
    }
}

/// Month matching uses fixed character offsets, not calendar parsing
pub fn date_in_period(date: &str, period: &PeriodSpec) -> bool {
    match period {
        PeriodSpec::YearPrefix(prefix) => date.starts_with(prefix.as_str()),
        PeriodSpec::YearMonths { year, months } => {
            date.get(0..4) == Some(year.as_str())
                && date.get(5..7).map_or(false, |month| months.contains(month))
        }
    }
}

/// Dump a raw provider payload to `<dir>/<ticker>_<type>.json`
pub fn save_raw_json(dir: &Path, ticker: &str, data_type: DataType, records: &[Value]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}_{}.json", ticker, data_type.code()));
    let content = serde_json::to_string_pretty(records)?;
    std::fs::write(&path, content)?;
    Ok(path)
}
