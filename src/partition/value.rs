//! Partition bound values and their SQL literal form

use crate::error::PartitionError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A single partition bound or list value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartitionValue {
    /// `MINVALUE` range sentinel
    MinValue,
    /// `MAXVALUE` range sentinel
    MaxValue,
    Integer(i64),
    Decimal(Decimal),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Text(String),
}

impl PartitionValue {
    /// Infer a value from text the way operators write bounds
    ///
    /// `MINVALUE`/`MAXVALUE` (any case) become sentinels, integers and decimals become
    /// numerics, `YYYY-MM-DD` becomes a date, `YYYY-MM-DD HH:MM:SS` a timestamp, and
    /// anything else stays text.
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("MINVALUE") {
            return PartitionValue::MinValue;
        }
        if trimmed.eq_ignore_ascii_case("MAXVALUE") {
            return PartitionValue::MaxValue;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return PartitionValue::Integer(i);
        }
        if let Ok(d) = Decimal::from_str(trimmed) {
            return PartitionValue::Decimal(d);
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
            return PartitionValue::Date(date);
        }
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT) {
            return PartitionValue::Timestamp(ts);
        }
        PartitionValue::Text(raw.to_string())
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, PartitionValue::MinValue | PartitionValue::MaxValue)
    }

    /// Render the value as it appears inside a `FOR VALUES` clause
    ///
    /// Numerics and sentinels are unquoted, dates and timestamps are quoted ISO
    /// literals, text is quoted with embedded quotes doubled.
    pub fn to_sql_literal(&self) -> String {
        match self {
            PartitionValue::MinValue => "MINVALUE".to_string(),
            PartitionValue::MaxValue => "MAXVALUE".to_string(),
            PartitionValue::Integer(i) => i.to_string(),
            PartitionValue::Decimal(d) => d.to_string(),
            PartitionValue::Date(d) => format!("'{}'", d.format(DATE_FORMAT)),
            PartitionValue::Timestamp(ts) => format!("'{}'", ts.format(TIMESTAMP_FORMAT)),
            PartitionValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    fn domain(&self) -> &'static str {
        match self {
            PartitionValue::MinValue | PartitionValue::MaxValue => "sentinel",
            PartitionValue::Integer(_) | PartitionValue::Decimal(_) => "numeric",
            PartitionValue::Date(_) | PartitionValue::Timestamp(_) => "date",
            PartitionValue::Text(_) => "text",
        }
    }
}

/// Order two range bounds in their shared domain
///
/// Returns `Ok(None)` when the pair is comparable only by the database (text, whose
/// ordering depends on collation).
///
/// # Errors
///
/// Returns a configuration error when the bounds come from different domains.
pub fn compare_bounds(
    from: &PartitionValue,
    to: &PartitionValue,
) -> Result<Option<Ordering>, PartitionError> {
    use PartitionValue as V;

    let ordering = match (from, to) {
        (V::MinValue, V::MinValue) | (V::MaxValue, V::MaxValue) => Some(Ordering::Equal),
        (V::MinValue, _) | (_, V::MaxValue) => Some(Ordering::Less),
        (V::MaxValue, _) | (_, V::MinValue) => Some(Ordering::Greater),
        (V::Integer(a), V::Integer(b)) => Some(a.cmp(b)),
        (V::Integer(a), V::Decimal(b)) => Some(Decimal::from(*a).cmp(b)),
        (V::Decimal(a), V::Integer(b)) => Some(a.cmp(&Decimal::from(*b))),
        (V::Decimal(a), V::Decimal(b)) => Some(a.cmp(b)),
        (V::Date(a), V::Date(b)) => Some(a.cmp(b)),
        (V::Timestamp(a), V::Timestamp(b)) => Some(a.cmp(b)),
        (V::Date(a), V::Timestamp(b)) => Some(a.and_time(NaiveTime::MIN).cmp(b)),
        (V::Timestamp(a), V::Date(b)) => Some(a.cmp(&b.and_time(NaiveTime::MIN))),
        (V::Text(_), V::Text(_)) => None,
        (a, b) => {
            return Err(PartitionError::configuration(format!(
                "mismatched bound types: {} bound {} cannot be compared with {} bound {}",
                a.domain(),
                a.to_sql_literal(),
                b.domain(),
                b.to_sql_literal()
            )))
        }
    };

    Ok(ordering)
}

impl fmt::Display for PartitionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql_literal())
    }
}

impl From<i64> for PartitionValue {
    fn from(value: i64) -> Self {
        PartitionValue::Integer(value)
    }
}

impl From<i32> for PartitionValue {
    fn from(value: i32) -> Self {
        PartitionValue::Integer(i64::from(value))
    }
}

impl From<Decimal> for PartitionValue {
    fn from(value: Decimal) -> Self {
        PartitionValue::Decimal(value)
    }
}

impl From<NaiveDate> for PartitionValue {
    fn from(value: NaiveDate) -> Self {
        PartitionValue::Date(value)
    }
}

impl From<NaiveDateTime> for PartitionValue {
    fn from(value: NaiveDateTime) -> Self {
        PartitionValue::Timestamp(value)
    }
}

impl From<&str> for PartitionValue {
    fn from(value: &str) -> Self {
        PartitionValue::Text(value.to_string())
    }
}

impl From<String> for PartitionValue {
    fn from(value: String) -> Self {
        PartitionValue::Text(value)
    }
}
