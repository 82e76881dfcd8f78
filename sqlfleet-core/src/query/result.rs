//! Typed result shaping for remote query output.
//!
//! The external executor emits a JSON object whose keys are table names and
//! whose values are arrays of row objects. This module parses that payload
//! into ordered tables of typed values, normalizing embedded
//! `/Date(milliseconds)/` serialization markers into real timestamps
//! before any caller sees them.

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// A single typed value from a query result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// Bit / boolean column.
    Bool(bool),
    /// Integral numeric column.
    Int(i64),
    /// Floating-point numeric column.
    Float(f64),
    /// Character data.
    Text(String),
    /// Date/time column, normalized from serialized date markers.
    DateTime(DateTime<Utc>),
}

impl SqlValue {
    /// Returns the value as text, if it is character data.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the value as a float, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// Returns the value as a timestamp, if it is one.
    pub const fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::DateTime(when) => Some(*when),
            _ => None,
        }
    }

    /// True for SQL NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// One result row: ordered column/value pairs.
///
/// Column order is preserved from the executor payload because scalar
/// shaping is defined as "first column of the first row".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row(Vec<(String, SqlValue)>);

impl Row {
    /// Looks up a column by name, case-insensitively.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.0
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    /// The first column's value, for scalar shaping.
    pub fn first_value(&self) -> Option<&SqlValue> {
        self.0.first().map(|(_, value)| value)
    }

    /// Iterates the columns in payload order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// Full query result: ordered mapping from table name to rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    tables: Vec<(String, Vec<Row>)>,
}

impl QueryResult {
    /// Looks up a table's rows by name.
    pub fn table(&self, name: &str) -> Option<&[Row]> {
        self.tables
            .iter()
            .find(|(table, _)| table == name)
            .map(|(_, rows)| rows.as_slice())
    }

    /// The first table's rows, in payload order.
    pub fn first_table(&self) -> Option<&[Row]> {
        self.tables.first().map(|(_, rows)| rows.as_slice())
    }

    /// Iterates tables in payload order.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &[Row])> {
        self.tables
            .iter()
            .map(|(name, rows)| (name.as_str(), rows.as_slice()))
    }

    /// True when the executor returned no tables at all.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Parses an executor JSON payload into a typed result.
    ///
    /// An empty payload parses to an empty result (queries without result
    /// sets return nothing). Errors carry a context string; the gateway
    /// attaches the redacted descriptor.
    pub(crate) fn from_payload(payload: &str) -> std::result::Result<Self, String> {
        let trimmed = payload.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let parsed: serde_json::Value = serde_json::from_str(trimmed)
            .map_err(|e| format!("payload is not valid JSON: {e}"))?;
        let object = parsed
            .as_object()
            .ok_or_else(|| "payload is not a JSON object keyed by table name".to_string())?;
        let mut tables = Vec::with_capacity(object.len());
        for (table_name, rows_value) in object {
            let rows_array = rows_value.as_array().ok_or_else(|| {
                format!("table '{table_name}' is not an array of row objects")
            })?;
            let mut rows = Vec::with_capacity(rows_array.len());
            for row_value in rows_array {
                let row_object = row_value.as_object().ok_or_else(|| {
                    format!("table '{table_name}' contains a non-object row")
                })?;
                let columns = row_object
                    .iter()
                    .map(|(column, value)| (column.clone(), convert_value(value)))
                    .collect();
                rows.push(Row(columns));
            }
            tables.push((table_name.clone(), rows));
        }
        Ok(Self { tables })
    }

    #[cfg(test)]
    pub(crate) fn from_rows(table: &str, rows: Vec<Row>) -> Self {
        Self {
            tables: vec![(table.to_string(), rows)],
        }
    }
}

#[cfg(test)]
impl Row {
    pub(crate) fn from_pairs(pairs: Vec<(&str, SqlValue)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        )
    }
}

/// A query result shaped per the request's return shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapedResult {
    /// Full result set (`ReturnShape::AllTables`).
    Tables(QueryResult),
    /// First table's rows (`ReturnShape::FirstTable`).
    Rows(Vec<Row>),
    /// First row of the first table (`ReturnShape::FirstRow`).
    Row(Row),
    /// First column of the first row; `None` when no row exists
    /// (`ReturnShape::Scalar`). Absence is not a failure.
    Scalar(Option<SqlValue>),
}

fn serialized_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)] // pattern is a literal, compiled once
    PATTERN.get_or_init(|| {
        Regex::new(r"^/Date\((-?\d+)([+-]\d{4})?\)/$").expect("Invalid serialized date pattern")
    })
}

/// Converts one JSON value into a typed `SqlValue`.
///
/// String values matching the `.NET` serialized-date marker
/// (`/Date(1633046400000)/`, optionally with a zone offset) become UTC
/// timestamps from the embedded epoch milliseconds. Nested arrays and
/// objects keep their JSON form as text, with every embedded date marker
/// normalized recursively before rendering.
fn convert_value(value: &serde_json::Value) -> SqlValue {
    match value {
        serde_json::Value::Null => SqlValue::Null,
        serde_json::Value::Bool(flag) => SqlValue::Bool(*flag),
        serde_json::Value::Number(number) => number.as_i64().map_or_else(
            || SqlValue::Float(number.as_f64().unwrap_or(f64::NAN)),
            SqlValue::Int,
        ),
        serde_json::Value::String(text) => parse_serialized_date(text)
            .map_or_else(|| SqlValue::Text(text.clone()), SqlValue::DateTime),
        other => SqlValue::Text(normalize_nested_dates(other).to_string()),
    }
}

/// Parses a serialized-date marker into a UTC timestamp, if the text is one.
fn parse_serialized_date(text: &str) -> Option<DateTime<Utc>> {
    serialized_date_pattern()
        .captures(text)
        .and_then(|captures| captures.get(1))
        .and_then(|millis| millis.as_str().parse::<i64>().ok())
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
}

/// Rewrites every serialized-date string within a JSON value to RFC 3339,
/// recursing through arrays and objects.
fn normalize_nested_dates(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(text) => parse_serialized_date(text).map_or_else(
            || value.clone(),
            |when| serde_json::Value::String(when.to_rfc3339()),
        ),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(normalize_nested_dates).collect())
        }
        serde_json::Value::Object(fields) => serde_json::Value::Object(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), normalize_nested_dates(value)))
                .collect(),
        ),
        other => other.clone(),
    }
}
