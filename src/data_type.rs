use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::{Value, parse_number, whole_int};

/// Column type accepted by `CREATE TABLE`, after alias folding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// A 64-bit signed integer.
    #[serde(rename = "INTEGER", alias = "INT")]
    Int,
    /// A 64-bit floating-point number.
    #[serde(rename = "REAL", alias = "FLOAT")]
    Float,
    /// A variable-length UTF-8 character string.
    #[serde(rename = "TEXT")]
    Text,
    /// A boolean value (true or false).
    #[serde(rename = "BOOLEAN", alias = "BOOL")]
    Bool,
    /// A point in time, stored as RFC 3339 text.
    #[serde(rename = "DATETIME", alias = "TIMESTAMP")]
    DateTime,
}

impl DataType {
    /// Maps a SQL type keyword (any case) to a [DataType].
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_uppercase().as_str() {
            "INTEGER" | "INT" | "BIGINT" => Some(Self::Int),
            "REAL" | "FLOAT" | "DOUBLE" => Some(Self::Float),
            "TEXT" | "VARCHAR" | "STRING" | "CHAR" => Some(Self::Text),
            "BOOLEAN" | "BOOL" => Some(Self::Bool),
            "DATETIME" | "TIMESTAMP" => Some(Self::DateTime),
            _ => None,
        }
    }

    /// Canonical SQL name, as shown by `DESCRIBE`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Int => "INTEGER",
            Self::Float => "REAL",
            Self::Text => "TEXT",
            Self::Bool => "BOOLEAN",
            Self::DateTime => "DATETIME",
        }
    }

    /// Converts `value` into this type, or explains why it cannot be.
    ///
    /// `Null` passes through untouched; NOT NULL is checked separately.
    ///
    /// # Example
    /// ```
    /// # use oxylite::{DataType, Value};
    /// assert_eq!(DataType::Int.coerce("n", Value::Float(4.0)).unwrap(), Value::Int(4));
    /// assert!(DataType::Int.coerce("n", Value::Float(4.5)).is_err());
    /// assert_eq!(DataType::Float.coerce("n", Value::Text("1.5".into())).unwrap(), Value::Float(1.5));
    /// ```
    pub fn coerce(&self, column: &str, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self {
            Self::Int => coerce_int(column, value),
            Self::Float => coerce_float(column, value),
            Self::Text => Ok(match value {
                Value::Text(s) => Value::Text(s),
                other => Value::from(other.to_string()),
            }),
            Self::Bool => coerce_bool(column, value),
            Self::DateTime => coerce_datetime(column, value),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn whole_float(column: &str, f: f64) -> Result<Value> {
    whole_int(f).map(Value::Int).ok_or_else(|| {
        Error::type_mismatch(
            column,
            format!("float value must be a whole number in range: {f}"),
        )
    })
}

fn coerce_int(column: &str, value: Value) -> Result<Value> {
    match value {
        Value::Int(i) => Ok(Value::Int(i)),
        Value::Float(f) => whole_float(column, f),
        Value::Text(s) => match parse_number(&s) {
            Some(Value::Int(i)) => Ok(Value::Int(i)),
            Some(Value::Float(f)) => whole_float(column, f),
            _ => Err(Error::type_mismatch(
                column,
                format!("invalid integer value: {s:?}"),
            )),
        },
        other => Err(Error::type_mismatch(
            column,
            format!("cannot convert {other} to INTEGER"),
        )),
    }
}

fn coerce_float(column: &str, value: Value) -> Result<Value> {
    match value {
        Value::Int(i) => Ok(Value::Float(i as f64)),
        Value::Float(f) if f.is_finite() => Ok(Value::Float(f)),
        Value::Text(s) => match parse_number(&s) {
            Some(Value::Int(i)) => Ok(Value::Float(i as f64)),
            Some(Value::Float(f)) => Ok(Value::Float(f)),
            _ => Err(Error::type_mismatch(
                column,
                format!("invalid real value: {s:?}"),
            )),
        },
        other => Err(Error::type_mismatch(
            column,
            format!("cannot convert {other} to REAL"),
        )),
    }
}

fn coerce_bool(column: &str, value: Value) -> Result<Value> {
    match value {
        Value::Bool(b) => Ok(Value::Bool(b)),
        Value::Int(0) => Ok(Value::Bool(false)),
        Value::Int(1) => Ok(Value::Bool(true)),
        Value::Text(s) => match s.trim().to_lowercase().as_str() {
            "true" | "t" | "yes" | "1" => Ok(Value::Bool(true)),
            "false" | "f" | "no" | "0" => Ok(Value::Bool(false)),
            _ => Err(Error::type_mismatch(
                column,
                format!("invalid boolean value: {s:?}"),
            )),
        },
        other => Err(Error::type_mismatch(
            column,
            format!("cannot convert {other} to BOOLEAN"),
        )),
    }
}

fn coerce_datetime(column: &str, value: Value) -> Result<Value> {
    let s = match value {
        Value::Text(s) => s,
        other => {
            return Err(Error::type_mismatch(
                column,
                format!("cannot convert {other} to DATETIME"),
            ));
        }
    };
    let text = s.trim();

    let parsed = DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
        })
        .or_else(|_| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d").map(|d| d.and_time(Default::default()).and_utc())
        })
        .map_err(|_| Error::type_mismatch(column, format!("invalid datetime value: {s:?}")))?;

    Ok(Value::from(parsed.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
}
