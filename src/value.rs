use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::de::{self, Deserialize, Deserializer, Visitor};
use serde::ser::{Serialize, Serializer};

use crate::ast::ComparisonOp;
use crate::data_type::DataType;

/// One cell of a row, or one literal of a statement.
///
/// DATETIME cells are kept as normalized text, so there is no separate
/// variant for them.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    Int(i64),
    Float(f64),
    /// Shared so that cloning rows for a snapshot does not copy text.
    Text(Arc<str>),
    Bool(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Reads the value as a row id: an integer, a whole float or integral
    /// numeric text.
    pub fn as_row_id(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) => whole_int(*f),
            Self::Text(s) => parse_number(s)?.as_row_id(),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The text of a [Value::Text], DATETIME cells included.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// `None` for [Value::Null], which only gets a type from its column.
    /// DATETIME cells report [DataType::Text].
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Int(_) => Some(DataType::Int),
            Self::Float(_) => Some(DataType::Float),
            Self::Text(_) => Some(DataType::Text),
            Self::Bool(_) => Some(DataType::Bool),
        }
    }

    /// Evaluates `self <op> other` with SQL-ish semantics.
    ///
    /// - `NULL = NULL` is true, `NULL != x` is true for any non-null `x`,
    ///   and every ordering operator involving `NULL` is false.
    /// - `Int` against `Float` compares as `f64`.
    /// - `Text` against a number parses the text; unparsable text matches nothing.
    /// - `Text` against `Text` is exact (case-sensitive), ordered by bytes.
    /// - Values that cannot be compared at all (e.g. `Bool` vs `Int`) match no
    ///   operator, `!=` included.
    ///
    /// # Example
    /// ```
    /// # use oxylite::{Value, ast::ComparisonOp};
    /// assert!(Value::Int(2).compare(ComparisonOp::Lt, &Value::Float(2.5)));
    /// assert!(Value::Text("10".into()).compare(ComparisonOp::Eq, &Value::Int(10)));
    /// assert!(!Value::Null.compare(ComparisonOp::GtEq, &Value::Int(0)));
    /// ```
    pub fn compare(&self, op: ComparisonOp, other: &Value) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => op == ComparisonOp::Eq,
            (Self::Null, _) | (_, Self::Null) => op == ComparisonOp::NotEq,
            _ => self.sql_cmp(other).is_some_and(|ord| op.matches(ord)),
        }
    }

    /// Equality used by PRIMARY KEY / UNIQUE checks. NULLs never collide.
    pub fn same_as(&self, other: &Value) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        self.sql_cmp(other) == Some(Ordering::Equal)
    }

    fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(l), Self::Int(r)) => Some(l.cmp(r)),
            (Self::Int(l), Self::Float(r)) => (*l as f64).partial_cmp(r),
            (Self::Float(l), Self::Int(r)) => l.partial_cmp(&(*r as f64)),
            (Self::Float(l), Self::Float(r)) => l.partial_cmp(r),
            (Self::Text(l), Self::Text(r)) => Some(l.as_bytes().cmp(r.as_bytes())),
            (Self::Bool(l), Self::Bool(r)) => Some(l.cmp(r)),
            (Self::Text(t), Self::Int(_) | Self::Float(_)) => parse_number(t)?.sql_cmp(other),
            (Self::Int(_) | Self::Float(_), Self::Text(t)) => self.sql_cmp(&parse_number(t)?),
            _ => None,
        }
    }
}

/// `f` as an `i64` when it is whole and in range. `i64::MAX as f64` rounds
/// up to 2^63, which is already out of range.
pub(crate) fn whole_int(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64)
        .then_some(f as i64)
}

/// Parses numeric text, preferring an exact integer.
pub(crate) fn parse_number(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::Int(i));
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Value::Float)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(Arc::from(value))
    }
}

// Cells are persisted as bare JSON scalars: `1`, `2.5`, `"a"`, `true`, `null`.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON number, string, boolean or null")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(i64::try_from(v).map_or(Value::Float(v as f64), Value::Int))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}
