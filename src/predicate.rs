//! WHERE clause evaluation.
//!
//! A [Predicate] is a conjunction of `column op literal` conditions. It is
//! first bound against a [Schema], which resolves every column name once and
//! fails on unknown columns before any row is looked at, then evaluated row
//! by row. Binding also converts each literal to its column's type, so a
//! literal finds the rows it was inserted with.

use crate::ast::ComparisonOp;
use crate::column::Schema;
use crate::data_type::DataType;
use crate::error::Result;
use crate::table::Row;
use crate::value::Value;

/// One `column op value` test.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub op: ComparisonOp,
    pub value: Value,
}

/// AND-conjunction of [Condition]s. Empty means "every row".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    pub conditions: Vec<Condition>,
}

impl Predicate {
    /// The predicate that matches every row.
    pub fn all() -> Self {
        Self::default()
    }

    /// Builder form: `Predicate::all().and("age", ComparisonOp::Gt, 18)`.
    pub fn and(mut self, column: impl Into<String>, op: ComparisonOp, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            column: column.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Resolves column names against `schema` and converts every literal to
    /// the column's type. A literal that does not convert is kept as written
    /// and matches nothing it cannot be compared with.
    ///
    /// # Errors
    /// [Error::ColumnNotFound](crate::Error::ColumnNotFound) for the first
    /// condition naming an unknown column.
    pub fn bind<'a>(&self, table: &str, schema: &'a Schema) -> Result<BoundPredicate<'a>> {
        let conditions = self
            .conditions
            .iter()
            .map(|c| {
                let column = schema.resolve(table, &c.column)?;
                // text cells already compare numerically against numbers
                let value = match column.data_type {
                    DataType::Text => c.value.clone(),
                    data_type => data_type
                        .coerce(&column.name, c.value.clone())
                        .unwrap_or_else(|_| c.value.clone()),
                };
                Ok((column.name.as_str(), c.op, value))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(BoundPredicate { conditions })
    }
}

impl From<Vec<Condition>> for Predicate {
    fn from(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }
}

/// A [Predicate] whose column names are the schema's canonical ones.
#[derive(Debug)]
pub struct BoundPredicate<'a> {
    conditions: Vec<(&'a str, ComparisonOp, Value)>,
}

impl BoundPredicate<'_> {
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|(column, op, value)| {
            match row.get(*column) {
                // a NULL cell fails the whole conjunction
                None | Some(Value::Null) => false,
                Some(cell) => cell.compare(*op, value),
            }
        })
    }
}
