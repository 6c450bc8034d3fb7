use std::collections::{BTreeMap, HashSet};

use crate::column::{ColumnDef, Schema};
use crate::error::{Constraint, Error, Result};
use crate::index::BTreeIndex;
use crate::predicate::Predicate;
use crate::value::Value;

/// A row: canonical column name to value. Committed rows hold every column.
pub type Row = BTreeMap<String, Value>;

/// One line of `DESCRIBE` output.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescription {
    pub field: String,
    pub data_type: String,
    pub constraints: String,
}

/// A named table: a fixed [Schema] and its rows, indexed by row id.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    schema: Schema,
    rows: BTreeIndex<Row>,
}

impl Table {
    /// Creates an empty table whose index nodes hold at most `order` keys.
    ///
    /// # Errors
    /// [Error::Schema] if the column list is not a valid schema.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>, order: usize) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            schema: Schema::new(columns)?,
            rows: BTreeIndex::with_order(order),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// All rows in ascending id order.
    pub fn rows(&self) -> impl Iterator<Item = (i64, &Row)> + '_ {
        self.rows.iter()
    }

    /// Point lookup by row id.
    pub fn find(&self, id: i64) -> Option<&Row> {
        self.rows.get(id)
    }

    /// Inserts a row given as `(column, value)` pairs and returns its id.
    ///
    /// Columns left out are filled with NULL when nullable. Nothing is
    /// modified if any check fails.
    ///
    /// # Example
    /// ```
    /// # use oxylite::{ColumnDef, DataType, Table, Value};
    /// let mut table = Table::new("users", vec![
    ///     ColumnDef::new("id", DataType::Int).primary_key(),
    ///     ColumnDef::new("name", DataType::Text),
    /// ], 4).unwrap();
    ///
    /// let id = table.insert(vec![("ID".into(), Value::from("7"))]).unwrap();
    /// assert_eq!(id, 7);
    /// assert_eq!(table.find(7).unwrap()["name"], Value::Null);
    /// assert!(table.insert(vec![("id".into(), Value::Int(7))]).is_err());
    /// ```
    pub fn insert(&mut self, values: Vec<(String, Value)>) -> Result<i64> {
        let (id, row) = self.prepare_insert(values)?;
        self.apply_insert(id, row)?;
        Ok(id)
    }

    /// Runs every INSERT check without touching the table.
    pub(crate) fn prepare_insert(&self, values: Vec<(String, Value)>) -> Result<(i64, Row)> {
        let mut provided: Vec<Option<Value>> = vec![None; self.schema.len()];
        for (name, value) in values {
            let pos = self
                .schema
                .position(&name)
                .ok_or_else(|| Error::column_not_found(&self.name, &name))?;
            if provided[pos].replace(value).is_some() {
                return Err(Error::Schema(format!(
                    "column {name} is assigned more than once"
                )));
            }
        }

        let mut row = Row::new();
        for (col, value) in self.schema.columns().iter().zip(provided) {
            let value = match value {
                Some(value) => col.data_type.coerce(&col.name, value)?,
                None if col.is_nullable() => Value::Null,
                None => return Err(Error::MissingColumn(col.name.clone())),
            };
            if value.is_null() && !col.is_nullable() {
                return Err(Error::NullConstraint(col.name.clone()));
            }
            row.insert(col.name.clone(), value);
        }

        for col in self.schema.columns() {
            let Some(constraint) = col.uniqueness() else {
                continue;
            };
            let value = &row[&col.name];
            if self
                .rows
                .values()
                .any(|existing| existing.get(&col.name).is_some_and(|v| v.same_as(value)))
            {
                return Err(Error::UniqueConstraint {
                    constraint,
                    column: col.name.clone(),
                });
            }
        }

        let id = self.row_id(&row)?;
        Ok((id, row))
    }

    pub(crate) fn apply_insert(&mut self, id: i64, row: Row) -> Result<()> {
        self.rows.insert(id, row).map_err(|_| self.duplicate_id())
    }

    /// Extracts the integer row id of a fully built row.
    fn row_id(&self, row: &Row) -> Result<i64> {
        let missing = |reason: &str| Error::MissingId {
            table: self.name.clone(),
            reason: reason.to_string(),
        };
        let col = self
            .schema
            .id_column()
            .ok_or_else(|| missing("no id column or INTEGER PRIMARY KEY to key rows by"))?;
        match row.get(&col.name) {
            Some(Value::Null) | None => Err(missing(&format!("column {} needs a value", col.name))),
            Some(value) => value.as_row_id().ok_or_else(|| {
                missing(&format!("column {} must hold an integer, got {value}", col.name))
            }),
        }
    }

    fn duplicate_id(&self) -> Error {
        Error::UniqueConstraint {
            constraint: Constraint::PrimaryKey,
            column: self
                .schema
                .id_column()
                .map_or_else(|| "id".to_string(), |c| c.name.clone()),
        }
    }

    /// Rows matching `predicate`, ascending by id.
    pub fn select(&self, predicate: &Predicate) -> Result<Vec<Row>> {
        let filter = predicate.bind(&self.name, &self.schema)?;
        Ok(self
            .rows
            .values()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    /// Applies `assignments` to every row matching `predicate` and returns
    /// how many rows changed.
    pub fn update(&mut self, assignments: &[(String, Value)], predicate: &Predicate) -> Result<usize> {
        let updated = self.prepare_update(assignments, predicate)?;
        Ok(self.apply_update(updated))
    }

    /// Computes and validates the new version of every matching row.
    pub(crate) fn prepare_update(
        &self,
        assignments: &[(String, Value)],
        predicate: &Predicate,
    ) -> Result<Vec<(i64, Row)>> {
        let filter = predicate.bind(&self.name, &self.schema)?;

        let mut changes = Vec::with_capacity(assignments.len());
        for (name, value) in assignments {
            let col = self.schema.resolve(&self.name, name)?;
            let value = col.data_type.coerce(&col.name, value.clone())?;
            if value.is_null() && !col.is_nullable() {
                return Err(Error::NullConstraint(col.name.clone()));
            }
            changes.push((col, value));
        }

        let updated: Vec<(i64, Row)> = self
            .rows
            .iter()
            .filter(|(_, row)| filter.matches(row))
            .map(|(id, row)| {
                let mut row = row.clone();
                for (col, value) in &changes {
                    row.insert(col.name.clone(), value.clone());
                }
                (id, row)
            })
            .collect();

        if let Some(id_col) = self.schema.id_column() {
            if updated
                .iter()
                .any(|(id, row)| row.get(&id_col.name).and_then(Value::as_row_id) != Some(*id))
            {
                return Err(Error::ImmutableRowId {
                    table: self.name.clone(),
                    column: id_col.name.clone(),
                });
            }
        }

        let touched: HashSet<i64> = updated.iter().map(|(id, _)| *id).collect();
        for (col, _) in &changes {
            let Some(constraint) = col.uniqueness() else {
                continue;
            };
            let clash = |a: &Row, b: &Row| match (a.get(&col.name), b.get(&col.name)) {
                (Some(x), Some(y)) => x.same_as(y),
                _ => false,
            };
            for (i, (_, row)) in updated.iter().enumerate() {
                let with_untouched = self
                    .rows
                    .iter()
                    .any(|(id, other)| !touched.contains(&id) && clash(row, other));
                let with_updated = updated[..i].iter().any(|(_, other)| clash(row, other));
                if with_untouched || with_updated {
                    return Err(Error::UniqueConstraint {
                        constraint,
                        column: col.name.clone(),
                    });
                }
            }
        }

        Ok(updated)
    }

    pub(crate) fn apply_update(&mut self, updated: Vec<(i64, Row)>) -> usize {
        let mut count = 0;
        for (id, row) in updated {
            if let Some(slot) = self.rows.get_mut(id) {
                *slot = row;
                count += 1;
            }
        }
        count
    }

    /// Removes every row matching `predicate`; an empty predicate empties
    /// the table.
    pub fn delete(&mut self, predicate: &Predicate) -> Result<usize> {
        if predicate.is_empty() {
            let count = self.rows.len();
            self.rows.clear();
            return Ok(count);
        }

        let filter = predicate.bind(&self.name, &self.schema)?;
        let doomed: Vec<i64> = self
            .rows
            .iter()
            .filter(|(_, row)| filter.matches(row))
            .map(|(id, _)| id)
            .collect();

        for id in &doomed {
            self.rows.remove(*id);
        }
        Ok(doomed.len())
    }

    pub fn describe(&self) -> Vec<ColumnDescription> {
        self.schema
            .columns()
            .iter()
            .map(|col| ColumnDescription {
                field: col.name.clone(),
                data_type: col.data_type.name().to_string(),
                constraints: col.constraints(),
            })
            .collect()
    }

    /// Puts back a row read from disk, skipping constraint checks.
    pub(crate) fn restore_row(&mut self, id: i64, row: Row) -> Result<()> {
        self.apply_insert(id, row)
    }
}
