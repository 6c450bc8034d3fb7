use serde::{Deserialize, Serialize};

use crate::data_type::DataType;
use crate::error::{Constraint, Error, Result};

/// Target of a `REFERENCES table(column)` clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
}

/// Column definition in the schema: a name, a declared type and its constraints.
///
/// Names keep the case they were declared with but are matched
/// case-insensitively everywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub not_null: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub references: Option<ForeignKey>,
}

impl ColumnDef {
    /// Creates an unconstrained, nullable column.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            primary_key: false,
            not_null: false,
            unique: false,
            references: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ForeignKey {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    /// Case-insensitive name match.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }

    pub fn is_nullable(&self) -> bool {
        !(self.not_null || self.primary_key)
    }

    /// The uniqueness constraint carried by this column, PRIMARY KEY first.
    pub fn uniqueness(&self) -> Option<Constraint> {
        if self.primary_key {
            Some(Constraint::PrimaryKey)
        } else if self.unique {
            Some(Constraint::Unique)
        } else {
            None
        }
    }

    /// Human readable constraint list, e.g. `"PRIMARY KEY, NOT NULL, UNIQUE"`.
    pub fn constraints(&self) -> String {
        let mut parts = Vec::new();
        if self.primary_key {
            parts.push("PRIMARY KEY".to_string());
        }
        if self.not_null {
            parts.push("NOT NULL".to_string());
        }
        if self.unique {
            parts.push("UNIQUE".to_string());
        }
        if let Some(fk) = &self.references {
            parts.push(format!("REFERENCES {}({})", fk.table, fk.column));
        }
        parts.join(", ")
    }
}

/// The ordered, validated column list of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Vec<ColumnDef>,
    /// Position of the column whose value is the row id, if any.
    id_column: Option<usize>,
}

impl Schema {
    /// Validates a column list.
    ///
    /// PRIMARY KEY columns are normalised to also be NOT NULL and UNIQUE.
    ///
    /// # Errors
    /// [Error::Schema] if the list is empty, declares more than one PRIMARY KEY
    /// or repeats a column name.
    pub fn new(mut columns: Vec<ColumnDef>) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::Schema("a table needs at least one column".into()));
        }
        if columns.iter().filter(|c| c.primary_key).count() > 1 {
            return Err(Error::Schema("table can only have one PRIMARY KEY".into()));
        }
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|prev| prev.is_named(&col.name)) {
                return Err(Error::Schema(format!(
                    "column {} is declared more than once",
                    col.name
                )));
            }
        }

        for col in columns.iter_mut().filter(|c| c.primary_key) {
            col.not_null = true;
            col.unique = true;
        }

        // the row id comes from `id`, or failing that from an INTEGER PRIMARY KEY
        let id_column = columns.iter().position(|c| c.is_named("id")).or_else(|| {
            columns
                .iter()
                .position(|c| c.primary_key && c.data_type == DataType::Int)
        });

        Ok(Self { columns, id_column })
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.is_named(name))
    }

    pub fn get(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.is_named(name))
    }

    /// Like [Schema::get] but reports an unknown column as an error.
    pub fn resolve(&self, table: &str, name: &str) -> Result<&ColumnDef> {
        self.get(name)
            .ok_or_else(|| Error::column_not_found(table, name))
    }

    pub fn id_column(&self) -> Option<&ColumnDef> {
        self.id_column.map(|i| &self.columns[i])
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}
