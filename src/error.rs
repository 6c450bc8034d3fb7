use std::fmt;

use thiserror::Error;

use crate::storage::StorageError;

/// Which uniqueness constraint rejected a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    PrimaryKey,
    Unique,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrimaryKey => f.write_str("PRIMARY KEY"),
            Self::Unique => f.write_str("UNIQUE"),
        }
    }
}

/// Every failure a statement can report to its caller.
///
/// None of these are fatal: after any error the [Database](crate::Database)
/// stays usable and no partial mutation is visible.
#[derive(Error, Debug)]
pub enum Error {
    /// The SQL text could not be turned into a statement.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid CREATE TABLE shape (no columns, two primary keys...).
    #[error("schema error: {0}")]
    Schema(String),

    #[error("table {0} already exists")]
    TableExists(String),

    #[error("table {0} does not exist")]
    TableNotFound(String),

    #[error("column {column} does not exist in table {table}")]
    ColumnNotFound { table: String, column: String },

    /// A NOT NULL column received no value at all.
    #[error("missing value for column {0}")]
    MissingColumn(String),

    /// The row carries no usable integer id.
    #[error("table {table}: {reason}")]
    MissingId { table: String, reason: String },

    #[error("invalid value for column {column}: {reason}")]
    TypeMismatch { column: String, reason: String },

    #[error("column {0} cannot be null")]
    NullConstraint(String),

    #[error("duplicate value in {constraint} column {column}")]
    UniqueConstraint {
        constraint: Constraint,
        column: String,
    },

    #[error("{0}")]
    TransactionState(String),

    #[error("invalid WHERE clause: {0}")]
    InvalidWhereClause(String),

    #[error("column count ({columns}) does not match value count ({values})")]
    ColumnCountMismatch { columns: usize, values: usize },

    #[error("row id column {column} of table {table} cannot be changed")]
    ImmutableRowId { table: String, column: String },

    #[error("value {value} in column {column} has no match in {table}({target})")]
    ForeignKeyViolation {
        column: String,
        value: String,
        table: String,
        target: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    /// Writing or reading the backing file failed. The in-memory state is
    /// kept as is; [Database::save](crate::Database::save) may be retried.
    #[error("persistence error: {0}")]
    Persistence(#[from] StorageError),
}

impl Error {
    pub(crate) fn column_not_found(table: &str, column: &str) -> Self {
        Self::ColumnNotFound {
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    pub(crate) fn type_mismatch(column: &str, reason: impl Into<String>) -> Self {
        Self::TypeMismatch {
            column: column.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
