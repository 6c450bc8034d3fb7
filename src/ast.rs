use std::cmp::Ordering;
use std::fmt;

use crate::predicate::Predicate;
use crate::{ColumnDef, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable(CreateTable),
    InsertInto(InsertInto),
    Select(Select),
    Update(Update),
    Delete(Delete),
    DropTable(String),
    Describe(String),
    Begin,
    Commit,
    Rollback,
}

impl Statement {
    /// `true` for statements that never modify state nor touch the file.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Select(_) | Self::Describe(_))
    }

    /// Short keyword form, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateTable(_) => "CREATE TABLE",
            Self::InsertInto(_) => "INSERT",
            Self::Select(_) => "SELECT",
            Self::Update(_) => "UPDATE",
            Self::Delete(_) => "DELETE",
            Self::DropTable(_) => "DROP TABLE",
            Self::Describe(_) => "DESCRIBE",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Rollback => "ROLLBACK",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertInto {
    pub table: String,
    pub columns: Option<Vec<String>>,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnsSelect {
    Star,
    ColumnsNames(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub columns: ColumnsSelect,
    pub table: String,
    pub where_clause: Predicate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub assignments: Vec<(String, Value)>,
    /// `None` when the statement had no WHERE at all, which is rejected.
    pub where_clause: Option<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: String,
    pub where_clause: Predicate,
}

/// The six comparison operators of a WHERE condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
}

impl ComparisonOp {
    /// Whether an ordering between two operands satisfies the operator.
    pub fn matches(self, ord: Ordering) -> bool {
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::NotEq => ord != Ordering::Equal,
            Self::Gt => ord == Ordering::Greater,
            Self::Lt => ord == Ordering::Less,
            Self::GtEq => ord != Ordering::Less,
            Self::LtEq => ord != Ordering::Greater,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::GtEq => ">=",
            Self::LtEq => "<=",
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
