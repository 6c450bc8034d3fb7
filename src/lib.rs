//! `oxylite`: an embedded, single-file relational store.
//!
//! SQL text is tokenized and parsed into a [Statement](ast::Statement), the
//! [Database] dispatches it to the target [Table], whose rows live in a
//! B+ tree keyed by row id. Mutations are saved to a JSON file right away,
//! or at `COMMIT` inside a transaction.
//!
//! ```
//! use oxylite::{Database, Value};
//!
//! let mut db = Database::new();
//! db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)").unwrap();
//! db.execute("INSERT INTO users VALUES (1, 'Alice')").unwrap();
//!
//! db.execute("BEGIN").unwrap();
//! db.execute("DELETE FROM users").unwrap();
//! db.execute("ROLLBACK").unwrap();
//!
//! let result = db.query("SELECT name FROM users WHERE id = 1").unwrap();
//! assert_eq!(result.rows(), vec![vec![Value::from("Alice")]]);
//! ```

pub mod ast;
pub mod column;
pub mod config;
pub mod data_type;
pub mod database;
pub mod error;
pub mod index;
pub mod parser;
pub mod predicate;
pub mod shared;
pub mod storage;
pub mod table;
pub mod tokenizer;
pub mod transaction;
pub mod value;

pub use column::{ColumnDef, ForeignKey, Schema};
pub use config::Config;
pub use data_type::DataType;
pub use database::{Database, QueryResult};
pub use error::{Constraint, Error, Result};
pub use predicate::{Condition, Predicate};
pub use shared::SharedDatabase;
pub use storage::StorageError;
pub use table::{ColumnDescription, Row, Table};
pub use transaction::TransactionState;
pub use value::Value;
