use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::ast::Statement;
use crate::database::{Database, QueryResult};
use crate::error::Result;
use crate::parser;

/// A cloneable, thread-safe handle on one [Database].
///
/// `SELECT` and `DESCRIBE` run under the read lock and may overlap; every
/// other statement holds the write lock until it is done, persistence
/// included.
///
/// # Example
/// ```
/// # use oxylite::{Database, SharedDatabase};
/// let shared = SharedDatabase::new(Database::new());
/// shared.execute("CREATE TABLE t (id INT)").unwrap();
///
/// let worker = shared.clone();
/// std::thread::spawn(move || worker.execute("INSERT INTO t VALUES (1)").unwrap())
///     .join()
///     .unwrap();
///
/// assert_eq!(shared.execute("SELECT * FROM t").unwrap().records.len(), 1);
/// ```
#[derive(Clone)]
pub struct SharedDatabase {
    inner: Arc<RwLock<Database>>,
}

impl SharedDatabase {
    pub fn new(db: Database) -> Self {
        Self {
            inner: Arc::new(RwLock::new(db)),
        }
    }

    /// Parses outside the lock, then runs under the lock the statement needs.
    pub fn execute(&self, sql: &str) -> Result<QueryResult> {
        self.execute_statement(parser::parse(sql)?)
    }

    pub fn execute_statement(&self, statement: Statement) -> Result<QueryResult> {
        if statement.is_read_only() {
            self.inner.read().query_statement(statement)
        } else {
            self.inner.write().execute_statement(statement)
        }
    }

    /// Like [SharedDatabase::execute], with errors folded into the result.
    pub fn run(&self, sql: &str) -> QueryResult {
        self.execute(sql)
            .unwrap_or_else(|e| QueryResult::failure(&e))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Database> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Database> {
        self.inner.write()
    }
}

impl From<Database> for SharedDatabase {
    fn from(db: Database) -> Self {
        Self::new(db)
    }
}
