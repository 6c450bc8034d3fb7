use std::collections::HashMap;

use log::{debug, info, warn};

use crate::{
    ColumnDef, Value,
    ast::{ColumnsSelect, Delete, InsertInto, Select, Statement, Update},
    column::ForeignKey,
    config::Config,
    error::{Error, Result},
    parser,
    storage::{Storage, StorageError, StoredDatabase, StoredTable},
    table::{Row, Table},
    transaction::{TransactionManager, TransactionState},
};

/// Tables keyed by lowercased name.
type Tables = HashMap<String, Table>;

fn table_key(name: &str) -> String {
    name.to_lowercase()
}

/// The main entry point of the engine.
/// It owns the tables, dispatches statements, runs transactions and keeps
/// the backing file (if any) in sync.
pub struct Database {
    /// A map of table names to their respective [Table] structures.
    tables: Tables,
    transactions: TransactionManager<Tables>,
    storage: Option<Storage>,
    config: Config,
}

/// Outcome of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub success: bool,
    pub message: String,
    /// `true` for results carrying rows (SELECT, DESCRIBE).
    pub is_select: bool,
    /// The names of the columns included in the result set.
    pub columns: Vec<String>,
    pub records: Vec<Row>,
    pub rows_affected: usize,
}

impl QueryResult {
    fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            ..Self::default()
        }
    }

    fn affected(message: impl Into<String>, rows_affected: usize) -> Self {
        Self {
            rows_affected,
            ..Self::message(message)
        }
    }

    fn select(columns: Vec<String>, records: Vec<Row>) -> Self {
        Self {
            success: true,
            message: format!("{} record(s) found", records.len()),
            is_select: true,
            columns,
            records,
            rows_affected: 0,
        }
    }

    /// The error form handed to front ends that do not deal in `Result`.
    pub fn failure(error: &Error) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            ..Self::default()
        }
    }

    /// Records as value vectors, in [QueryResult::columns] order.
    pub fn rows(&self) -> Vec<Vec<Value>> {
        self.records
            .iter()
            .map(|record| {
                self.columns
                    .iter()
                    .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect()
    }
}

impl Database {
    /// Creates a new, empty, purely in-memory database.
    pub fn new() -> Self {
        Self {
            tables: Tables::default(),
            transactions: TransactionManager::new(),
            storage: None,
            config: Config::default(),
        }
    }

    /// Opens a database as described by `config`, loading the backing file
    /// when there is one. A missing file starts an empty database.
    ///
    /// # Errors
    /// [Error::Config] for an invalid config, [Error::Persistence] when the
    /// file cannot be read or does not describe a valid database.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let storage = Storage::from_config(&config);

        let mut tables = Tables::default();
        if let Some(storage) = &storage {
            for (name, stored) in storage.load()?.tables {
                let table = stored.restore(&name, config.index_order)?;
                if tables.insert(table_key(&name), table).is_some() {
                    return Err(StorageError::Corrupt(format!("table {name} is stored twice")).into());
                }
            }
            info!(
                "opened {} with {} table(s)",
                storage.path().display(),
                tables.len()
            );
        }

        Ok(Self {
            tables,
            transactions: TransactionManager::new(),
            storage,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.transactions.state()
    }

    pub fn in_transaction(&self) -> bool {
        self.transactions.is_active()
    }

    /// Creates a new table in the database.
    ///
    /// # Errors
    /// Returns an error if a table with the same name already exists, if
    /// the column list is invalid or if a REFERENCES target is unknown.
    pub fn create_table(&mut self, name: &str, columns: Vec<ColumnDef>) -> Result<()> {
        let key = table_key(name);
        if self.tables.contains_key(&key) {
            return Err(Error::TableExists(name.to_string()));
        }
        let table = Table::new(name, columns, self.config.index_order)?;
        for fk in table.schema().columns().iter().filter_map(|c| c.references.as_ref()) {
            self.check_reference_target(&table, fk)?;
        }
        info!("created table {name}");
        self.tables.insert(key, table);
        Ok(())
    }

    /// Removes a table from the database by its name.
    ///
    /// # Errors
    /// Returns an error if the table does not exist.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        match self.tables.remove(&table_key(name)) {
            Some(_) => {
                info!("dropped table {name}");
                Ok(())
            }
            None => Err(Error::TableNotFound(name.to_string())),
        }
    }

    /// Retrieves a reference to a table by name (any case).
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(&table_key(name))
    }

    /// Retrieves a mutable reference to a table by name (any case).
    pub fn get_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(&table_key(name))
    }

    /// Returns the names of all tables, sorted.
    pub fn list_tables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.values().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    fn table(&self, name: &str) -> Result<&Table> {
        self.get_table(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.get_table_mut(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// Parses and runs one SQL statement.
    ///
    /// Mutations are written to the backing file straight away, or at
    /// COMMIT when a transaction is open.
    ///
    /// # Errors
    /// Returns an error if parsing or execution fails. A failed statement
    /// leaves no partial change behind.
    ///
    /// # Example
    /// ```
    /// use oxylite::{Database, Value};
    /// let mut db = Database::new();
    /// db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)").unwrap();
    /// db.execute("INSERT INTO users VALUES (1, 'Alice')").unwrap();
    /// let result = db.execute("DELETE FROM users WHERE id > 12").unwrap();
    /// assert_eq!(result.message, "0 record(s) deleted successfully");
    ///
    /// let result = db.query("SELECT * FROM users").unwrap();
    /// assert_eq!(result.rows()[0][0], Value::Int(1));
    /// ```
    pub fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        let statement = parser::parse(sql)?;
        self.execute_statement(statement)
    }

    /// Runs a parsed statement.
    pub fn execute_statement(&mut self, statement: Statement) -> Result<QueryResult> {
        debug!("executing {}", statement.kind());
        let result = match statement {
            statement @ (Statement::Select(_) | Statement::Describe(_)) => {
                return self.query_statement(statement);
            }
            Statement::Begin => return self.begin(),
            Statement::Commit => return self.commit(),
            Statement::Rollback => return self.rollback(),
            Statement::CreateTable(create) => {
                self.create_table(&create.name, create.columns)?;
                QueryResult::message(format!("Table {} created successfully", create.name))
            }
            Statement::DropTable(name) => {
                self.drop_table(&name)?;
                QueryResult::message(format!("Table {name} dropped successfully"))
            }
            Statement::InsertInto(insert) => self.insert(insert)?,
            Statement::Update(update) => self.update(update)?,
            Statement::Delete(delete) => self.delete(delete)?,
        };
        self.persist()?;
        Ok(result)
    }

    /// Runs every statement of a `;` separated script, stopping at the
    /// first failure. Results of the statements that ran are returned.
    pub fn execute_script(&mut self, sql: &str) -> Result<Vec<QueryResult>> {
        parser::parse_script(sql)?
            .into_iter()
            .map(|statement| self.execute_statement(statement))
            .collect()
    }

    /// Like [Database::execute], but folds errors into a failed [QueryResult].
    pub fn run(&mut self, sql: &str) -> QueryResult {
        self.execute(sql).unwrap_or_else(|e| {
            warn!("statement failed: {e}");
            QueryResult::failure(&e)
        })
    }

    /// Executes a read-only statement (`SELECT` or `DESCRIBE`).
    ///
    /// # Example
    ///
    /// ```
    /// use oxylite::{Database, Value};
    ///
    /// let mut db = Database::new();
    /// db.execute("CREATE TABLE products (id INT, name TEXT, price INT)").unwrap();
    /// db.execute("INSERT INTO products VALUES (1, 'Laptop', 1200)").unwrap();
    /// db.execute("INSERT INTO products VALUES (2, 'Mouse', 25)").unwrap();
    ///
    /// // Querying specific columns
    /// let result = db.query("SELECT name FROM products WHERE price < 100").unwrap();
    ///
    /// assert_eq!(result.columns, vec!["name"]);
    /// assert_eq!(result.rows(), vec![vec![Value::Text("Mouse".into())]]);
    /// ```
    ///
    /// # Errors
    /// Returns an error if the SQL is not a read-only statement, if the table
    /// does not exist or if a named column does not exist.
    pub fn query(&self, sql: &str) -> Result<QueryResult> {
        self.query_statement(parser::parse(sql)?)
    }

    /// Runs a parsed read-only statement.
    pub fn query_statement(&self, statement: Statement) -> Result<QueryResult> {
        match statement {
            Statement::Select(select) => self.select(select),
            Statement::Describe(name) => self.describe(&name),
            other => Err(Error::Parse(format!(
                "{} is not a read-only statement",
                other.kind()
            ))),
        }
    }

    /// Writes the committed state to the backing file. Without a file this
    /// does nothing. Inside a transaction the state captured at BEGIN is
    /// written.
    pub fn save(&self) -> Result<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        let tables = self.transactions.snapshot().unwrap_or(&self.tables);
        let stored = StoredDatabase {
            tables: tables
                .values()
                .map(|t| (t.name.clone(), StoredTable::capture(t)))
                .collect(),
        };
        storage.save(&stored).map_err(|e| {
            warn!("could not save {}: {e}", storage.path().display());
            Error::from(e)
        })
    }

    fn persist(&self) -> Result<()> {
        if self.transactions.is_active() {
            debug!("save deferred until COMMIT");
            return Ok(());
        }
        self.save()
    }

    // --- Transactions ---

    fn begin(&mut self) -> Result<QueryResult> {
        self.transactions.begin(&self.tables)?;
        info!("transaction started");
        Ok(QueryResult::message("Transaction started"))
    }

    fn commit(&mut self) -> Result<QueryResult> {
        self.transactions.commit()?;
        info!("transaction committed");
        self.save()?;
        Ok(QueryResult::message("Transaction committed successfully"))
    }

    fn rollback(&mut self) -> Result<QueryResult> {
        self.tables = self.transactions.rollback()?;
        info!("transaction rolled back");
        Ok(QueryResult::message("Transaction rolled back successfully"))
    }

    // --- Statements ---

    /// Maps the provided values to their columns, handling cases where:
    /// 1. Columns are not specified (positional insertion).
    /// 2. Columns are specified in a different order than the schema.
    /// 3. Some columns are missing (filled with `NULL` when allowed).
    fn insert(&mut self, insert: InsertInto) -> Result<QueryResult> {
        let table = self.table(&insert.table)?;

        let value_count = insert.values.len();
        let mismatch = |columns: usize| Error::ColumnCountMismatch {
            columns,
            values: value_count,
        };
        let values: Vec<(String, Value)> = match insert.columns {
            Some(columns) if columns.len() != insert.values.len() => {
                return Err(mismatch(columns.len()));
            }
            Some(columns) => columns.into_iter().zip(insert.values).collect(),
            None if insert.values.len() > table.schema().len() => {
                return Err(mismatch(table.schema().len()));
            }
            None => table.schema().names().into_iter().zip(insert.values).collect(),
        };

        let (id, row) = table.prepare_insert(values)?;
        let linked: Vec<&ColumnDef> = table
            .schema()
            .columns()
            .iter()
            .filter(|c| c.references.is_some())
            .collect();
        self.check_foreign_keys(table, &linked, &row)?;

        self.table_mut(&insert.table)?.apply_insert(id, row)?;
        debug!("inserted row {id} into {}", insert.table);
        Ok(QueryResult::affected("Record inserted successfully", 1))
    }

    fn update(&mut self, update: Update) -> Result<QueryResult> {
        let table = self.table(&update.table)?;
        let where_clause = update.where_clause.ok_or_else(|| {
            Error::InvalidWhereClause("UPDATE requires a WHERE clause".into())
        })?;

        let updated = table.prepare_update(&update.assignments, &where_clause)?;
        let linked: Vec<&ColumnDef> = table
            .schema()
            .columns()
            .iter()
            .filter(|c| {
                c.references.is_some() && update.assignments.iter().any(|(name, _)| c.is_named(name))
            })
            .collect();
        for (_, row) in &updated {
            self.check_foreign_keys(table, &linked, row)?;
        }

        let count = self.table_mut(&update.table)?.apply_update(updated);
        debug!("updated {count} row(s) in {}", update.table);
        Ok(QueryResult::affected(
            format!("{count} record(s) updated successfully"),
            count,
        ))
    }

    fn delete(&mut self, delete: Delete) -> Result<QueryResult> {
        let count = self
            .table_mut(&delete.table)?
            .delete(&delete.where_clause)?;
        debug!("deleted {count} row(s) from {}", delete.table);
        Ok(QueryResult::affected(
            format!("{count} record(s) deleted successfully"),
            count,
        ))
    }

    fn select(&self, select: Select) -> Result<QueryResult> {
        let table = self.table(&select.table)?;

        // Resolve which columns need to be projected
        let columns: Vec<String> = match select.columns {
            ColumnsSelect::Star => table.schema().names(),
            ColumnsSelect::ColumnsNames(names) => names
                .iter()
                .map(|n| {
                    table
                        .schema()
                        .resolve(&table.name, n)
                        .map(|c| c.name.clone())
                })
                .collect::<Result<_>>()?,
        };

        let records = table
            .select(&select.where_clause)?
            .into_iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect();

        Ok(QueryResult::select(columns, records))
    }

    fn describe(&self, name: &str) -> Result<QueryResult> {
        let table = self.table(name)?;
        let records = table
            .describe()
            .into_iter()
            .map(|d| {
                Row::from([
                    ("Field".to_string(), Value::from(d.field)),
                    ("Type".to_string(), Value::from(d.data_type)),
                    ("Constraints".to_string(), Value::from(d.constraints)),
                ])
            })
            .collect();
        let columns = ["Field", "Type", "Constraints"].map(String::from).to_vec();
        Ok(QueryResult::select(columns, records))
    }

    // --- Foreign keys ---

    /// The target of a REFERENCES clause must exist. A table may refer to
    /// itself.
    fn check_reference_target(&self, table: &Table, fk: &ForeignKey) -> Result<()> {
        let target = if table_key(&fk.table) == table_key(&table.name) {
            table
        } else {
            self.table(&fk.table)?
        };
        target.schema().resolve(&target.name, &fk.column)?;
        Ok(())
    }

    /// Every non-null value of the `linked` columns must appear in the
    /// referenced column. A self-referencing row may point at itself.
    fn check_foreign_keys(&self, table: &Table, linked: &[&ColumnDef], row: &Row) -> Result<()> {
        for col in linked {
            let Some(fk) = &col.references else {
                continue;
            };
            let value = match row.get(&col.name) {
                Some(value) if !value.is_null() => value,
                _ => continue,
            };
            let self_ref = table_key(&fk.table) == table_key(&table.name);
            let target = if self_ref { table } else { self.table(&fk.table)? };
            let target_col = target.schema().resolve(&target.name, &fk.column)?;
            let holds = |r: &Row| r.get(&target_col.name).is_some_and(|v| v.same_as(value));
            let found = (self_ref && holds(row)) || target.rows().any(|(_, r)| holds(r));
            if !found {
                return Err(Error::ForeignKeyViolation {
                    column: col.name.clone(),
                    value: value.to_string(),
                    table: target.name.clone(),
                    target: target_col.name.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_type::DataType;
    use crate::error::Constraint;

    fn simple_columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id", DataType::Int),
            ColumnDef::new("name", DataType::Text),
        ]
    }

    fn text(s: &str) -> Value {
        Value::Text(s.into())
    }

    #[test]
    fn test_create_and_drop_table() {
        let mut db = Database::new();

        assert!(db.create_table("users", simple_columns()).is_ok());
        assert!(db.get_table("USERS").is_some());

        assert!(db.drop_table("Users").is_ok());
        assert!(db.get_table("users").is_none());
    }

    #[test]
    fn test_duplicate_table_error() {
        let mut db = Database::new();

        db.create_table("users", simple_columns()).unwrap();
        let err = db.create_table("Users", simple_columns()).unwrap_err();

        assert!(matches!(err, Error::TableExists(_)));
    }

    #[test]
    fn test_drop_nonexistent_table() {
        let mut db = Database::new();

        let err = db.execute("DROP TABLE unknown").unwrap_err();
        assert!(matches!(err, Error::TableNotFound(_)));
    }

    #[test]
    fn test_list_tables() {
        let mut db = Database::new();

        db.create_table("users", simple_columns()).unwrap();
        db.create_table("Posts", simple_columns()).unwrap();

        assert_eq!(db.list_tables(), vec!["Posts", "users"]);
    }

    #[test]
    fn test_execute_messages() {
        let mut db = Database::new();
        let result = db.execute("CREATE TABLE users (id INT, name TEXT)").unwrap();
        assert!(result.success);
        assert_eq!(result.message, "Table users created successfully");

        let result = db.execute("INSERT INTO users VALUES (1, 'Alice')").unwrap();
        assert_eq!(result.message, "Record inserted successfully");
        assert_eq!(result.rows_affected, 1);

        let result = db.execute("DROP TABLE users").unwrap();
        assert_eq!(result.message, "Table users dropped successfully");
    }

    #[test]
    fn test_execute_insert_and_query_star() {
        let mut db = Database::new();
        db.execute("CREATE TABLE users (id INT, name TEXT)").unwrap();

        db.execute("INSERT INTO users VALUES (2, 'Bob')").unwrap();
        db.execute("INSERT INTO users VALUES (1, 'Alice')").unwrap();

        let result = db.query("SELECT * FROM users").unwrap();

        assert!(result.is_select);
        assert_eq!(result.columns, vec!["id", "name"]);
        // rows come back in id order
        assert_eq!(
            result.rows(),
            vec![
                vec![Value::Int(1), text("Alice")],
                vec![Value::Int(2), text("Bob")],
            ]
        );
    }

    #[test]
    fn test_insert_with_column_reordering() {
        let mut db = Database::new();
        db.execute("CREATE TABLE users (id INT, name TEXT)").unwrap();

        db.execute("INSERT INTO users (name, id) VALUES ('Charlie', 3)").unwrap();

        let result = db.query("SELECT id, name FROM users").unwrap();
        assert_eq!(result.rows()[0], vec![Value::Int(3), text("Charlie")]);
    }

    #[test]
    fn test_insert_partial_columns() {
        let mut db = Database::new();
        db.execute("CREATE TABLE users (id INT, name TEXT)").unwrap();

        db.execute("INSERT INTO users (id) VALUES (4)").unwrap();

        let result = db.query("SELECT NAME, id FROM users").unwrap();

        // Row must be [Null, 4] as we asked name before id in the query
        assert_eq!(result.columns, vec!["name", "id"]);
        assert_eq!(result.rows()[0], vec![Value::Null, Value::Int(4)]);
    }

    #[test]
    fn test_insert_count_mismatch() {
        let mut db = Database::new();
        db.execute("CREATE TABLE users (id INT, name TEXT)").unwrap();

        let err = db.execute("INSERT INTO users (id, name) VALUES (1)").unwrap_err();
        assert!(matches!(err, Error::ColumnCountMismatch { columns: 2, values: 1 }));

        let err = db.execute("INSERT INTO users VALUES (1, 'a', 'b')").unwrap_err();
        assert!(matches!(err, Error::ColumnCountMismatch { columns: 2, values: 3 }));
    }

    #[test]
    fn test_query_with_where_simple() {
        let mut db = Database::new();
        db.execute("CREATE TABLE users (id INT, name TEXT, age INT)").unwrap();
        db.execute("INSERT INTO users VALUES (1, 'Alice', 30)").unwrap();
        db.execute("INSERT INTO users VALUES (2, 'Bob', 17)").unwrap();
        db.execute("INSERT INTO users VALUES (3, 'Charlie', 25)").unwrap();

        let result = db.query("SELECT name FROM users WHERE age > 18").unwrap();

        assert_eq!(result.columns, vec!["name"]);
        assert_eq!(result.rows(), vec![vec![text("Alice")], vec![text("Charlie")]]);
    }

    #[test]
    fn test_query_with_where_and() {
        let mut db = Database::new();
        db.execute("CREATE TABLE users (id INT, age INT, active BOOL)").unwrap();
        db.execute("INSERT INTO users VALUES (1, 30, true)").unwrap();
        db.execute("INSERT INTO users VALUES (2, 17, true)").unwrap();
        db.execute("INSERT INTO users VALUES (3, 25, false)").unwrap();

        let result = db
            .query("SELECT id FROM users WHERE age >= 18 AND active = TRUE")
            .unwrap();

        assert_eq!(result.rows(), vec![vec![Value::Int(1)]]);
    }

    #[test]
    fn test_query_with_null_comparison() {
        let mut db = Database::new();
        db.execute("CREATE TABLE users (id INT, age INT)").unwrap();
        db.execute("INSERT INTO users (id) VALUES (1)").unwrap(); // age = NULL
        db.execute("INSERT INTO users VALUES (2, 25)").unwrap();

        // NULL > 18 is false, and so is NULL != 18
        let result = db.query("SELECT id FROM users WHERE age > 18").unwrap();
        assert_eq!(result.rows(), vec![vec![Value::Int(2)]]);
        let result = db.query("SELECT id FROM users WHERE age != 18").unwrap();
        assert_eq!(result.rows(), vec![vec![Value::Int(2)]]);
    }

    #[test]
    fn test_query_errors() {
        let mut db = Database::new();
        db.execute("CREATE TABLE users (id INT)").unwrap();

        assert!(matches!(
            db.query("SELECT * FROM ghosts"),
            Err(Error::TableNotFound(_))
        ));
        assert!(matches!(
            db.query("SELECT age FROM users"),
            Err(Error::ColumnNotFound { .. })
        ));
        // unknown WHERE column fails even on an empty table
        assert!(matches!(
            db.query("SELECT * FROM users WHERE age = 1"),
            Err(Error::ColumnNotFound { .. })
        ));
        assert!(matches!(
            db.query("DELETE FROM users"),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_describe() {
        let mut db = Database::new();
        db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .unwrap();

        let result = db.query("DESCRIBE users").unwrap();
        assert_eq!(result.columns, vec!["Field", "Type", "Constraints"]);
        assert_eq!(
            result.rows(),
            vec![
                vec![text("id"), text("INTEGER"), text("PRIMARY KEY, NOT NULL, UNIQUE")],
                vec![text("name"), text("TEXT"), text("NOT NULL")],
            ]
        );
    }

    #[test]
    fn test_delete_rows() {
        let mut db = Database::new();
        db.execute("CREATE TABLE products (id INT, price INT)").unwrap();
        for (id, price) in [(1, 10), (2, 50), (3, 100), (4, 20)] {
            db.execute(&format!("INSERT INTO products VALUES ({id}, {price})"))
                .unwrap();
        }

        let result = db.execute("DELETE FROM products WHERE price > 40").unwrap();
        assert_eq!(result.message, "2 record(s) deleted successfully");

        let result = db.query("SELECT id FROM products").unwrap();
        assert_eq!(result.rows(), vec![vec![Value::Int(1)], vec![Value::Int(4)]]);

        let result = db.execute("DELETE FROM products WHERE id = 99").unwrap();
        assert_eq!(result.rows_affected, 0);

        let result = db.execute("DELETE FROM products").unwrap();
        assert_eq!(result.rows_affected, 2);
        assert!(db.query("SELECT * FROM products").unwrap().records.is_empty());
    }

    #[test]
    fn test_update_multiple_columns() {
        let mut db = Database::new();
        db.execute("CREATE TABLE products (id INT, name TEXT, price INT)").unwrap();
        db.execute("INSERT INTO products VALUES (1, 'Keyboard', 50)").unwrap();

        let result = db
            .execute("UPDATE products SET name = 'Mechanical Keyboard', price = 120 WHERE id = 1")
            .unwrap();
        assert_eq!(result.message, "1 record(s) updated successfully");

        let result = db.query("SELECT name, price FROM products").unwrap();
        assert_eq!(
            result.rows()[0],
            vec![text("Mechanical Keyboard"), Value::Int(120)]
        );
    }

    #[test]
    fn test_update_with_complex_where() {
        let mut db = Database::new();
        db.execute("CREATE TABLE employees (id INT, dept TEXT, salary INT)").unwrap();
        db.execute("INSERT INTO employees VALUES (1, 'IT', 3000)").unwrap();
        db.execute("INSERT INTO employees VALUES (2, 'HR', 2500)").unwrap();
        db.execute("INSERT INTO employees VALUES (3, 'IT', 3500)").unwrap();

        db.execute("UPDATE employees SET salary = 3300 WHERE dept = 'IT' AND salary < 3200")
            .unwrap();

        let result = db.query("SELECT salary FROM employees").unwrap();
        assert_eq!(
            result.rows(),
            vec![vec![Value::Int(3300)], vec![Value::Int(2500)], vec![Value::Int(3500)]]
        );
    }

    #[test]
    fn test_update_errors() {
        let mut db = Database::new();
        db.execute("CREATE TABLE test (id INT, val INT)").unwrap();
        db.execute("INSERT INTO test VALUES (1, 10)").unwrap();

        let err = db.execute("UPDATE test SET val = 'Invalid' WHERE id = 1").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));

        let err = db.execute("UPDATE test SET unknown_col = 10 WHERE id = 1").unwrap_err();
        assert!(matches!(err, Error::ColumnNotFound { .. }));

        let err = db.execute("UPDATE test SET val = 1").unwrap_err();
        assert!(matches!(err, Error::InvalidWhereClause(_)));

        let err = db.execute("UPDATE ghost SET val = 1 WHERE id = 1").unwrap_err();
        assert!(matches!(err, Error::TableNotFound(_)));

        let result = db.execute("UPDATE test SET val = 99 WHERE id = 404").unwrap();
        assert_eq!(result.message, "0 record(s) updated successfully");

        let result = db.query("SELECT val FROM test").unwrap();
        assert_eq!(result.rows()[0][0], Value::Int(10));
    }

    #[test]
    fn test_unique_violation_through_sql() {
        let mut db = Database::new();
        db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT UNIQUE)")
            .unwrap();
        db.execute("INSERT INTO users VALUES (1, 'a@x')").unwrap();

        let err = db.execute("INSERT INTO users VALUES (1, 'b@x')").unwrap_err();
        assert!(matches!(
            err,
            Error::UniqueConstraint {
                constraint: Constraint::PrimaryKey,
                ..
            }
        ));
        let err = db.execute("INSERT INTO users VALUES (2, 'a@x')").unwrap_err();
        assert_eq!(err.to_string(), "duplicate value in UNIQUE column email");
    }

    #[test]
    fn test_transactions() {
        let mut db = Database::new();
        db.execute("CREATE TABLE t (id INT)").unwrap();
        db.execute("INSERT INTO t VALUES (1)").unwrap();

        assert_eq!(db.execute("BEGIN").unwrap().message, "Transaction started");
        assert_eq!(db.transaction_state(), TransactionState::InTransaction);
        db.execute("INSERT INTO t VALUES (2)").unwrap();
        db.execute("CREATE TABLE other (id INT)").unwrap();

        let err = db.execute("BEGIN TRANSACTION").unwrap_err();
        assert_eq!(err.to_string(), "transaction already in progress");

        let result = db.execute("ROLLBACK").unwrap();
        assert_eq!(result.message, "Transaction rolled back successfully");
        assert_eq!(db.query("SELECT * FROM t").unwrap().records.len(), 1);
        assert!(db.get_table("other").is_none());

        db.execute("BEGIN").unwrap();
        db.execute("DELETE FROM t").unwrap();
        let result = db.execute("COMMIT").unwrap();
        assert_eq!(result.message, "Transaction committed successfully");
        assert!(db.query("SELECT * FROM t").unwrap().records.is_empty());

        let err = db.execute("COMMIT").unwrap_err();
        assert_eq!(err.to_string(), "no transaction in progress");
        assert!(matches!(db.execute("ROLLBACK"), Err(Error::TransactionState(_))));
    }

    #[test]
    fn test_foreign_keys() {
        let mut db = Database::new();
        let err = db
            .execute("CREATE TABLE posts (id INT, author INT REFERENCES users(id))")
            .unwrap_err();
        assert!(matches!(err, Error::TableNotFound(_)));

        db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY)").unwrap();
        let err = db
            .execute("CREATE TABLE posts (id INT, author INT REFERENCES users(uid))")
            .unwrap_err();
        assert!(matches!(err, Error::ColumnNotFound { .. }));

        db.execute("CREATE TABLE posts (id INT, author INT REFERENCES users(id))")
            .unwrap();
        db.execute("INSERT INTO users VALUES (1)").unwrap();
        db.execute("INSERT INTO posts VALUES (10, 1)").unwrap();
        db.execute("INSERT INTO posts VALUES (11, NULL)").unwrap();

        let err = db.execute("INSERT INTO posts VALUES (12, 2)").unwrap_err();
        assert!(matches!(err, Error::ForeignKeyViolation { .. }));
        let err = db
            .execute("UPDATE posts SET author = 5 WHERE id = 10")
            .unwrap_err();
        assert!(matches!(err, Error::ForeignKeyViolation { .. }));
        assert_eq!(db.query("SELECT * FROM posts").unwrap().records.len(), 2);
    }

    #[test]
    fn test_self_referencing_foreign_key() {
        let mut db = Database::new();
        db.execute("CREATE TABLE node (id INT, parent INT REFERENCES node(id))")
            .unwrap();
        db.execute("INSERT INTO node VALUES (1, 1)").unwrap();
        db.execute("INSERT INTO node VALUES (2, 1)").unwrap();
        db.execute("UPDATE node SET parent = 2 WHERE id = 2").unwrap();

        let err = db.execute("INSERT INTO node VALUES (3, 4)").unwrap_err();
        assert!(matches!(err, Error::ForeignKeyViolation { .. }));
        let err = db.execute("UPDATE node SET parent = 9 WHERE id = 1").unwrap_err();
        assert!(matches!(err, Error::ForeignKeyViolation { .. }));
    }

    #[test]
    fn test_where_finds_rows_by_inserted_literal() {
        let mut db = Database::new();
        db.execute_script(
            "CREATE TABLE e (id INT, at DATETIME, active BOOL);
             INSERT INTO e VALUES (1, '2024-03-01 10:00:00', 'true');
             INSERT INTO e VALUES (2, '2024-03-02', 1);
             INSERT INTO e VALUES (3, '2024-03-03', FALSE);",
        )
        .unwrap();

        let result = db.query("SELECT id FROM e WHERE at = '2024-03-01 10:00:00'").unwrap();
        assert_eq!(result.rows(), vec![vec![Value::Int(1)]]);
        let result = db.query("SELECT id FROM e WHERE active = 'true'").unwrap();
        assert_eq!(result.records.len(), 2);
        let result = db.query("SELECT id FROM e WHERE active = 1").unwrap();
        assert_eq!(result.records.len(), 2);

        let result = db
            .execute("UPDATE e SET active = 0 WHERE at = '2024-03-01 10:00:00'")
            .unwrap();
        assert_eq!(result.message, "1 record(s) updated successfully");
        let result = db.execute("DELETE FROM e WHERE at >= '2024-03-02'").unwrap();
        assert_eq!(result.rows_affected, 2);
    }

    #[test]
    fn test_run_folds_errors() {
        let mut db = Database::new();
        let result = db.run("SELECT * FROM nowhere");
        assert!(!result.success);
        assert_eq!(result.message, "table nowhere does not exist");

        let result = db.run("CREATE TABLE t (id INT)");
        assert!(result.success);
    }

    #[test]
    fn test_execute_script() {
        let mut db = Database::new();
        let results = db
            .execute_script(
                "CREATE TABLE t (id INT, v TEXT);
                 INSERT INTO t VALUES (1, 'a');
                 INSERT INTO t VALUES (2, 'b');
                 SELECT v FROM t WHERE id >= 2;",
            )
            .unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results[3].rows(), vec![vec![text("b")]]);

        // stops at the first failure
        let err = db
            .execute_script("INSERT INTO t VALUES (3, 'c'); INSERT INTO t VALUES (3, 'd'); INSERT INTO t VALUES (4, 'e')")
            .unwrap_err();
        assert!(matches!(err, Error::UniqueConstraint { .. }));
        assert!(db.get_table("t").unwrap().find(3).is_some());
        assert!(db.get_table("t").unwrap().find(4).is_none());
    }

    #[test]
    fn test_open_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_path(dir.path().join("db.json")).index_order(3);

        {
            let mut db = Database::open(config.clone()).unwrap();
            db.execute("CREATE TABLE Users (id INTEGER PRIMARY KEY, name TEXT)")
                .unwrap();
            for id in 1..=10 {
                db.execute(&format!("INSERT INTO users VALUES ({id}, 'u{id}')"))
                    .unwrap();
            }
        }

        let db = Database::open(config).unwrap();
        assert_eq!(db.list_tables(), vec!["Users"]);
        let result = db.query("SELECT name FROM users WHERE id = 7").unwrap();
        assert_eq!(result.rows(), vec![vec![text("u7")]]);
    }

    #[test]
    fn test_open_rejects_bad_config() {
        let err = Database::open(Config::default().index_order(1)).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
