use std::env;

use log::info;
use oxylite::{Config, Database, QueryResult, Value};

fn print_result(result: &QueryResult) {
    if !result.is_select {
        println!("{}", result.message);
        return;
    }

    let width = 14;
    for column in &result.columns {
        print!("{column:<width$}");
    }
    println!();
    println!("{}", "-".repeat(width * result.columns.len()));

    for row in result.rows() {
        for value in row {
            let cell = match value {
                Value::Null => "NULL".to_string(),
                other => other.to_string(),
            };
            print!("{cell:<width$}");
        }
        println!();
    }
    println!();
}

fn main() -> Result<(), oxylite::Error> {
    env_logger::init();
    println!("oxylite demo\n");

    // Pass a path to persist the demo tables between runs
    let config = match env::args().nth(1) {
        Some(path) => Config::with_path(path),
        None => Config::default(),
    };
    let mut db = Database::open(config)?;
    info!("database opened");

    let script = "
        CREATE TABLE teams (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE);
        CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            age INT,
            team INT REFERENCES teams(id),
            joined DATETIME
        );
        INSERT INTO teams VALUES (1, 'core');
        INSERT INTO users VALUES (1, 'Alice', 30, 1, '2024-03-01');
        INSERT INTO users (id, name) VALUES (2, 'Bob');
        INSERT INTO users VALUES (3, 'Charlie', 25, 1, '2024-03-02 09:30:00');
    ";
    if db.get_table("users").is_none() {
        for result in db.execute_script(script)? {
            print_result(&result);
        }
    }

    print_result(&db.query("DESCRIBE users")?);
    print_result(&db.query("SELECT * FROM users")?);

    println!("Rolling back a delete...");
    db.execute("BEGIN")?;
    print_result(&db.execute("DELETE FROM users WHERE age > 18")?);
    db.execute("ROLLBACK")?;
    print_result(&db.query("SELECT id, name FROM users")?);

    // Errors come back as values through `run`
    let failed = db.run("INSERT INTO users VALUES (1, 'Again')");
    println!("success={} message={}\n", failed.success, failed.message);

    println!("Tables in database:");
    for table_name in db.list_tables() {
        println!("  - {table_name}");
    }

    Ok(())
}
