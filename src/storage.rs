//! JSON persistence of the whole table set.
//!
//! The file holds one object per table: its column definitions and its
//! records keyed by row id. Saving rewrites the whole file through a
//! sibling temp file that is flushed, optionally synced, then renamed over
//! the target, so readers see either the old or the new contents.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::column::ColumnDef;
use crate::config::Config;
use crate::table::{Row, Table};
use crate::value::Value;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The file parsed but does not describe a valid database.
    #[error("corrupt database file: {0}")]
    Corrupt(String),
}

/// On-disk form of a database.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoredDatabase {
    #[serde(default)]
    pub tables: BTreeMap<String, StoredTable>,
}

/// On-disk form of a table.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoredTable {
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub records: BTreeMap<i64, BTreeMap<String, Value>>,
}

impl StoredTable {
    pub fn capture(table: &Table) -> Self {
        Self {
            columns: table.schema().columns().to_vec(),
            records: table.rows().map(|(id, row)| (id, row.clone())).collect(),
        }
    }

    /// Rebuilds a [Table]. Cells are coerced back to their column type;
    /// uniqueness is trusted, as it was enforced when the rows were written.
    pub fn restore(self, name: &str, order: usize) -> Result<Table, StorageError> {
        let corrupt = |msg: String| StorageError::Corrupt(format!("table {name}: {msg}"));

        let mut table = Table::new(name, self.columns, order).map_err(|e| corrupt(e.to_string()))?;
        let id_column = table.schema().id_column().map(|c| c.name.clone());

        for (id, mut stored) in self.records {
            let mut row = Row::new();
            for col in table.schema().columns() {
                let key = stored.keys().find(|k| col.is_named(k)).cloned();
                let raw = key.and_then(|k| stored.remove(&k)).unwrap_or(Value::Null);
                let value = col
                    .data_type
                    .coerce(&col.name, raw)
                    .map_err(|e| corrupt(format!("record {id}: {e}")))?;
                row.insert(col.name.clone(), value);
            }
            if let Some(extra) = stored.keys().next() {
                return Err(corrupt(format!("record {id} has unknown column {extra}")));
            }
            if let Some(id_col) = &id_column {
                if row.get(id_col).and_then(Value::as_row_id) != Some(id) {
                    return Err(corrupt(format!("record {id} does not match its {id_col} column")));
                }
            }
            table
                .restore_row(id, row)
                .map_err(|_| corrupt(format!("duplicate record {id}")))?;
        }
        Ok(table)
    }
}

/// A database file on disk.
#[derive(Debug, Clone)]
pub struct Storage {
    path: PathBuf,
    pretty: bool,
    sync: bool,
}

impl Storage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pretty: true,
            sync: true,
        }
    }

    /// Storage for `config.path`, or `None` for an in-memory config.
    pub fn from_config(config: &Config) -> Option<Self> {
        config.path.as_ref().map(|path| Self {
            path: path.clone(),
            pretty: config.pretty,
            sync: config.sync_on_save,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file. A missing or blank file is an empty database.
    pub fn load(&self) -> Result<StoredDatabase, StorageError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("no database file at {}, starting empty", self.path.display());
                return Ok(StoredDatabase::default());
            }
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(StoredDatabase::default());
        }
        let stored: StoredDatabase = serde_json::from_str(&text)?;
        debug!(
            "loaded {} table(s) from {}",
            stored.tables.len(),
            self.path.display()
        );
        Ok(stored)
    }

    /// Atomically replaces the file with `db`.
    pub fn save(&self, db: &StoredDatabase) -> Result<(), StorageError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let tmp = self.temp_path();
        let written = self.write_file(&tmp, db);
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
            return written;
        }
        fs::rename(&tmp, &self.path)?;
        debug!("saved {} table(s) to {}", db.tables.len(), self.path.display());
        Ok(())
    }

    fn write_file(&self, path: &Path, db: &StoredDatabase) -> Result<(), StorageError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        if self.pretty {
            serde_json::to_writer_pretty(&mut writer, db)?;
        } else {
            serde_json::to_writer(&mut writer, db)?;
        }
        writer.flush()?;
        if self.sync {
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
