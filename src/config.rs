use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::index::{DEFAULT_ORDER, MIN_ORDER};

/// Settings for opening a [Database](crate::Database).
///
/// Every field has a default, so a config file only needs the keys it
/// changes:
///
/// ```json
/// { "path": "data/app.json", "index_order": 16 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backing file. `None` keeps everything in memory.
    pub path: Option<PathBuf>,
    /// Maximum number of keys per B+ tree node.
    pub index_order: usize,
    /// Pretty-print the JSON file.
    pub pretty: bool,
    /// `fsync` the file before it replaces the previous one.
    pub sync_on_save: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: None,
            index_order: DEFAULT_ORDER,
            pretty: true,
            sync_on_save: true,
        }
    }
}

impl Config {
    /// Default settings persisting to `path`.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Reads a JSON config file and validates it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("invalid config {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn index_order(mut self, order: usize) -> Self {
        self.index_order = order;
        self
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn sync_on_save(mut self, sync: bool) -> Self {
        self.sync_on_save = sync;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.index_order < MIN_ORDER {
            return Err(Error::Config(format!(
                "index_order must be at least {MIN_ORDER}, got {}",
                self.index_order
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.path, None);
        assert_eq!(config.index_order, DEFAULT_ORDER);
        assert!(config.pretty && config.sync_on_save);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = Config::with_path("db.json")
            .index_order(4)
            .pretty(false)
            .sync_on_save(false);
        assert_eq!(config.path, Some(PathBuf::from("db.json")));
        assert_eq!(config.index_order, 4);
        assert!(!config.pretty && !config.sync_on_save);
    }

    #[test]
    fn test_small_order_rejected() {
        let err = Config::default().index_order(2).validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"path": "data.json", "index_order": 8}}"#).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.path, Some(PathBuf::from("data.json")));
        assert_eq!(config.index_order, 8);
        assert!(config.pretty);
    }

    #[test]
    fn test_from_file_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"index_order": 1}}"#).unwrap();
        assert!(matches!(Config::from_file(file.path()), Err(Error::Config(_))));

        assert!(matches!(
            Config::from_file("/definitely/not/here.json"),
            Err(Error::Config(_))
        ));
    }
}
