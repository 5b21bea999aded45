//! User preference blob: a small JSON document persisted atomically next to
//! the database. The backup archive carries this file verbatim.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::{db, AppError, AppResult};

#[derive(Debug, Clone)]
pub struct Preferences {
    path: PathBuf,
    values: Map<String, Value>,
}

impl Preferences {
    /// Load preferences from `path`; a missing file is an empty document.
    pub fn load(path: &Path) -> AppResult<Self> {
        let values = match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                AppError::from(err)
                    .with_context("operation", "parse_preferences")
                    .with_context("path", path.display().to_string())
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(err) => {
                return Err(AppError::from(err)
                    .with_context("operation", "read_preferences")
                    .with_context("path", path.display().to_string()));
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn save(&self) -> AppResult<()> {
        let payload =
            serde_json::to_vec_pretty(&self.values).map_err(AppError::from)?;
        db::write_atomic(&self.path, &payload).map_err(|err| {
            AppError::from(err)
                .with_context("operation", "write_preferences")
                .with_context("path", self.path.display().to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let prefs = Preferences::load(&dir.path().join("prefs.json")).unwrap();
        assert!(prefs.get("theme").is_none());
    }

    #[test]
    fn save_and_reload_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        let mut prefs = Preferences::load(&path).unwrap();
        prefs.set("theme", json!("dark"));
        prefs.set("grid_columns", json!(5));
        prefs.save().unwrap();

        let reloaded = Preferences::load(&path).unwrap();
        assert_eq!(reloaded.get("theme"), Some(&json!("dark")));
        assert_eq!(reloaded.get("grid_columns"), Some(&json!(5)));
    }
}
