//! Persistent target store
//!
//! One TOML file holding a single multi-valued field: the saved target
//! selection. A missing file means an empty selection; there is no schema
//! versioning.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::types::{Selection, TargetId};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    saved: Vec<String>,
}

/// Persists and retrieves the selected target set
#[derive(Debug, Clone)]
pub struct TargetStore {
    path: PathBuf,
}

impl TargetStore {
    /// Create a store backed by the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted selection. A missing file is an empty selection.
    pub fn load(&self) -> Result<Selection, StoreError> {
        if !self.path.exists() {
            return Ok(Selection::new());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| StoreError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        let file: StoreFile = toml::from_str(&content)?;

        Ok(file.saved.into_iter().map(TargetId::from).collect())
    }

    /// Persist the selection, replacing any previous contents
    pub fn save(&self, selection: &Selection) -> Result<(), StoreError> {
        let file = StoreFile {
            saved: selection.iter().map(|t| t.as_str().to_string()).collect(),
        };
        let content = toml::to_string_pretty(&file)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                path: self.path.clone(),
                source: e,
            })?;
        }
        std::fs::write(&self.path, content).map_err(|e| StoreError::Io {
            path: self.path.clone(),
            source: e,
        })?;

        Ok(())
    }
}
