//! Append-only JSON record store.
//!
//! Records are kept as a single pretty-printed JSON array. Appending reads
//! the existing array, extends it and replaces the file through a sibling
//! temp file, so an interrupted write never truncates earlier results.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::ops::OpsError;

#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw records currently on disk. A missing file is empty; a file that
    /// does not hold a JSON array is treated as empty with a warning.
    fn existing(&self) -> Result<Vec<Value>, OpsError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Vec<Value>>(&content) {
            Ok(records) => Ok(records),
            Err(e) => {
                tracing::warn!(
                    "Store {} is not a JSON array ({}), starting a new one",
                    self.path.display(),
                    e
                );
                Ok(Vec::new())
            }
        }
    }

    /// Append `records`, returning the total number now stored.
    pub fn append<T: Serialize>(&self, records: &[T]) -> Result<usize, OpsError> {
        let mut all = self.existing()?;
        for record in records {
            all.push(serde_json::to_value(record)?);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&all)?)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::debug!("Appended {} records to {}", records.len(), self.path.display());
        Ok(all.len())
    }

    /// Every stored record
    pub fn load<T: DeserializeOwned>(&self) -> Result<Vec<T>, OpsError> {
        self.existing()?
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(OpsError::from))
            .collect()
    }

    pub fn len(&self) -> Result<usize, OpsError> {
        Ok(self.existing()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, OpsError> {
        Ok(self.len()? == 0)
    }
}
