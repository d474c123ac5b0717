use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::models::error::StorageError;
use crate::models::measurement::Measurement;
use crate::traits::measurement_storage::MeasurementStorage;

/// Stores each measurement as `{uuid}.json` in a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    directory: PathBuf,
}

impl JsonFileStorage {
    /// Opens `directory`, creating it if needed.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let directory = directory.into();
        fs::create_dir_all(&directory)
            .map_err(|e| StorageError::Io(format!("failed to create {}: {e}", directory.display())))?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn document_path(&self, uuid: &str) -> Result<PathBuf, StorageError> {
        let valid = !uuid.is_empty() && uuid.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(StorageError::NotFound(uuid.to_string()));
        }
        Ok(self.directory.join(format!("{uuid}.json")))
    }
}

fn io_error(uuid: &str, e: std::io::Error) -> StorageError {
    match e.kind() {
        ErrorKind::NotFound => StorageError::NotFound(uuid.to_string()),
        _ => StorageError::Io(e.to_string()),
    }
}

impl MeasurementStorage for JsonFileStorage {
    fn save(&self, measurement: &Measurement) -> Result<(), StorageError> {
        let path = self.document_path(&measurement.uuid)?;
        let json =
            serde_json::to_vec_pretty(measurement).map_err(|e| StorageError::Serialization(e.to_string()))?;

        // Write next to the target and rename, so readers never see half a document.
        let partial = path.with_extension("json.partial");
        fs::write(&partial, json).map_err(|e| StorageError::Io(format!("failed to write measurement: {e}")))?;
        fs::rename(&partial, &path).map_err(|e| StorageError::Io(format!("failed to store measurement: {e}")))?;
        log::debug!("measurement {} written to {}", measurement.uuid, path.display());
        Ok(())
    }

    fn load(&self, uuid: &str) -> Result<Measurement, StorageError> {
        let document = self.fetch_document_raw(uuid)?;
        serde_json::from_slice(&document)
            .map_err(|e| StorageError::Serialization(format!("failed to parse measurement {uuid}: {e}")))
    }

    fn list(&self) -> Result<Vec<String>, StorageError> {
        let entries = fs::read_dir(&self.directory).map_err(|e| StorageError::Io(e.to_string()))?;
        let mut uuids = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StorageError::Io(e.to_string()))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    uuids.push(stem.to_string());
                }
            }
        }
        uuids.sort();
        Ok(uuids)
    }

    fn delete(&self, uuid: &str) -> Result<(), StorageError> {
        let path = self.document_path(uuid)?;
        fs::remove_file(path).map_err(|e| io_error(uuid, e))
    }

    fn fetch_document_raw(&self, uuid: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.document_path(uuid)?;
        fs::read(path).map_err(|e| io_error(uuid, e))
    }
}
