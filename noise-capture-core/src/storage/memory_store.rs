use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::models::error::StorageError;
use crate::models::measurement::Measurement;
use crate::traits::measurement_storage::MeasurementStorage;

/// Measurement storage kept in memory as serialized JSON documents.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    documents: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.lock().is_empty()
    }
}

impl MeasurementStorage for InMemoryStorage {
    fn save(&self, measurement: &Measurement) -> Result<(), StorageError> {
        let document = serde_json::to_vec(measurement).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.documents.lock().insert(measurement.uuid.clone(), document);
        Ok(())
    }

    fn load(&self, uuid: &str) -> Result<Measurement, StorageError> {
        let document = self.fetch_document_raw(uuid)?;
        serde_json::from_slice(&document).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn list(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.documents.lock().keys().cloned().collect())
    }

    fn delete(&self, uuid: &str) -> Result<(), StorageError> {
        self.documents
            .lock()
            .remove(uuid)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(uuid.to_string()))
    }

    fn fetch_document_raw(&self, uuid: &str) -> Result<Vec<u8>, StorageError> {
        self.documents
            .lock()
            .get(uuid)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(uuid.to_string()))
    }
}
