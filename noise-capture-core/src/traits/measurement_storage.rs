use crate::models::error::StorageError;
use crate::models::measurement::Measurement;

/// Persistence collaborator receiving finalized measurements.
pub trait MeasurementStorage: Send + Sync {
    fn save(&self, measurement: &Measurement) -> Result<(), StorageError>;

    fn load(&self, uuid: &str) -> Result<Measurement, StorageError>;

    /// Identifiers of every stored measurement, sorted.
    fn list(&self) -> Result<Vec<String>, StorageError>;

    fn delete(&self, uuid: &str) -> Result<(), StorageError>;

    /// Serialized document as stored, for transfer without re-parsing.
    fn fetch_document_raw(&self, uuid: &str) -> Result<Vec<u8>, StorageError>;
}
