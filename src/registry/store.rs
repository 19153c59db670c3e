use crate::domain::{DeviceHash, DeviceId, DeviceRecord, Serial};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{instrument, trace};

#[async_trait]
pub trait DeviceStore: Debug + Send + Sync {
    async fn insert(&self, record: DeviceRecord) -> Result<DeviceRecord, StoreError>;

    async fn get(&self, id: &DeviceId) -> Result<Option<DeviceRecord>, StoreError>;

    async fn find_by_serial(&self, serial: &Serial) -> Result<Option<DeviceRecord>, StoreError>;

    async fn find_by_hash(&self, hash: &DeviceHash) -> Result<Option<DeviceRecord>, StoreError>;

    /// Replaces the stored record if its version still equals `record.version()` and returns the
    /// stored copy with the bumped version.
    async fn compare_and_swap(&self, record: DeviceRecord) -> Result<DeviceRecord, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;
}

#[derive(Error, Debug, PartialEq)]
pub enum StoreError {
    #[error("a device with serial '{0}' already exists")]
    DuplicateSerial(Serial),
    #[error("device '{0}' does not exist")]
    Missing(DeviceId),
    #[error("device '{id}' was modified concurrently, expected version {expected} but found {actual}")]
    VersionConflict { id: DeviceId, expected: u64, actual: u64 },
}

#[derive(Debug, Default)]
pub struct MemoryDeviceStore {
    devices: RwLock<HashMap<DeviceId, DeviceRecord>>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        MemoryDeviceStore::default()
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    #[instrument(skip_all, fields(device_id = %record.id))]
    async fn insert(&self, mut record: DeviceRecord) -> Result<DeviceRecord, StoreError> {
        let mut write_guard = self.devices.write().await;

        if write_guard.values().any(|existing| existing.serial == record.serial) {
            return Err(StoreError::DuplicateSerial(record.serial));
        }

        record.version = 1;
        write_guard.insert(record.id.clone(), record.clone());
        trace!("Inserted device record");
        Ok(record)
    }

    async fn get(&self, id: &DeviceId) -> Result<Option<DeviceRecord>, StoreError> {
        Ok(self.devices.read().await.get(id).cloned())
    }

    async fn find_by_serial(&self, serial: &Serial) -> Result<Option<DeviceRecord>, StoreError> {
        let read_guard = self.devices.read().await;
        Ok(read_guard.values().find(|record| &record.serial == serial).cloned())
    }

    async fn find_by_hash(&self, hash: &DeviceHash) -> Result<Option<DeviceRecord>, StoreError> {
        let read_guard = self.devices.read().await;
        Ok(read_guard.values().find(|record| &record.hash == hash).cloned())
    }

    #[instrument(skip_all, fields(device_id = %record.id, version = record.version))]
    async fn compare_and_swap(&self, mut record: DeviceRecord) -> Result<DeviceRecord, StoreError> {
        let mut write_guard = self.devices.write().await;

        let Some(stored) = write_guard.get_mut(&record.id) else {
            return Err(StoreError::Missing(record.id));
        };

        if stored.version != record.version {
            return Err(StoreError::VersionConflict {
                id: record.id,
                expected: record.version,
                actual: stored.version,
            });
        }

        record.version += 1;
        *stored = record.clone();
        trace!(new_version = record.version, "Swapped device record");
        Ok(record)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.devices.read().await.len())
    }
}
