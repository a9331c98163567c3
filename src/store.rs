//! Device store collaborator seam.
//!
//! The core refreshes a record through [`DeviceStore::add_or_update`] after
//! every successful discovery or operation; what the records are persisted
//! to (JSON files, a database, nothing) is the shell's concern.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::device::DeviceRecord;

/// Persistent record store, keyed by device serial number.
pub trait DeviceStore: Send + Sync {
    /// Insert or refresh a record.
    fn add_or_update(&self, record: &DeviceRecord);
    fn get(&self, serial_number: u32) -> Option<DeviceRecord>;
    fn list(&self) -> Vec<DeviceRecord>;
    fn remove(&self, serial_number: u32) -> Option<DeviceRecord>;
}

/// In-memory store, suitable for tests and short-lived tools.
#[derive(Debug, Default)]
pub struct MemoryStore {
    devices: Mutex<BTreeMap<u32, DeviceRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceStore for MemoryStore {
    fn add_or_update(&self, record: &DeviceRecord) {
        let mut devices = self.devices.lock().unwrap();
        devices.insert(record.serial_number, record.clone());
    }

    fn get(&self, serial_number: u32) -> Option<DeviceRecord> {
        self.devices.lock().unwrap().get(&serial_number).cloned()
    }

    fn list(&self) -> Vec<DeviceRecord> {
        self.devices.lock().unwrap().values().cloned().collect()
    }

    fn remove(&self, serial_number: u32) -> Option<DeviceRecord> {
        self.devices.lock().unwrap().remove(&serial_number)
    }
}
