use memmap::MmapMut;

use super::error::PinError;
use crate::pin_map::PinId;
use std::collections::HashSet;
use std::fs::File;
use std::ops::Deref;
use std::sync::Mutex;

/// Mapped GPIO register block together with the set of pins currently driven as outputs.
///
/// The device file handle lives here too so that the mapping and its descriptor are released together,
/// once the last pin referencing this memory is gone.
#[derive(Debug)]
pub struct Memory {
    map: MmapMut,
    _file_handle: File,
    leases: Mutex<HashSet<PinId>>,
}

impl Memory {
    pub fn new(map: MmapMut, file_handle: File) -> Self {
        Self {
            map,
            _file_handle: file_handle,
            leases: Mutex::new(HashSet::with_capacity(26)),
        }
    }

    pub fn lease(&self, pin_id: PinId) -> Result<(), PinError> {
        let mut leases = self.leases.lock().map_err(|_| PinError::LeaseMapPoisoned)?;

        if leases.insert(pin_id) {
            Ok(())
        } else {
            Err(PinError::AlreadyLeased(pin_id as u8))
        }
    }

    pub fn release(&self, pin_id: PinId) -> Result<(), PinError> {
        let mut leases = self.leases.lock().map_err(|_| PinError::LeaseMapPoisoned)?;
        leases.remove(&pin_id);
        Ok(())
    }
}

impl Deref for Memory {
    type Target = MmapMut;

    fn deref(&self) -> &Self::Target {
        &self.map
    }
}
