//! Per-target exclusive leases.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;

use crate::error_handling::SnapshotError;

/// Tracks which targets currently have a backup or restore running.
///
/// Acquisition never waits: a held key fails immediately with
/// `OperationInProgress`.
#[derive(Debug, Clone, Default)]
pub struct LeaseRegistry {
    held: Arc<Mutex<HashSet<String>>>,
}

/// Releases its key when dropped.
#[derive(Debug)]
pub struct LeaseGuard {
    key: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl LeaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lease for `key`.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::OperationInProgress` if the lease is already held.
    pub fn try_acquire(&self, key: &str) -> Result<LeaseGuard, SnapshotError> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(key.to_string()) {
            return Err(SnapshotError::OperationInProgress(key.to_string()));
        }
        debug!("Lease acquired for {key}");
        Ok(LeaseGuard {
            key: key.to_string(),
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
        debug!("Lease released for {}", self.key);
    }
}
