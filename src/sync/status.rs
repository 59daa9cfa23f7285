// Sync status - Connection state of the transport sync adapter

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Disconnected = 0,
    ConnectedMaster = 1,
    ConnectedSlave = 2,
}

impl SyncStatus {
    pub fn is_connected(&self) -> bool {
        *self != SyncStatus::Disconnected
    }
}

impl From<u8> for SyncStatus {
    fn from(value: u8) -> Self {
        match value {
            1 => SyncStatus::ConnectedMaster,
            2 => SyncStatus::ConnectedSlave,
            _ => SyncStatus::Disconnected,
        }
    }
}

/// Atomic wrapper to share the status between threads
#[derive(Debug, Clone, Default)]
pub struct AtomicSyncStatus {
    inner: Arc<AtomicU8>,
}

impl AtomicSyncStatus {
    pub fn new(status: SyncStatus) -> Self {
        Self {
            inner: Arc::new(AtomicU8::new(status as u8)),
        }
    }

    pub fn get(&self) -> SyncStatus {
        SyncStatus::from(self.inner.load(Ordering::Acquire))
    }

    pub fn set(&self, status: SyncStatus) {
        self.inner.store(status as u8, Ordering::Release);
    }
}
