// SyncAdapter - Reconciles the local transport with an external authority
//
// Disconnected -> enable() -> ConnectedMaster | ConnectedSlave -> disable()
// A failed query or publish drops back to Disconnected; the transport keeps
// its current tick and free-runs from there.

use super::SyncError;
use super::authority::{ExternalPosition, SyncRole, TransportAuthority};
use super::status::{AtomicSyncStatus, SyncStatus};
use crate::sequencer::timeline::Tick;

/// Snapshot of the adapter for display and tests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncState {
    pub status: SyncStatus,
    pub external_position: f64,
    pub is_connected: bool,
}

pub struct SyncAdapter {
    authority: Box<dyn TransportAuthority>,
    status: AtomicSyncStatus,
    external_position: f64,
}

impl SyncAdapter {
    pub fn new(authority: Box<dyn TransportAuthority>) -> Self {
        Self {
            authority,
            status: AtomicSyncStatus::default(),
            external_position: 0.0,
        }
    }

    /// Cloneable, lock-free view of the connection status
    pub fn shared_status(&self) -> AtomicSyncStatus {
        self.status.clone()
    }

    pub fn status(&self) -> SyncStatus {
        self.status.get()
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    pub fn is_master(&self) -> bool {
        self.status() == SyncStatus::ConnectedMaster
    }

    pub fn is_slave(&self) -> bool {
        self.status() == SyncStatus::ConnectedSlave
    }

    pub fn state(&self) -> SyncState {
        let status = self.status();
        SyncState {
            status,
            external_position: self.external_position,
            is_connected: status.is_connected(),
        }
    }

    /// Connect to the authority; the granted role may differ from the
    /// preference. Reconnecting while connected renegotiates.
    pub fn enable(&mut self, prefer_master: bool) -> Result<SyncStatus, SyncError> {
        if self.is_connected() {
            self.authority.disconnect();
        }
        match self.authority.connect(prefer_master) {
            Ok(role) => {
                let status = match role {
                    SyncRole::Master => SyncStatus::ConnectedMaster,
                    SyncRole::Slave => SyncStatus::ConnectedSlave,
                };
                self.status.set(status);
                log::info!("Transport sync connected as {:?}", role);
                Ok(status)
            }
            Err(e) => {
                self.status.set(SyncStatus::Disconnected);
                log::warn!("Transport sync unavailable: {}", e);
                Err(e)
            }
        }
    }

    pub fn disable(&mut self) {
        if self.is_connected() {
            self.authority.disconnect();
            log::info!("Transport sync disconnected");
        }
        self.status.set(SyncStatus::Disconnected);
    }

    fn degrade(&mut self, error: &SyncError) {
        log::warn!("Transport sync lost ({}), free-running", error);
        self.authority.disconnect();
        self.status.set(SyncStatus::Disconnected);
    }

    /// Read the external position (slave role only)
    ///
    /// Returns None when not a slave or when the connection just failed.
    pub fn poll(&mut self) -> Option<ExternalPosition> {
        if !self.is_slave() {
            return None;
        }
        match self.authority.query() {
            Ok(position) => {
                self.external_position = position.tick;
                Some(position)
            }
            Err(e) => {
                self.degrade(&e);
                None
            }
        }
    }

    /// Publish the local position (master role only)
    pub fn publish(&mut self, tick: f64, running: bool) {
        if !self.is_master() {
            return;
        }
        let position = ExternalPosition { tick, running };
        match self.authority.publish(position) {
            Ok(()) => self.external_position = tick,
            Err(e) => self.degrade(&e),
        }
    }

    pub fn request_start(&mut self) -> Result<(), SyncError> {
        self.ensure_connected()?;
        let result = self.authority.request_start();
        self.settle(result)
    }

    pub fn request_stop(&mut self) -> Result<(), SyncError> {
        self.ensure_connected()?;
        let result = self.authority.request_stop();
        self.settle(result)
    }

    pub fn request_locate(&mut self, tick: Tick) -> Result<(), SyncError> {
        self.ensure_connected()?;
        let result = self.authority.request_locate(tick);
        self.settle(result)
    }

    fn ensure_connected(&self) -> Result<(), SyncError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SyncError::NotConnected)
        }
    }

    fn settle(&mut self, result: Result<(), SyncError>) -> Result<(), SyncError> {
        if let Err(e) = &result {
            self.degrade(e);
        }
        result
    }
}

impl std::fmt::Debug for SyncAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncAdapter")
            .field("status", &self.status())
            .field("external_position", &self.external_position)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::authority::LoopbackAuthority;

    fn adapter() -> (SyncAdapter, crate::sync::LoopbackHandle) {
        let (authority, handle) = LoopbackAuthority::new();
        (SyncAdapter::new(Box::new(authority)), handle)
    }

    #[test]
    fn test_enable_disable() {
        let (mut adapter, handle) = adapter();
        assert_eq!(adapter.status(), SyncStatus::Disconnected);

        assert_eq!(adapter.enable(true), Ok(SyncStatus::ConnectedMaster));
        adapter.disable();
        assert_eq!(adapter.status(), SyncStatus::Disconnected);

        handle.set_external_master(true);
        assert_eq!(adapter.enable(true), Ok(SyncStatus::ConnectedSlave));
    }

    #[test]
    fn test_enable_failure_stays_disconnected() {
        let (mut adapter, handle) = adapter();
        handle.set_available(false);
        assert!(adapter.enable(false).is_err());
        assert!(!adapter.state().is_connected);
    }

    #[test]
    fn test_slave_poll_and_degrade() {
        let (mut adapter, handle) = adapter();
        adapter.enable(false).unwrap();
        handle.report(960.0, true);

        let position = adapter.poll().unwrap();
        assert_eq!(position.tick, 960.0);
        assert_eq!(adapter.state().external_position, 960.0);

        handle.drop_connection();
        assert!(adapter.poll().is_none());
        assert_eq!(adapter.status(), SyncStatus::Disconnected);
    }

    #[test]
    fn test_master_publishes() {
        let (mut adapter, handle) = adapter();
        adapter.enable(true).unwrap();
        assert!(adapter.poll().is_none());

        adapter.publish(384.0, true);
        assert_eq!(
            handle.published(),
            Some(ExternalPosition {
                tick: 384.0,
                running: true
            })
        );
    }

    #[test]
    fn test_requests_need_connection() {
        let (mut adapter, _handle) = adapter();
        assert_eq!(adapter.request_start(), Err(SyncError::NotConnected));
        adapter.enable(false).unwrap();
        assert!(adapter.request_locate(100).is_ok());
    }
}
