// Transport authority - The external timing master the adapter talks to
// LoopbackAuthority is an in-process stand-in with a scriptable handle

use super::SyncError;
use crate::sequencer::timeline::{Tempo, Tick};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Position as reported by the external transport
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExternalPosition {
    /// Fractional tick position
    pub tick: f64,
    pub running: bool,
}

/// Outcome of role negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRole {
    Master,
    Slave,
}

/// External transport authority
///
/// Implementations wrap whatever sync protocol is available. Requests are
/// advisory: the authority applies them and the change becomes visible
/// through the next `query`.
pub trait TransportAuthority: Send {
    /// Connect, asking for the master role if `prefer_master`
    fn connect(&mut self, prefer_master: bool) -> Result<SyncRole, SyncError>;

    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    fn request_start(&mut self) -> Result<(), SyncError>;

    fn request_stop(&mut self) -> Result<(), SyncError>;

    fn request_locate(&mut self, tick: Tick) -> Result<(), SyncError>;

    /// Current external position and running state
    fn query(&mut self) -> Result<ExternalPosition, SyncError>;

    /// Publish the local position (master role)
    fn publish(&mut self, position: ExternalPosition) -> Result<(), SyncError>;
}

/// A request seen by the loopback authority
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoopbackRequest {
    Start,
    Stop,
    Locate(Tick),
}

#[derive(Debug)]
struct LoopbackState {
    available: bool,
    external_master: bool,
    connected: bool,
    auto_ack: bool,
    position: ExternalPosition,
    pending: Vec<LoopbackRequest>,
    published: Option<ExternalPosition>,
    free_running: Option<(Tempo, Instant)>,
}

impl LoopbackState {
    fn apply(&mut self, request: LoopbackRequest) {
        match request {
            LoopbackRequest::Start => self.position.running = true,
            LoopbackRequest::Stop => self.position.running = false,
            LoopbackRequest::Locate(tick) => self.position.tick = tick as f64,
        }
    }

    fn request(&mut self, request: LoopbackRequest) -> Result<(), SyncError> {
        if !self.connected {
            return Err(SyncError::NotConnected);
        }
        if self.auto_ack {
            self.apply(request);
        } else {
            self.pending.push(request);
        }
        Ok(())
    }

    fn tick_clock(&mut self) {
        if let Some((tempo, last)) = &mut self.free_running {
            let now = Instant::now();
            if self.position.running {
                self.position.tick += tempo.ticks_in(now.duration_since(*last));
            }
            *last = now;
        }
    }
}

fn lock(state: &Mutex<LoopbackState>) -> MutexGuard<'_, LoopbackState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process transport authority
#[derive(Debug)]
pub struct LoopbackAuthority {
    state: Arc<Mutex<LoopbackState>>,
}

/// Scripting side of a [`LoopbackAuthority`]
#[derive(Debug, Clone)]
pub struct LoopbackHandle {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackAuthority {
    /// Available, no other master, requests acknowledged immediately
    pub fn new() -> (Self, LoopbackHandle) {
        let state = Arc::new(Mutex::new(LoopbackState {
            available: true,
            external_master: false,
            connected: false,
            auto_ack: true,
            position: ExternalPosition::default(),
            pending: Vec::new(),
            published: None,
            free_running: None,
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            LoopbackHandle { state },
        )
    }
}

impl TransportAuthority for LoopbackAuthority {
    fn connect(&mut self, prefer_master: bool) -> Result<SyncRole, SyncError> {
        let mut state = lock(&self.state);
        if !state.available {
            return Err(SyncError::Unavailable("loopback transport offline".into()));
        }
        state.connected = true;
        if prefer_master && !state.external_master {
            Ok(SyncRole::Master)
        } else {
            Ok(SyncRole::Slave)
        }
    }

    fn disconnect(&mut self) {
        let mut state = lock(&self.state);
        state.connected = false;
        state.pending.clear();
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    fn request_start(&mut self) -> Result<(), SyncError> {
        lock(&self.state).request(LoopbackRequest::Start)
    }

    fn request_stop(&mut self) -> Result<(), SyncError> {
        lock(&self.state).request(LoopbackRequest::Stop)
    }

    fn request_locate(&mut self, tick: Tick) -> Result<(), SyncError> {
        lock(&self.state).request(LoopbackRequest::Locate(tick))
    }

    fn query(&mut self) -> Result<ExternalPosition, SyncError> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(SyncError::ConnectionLost);
        }
        state.tick_clock();
        Ok(state.position)
    }

    fn publish(&mut self, position: ExternalPosition) -> Result<(), SyncError> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(SyncError::ConnectionLost);
        }
        state.published = Some(position);
        state.position = position;
        Ok(())
    }
}

impl LoopbackHandle {
    /// Make the next `connect` fail (or succeed again)
    pub fn set_available(&self, available: bool) {
        lock(&self.state).available = available;
    }

    /// Pretend another application already holds the master role
    pub fn set_external_master(&self, present: bool) {
        lock(&self.state).external_master = present;
    }

    /// Queue requests until `acknowledge` instead of applying them
    pub fn set_auto_ack(&self, auto_ack: bool) {
        lock(&self.state).auto_ack = auto_ack;
    }

    /// Advance the reported position on its own while running
    pub fn set_free_running(&self, bpm: Option<f64>) {
        lock(&self.state).free_running = bpm.map(|bpm| (Tempo::clamped(bpm), Instant::now()));
    }

    /// Script the externally reported position
    pub fn report(&self, tick: f64, running: bool) {
        lock(&self.state).position = ExternalPosition { tick, running };
    }

    /// Apply every queued request, returning them
    pub fn acknowledge(&self) -> Vec<LoopbackRequest> {
        let mut state = lock(&self.state);
        let pending = std::mem::take(&mut state.pending);
        for request in &pending {
            state.apply(*request);
        }
        pending
    }

    pub fn pending(&self) -> Vec<LoopbackRequest> {
        lock(&self.state).pending.clone()
    }

    /// Last position published by a master
    pub fn published(&self) -> Option<ExternalPosition> {
        lock(&self.state).published
    }

    pub fn position(&self) -> ExternalPosition {
        lock(&self.state).position
    }

    /// Simulate the external transport going away
    pub fn drop_connection(&self) {
        let mut state = lock(&self.state);
        state.connected = false;
        state.available = false;
    }
}
