// Out-of-band control requests
// Delivered from outside the control context (signals, a second thread)

/// Requests drained by the engine between command dispatches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    /// Save to the current file path
    Save,
    /// Clean shutdown with an unattended save
    Terminate,
}
