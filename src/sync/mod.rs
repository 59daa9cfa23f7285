// Transport sync with an external timing authority

pub mod adapter;
pub mod authority;
pub mod status;

pub use adapter::{SyncAdapter, SyncState};
pub use authority::{
    ExternalPosition, LoopbackAuthority, LoopbackHandle, LoopbackRequest, SyncRole,
    TransportAuthority,
};
pub use status::{AtomicSyncStatus, SyncStatus};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("External transport unavailable: {0}")]
    Unavailable(String),

    #[error("Connection to the external transport was lost")]
    ConnectionLost,

    #[error("Transport sync is not connected")]
    NotConnected,
}
