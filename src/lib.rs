// perfseq - Library exports for the binary, tests and benchmarks

pub mod command;
pub mod config;
pub mod engine;
pub mod messaging;
pub mod midi;
pub mod project;
pub mod sequencer;
pub mod setlist;
pub mod sync;

// Re-export commonly used types for convenience
pub use command::{UndoKind, UndoRecord, UndoStack};
pub use config::EngineConfig;
pub use engine::driver::{Driver, Scheduler};
pub use engine::{Engine, EngineError, PollOutcome};
pub use messaging::{ControlRequest, EngineEvent, Notification};
pub use midi::{ExportSelector, MidiCodec, SmfCodec};
pub use project::{Project, ProjectManager};
pub use sequencer::{
    Arrangement, MusicalTime, PPQN, PlayMode, TempoTrack, Tick, TimeSignature, Transport,
    TransportState,
};
pub use setlist::{JumpOutcome, SetlistSequencer};
pub use sync::{LoopbackAuthority, SyncAdapter, SyncStatus, TransportAuthority};
