// Sequencer module
// Timeline, transport, tempo track and the trigger arrangement

pub mod arrangement;
pub mod pattern;
pub mod tempo;
pub mod timeline;
pub mod track;
pub mod transport;
pub mod trigger;

pub use arrangement::{Arrangement, MuteOp, ScheduledEvent, Sounding};
pub use pattern::{Pattern, PatternId};
pub use tempo::{TempoMarker, TempoTrack};
pub use timeline::{MusicalTime, PPQN, Tempo, Tick, TimeSignature};
pub use track::Track;
pub use transport::{PlayMode, SeekDirection, Transport, TransportSettings, TransportState};
pub use trigger::{Trigger, TriggerSerial};
