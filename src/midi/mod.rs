// MIDI types and the file codec collaborator

pub mod codec;
pub mod event;

pub use codec::{BankOffset, CodecError, ExportSelector, MidiCodec, SmfCodec};
pub use event::{MidiEvent, PatternEvent};
