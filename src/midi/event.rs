// MIDI types events

use crate::sequencer::timeline::Tick;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    ControlChange { controller: u8, value: u8 },
    PitchBend { value: i16 },
}

/// MIDI event placed inside a pattern
/// `tick` is relative to the pattern start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternEvent {
    pub tick: Tick,
    pub event: MidiEvent,
}

impl PatternEvent {
    pub fn new(tick: Tick, event: MidiEvent) -> Self {
        Self { tick, event }
    }
}

impl MidiEvent {
    /// Parse un RAW MIDI message
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 3 {
            return None;
        }

        let status = bytes[0];
        let message_type = status & 0xF0;

        match message_type {
            0x90 => {
                // Velocity 0 = Note Off
                if bytes[2] == 0 {
                    Some(MidiEvent::NoteOff { note: bytes[1] })
                } else {
                    Some(MidiEvent::NoteOn {
                        note: bytes[1],
                        velocity: bytes[2],
                    })
                }
            }
            0x80 => Some(MidiEvent::NoteOff { note: bytes[1] }),
            0xB0 => Some(MidiEvent::ControlChange {
                controller: bytes[1],
                value: bytes[2],
            }),
            0xE0 => {
                let lsb = bytes[1] as i16;
                let msb = bytes[2] as i16;
                Some(MidiEvent::PitchBend {
                    value: (msb << 7) | lsb,
                })
            }
            _ => None,
        }
    }

    /// Encode as a 3-byte channel message
    pub fn to_bytes(&self, channel: u8) -> [u8; 3] {
        let channel = channel & 0x0F;
        match *self {
            MidiEvent::NoteOn { note, velocity } => [0x90 | channel, note & 0x7F, velocity & 0x7F],
            MidiEvent::NoteOff { note } => [0x80 | channel, note & 0x7F, 0],
            MidiEvent::ControlChange { controller, value } => {
                [0xB0 | channel, controller & 0x7F, value & 0x7F]
            }
            MidiEvent::PitchBend { value } => {
                let value = value.clamp(0, 0x3FFF);
                [0xE0 | channel, (value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8]
            }
        }
    }

    /// Shift note numbers by `semitones`, clamped to the MIDI range
    /// Non-note events are returned unchanged
    pub fn transposed(&self, semitones: i8) -> Self {
        let shift = |note: u8| (note as i16 + semitones as i16).clamp(0, 127) as u8;
        match *self {
            MidiEvent::NoteOn { note, velocity } => MidiEvent::NoteOn {
                note: shift(note),
                velocity,
            },
            MidiEvent::NoteOff { note } => MidiEvent::NoteOff { note: shift(note) },
            other => other,
        }
    }

    pub fn is_note_on(&self) -> bool {
        matches!(self, MidiEvent::NoteOn { .. })
    }
}
