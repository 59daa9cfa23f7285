// MIDI file codec - Standard MIDI File import/export for the arrangement
// The engine only sees the MidiCodec trait; SmfCodec is the stock implementation

use crate::midi::event::{MidiEvent, PatternEvent};
use crate::sequencer::arrangement::Arrangement;
use crate::sequencer::pattern::{Pattern, PatternId};
use crate::sequencer::tempo::TempoTrack;
use crate::sequencer::timeline::{PPQN, Tick};
use crate::sequencer::track::Track;
use crate::sequencer::transport::PlayMode;
use midly::num::{u4, u7, u14, u15, u24, u28};
use midly::{
    Format, Header, MetaMessage, MidiMessage, PitchBend, Smf, Timing, TrackEvent, TrackEventKind,
};
use std::path::Path;

/// Number of pattern banks a song can hold
pub const MAX_BANKS: i32 = 32;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid MIDI file: {0}")]
    Parse(String),

    #[error("Bank offset {0} is outside -1..={max}", max = MAX_BANKS - 1)]
    InvalidBank(i32),

    #[error("Nothing matches the export selection")]
    EmptySelection,

    #[error("MIDI file contains no usable tracks")]
    NothingToImport,
}

/// What an export covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportSelector {
    All,
    Track(usize),
    Pattern { track: usize, pattern: PatternId },
    /// The trigger sounding at `tick` on `track`
    Trigger { track: usize, tick: Tick },
}

/// Pattern bank an import lands in
///
/// `-1` appends a new bank after the highest one in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankOffset(i32);

impl BankOffset {
    pub const APPEND: BankOffset = BankOffset(-1);

    pub fn new(value: i32) -> Result<Self, CodecError> {
        if (-1..MAX_BANKS).contains(&value) {
            Ok(Self(value))
        } else {
            Err(CodecError::InvalidBank(value))
        }
    }

    pub fn value(&self) -> i32 {
        self.0
    }

    /// Concrete bank for `arrangement`, capped at the last bank
    pub fn resolve(&self, arrangement: &Arrangement) -> u8 {
        let bank = if self.0 < 0 {
            arrangement.highest_bank().map_or(0, |b| b as i32 + 1)
        } else {
            self.0
        };
        bank.min(MAX_BANKS - 1) as u8
    }
}

/// Read/write service for MIDI files
pub trait MidiCodec: Send {
    /// Export pattern contents, ignoring the arrangement
    fn write_patterns(
        &self,
        path: &Path,
        arrangement: &Arrangement,
        selector: ExportSelector,
    ) -> Result<(), CodecError>;

    /// Export the arrangement rendered into one timeline
    fn write_song(
        &self,
        path: &Path,
        arrangement: &Arrangement,
        tempo: &TempoTrack,
        selector: ExportSelector,
    ) -> Result<(), CodecError>;

    /// Merge a MIDI file into the arrangement; returns the number of tracks added
    fn parse(
        &self,
        path: &Path,
        arrangement: &mut Arrangement,
        tempo: &mut TempoTrack,
        bank: BankOffset,
    ) -> Result<usize, CodecError>;
}

/// Standard MIDI File codec (format 1, PPQN resolution)
#[derive(Debug, Default, Clone, Copy)]
pub struct SmfCodec;

impl SmfCodec {
    pub fn new() -> Self {
        Self
    }
}

impl MidiCodec for SmfCodec {
    fn write_patterns(
        &self,
        path: &Path,
        arrangement: &Arrangement,
        selector: ExportSelector,
    ) -> Result<(), CodecError> {
        let mut smf = new_smf();
        for (index, track) in arrangement.tracks().iter().enumerate() {
            for pattern in track.patterns() {
                if !pattern_selected(selector, index, track, pattern) {
                    continue;
                }
                let events: Vec<(Tick, MidiEvent)> =
                    pattern.events().iter().map(|e| (e.tick, e.event)).collect();
                smf.tracks
                    .push(encode_track(&pattern.name, track.channel, &events, pattern.length()));
            }
        }
        if smf.tracks.is_empty() {
            return Err(CodecError::EmptySelection);
        }
        smf.save(path)?;
        log::info!("Exported {} patterns to {}", smf.tracks.len(), path.display());
        Ok(())
    }

    fn write_song(
        &self,
        path: &Path,
        arrangement: &Arrangement,
        tempo: &TempoTrack,
        selector: ExportSelector,
    ) -> Result<(), CodecError> {
        let mut smf = new_smf();
        smf.tracks.push(encode_tempo_map(tempo));

        let end = arrangement.song_end();
        let mut rendered = Vec::new();
        arrangement.collect_events(0, end, PlayMode::Song, 0, &mut rendered);

        for (index, track) in arrangement.tracks().iter().enumerate() {
            // Pattern selections have no place on the song timeline
            let span = match selector {
                ExportSelector::All => Some((0, end)),
                ExportSelector::Track(t) if t == index => Some((0, end)),
                ExportSelector::Trigger { track: t, tick } if t == index => {
                    track.sounding_trigger(tick).map(|tr| (tr.start, tr.end))
                }
                _ => None,
            };
            let Some((from, to)) = span else {
                continue;
            };
            let events: Vec<(Tick, MidiEvent)> = rendered
                .iter()
                .filter(|e| e.track == index && (from..to).contains(&e.tick))
                .map(|e| (e.tick - from, e.event))
                .collect();
            smf.tracks
                .push(encode_track(&track.name, track.channel, &events, to - from));
        }

        if smf.tracks.len() == 1 {
            return Err(CodecError::EmptySelection);
        }
        smf.save(path)?;
        log::info!("Exported song to {}", path.display());
        Ok(())
    }

    fn parse(
        &self,
        path: &Path,
        arrangement: &mut Arrangement,
        tempo: &mut TempoTrack,
        bank: BankOffset,
    ) -> Result<usize, CodecError> {
        let bytes = std::fs::read(path)?;
        let smf = Smf::parse(&bytes).map_err(|e| CodecError::Parse(e.to_string()))?;
        let resolution = match smf.header.timing {
            Timing::Metrical(ticks) => ticks.as_int().max(1) as Tick,
            Timing::Timecode(..) => {
                return Err(CodecError::Parse("SMPTE timing is not supported".to_string()));
            }
        };
        let scale = |tick: Tick| tick * PPQN / resolution;
        let bank = bank.resolve(arrangement);

        let mut imported = Vec::new();
        for (number, events) in smf.tracks.iter().enumerate() {
            let mut name = None;
            let mut channel = None;
            let mut absolute: Tick = 0;
            let mut pattern_events = Vec::new();

            for event in events {
                absolute += event.delta.as_int() as Tick;
                match event.kind {
                    TrackEventKind::Meta(MetaMessage::TrackName(raw)) => {
                        name = Some(String::from_utf8_lossy(raw).into_owned());
                    }
                    TrackEventKind::Meta(MetaMessage::Tempo(micros)) => {
                        let micros = micros.as_int().max(1) as f64;
                        tempo.insert_marker(scale(absolute), 60_000_000.0 / micros);
                    }
                    TrackEventKind::Midi {
                        channel: ch,
                        message,
                    } => {
                        if let Some(decoded) = decode_message(message) {
                            channel.get_or_insert(ch.as_int());
                            pattern_events.push(PatternEvent::new(scale(absolute), decoded));
                        }
                    }
                    _ => {}
                }
            }

            if pattern_events.is_empty() {
                continue;
            }
            let bar = PPQN * 4;
            let length = (scale(absolute) / bar + 1) * bar;
            let mut pattern = Pattern::new(
                0,
                name.clone().unwrap_or_else(|| format!("Import {}", number)),
                length,
            );
            pattern.bank = bank;
            for event in pattern_events {
                pattern.add_event(event);
            }

            let mut track = Track::new(name.unwrap_or_else(|| format!("Track {}", number)));
            track.channel = channel.unwrap_or(0);
            let id = track.insert_pattern(pattern);
            imported.push((track, id, length));
        }

        if imported.is_empty() {
            return Err(CodecError::NothingToImport);
        }
        let count = imported.len();
        for (track, pattern, length) in imported {
            let index = arrangement.add_track(track);
            arrangement.add_trigger(index, pattern, 0, length);
        }
        log::info!("Imported {} tracks from {} into bank {}", count, path.display(), bank);
        Ok(count)
    }
}

fn new_smf<'a>() -> Smf<'a> {
    Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(PPQN as u16)),
    ))
}

fn pattern_selected(selector: ExportSelector, index: usize, track: &Track, pattern: &Pattern) -> bool {
    match selector {
        ExportSelector::All => true,
        ExportSelector::Track(t) => t == index,
        ExportSelector::Pattern { track: t, pattern: p } => t == index && p == pattern.id,
        ExportSelector::Trigger { track: t, tick } => {
            t == index && track.sounding_trigger(tick).map(|tr| tr.pattern) == Some(pattern.id)
        }
    }
}

fn encode_tempo_map<'a>(tempo: &TempoTrack) -> Vec<TrackEvent<'a>> {
    let mut events = Vec::with_capacity(tempo.markers().len() + 1);
    let mut last: Tick = 0;
    for marker in tempo.markers() {
        let micros = (60_000_000.0 / marker.bpm).round() as u32;
        events.push(TrackEvent {
            delta: u28::new((marker.tick - last) as u32),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(micros))),
        });
        last = marker.tick;
    }
    events.push(end_of_track(0));
    events
}

fn encode_track<'a>(
    name: &'a str,
    channel: u8,
    events: &[(Tick, MidiEvent)],
    length: Tick,
) -> Vec<TrackEvent<'a>> {
    let mut sorted = events.to_vec();
    sorted.sort_by_key(|(tick, _)| *tick);

    let mut out = Vec::with_capacity(sorted.len() + 2);
    out.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())),
    });

    let channel = u4::new(channel & 0x0F);
    let mut last: Tick = 0;
    for (tick, event) in sorted {
        out.push(TrackEvent {
            delta: u28::new((tick - last) as u32),
            kind: TrackEventKind::Midi {
                channel,
                message: encode_message(event),
            },
        });
        last = tick;
    }
    out.push(end_of_track(length.saturating_sub(last)));
    out
}

fn end_of_track<'a>(delta: Tick) -> TrackEvent<'a> {
    TrackEvent {
        delta: u28::new(delta as u32),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    }
}

fn encode_message(event: MidiEvent) -> MidiMessage {
    match event {
        MidiEvent::NoteOn { note, velocity } => MidiMessage::NoteOn {
            key: u7::new(note & 0x7F),
            vel: u7::new(velocity & 0x7F),
        },
        MidiEvent::NoteOff { note } => MidiMessage::NoteOff {
            key: u7::new(note & 0x7F),
            vel: u7::new(0),
        },
        MidiEvent::ControlChange { controller, value } => MidiMessage::Controller {
            controller: u7::new(controller & 0x7F),
            value: u7::new(value & 0x7F),
        },
        MidiEvent::PitchBend { value } => MidiMessage::PitchBend {
            bend: PitchBend(u14::new(value.clamp(0, 0x3FFF) as u16)),
        },
    }
}

fn decode_message(message: MidiMessage) -> Option<MidiEvent> {
    match message {
        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => Some(MidiEvent::NoteOn {
            note: key.as_int(),
            velocity: vel.as_int(),
        }),
        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
            Some(MidiEvent::NoteOff { note: key.as_int() })
        }
        MidiMessage::Controller { controller, value } => Some(MidiEvent::ControlChange {
            controller: controller.as_int(),
            value: value.as_int(),
        }),
        MidiMessage::PitchBend { bend } => Some(MidiEvent::PitchBend {
            value: bend.0.as_int() as i16,
        }),
        _ => None,
    }
}
