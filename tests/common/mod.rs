// Shared fixtures for the integration tests

#![allow(dead_code)]

use perfseq::config::EngineConfig;
use perfseq::messaging::EventConsumer;
use perfseq::midi::event::{MidiEvent, PatternEvent};
use perfseq::project::{Project, ProjectManager};
use perfseq::sequencer::{PPQN, TempoMarker, Tick, Track};
use perfseq::sync::{LoopbackAuthority, LoopbackHandle};
use perfseq::{Engine, EngineEvent, SmfCodec};
use ringbuf::traits::Consumer;
use std::path::{Path, PathBuf};

pub const BAR: Tick = PPQN * 4;

/// Engine on a loopback authority with default settings
pub fn engine() -> (Engine, EventConsumer, LoopbackHandle) {
    let (authority, handle) = LoopbackAuthority::new();
    let (engine, events) = Engine::new(
        EngineConfig::default(),
        Box::new(authority),
        Box::new(SmfCodec::new()),
    );
    (engine, events, handle)
}

/// One-bar pattern playing a note on every beat
pub fn beat_track(name: &str, channel: u8, note: u8) -> (Track, u32) {
    let mut track = Track::new(name);
    track.channel = channel;
    let id = track.add_pattern(format!("{} beat", name), BAR);
    if let Some(pattern) = track.pattern_mut(id) {
        for beat in 0..4 {
            pattern.add_event(PatternEvent::new(
                beat * PPQN,
                MidiEvent::NoteOn { note, velocity: 100 },
            ));
            pattern.add_event(PatternEvent::new(beat * PPQN + PPQN / 2, MidiEvent::NoteOff { note }));
        }
    }
    (track, id)
}

/// Two tracks: drums over bars 0-4, bass over bars 2-6
pub fn demo_project(name: &str) -> Project {
    let mut project = Project::new(name);
    let (drums, drum_pattern) = beat_track("Drums", 9, 36);
    let (bass, bass_pattern) = beat_track("Bass", 1, 40);
    let drums = project.arrangement.add_track(drums);
    let bass = project.arrangement.add_track(bass);
    project.arrangement.add_trigger(drums, drum_pattern, 0, BAR * 4);
    project.arrangement.add_trigger(bass, bass_pattern, BAR * 2, BAR * 6);
    project.transport.left_tick = 0;
    project.transport.right_tick = BAR * 2;
    project
}

/// Same as [`demo_project`] with a stop marker at `stop`
pub fn project_with_stop(name: &str, stop: Tick) -> Project {
    let mut project = demo_project(name);
    project.tempo_markers.push(TempoMarker::stop(stop, 120.0));
    project
}

pub fn write_project(dir: &Path, file: &str, project: &Project) -> PathBuf {
    let path = dir.join(file);
    ProjectManager::new()
        .save_project(project, &path)
        .expect("save fixture project");
    path
}

pub fn drain(events: &mut EventConsumer) -> Vec<EngineEvent> {
    std::iter::from_fn(|| events.try_pop()).collect()
}
