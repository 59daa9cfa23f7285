use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use perfseq::config::EngineConfig;
use perfseq::midi::event::{MidiEvent, PatternEvent};
use perfseq::sequencer::{PPQN, TempoTrack, Track};
use perfseq::{Engine, LoopbackAuthority, SmfCodec};
use std::time::Duration;

const BAR: u64 = PPQN * 4;

/// Engine with `tracks` tracks, each a 16th-note pattern triggered over 64 bars
fn busy_engine(tracks: usize) -> Engine {
    let (authority, _handle) = LoopbackAuthority::new();
    let (mut engine, _events) = Engine::new(
        EngineConfig::default(),
        Box::new(authority),
        Box::new(SmfCodec::new()),
    );
    for index in 0..tracks {
        let track = engine.add_track(format!("Track {}", index)).unwrap();
        let pattern = engine.add_pattern(track, "Sixteenths", BAR).unwrap();
        engine
            .add_trigger(track, pattern, 0, BAR * 64)
            .unwrap();
    }
    engine.set_loop(true);
    engine.set_right(BAR * 64);
    engine
}

/// Benchmark one scheduler step (critical for timing stability)
fn bench_scheduler_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_step");

    for tracks in [1, 8, 32] {
        let mut engine = busy_engine(tracks);
        engine.start();
        let scheduler = engine.scheduler();
        let mut out = Vec::with_capacity(4096);

        group.bench_with_input(BenchmarkId::from_parameter(tracks), &tracks, |b, _| {
            b.iter(|| {
                out.clear();
                black_box(scheduler.step(Duration::from_millis(5), &mut out));
            });
        });
    }
    group.finish();
}

/// Benchmark event collection over a full bar of dense patterns
fn bench_collect_events(c: &mut Criterion) {
    let mut track = Track::new("Dense");
    let id = track.add_pattern("Sixteenths", BAR);
    if let Some(pattern) = track.pattern_mut(id) {
        for step in 0..16 {
            pattern.add_event(PatternEvent::new(
                step * PPQN / 4,
                MidiEvent::NoteOn { note: 60, velocity: 90 },
            ));
        }
    }
    let mut arrangement = perfseq::Arrangement::new();
    for _ in 0..16 {
        let index = arrangement.add_track(track.clone());
        for bar in 0..32 {
            arrangement.add_trigger(index, id, bar * BAR, (bar + 1) * BAR);
        }
    }

    let mut out = Vec::with_capacity(4096);
    c.bench_function("collect_events_bar", |b| {
        b.iter(|| {
            out.clear();
            arrangement.collect_events(
                black_box(BAR * 8),
                black_box(BAR * 9),
                perfseq::PlayMode::Song,
                0,
                &mut out,
            );
        });
    });
}

/// Benchmark tempo resolution against a long marker list
fn bench_tempo_lookup(c: &mut Criterion) {
    let mut tempo = TempoTrack::default();
    for bar in 1..256 {
        tempo.insert_marker(bar * BAR, 80.0 + (bar % 60) as f64);
    }
    tempo.rebuild_playback_list();

    c.bench_function("tempo_playback_bpm", |b| {
        let mut tick = 0;
        b.iter(|| {
            tick = (tick + 997) % (BAR * 256);
            black_box(tempo.playback_bpm(black_box(tick)));
        });
    });
}

criterion_group!(
    benches,
    bench_scheduler_step,
    bench_collect_events,
    bench_tempo_lookup
);
criterion_main!(benches);
