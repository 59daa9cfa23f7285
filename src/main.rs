// perfseq - Headless performance sequencer
// Reads transport and edit commands from stdin; scheduled events go to the log

use clap::{Arg, ArgAction, Command};
use crossbeam_channel::{RecvTimeoutError, unbounded};
use perfseq::config::EngineConfig;
use perfseq::engine::driver::Driver;
use perfseq::messaging::EventConsumer;
use perfseq::midi::{ExportSelector, SmfCodec};
use perfseq::project::RecentFiles;
use perfseq::sequencer::{MuteOp, PlayMode};
use perfseq::sync::LoopbackAuthority;
use perfseq::{ControlRequest, Engine, EngineEvent, PollOutcome};
use ringbuf::traits::Consumer;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn cli() -> Command {
    Command::new("perfseq")
        .about("Live-performance MIDI song sequencer")
        .arg(
            Arg::new("file")
                .value_name("FILE")
                .help("Project file to open on start"),
        )
        .arg(
            Arg::new("setlist")
                .short('s')
                .long("setlist")
                .value_name("SETLIST")
                .conflicts_with("file")
                .help("Play through the songs listed in a setlist file"),
        )
        .arg(
            Arg::new("verify")
                .long("verify")
                .action(ArgAction::SetTrue)
                .requires("setlist")
                .help("Load every setlist song once before starting"),
        )
        .arg(
            Arg::new("sync")
                .long("sync")
                .value_name("ROLE")
                .value_parser(["master", "slave"])
                .help("Sync the transport to the external timing authority"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("CONFIG")
                .help("Engine configuration file (RON)"),
        )
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let matches = cli().get_matches();

    let config = match matches.get_one::<String>("config") {
        Some(path) => EngineConfig::load_from(Path::new(path)),
        None => EngineConfig::load(),
    };
    let period = config.driver_period();
    let recent = RecentFiles::load(config.recent_capacity);

    // No external timing authority is linked into the headless build, so sync
    // runs against the in-process loopback
    let (authority, _loopback) = LoopbackAuthority::new();
    let (engine, events) = Engine::new(config, Box::new(authority), Box::new(SmfCodec::new()));
    let mut engine = engine.with_recent_files(recent);

    if let Some(role) = matches.get_one::<String>("sync") {
        let _ = engine.enable_sync(role == "master");
    }
    if let Some(setlist) = matches.get_one::<String>("setlist") {
        let _ = engine.open_setlist(Path::new(setlist), matches.get_flag("verify"));
    } else if let Some(file) = matches.get_one::<String>("file") {
        let _ = engine.open_file(Path::new(file));
    }

    let mut driver = match Driver::spawn(engine.scheduler(), period, |batch| {
        for event in batch {
            log::trace!(
                "{:>8} track {} ch {} {:?}",
                event.tick,
                event.track,
                event.channel,
                event.event
            );
        }
    }) {
        Ok(driver) => driver,
        Err(e) => {
            eprintln!("ERROR: failed to start the driver thread: {}", e);
            return;
        }
    };

    println!("{}", engine.display_title());
    println!("Type 'help' for commands");
    run(&mut engine, events);

    driver.stop();
}

/// Control loop: stdin lines arrive on a channel so polling never blocks
fn run(engine: &mut Engine, mut events: EventConsumer) {
    let (line_tx, line_rx) = unbounded::<String>();
    let requests = engine.request_sender();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                return;
            }
        }
        // EOF behaves like quit
        let _ = requests.send(ControlRequest::Terminate);
    });

    loop {
        match line_rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => execute(engine, line.trim()),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(POLL_INTERVAL);
            }
        }

        let outcome = engine.poll();
        while let Some(event) = events.try_pop() {
            report(&event);
        }
        if outcome == PollOutcome::Terminate {
            break;
        }
    }
}

fn report(event: &EngineEvent) {
    match event {
        EngineEvent::RunningChanged(running) => {
            println!("{}", if *running { "playing" } else { "stopped" })
        }
        EngineEvent::PlayModeChanged(mode) => println!("mode: {:?}", mode),
        EngineEvent::BpmChanged(bpm) => println!("bpm: {:.2}", bpm),
        EngineEvent::TimeSignatureChanged(ts) => println!("time signature: {}", ts),
        EngineEvent::SetlistPositionChanged(Some(index)) => println!("setlist song {}", index + 1),
        EngineEvent::SyncStatusChanged(status) => println!("sync: {:?}", status),
        EngineEvent::TitleChanged(title) => println!("{}", title),
        EngineEvent::Notification(notification) => println!("{}", notification),
        EngineEvent::HistoryChanged { .. } | EngineEvent::SetlistPositionChanged(None) => {}
    }
}

fn print_help() {
    println!("transport: play | stop | loop | left <tick> | right <tick> | seek <tick> | mode song|live");
    println!("tempo:     bpm <value> | nudge <delta> | tap | marker <tick> <bpm> | stopmarker <tick>");
    println!("edit:      expand | collapse | copy | capture | undo | redo | transpose <n> | bake");
    println!("song:      mute all|none|toggle | tracks | status");
    println!("files:     new | open <file> | save | saveas <file> | export <file> | import <file> [bank]");
    println!("setlist:   next | prev | verify");
    println!("sync:      sync master|slave|off");
    println!("           quit");
}

fn execute(engine: &mut Engine, line: &str) {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else { return };
    let arg = words.next();
    let tick = || arg.and_then(|a| a.parse::<u64>().ok());
    let number = |value: Option<&str>| value.and_then(|a| a.parse::<f64>().ok());

    // Errors are already reported through notifications
    match command {
        "help" => print_help(),
        "play" => {
            engine.start();
        }
        "stop" => {
            engine.stop();
        }
        "loop" => println!("loop {}", if engine.toggle_loop() { "on" } else { "off" }),
        "left" => match tick() {
            Some(t) => engine.set_left(t),
            None => println!("usage: left <tick>"),
        },
        "right" => match tick() {
            Some(t) => engine.set_right(t),
            None => println!("usage: right <tick>"),
        },
        "seek" => match tick() {
            Some(t) => {
                engine.set_position(t);
            }
            None => println!("usage: seek <tick>"),
        },
        "mode" => {
            let mode = match arg {
                Some("song") => PlayMode::Song,
                Some("live") => PlayMode::Live,
                _ => return println!("usage: mode song|live"),
            };
            if !engine.set_play_mode(mode) {
                println!("mode change deferred until stop");
            }
        }
        "bpm" => match number(arg) {
            Some(bpm) => {
                let _ = engine.set_bpm(bpm);
            }
            None => println!("usage: bpm <value>"),
        },
        "nudge" => match number(arg) {
            Some(delta) => {
                println!("bpm: {:.2}", engine.nudge_bpm(delta));
                engine.release_bpm_nudge();
            }
            None => println!("usage: nudge <delta>"),
        },
        "tap" => {
            if let Some(bpm) = engine.tap_tempo(Instant::now()) {
                println!("tap: {:.2}", bpm);
            }
        }
        "marker" => match (tick(), number(words.next())) {
            (Some(t), Some(bpm)) => {
                let _ = engine.insert_tempo_marker(t, bpm);
            }
            _ => println!("usage: marker <tick> <bpm>"),
        },
        "stopmarker" => match tick() {
            Some(t) => {
                let _ = engine.insert_stop_marker(t);
            }
            None => println!("usage: stopmarker <tick>"),
        },
        "expand" => {
            let _ = engine.expand();
        }
        "collapse" => {
            let _ = engine.collapse();
        }
        "copy" => {
            let _ = engine.copy();
        }
        "capture" => {
            if let Ok(tracks) = engine.create_triggers_for_playing_tracks() {
                println!("captured {} tracks", tracks.len());
            }
        }
        "undo" => match engine.undo() {
            Ok(kind) => println!("undo {}", kind),
            Err(e) => println!("{}", e),
        },
        "redo" => match engine.redo() {
            Ok(kind) => println!("redo {}", kind),
            Err(e) => println!("{}", e),
        },
        "transpose" => match arg.and_then(|a| a.parse::<i32>().ok()) {
            Some(semitones) => engine.set_transpose(semitones),
            None => println!("usage: transpose <semitones>"),
        },
        "bake" => {
            let _ = engine.apply_transpose();
        }
        "mute" => {
            let op = match arg {
                Some("all") => MuteOp::Mute,
                Some("none") => MuteOp::Unmute,
                Some("toggle") => MuteOp::Toggle,
                _ => return println!("usage: mute all|none|toggle"),
            };
            let _ = engine.set_song_mute(op);
        }
        "tracks" => engine.with_performance(|perf| {
            for (index, track) in perf.arrangement().tracks().iter().enumerate() {
                println!(
                    "{:>2} {:<16} {} triggers{}",
                    index,
                    track.name,
                    track.triggers().len(),
                    if track.muted { " (muted)" } else { "" }
                );
            }
        }),
        "status" => {
            let state = engine.snapshot();
            println!(
                "{} at {} ({}) {:.2} bpm, L {} R {}{}",
                if state.is_running { "playing" } else { "stopped" },
                state.current_tick,
                engine.musical_position(),
                state.bpm,
                state.left_tick,
                state.right_tick,
                if state.is_looping { ", looping" } else { "" }
            );
        }
        "new" => engine.new_file(),
        "open" => match arg {
            Some(path) => {
                let _ = engine.open_file(Path::new(path));
            }
            None => println!("usage: open <file>"),
        },
        "save" => {
            let _ = engine.request_sender().send(ControlRequest::Save);
        }
        "saveas" => match arg {
            Some(path) => {
                let _ = engine.save_as(Path::new(path));
            }
            None => println!("usage: saveas <file>"),
        },
        "export" => match arg {
            Some(path) => {
                let _ = engine.export_midi(&PathBuf::from(path), true, ExportSelector::All);
            }
            None => println!("usage: export <file>"),
        },
        "import" => match arg {
            Some(path) => {
                let bank = words
                    .next()
                    .and_then(|b| b.parse::<i32>().ok())
                    .unwrap_or(-1);
                if let Ok(count) = engine.import_midi(Path::new(path), bank) {
                    println!("imported {} tracks", count);
                }
            }
            None => println!("usage: import <file> [bank]"),
        },
        "next" => {
            let _ = engine.jump_setlist(1);
        }
        "prev" => {
            let _ = engine.jump_setlist(-1);
        }
        "verify" => {
            let _ = engine.verify_setlist();
        }
        "sync" => match arg {
            Some("master") => {
                let _ = engine.enable_sync(true);
            }
            Some("slave") => {
                let _ = engine.enable_sync(false);
            }
            Some("off") => {
                let _ = engine.disable_sync();
            }
            _ => println!("usage: sync master|slave|off"),
        },
        "quit" | "exit" => {
            let _ = engine.request_sender().send(ControlRequest::Terminate);
        }
        other => println!("unknown command '{}' (type 'help')", other),
    }
}
