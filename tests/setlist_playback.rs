// Setlist mode: loading, stepping, failures and stop-marker advance

mod common;

use common::{BAR, demo_project, drain, engine, project_with_stop, write_project};
use perfseq::messaging::NotificationCategory;
use perfseq::setlist::SetlistError;
use perfseq::{EngineError, EngineEvent, JumpOutcome};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::tempdir;

fn write_setlist(dir: &Path, songs: &[&str]) -> PathBuf {
    let path = dir.join("gig.setlist");
    let text = format!("# friday gig\n\n{}\n", songs.join("\n"));
    std::fs::write(&path, text).unwrap();
    path
}

#[test]
fn test_open_and_step_through_setlist() {
    let dir = tempdir().unwrap();
    write_project(dir.path(), "one.perf", &demo_project("One"));
    write_project(dir.path(), "two.perf", &demo_project("Two"));
    let setlist = write_setlist(dir.path(), &["one.perf", "two.perf"]);

    let (mut engine, mut events, _sync) = engine();
    assert_eq!(engine.open_setlist(&setlist, false).unwrap(), JumpOutcome::Loaded(0));
    assert!(engine.setlist().is_enabled());
    assert_eq!(engine.metadata().name, "One");
    assert!(engine.display_title().starts_with("perfseq - Setlist, Song 01 - ["));

    assert_eq!(engine.jump_setlist(1).unwrap(), JumpOutcome::Loaded(1));
    assert_eq!(engine.metadata().name, "Two");
    assert_eq!(engine.jump_setlist(1).unwrap(), JumpOutcome::Boundary);
    assert_eq!(engine.metadata().name, "Two");
    assert_eq!(engine.jump_setlist(-1).unwrap(), JumpOutcome::Loaded(0));

    engine.poll();
    assert!(drain(&mut events).contains(&EngineEvent::SetlistPositionChanged(Some(0))));
    // Setlist songs stay out of the recent list
    assert!(engine.recent_files().is_empty());
}

#[test]
fn test_missing_song_falls_back_to_empty_project() {
    let dir = tempdir().unwrap();
    write_project(dir.path(), "one.perf", &demo_project("One"));
    write_project(dir.path(), "three.perf", &demo_project("Three"));
    let setlist = write_setlist(dir.path(), &["one.perf", "two.perf", "three.perf"]);

    let (mut engine, mut events, _sync) = engine();
    engine.open_setlist(&setlist, false).unwrap();

    let result = engine.jump_setlist(1);
    assert!(matches!(
        result,
        Err(EngineError::Setlist(SetlistError::EntryMissing { index: 1, .. }))
    ));
    assert!(!engine.setlist().is_enabled());
    assert!(engine.current_path().is_none());
    assert_eq!(engine.with_performance(|p| p.arrangement().track_count()), 0);
    assert_eq!(engine.display_title(), "perfseq - song - unsaved");

    let reported = drain(&mut events).into_iter().any(|e| {
        matches!(e, EngineEvent::Notification(n) if n.category == NotificationCategory::Setlist)
    });
    assert!(reported);

    // Stepping is refused until a setlist is loaded again
    assert!(matches!(
        engine.jump_setlist(1),
        Err(EngineError::Setlist(SetlistError::NotActive))
    ));
}

#[test]
fn test_verify_stops_on_broken_entry() {
    let dir = tempdir().unwrap();
    write_project(dir.path(), "one.perf", &demo_project("One"));
    std::fs::write(dir.path().join("two.perf"), b"garbage").unwrap();
    let setlist = write_setlist(dir.path(), &["one.perf", "two.perf"]);

    let (mut engine, _events, _sync) = engine();
    let result = engine.open_setlist(&setlist, true);
    assert!(matches!(
        result,
        Err(EngineError::Setlist(SetlistError::EntryFailed { index: 1, .. }))
    ));
    assert!(!engine.setlist().is_enabled());
    assert!(engine.current_path().is_none());
}

#[test]
fn test_verify_ends_on_first_song() {
    let dir = tempdir().unwrap();
    write_project(dir.path(), "one.perf", &demo_project("One"));
    write_project(dir.path(), "two.perf", &demo_project("Two"));
    let setlist = write_setlist(dir.path(), &["one.perf", "two.perf"]);

    let (mut engine, _events, _sync) = engine();
    assert_eq!(engine.open_setlist(&setlist, true).unwrap(), JumpOutcome::Loaded(0));
    assert_eq!(engine.metadata().name, "One");
    assert_eq!(engine.verify_setlist().unwrap(), JumpOutcome::Loaded(0));
}

#[test]
fn test_empty_setlist_is_rejected() {
    let dir = tempdir().unwrap();
    let setlist = write_setlist(dir.path(), &["# nothing yet"]);

    let (mut engine, _events, _sync) = engine();
    assert!(matches!(
        engine.open_setlist(&setlist, false),
        Err(EngineError::Setlist(SetlistError::Empty))
    ));
    assert!(!engine.setlist().is_enabled());
}

#[test]
fn test_stop_marker_advances_to_next_song() {
    let dir = tempdir().unwrap();
    write_project(dir.path(), "one.perf", &project_with_stop("One", BAR));
    write_project(dir.path(), "two.perf", &demo_project("Two"));
    let setlist = write_setlist(dir.path(), &["one.perf", "two.perf"]);

    let (mut engine, _events, _sync) = engine();
    engine.open_setlist(&setlist, false).unwrap();
    engine.start();

    let mut out = Vec::new();
    let report = engine.scheduler().step(Duration::from_secs(3), &mut out);
    assert!(report.halted);
    assert!(!engine.is_running());
    assert_eq!(engine.snapshot().current_tick, BAR);
    // Only the bar before the marker was played
    assert_eq!(out.len(), 8);

    engine.poll();
    assert_eq!(engine.setlist().current_index(), 1);
    assert_eq!(engine.metadata().name, "Two");
}

#[test]
fn test_last_song_halts_at_song_end() {
    let dir = tempdir().unwrap();
    write_project(dir.path(), "only.perf", &demo_project("Only"));
    let setlist = write_setlist(dir.path(), &["only.perf"]);

    let (mut engine, mut events, _sync) = engine();
    engine.open_setlist(&setlist, false).unwrap();
    engine.start();

    let mut out = Vec::new();
    let report = engine.scheduler().step(Duration::from_secs(20), &mut out);
    assert!(report.halted);
    assert_eq!(engine.snapshot().current_tick, BAR * 6);

    drain(&mut events);
    engine.poll();
    assert_eq!(engine.setlist().current_index(), 0);
    let finished = drain(&mut events).into_iter().any(|e| {
        matches!(e, EngineEvent::Notification(n) if n.message.contains("End of setlist"))
    });
    assert!(finished);
}

#[test]
fn test_new_file_leaves_setlist_mode() {
    let dir = tempdir().unwrap();
    write_project(dir.path(), "one.perf", &demo_project("One"));
    let setlist = write_setlist(dir.path(), &["one.perf"]);

    let (mut engine, _events, _sync) = engine();
    engine.open_setlist(&setlist, false).unwrap();
    engine.new_file();
    assert!(!engine.setlist().is_enabled());
    assert_eq!(engine.display_title(), "perfseq - song - unsaved");
}

#[test]
fn test_setlist_refused_while_running() {
    let dir = tempdir().unwrap();
    write_project(dir.path(), "one.perf", &demo_project("One"));
    let setlist = write_setlist(dir.path(), &["one.perf"]);

    let (mut engine, _events, _sync) = engine();
    engine.start();
    assert!(matches!(
        engine.open_setlist(&setlist, false),
        Err(EngineError::TransportRunning)
    ));
}
