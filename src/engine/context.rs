// EngineContext - Process state flags owned by one engine instance
// Shared between the control context, the scheduler and presentation readers

use crate::sequencer::transport::PlayMode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Running / modified / mode flags for one engine instance
///
/// Every flag is an atomic so the presentation layer can poll it without
/// taking the performance lock. Writers are the transport (running) and the
/// control context (everything else).
#[derive(Debug)]
pub struct EngineContext {
    running: AtomicBool,
    modified: AtomicBool,
    song_mode: AtomicBool,
    follow_transport: AtomicBool,
}

impl EngineContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::Relaxed)
    }

    pub fn set_modified(&self, modified: bool) {
        self.modified.store(modified, Ordering::Relaxed);
    }

    pub fn play_mode(&self) -> PlayMode {
        if self.song_mode.load(Ordering::Relaxed) {
            PlayMode::Song
        } else {
            PlayMode::Live
        }
    }

    pub(crate) fn set_play_mode(&self, mode: PlayMode) {
        self.song_mode
            .store(mode == PlayMode::Song, Ordering::Relaxed);
    }

    pub fn follow_transport(&self) -> bool {
        self.follow_transport.load(Ordering::Relaxed)
    }

    pub fn set_follow_transport(&self, follow: bool) {
        self.follow_transport.store(follow, Ordering::Relaxed);
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self {
            running: AtomicBool::new(false),
            modified: AtomicBool::new(false),
            song_mode: AtomicBool::new(true),
            follow_transport: AtomicBool::new(true),
        }
    }
}
