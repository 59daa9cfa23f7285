// Driver - Internal fixed-rate scheduling thread
// Steps the performance when no external process callback drives it

use crate::engine::performance::{Performance, StepReport, lock};
use crate::sequencer::arrangement::ScheduledEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Handle the scheduling context steps the performance through
#[derive(Clone)]
pub struct Scheduler {
    performance: Arc<Mutex<Performance>>,
}

impl Scheduler {
    pub(crate) fn new(performance: Arc<Mutex<Performance>>) -> Self {
        Self { performance }
    }

    /// One step; the lock is held only for its duration
    pub fn step(&self, elapsed: Duration, out: &mut Vec<ScheduledEvent>) -> StepReport {
        lock(&self.performance).process(elapsed, out)
    }
}

/// Background thread calling [`Scheduler::step`] every `period`
///
/// Elapsed time is measured rather than assumed, so a late wake-up plays a
/// longer span instead of drifting.
pub struct Driver {
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Driver {
    /// `sink` receives each step's events, in tick order
    pub fn spawn<S>(scheduler: Scheduler, period: Duration, mut sink: S) -> std::io::Result<Self>
    where
        S: FnMut(&[ScheduledEvent]) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let thread = thread::Builder::new()
            .name("perfseq-driver".into())
            .spawn(move || {
                let mut buffer = Vec::with_capacity(1024);
                let mut last = Instant::now();
                while flag.load(Ordering::Relaxed) {
                    thread::sleep(period);
                    let now = Instant::now();
                    let elapsed = now.duration_since(last);
                    last = now;

                    buffer.clear();
                    scheduler.step(elapsed, &mut buffer);
                    if !buffer.is_empty() {
                        buffer.sort_by_key(|e| e.tick);
                        sink(&buffer);
                    }
                }
                log::debug!("Driver thread exiting");
            })?;

        log::info!("Driver started ({} ms period)", period.as_millis());
        Ok(Self {
            running,
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop the thread and wait for it
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            log::error!("Driver thread panicked");
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.stop();
    }
}
