use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{info, warn};

/// How often the trigger thread checks for the next tick or a stop request
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Interval trigger source for the orchestrator.
///
/// Runs in its own thread with an explicit start/stop lifecycle. The first
/// tick fires immediately on start. A tick that comes up while the previous
/// job call is still running simply fires into the orchestrator's
/// single-flight guard; a tick that is overdue by more than the misfire
/// grace is abandoned rather than executed late.
pub struct Scheduler {
    interval: Duration,
    misfire_grace: Duration,
}

/// Handle to a started scheduler thread
pub struct SchedulerHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Requests the trigger loop to stop and waits for it to finish
    pub fn stop(self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.thread.join();
    }

    /// Blocks until the trigger loop ends
    pub fn join(self) {
        let _ = self.thread.join();
    }
}

impl Scheduler {
    pub fn new(interval: Duration, misfire_grace: Duration) -> Scheduler {
        Scheduler { interval, misfire_grace }
    }

    /// Starts the trigger loop in its own thread
    ///
    /// # Arguments
    ///
    /// * 'job' - invoked once per tick
    pub fn start<F>(&self, job: F) -> SchedulerHandle
    where
        F: Fn() + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let interval = self.interval;
        let misfire_grace = self.misfire_grace;

        info!("scheduler started, interval {:?}", interval);

        let thread = thread::spawn(move || {
            let mut next_tick = Instant::now();
            loop {
                while Instant::now() < next_tick {
                    if stop_flag.load(Ordering::SeqCst) {
                        return;
                    }
                    let remaining = next_tick.saturating_duration_since(Instant::now());
                    thread::sleep(remaining.min(POLL_INTERVAL));
                }
                if stop_flag.load(Ordering::SeqCst) {
                    return;
                }

                let overdue = Instant::now().saturating_duration_since(next_tick);
                next_tick += interval;

                if overdue > misfire_grace {
                    warn!("trigger misfired by {:?}, abandoning this tick", overdue);
                    continue;
                }

                job();
            }
        });

        SchedulerHandle { stop, thread }
    }
}
