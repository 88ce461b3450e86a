//! Background thread driving the age-out sweep and the quiescence check.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::platform::Platform;
use crate::reo::engine::ReoEngine;
use crate::trace::{debug, info};

/// Handle to the timer thread.
///
/// Dropping the handle signals the thread to exit but does not wait for it.
/// Use [`TimerThread::shutdown`] to join.
pub(crate) struct TimerThread {
    shutdown_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TimerThread {
    /// Spawns the timer thread. It holds only a weak reference to the
    /// engine and exits on its own once the engine is dropped.
    ///
    /// # Panics
    /// Panics if thread spawning fails.
    pub(crate) fn spawn<P: Platform>(engine: Weak<ReoEngine<P>>, period: Duration) -> Self {
        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown_flag);

        debug!(period_ms = period.as_millis() as u64, "spawning timer thread");
        let handle = thread::Builder::new()
            .name("reo-timer".into())
            .spawn(move || {
                info!("timer thread started");
                run(&engine, &flag, period);
                info!("timer thread exiting");
            })
            .expect("failed to spawn timer thread");

        Self {
            shutdown_flag,
            handle: Some(handle),
        }
    }

    /// Signals the thread and waits for it to exit.
    pub(crate) fn shutdown(mut self) {
        self.shutdown_flag.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            debug!("waiting for timer thread to exit");
            let _ = handle.join();
        }
    }
}

impl Drop for TimerThread {
    fn drop(&mut self) {
        self.shutdown_flag.store(true, Ordering::Release);
        if let Some(handle) = &self.handle {
            handle.thread().unpark();
        }
    }
}

fn run<P: Platform>(engine: &Weak<ReoEngine<P>>, shutdown: &AtomicBool, period: Duration) {
    let mut next_tick = Instant::now() + period;
    while !shutdown.load(Ordering::Acquire) {
        let now = Instant::now();
        if now < next_tick {
            thread::park_timeout(next_tick - now);
            continue;
        }
        next_tick += period;
        // Catch up without firing a burst after a long stall.
        if next_tick < now {
            next_tick = now + period;
        }

        let Some(engine) = engine.upgrade() else {
            break;
        };
        engine.on_timer_tick();
    }
}
