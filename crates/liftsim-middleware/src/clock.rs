//! Injectable time source for door timers and simulator ticks.
//!
//! Nothing in the controller or the simulator sleeps or reads the wall
//! clock. They hand deferred work to a [`Clock`], which lets production run
//! on a dedicated timer thread ([`TokioClock`]) while tests step virtual
//! time by hand ([`ManualClock`]).

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use liftsim_types::LiftError;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Deferred unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run a task after a delay.
pub trait Clock: Send + Sync {
    /// Run `task` once `delay` has elapsed. Scheduling never blocks.
    fn schedule(&self, delay: Duration, task: Task);
}

// ────────────────────────────────────────────────────────────────────────────
// TokioClock
// ────────────────────────────────────────────────────────────────────────────

/// Runs every task on one named thread driving a current-thread Tokio
/// runtime, so scheduled work never runs concurrently with other scheduled
/// work.
pub struct TokioClock {
    jobs: mpsc::UnboundedSender<(Duration, Task)>,
}

impl TokioClock {
    /// Start the timer thread.
    ///
    /// # Errors
    ///
    /// Returns [`LiftError::Io`] if the runtime or the thread cannot be
    /// created.
    pub fn start(thread_name: &str) -> Result<Self, LiftError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let (jobs, mut rx) = mpsc::unbounded_channel::<(Duration, Task)>();

        std::thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    while let Some((delay, task)) = rx.recv().await {
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            task();
                        });
                    }
                });
                debug!("timer thread stopped");
            })?;

        Ok(Self { jobs })
    }
}

impl Clock for TokioClock {
    fn schedule(&self, delay: Duration, task: Task) {
        if self.jobs.send((delay, task)).is_err() {
            error!("timer thread is gone, task dropped");
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ManualClock
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Timeline {
    now: Duration,
    seq: u64,
    due: BTreeMap<(Duration, u64), Task>,
}

/// Virtual clock for deterministic tests.
///
/// Time only moves when [`advance`](ManualClock::advance) is called. Due
/// tasks run in deadline order, ties in scheduling order.
#[derive(Default)]
pub struct ManualClock {
    timeline: Mutex<Timeline>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since construction.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Number of tasks waiting for their deadline.
    pub fn pending(&self) -> usize {
        self.lock().due.len()
    }

    /// Move virtual time forward by `by`, running every task whose deadline
    /// falls inside the window, including tasks scheduled by those tasks.
    ///
    /// Tasks run with the internal lock released, so they may schedule.
    pub fn advance(&self, by: Duration) {
        let horizon = self.lock().now + by;
        loop {
            let task = {
                let mut tl = self.lock();
                let Some(&key) = tl.due.keys().next() else {
                    break;
                };
                if key.0 > horizon {
                    break;
                }
                tl.now = key.0;
                tl.due.remove(&key)
            };
            if let Some(task) = task {
                task();
            }
        }
        self.lock().now = horizon;
    }

    /// Convenience wrapper around [`advance`](Self::advance) in milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Timeline> {
        self.timeline.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn schedule(&self, delay: Duration, task: Task) {
        let mut tl = self.lock();
        let key = (tl.now + delay, tl.seq);
        tl.seq += 1;
        tl.due.insert(key, task);
    }
}
