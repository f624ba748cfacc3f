//! Tick-driven motion simulator.
//!
//! [`MotionSimulator`] turns move commands into one-floor-per-tick progress.
//! Each tick publishes `SimFloorTick(floor)`; reaching the active target
//! also publishes `SimArrived(target)` and promotes the next queued command.
//!
//! A single self-rescheduling tick runs only while a target is active. The
//! first tick fires one period after a target is activated. Commands that
//! arrive mid-travel are queued, never used to retarget.
//!
//! ```rust
//! use std::sync::Arc;
//! use liftsim_hal::sim::{MotionSimulator, SimulatorConfig};
//! use liftsim_middleware::{LocalBus, ManualClock};
//!
//! let bus = Arc::new(LocalBus::new());
//! let clock = Arc::new(ManualClock::new());
//! let sim = MotionSimulator::new(SimulatorConfig::default().with_start_floor(1), bus, clock.clone());
//!
//! sim.on_move_to(3);
//! clock.advance_ms(2 * 750);
//! assert_eq!(sim.snapshot().current_floor, 3);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use liftsim_middleware::{Clock, EventBus};
use liftsim_types::{Channel, LiftError, Payload};
use tracing::{debug, info, warn};

use crate::actuator::Actuator;

/// Default time the car needs to travel one floor.
pub const DEFAULT_TICK: Duration = Duration::from_millis(750);

/// Construction parameters for [`MotionSimulator`].
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub id: String,
    pub start_floor: i32,
    pub tick_period: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            id: "car-1".to_string(),
            start_floor: 0,
            tick_period: DEFAULT_TICK,
        }
    }
}

impl SimulatorConfig {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_start_floor(mut self, floor: i32) -> Self {
        self.start_floor = floor;
        self
    }

    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }
}

/// Point-in-time view of the simulator, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimSnapshot {
    pub current_floor: i32,
    pub active_target: Option<i32>,
    pub pending: Vec<i32>,
    pub ticking: bool,
}

struct SimState {
    current_floor: i32,
    active_target: Option<i32>,
    pending: VecDeque<i32>,
    /// Generation of the running ticker, `None` when stopped.
    ticker: Option<u64>,
    generation: u64,
}

/// Outbound work computed under the lock and carried out after it is
/// released.
#[derive(Default)]
struct Outcome {
    events: Vec<(Channel, i32)>,
    start_ticker: Option<u64>,
}

pub struct MotionSimulator {
    id: String,
    tick_period: Duration,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    state: Mutex<SimState>,
    this: Weak<MotionSimulator>,
}

impl MotionSimulator {
    pub fn new(
        config: SimulatorConfig,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: config.id,
            tick_period: config.tick_period,
            bus,
            clock,
            state: Mutex::new(SimState {
                current_floor: config.start_floor,
                active_target: None,
                pending: VecDeque::new(),
                ticker: None,
                generation: 0,
            }),
            this: this.clone(),
        })
    }

    /// Queue a move command and start travelling if idle.
    pub fn on_move_to(&self, floor: i32) {
        let outcome = {
            let mut st = self.lock();
            st.pending.push_back(floor);
            let mut outcome = Outcome::default();
            promote(&mut st, &mut outcome);
            if st.active_target.is_some() && st.ticker.is_none() {
                st.generation += 1;
                st.ticker = Some(st.generation);
                outcome.start_ticker = Some(st.generation);
            }
            debug!(sim = %self.id, floor, active = ?st.active_target, queued = st.pending.len(), "move queued");
            outcome
        };
        self.finish(outcome);
    }

    /// Abandon the current move and the queue. No arrival is reported.
    pub fn on_stop(&self) {
        let mut st = self.lock();
        if st.active_target.is_some() || !st.pending.is_empty() {
            info!(sim = %self.id, floor = st.current_floor, "halted");
        }
        st.active_target = None;
        st.pending.clear();
        st.ticker = None;
    }

    pub fn snapshot(&self) -> SimSnapshot {
        let st = self.lock();
        SimSnapshot {
            current_floor: st.current_floor,
            active_target: st.active_target,
            pending: st.pending.iter().copied().collect(),
            ticking: st.ticker.is_some(),
        }
    }

    fn tick(&self, generation: u64) {
        let outcome = {
            let mut st = self.lock();
            if st.ticker != Some(generation) {
                // A stop or restart superseded this ticker.
                return;
            }
            let mut outcome = Outcome::default();
            let Some(target) = st.active_target else {
                st.ticker = None;
                return;
            };

            let step = (target - st.current_floor).signum();
            st.current_floor += step;
            outcome.events.push((Channel::SimFloorTick, st.current_floor));

            if st.current_floor == target {
                st.active_target = None;
                outcome.events.push((Channel::SimArrived, target));
                promote(&mut st, &mut outcome);
            }

            if st.active_target.is_some() {
                outcome.start_ticker = Some(generation);
            } else {
                st.ticker = None;
            }
            outcome
        };
        self.finish(outcome);
    }

    fn finish(&self, outcome: Outcome) {
        for (channel, floor) in outcome.events {
            if let Err(e) = self.bus.publish(channel, Payload::Floor(floor)) {
                warn!(sim = %self.id, ?channel, floor, error = %e, "could not report progress");
            }
        }
        if let Some(generation) = outcome.start_ticker {
            let this = self.this.clone();
            self.clock.schedule(
                self.tick_period,
                Box::new(move || {
                    if let Some(sim) = this.upgrade() {
                        sim.tick(generation);
                    }
                }),
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Draw queued targets until one needs travel. Targets equal to the current
/// floor arrive on the spot.
fn promote(st: &mut SimState, outcome: &mut Outcome) {
    while st.active_target.is_none() {
        let Some(next) = st.pending.pop_front() else {
            break;
        };
        if next == st.current_floor {
            outcome.events.push((Channel::SimArrived, next));
        } else {
            st.active_target = Some(next);
        }
    }
}

impl Actuator for MotionSimulator {
    fn id(&self) -> &str {
        &self.id
    }

    fn move_to(&self, floor: i32) -> Result<(), LiftError> {
        self.on_move_to(floor);
        Ok(())
    }

    fn stop(&self) -> Result<(), LiftError> {
        self.on_stop();
        Ok(())
    }

    fn position(&self) -> i32 {
        self.lock().current_floor
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
