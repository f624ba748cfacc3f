//! Command contract between the dispatch controller and whatever moves the
//! car.
//!
//! The controller only ever publishes `CtrlMoveTo` / `CtrlStop` and listens
//! for `SimFloorTick` / `SimArrived`. Any [`Actuator`] wired up with
//! [`attach_actuator`] can stand behind those channels, whether it is the
//! tick-driven [`MotionSimulator`](crate::sim::MotionSimulator) or a
//! continuous motor model.

use std::sync::Arc;

use liftsim_middleware::{EventBus, handler};
use liftsim_types::{Channel, LiftError};
use tracing::{debug, warn};

/// Something that can carry the car between floors.
pub trait Actuator: Send + Sync {
    /// Stable identifier used in logs, e.g. `"car-1"`.
    fn id(&self) -> &str;

    /// Travel to `floor`. Commands received mid-travel queue behind the
    /// current one.
    ///
    /// # Errors
    ///
    /// Implementations may refuse a command they cannot carry out.
    fn move_to(&self, floor: i32) -> Result<(), LiftError>;

    /// Halt where the car is and forget every queued command.
    ///
    /// # Errors
    ///
    /// Implementations may report a failure to halt.
    fn stop(&self) -> Result<(), LiftError>;

    /// Floor the car is at or last passed.
    fn position(&self) -> i32;
}

/// Subscribe `actuator` to the controller's command channels on `bus`.
pub fn attach_actuator(bus: &dyn EventBus, actuator: Arc<dyn Actuator>) {
    let mover = Arc::clone(&actuator);
    bus.subscribe(
        Channel::CtrlMoveTo,
        handler(move |event| {
            let Some(floor) = event.payload.floor() else {
                warn!(actuator = mover.id(), payload = ?event.payload, "move command without a floor");
                return;
            };
            debug!(actuator = mover.id(), floor, "move command");
            if let Err(e) = mover.move_to(floor) {
                warn!(actuator = mover.id(), floor, error = %e, "move command refused");
            }
        }),
    );

    bus.subscribe(
        Channel::CtrlStop,
        handler(move |_| {
            debug!(actuator = actuator.id(), "stop command");
            if let Err(e) = actuator.stop() {
                warn!(actuator = actuator.id(), error = %e, "stop command failed");
            }
        }),
    );
}
