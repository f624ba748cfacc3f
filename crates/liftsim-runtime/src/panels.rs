//! Built-in [`Panel`] implementations.
//!
//! - [`TracingPanel`] logs every display push and every denial.
//! - [`WirePanel`] mirrors the controller's display state onto the numeric
//!   bus for device firmware: direction, door, fire-alarm and mode lamps
//!   whenever they change, plus button-lamp resets when a request is served.

use std::sync::{Arc, Mutex};

use liftsim_kernel::Panel;
use liftsim_middleware::NetBus;
use liftsim_middleware::wire::{
    CABIN_BUTTON_RESET, CALL_BUTTON_RESET, CALL_DOWN, CALL_UP, DOOR_CLOSE_COMMAND,
    DOOR_COMMAND, DOOR_OPEN_COMMAND, ELEVATOR_DIRECTION, ELEVATOR_DOOR, ELEVATOR_MODE, FIRE_ALARM,
    MODE_FIRE, MODE_NORMAL,
};
use liftsim_types::{Denial, DoorState, LiftError, Message, PanelSnapshot, Topic};
use tracing::{debug, warn};

// ────────────────────────────────────────────────────────────────────────────
// TracingPanel
// ────────────────────────────────────────────────────────────────────────────

/// Writes the display state to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPanel;

impl Panel for TracingPanel {
    fn render(&self, s: &PanelSnapshot) {
        debug!(
            floor = s.current_floor,
            target = s.target_floor,
            direction = %s.direction,
            door = %s.door,
            fire = s.fire_mode,
            moving = s.moving,
            hall_up = ?s.hall_up,
            hall_down = ?s.hall_down,
            cabin = ?s.cabin,
            "panel"
        );
    }

    fn request_denied(&self, d: &Denial) {
        warn!(floor = d.floor, reason = %d.reason, "buzz: request denied");
    }
}

// ────────────────────────────────────────────────────────────────────────────
// WirePanel
// ────────────────────────────────────────────────────────────────────────────

/// Destination for numeric messages.
pub trait MessageSink: Send + Sync {
    fn send(&self, message: Message) -> Result<(), LiftError>;
}

impl MessageSink for NetBus {
    fn send(&self, message: Message) -> Result<(), LiftError> {
        self.publish(message)
    }
}

/// Mirrors controller state onto the numeric bus, one car.
pub struct WirePanel {
    sink: Arc<dyn MessageSink>,
    car: i32,
    last: Mutex<Option<PanelSnapshot>>,
}

impl WirePanel {
    pub fn new(sink: Arc<dyn MessageSink>, car: i32) -> Self {
        Self {
            sink,
            car,
            last: Mutex::new(None),
        }
    }
}

impl Panel for WirePanel {
    fn render(&self, snapshot: &PanelSnapshot) {
        let messages = {
            let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
            let messages = mirror_messages(last.as_ref(), snapshot, self.car);
            *last = Some(snapshot.clone());
            messages
        };
        for m in messages {
            if let Err(e) = self.sink.send(m) {
                warn!(car = self.car, message = %m, error = %e, "could not mirror state");
                return;
            }
        }
    }
}

fn msg(category: i32, instance: i32, first: i32) -> Message {
    Message::new(Topic::new(category, instance), [first, 0, 0, 0])
}

/// Numeric messages that bring device displays from `prev` to `next`.
/// With no previous state everything except button resets is sent.
pub fn mirror_messages(prev: Option<&PanelSnapshot>, next: &PanelSnapshot, car: i32) -> Vec<Message> {
    let mut out = Vec::new();
    let changed = |f: fn(&PanelSnapshot) -> i32| prev.is_none_or(|p| f(p) != f(next));

    if changed(|s| s.direction.wire_code()) {
        out.push(msg(ELEVATOR_DIRECTION, car, next.direction.wire_code()));
    }
    if changed(|s| s.door.wire_code()) {
        out.push(msg(ELEVATOR_DOOR, car, next.door.wire_code()));
        match next.door {
            DoorState::Opening => out.push(msg(DOOR_COMMAND, car, DOOR_OPEN_COMMAND)),
            DoorState::Closing => out.push(msg(DOOR_COMMAND, car, DOOR_CLOSE_COMMAND)),
            _ => {}
        }
    }
    if changed(|s| i32::from(s.fire_mode)) {
        out.push(msg(FIRE_ALARM, car, i32::from(next.fire_mode)));
        let mode = if next.fire_mode { MODE_FIRE } else { MODE_NORMAL };
        out.push(msg(ELEVATOR_MODE, car, mode));
    }

    if let Some(p) = prev {
        for floor in p.hall_up.iter().filter(|f| !next.hall_up.contains(f)) {
            out.push(msg(CALL_BUTTON_RESET, *floor, CALL_UP));
        }
        for floor in p.hall_down.iter().filter(|f| !next.hall_down.contains(f)) {
            out.push(msg(CALL_BUTTON_RESET, *floor, CALL_DOWN));
        }
        for floor in p.cabin.iter().filter(|f| !next.cabin.contains(f)) {
            out.push(msg(CABIN_BUTTON_RESET, car, *floor));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use liftsim_types::Direction;

    #[derive(Default)]
    struct Captured(Mutex<Vec<Message>>);

    impl MessageSink for Captured {
        fn send(&self, message: Message) -> Result<(), LiftError> {
            self.0.lock().unwrap().push(message);
            Ok(())
        }
    }

    fn idle_at(floor: i32) -> PanelSnapshot {
        PanelSnapshot {
            current_floor: floor,
            target_floor: floor,
            ..PanelSnapshot::default()
        }
    }

    #[test]
    fn first_render_sends_full_display_state() {
        let out = mirror_messages(None, &idle_at(0), 1);
        let topics: Vec<_> = out.iter().map(|m| m.topic().category()).collect();
        assert_eq!(topics, vec![ELEVATOR_DIRECTION, ELEVATOR_DOOR, FIRE_ALARM, ELEVATOR_MODE]);
    }

    #[test]
    fn unchanged_state_sends_nothing() {
        let s = idle_at(4);
        assert!(mirror_messages(Some(&s), &s, 1).is_empty());
    }

    #[test]
    fn door_transitions_carry_door_commands() {
        let prev = idle_at(2);
        let next = PanelSnapshot {
            door: DoorState::Opening,
            ..prev.clone()
        };
        let out = mirror_messages(Some(&prev), &next, 1);
        assert_eq!(
            out,
            vec![
                msg(ELEVATOR_DOOR, 1, DoorState::Opening.wire_code()),
                msg(DOOR_COMMAND, 1, DOOR_OPEN_COMMAND),
            ]
        );
    }

    #[test]
    fn served_requests_reset_their_lamps() {
        let prev = PanelSnapshot {
            hall_up: vec![3, 5],
            hall_down: vec![3],
            cabin: vec![3, 7],
            ..idle_at(3)
        };
        let next = PanelSnapshot {
            hall_up: vec![5],
            hall_down: vec![],
            cabin: vec![7],
            ..prev.clone()
        };
        let out = mirror_messages(Some(&prev), &next, 2);
        assert_eq!(
            out,
            vec![
                msg(CALL_BUTTON_RESET, 3, CALL_UP),
                msg(CALL_BUTTON_RESET, 3, CALL_DOWN),
                msg(CABIN_BUTTON_RESET, 2, 3),
            ]
        );
    }

    #[test]
    fn panel_remembers_what_it_sent() {
        let sink = Arc::new(Captured::default());
        let panel = WirePanel::new(sink.clone(), 1);

        panel.render(&idle_at(0));
        let first = sink.0.lock().unwrap().len();
        panel.render(&idle_at(0));
        assert_eq!(sink.0.lock().unwrap().len(), first);

        panel.render(&PanelSnapshot {
            direction: Direction::Up,
            moving: true,
            target_floor: 5,
            ..idle_at(0)
        });
        let sent = sink.0.lock().unwrap();
        assert_eq!(sent.last(), Some(&msg(ELEVATOR_DIRECTION, 1, Direction::Up.wire_code())));
    }
}
