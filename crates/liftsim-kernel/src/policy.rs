//! Pure dispatch policy: `(state, input) -> (next state, effects)`.
//!
//! [`step`] never touches the bus, the clock or a lock. The
//! [`ElevatorController`](crate::controller::ElevatorController) feeds it
//! inputs and carries out the returned [`Effect`]s.
//!
//! # Car state
//!
//! Each dimension of the car is its own sum type, so impossible combinations
//! cannot be represented:
//!
//! | Dimension | Type | Notes |
//! |---|---|---|
//! | Doors | [`DoorState`] | exactly one of five states |
//! | Motion | [`Motion`] | only `Moving` means the car is travelling |
//! | Interlock | [`Interlock`] | overload and obstruction exclude each other |
//! | Fire recall | `bool` | orthogonal to the above |
//!
//! The car only enters [`Motion::Moving`] from a depart timer that fires
//! after the doors reported closed, so a moving car always has closed doors.
//!
//! # Timers
//!
//! At most one door/dwell timer is outstanding. Starting or cancelling a
//! timer bumps `timer_generation`; a [`Input::TimerFired`] whose generation
//! does not match is stale and ignored.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::time::Duration;

use liftsim_types::{
    CallDirection, DenialReason, Direction, DoorState, LiftError, PanelSnapshot,
};
use tracing::debug;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Building layout and door timings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    pub lowest_floor: i32,
    pub highest_floor: i32,
    /// Floor the car returns to in fire recall.
    pub recall_floor: i32,
    /// Floor the car is parked at on start-up.
    pub start_floor: i32,
    /// Time for the doors to finish opening or closing.
    pub door_transition: Duration,
    /// Pause between the doors reporting closed and the move command.
    pub depart_delay: Duration,
    /// How long the doors stay open at a served floor.
    pub dwell: Duration,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            lowest_floor: 0,
            highest_floor: 9,
            recall_floor: 0,
            start_floor: 0,
            door_transition: Duration::from_millis(1000),
            depart_delay: Duration::from_millis(500),
            dwell: Duration::from_millis(3000),
        }
    }
}

impl PolicyConfig {
    pub fn with_floors(mut self, lowest: i32, highest: i32) -> Self {
        self.lowest_floor = lowest;
        self.highest_floor = highest;
        self
    }

    pub fn with_recall_floor(mut self, floor: i32) -> Self {
        self.recall_floor = floor;
        self
    }

    pub fn with_start_floor(mut self, floor: i32) -> Self {
        self.start_floor = floor;
        self
    }

    pub fn with_door_transition(mut self, d: Duration) -> Self {
        self.door_transition = d;
        self
    }

    pub fn with_depart_delay(mut self, d: Duration) -> Self {
        self.depart_delay = d;
        self
    }

    pub fn with_dwell(mut self, d: Duration) -> Self {
        self.dwell = d;
        self
    }

    pub fn floors(&self) -> RangeInclusive<i32> {
        self.lowest_floor..=self.highest_floor
    }
}

// ────────────────────────────────────────────────────────────────────────────
// State
// ────────────────────────────────────────────────────────────────────────────

/// What the car is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Motion {
    /// Parked at `current_floor`.
    #[default]
    Idle,
    /// Doors opening or open at a served floor, dwell pending.
    Serving,
    /// Doors closing before travel; the move command is not out yet.
    Departing { target: i32 },
    /// Travel command published, waiting for the target floor.
    Moving { target: i32 },
}

/// Safety condition that pins the car in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interlock {
    #[default]
    Clear,
    Overloaded,
    Obstructed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarState {
    pub current_floor: i32,
    pub target_floor: i32,
    pub door: DoorState,
    pub motion: Motion,
    pub interlock: Interlock,
    pub fire_mode: bool,
    pub hall_up: BTreeSet<i32>,
    pub hall_down: BTreeSet<i32>,
    pub cabin: BTreeSet<i32>,
    pub timer_generation: u64,
}

impl CarState {
    /// Idle car with closed doors at `floor`.
    pub fn parked_at(floor: i32) -> Self {
        Self {
            current_floor: floor,
            target_floor: floor,
            door: DoorState::Closed,
            motion: Motion::Idle,
            interlock: Interlock::Clear,
            fire_mode: false,
            hall_up: BTreeSet::new(),
            hall_down: BTreeSet::new(),
            cabin: BTreeSet::new(),
            timer_generation: 0,
        }
    }

    pub fn moving(&self) -> bool {
        matches!(self.motion, Motion::Moving { .. })
    }

    pub fn overloaded(&self) -> bool {
        self.interlock == Interlock::Overloaded
    }

    pub fn obstructed(&self) -> bool {
        self.interlock == Interlock::Obstructed
    }

    pub fn has_pending(&self) -> bool {
        !(self.hall_up.is_empty() && self.hall_down.is_empty() && self.cabin.is_empty())
    }

    pub fn direction(&self) -> Direction {
        match self.motion {
            Motion::Moving { target } if target > self.current_floor => Direction::Up,
            Motion::Moving { target } if target < self.current_floor => Direction::Down,
            _ => Direction::Idle,
        }
    }

    pub fn panel_snapshot(&self) -> PanelSnapshot {
        PanelSnapshot {
            current_floor: self.current_floor,
            target_floor: self.target_floor,
            direction: self.direction(),
            door: self.door,
            fire_mode: self.fire_mode,
            moving: self.moving(),
            hall_up: self.hall_up.iter().copied().collect(),
            hall_down: self.hall_down.iter().copied().collect(),
            cabin: self.cabin.iter().copied().collect(),
        }
    }

    fn clear_floor(&mut self, floor: i32) {
        self.hall_up.remove(&floor);
        self.hall_down.remove(&floor);
        self.cabin.remove(&floor);
    }

    fn clear_all(&mut self) {
        self.hall_up.clear();
        self.hall_down.clear();
        self.cabin.clear();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Inputs and effects
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    /// Doors finished opening.
    OpenComplete,
    /// Doors finished closing.
    CloseComplete,
    /// Depart delay after closing elapsed.
    Depart,
    /// Dwell at a served floor elapsed.
    Dwell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    HallCall { floor: i32, direction: CallDirection },
    CabinSelect(i32),
    Fire(bool),
    Overload(bool),
    Obstruct(bool),
    ClearRequests,
    FloorTick(i32),
    Arrived(i32),
    TimerFired { timer: Timer, generation: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    MoveTo(i32),
    Stop,
}

/// Side effect requested by [`step`], executed in order by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Push the display state to every panel.
    Render,
    StartTimer {
        timer: Timer,
        delay: Duration,
        generation: u64,
    },
    Command(Command),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: CarState,
    pub effects: Vec<Effect>,
}

// ────────────────────────────────────────────────────────────────────────────
// step
// ────────────────────────────────────────────────────────────────────────────

/// Apply one input to the car.
///
/// A [`Effect::Render`] leads the effect list whenever the panel-visible
/// state changed.
///
/// # Errors
///
/// Returns [`LiftError::RequestDenied`] for a floor request made while fire
/// recall, overload or obstruction is active. The state is left untouched.
pub fn step(state: &CarState, input: Input, cfg: &PolicyConfig) -> Result<Transition, LiftError> {
    let mut next = state.clone();
    let mut fx = Vec::new();

    match input {
        Input::HallCall { floor, direction } => {
            refuse_if_locked(state, floor)?;
            match direction {
                CallDirection::Up => next.hall_up.insert(floor),
                CallDirection::Down => next.hall_down.insert(floor),
            };
            schedule(&mut next, cfg, &mut fx);
        }
        Input::CabinSelect(floor) => {
            refuse_if_locked(state, floor)?;
            next.cabin.insert(floor);
            schedule(&mut next, cfg, &mut fx);
        }
        Input::ClearRequests => next.clear_all(),
        Input::Fire(on) => fire(&mut next, on, cfg, &mut fx),
        Input::Overload(on) => interlock(&mut next, Interlock::Overloaded, on, cfg, &mut fx),
        Input::Obstruct(on) => interlock(&mut next, Interlock::Obstructed, on, cfg, &mut fx),
        Input::FloorTick(floor) => floor_tick(&mut next, floor, cfg, &mut fx),
        Input::Arrived(floor) => {
            // Usually already handled by the tick that reached the floor.
            if next.motion == (Motion::Moving { target: floor }) {
                next.current_floor = floor;
                arrive(&mut next, cfg, &mut fx);
            }
        }
        Input::TimerFired { timer, generation } => {
            if generation == state.timer_generation {
                timer_fired(&mut next, timer, cfg, &mut fx);
            } else {
                debug!(?timer, generation, current = state.timer_generation, "stale timer");
            }
        }
    }

    if next.panel_snapshot() != state.panel_snapshot() {
        fx.insert(0, Effect::Render);
    }
    Ok(Transition {
        state: next,
        effects: fx,
    })
}

/// Nearest pending floor. Ties go to hall-up, then hall-down, then cabin;
/// within a set to the lowest floor.
pub fn pick_nearest(state: &CarState) -> Option<i32> {
    let mut best: Option<(u32, i32)> = None;
    for set in [&state.hall_up, &state.hall_down, &state.cabin] {
        for &floor in set {
            let d = floor.abs_diff(state.current_floor);
            if best.is_none_or(|(bd, _)| d < bd) {
                best = Some((d, floor));
            }
        }
    }
    best.map(|(_, floor)| floor)
}

/// Reason a floor request would be refused right now, if any. Overload and
/// obstruction are reported ahead of fire recall.
pub fn refusal(state: &CarState) -> Option<DenialReason> {
    match state.interlock {
        Interlock::Overloaded => Some(DenialReason::Overloaded),
        Interlock::Obstructed => Some(DenialReason::Obstructed),
        Interlock::Clear if state.fire_mode => Some(DenialReason::FireMode),
        Interlock::Clear => None,
    }
}

fn refuse_if_locked(state: &CarState, floor: i32) -> Result<(), LiftError> {
    match refusal(state) {
        Some(reason) => Err(LiftError::RequestDenied { floor, reason }),
        None => Ok(()),
    }
}

fn start_timer(st: &mut CarState, timer: Timer, delay: Duration, fx: &mut Vec<Effect>) {
    st.timer_generation += 1;
    fx.push(Effect::StartTimer {
        timer,
        delay,
        generation: st.timer_generation,
    });
}

fn cancel_timer(st: &mut CarState) {
    st.timer_generation += 1;
}

fn schedule(st: &mut CarState, cfg: &PolicyConfig, fx: &mut Vec<Effect>) {
    if st.interlock != Interlock::Clear {
        st.target_floor = st.current_floor;
        return;
    }

    if st.fire_mode {
        if st.motion != Motion::Idle {
            return;
        }
        if st.current_floor == cfg.recall_floor {
            st.target_floor = st.current_floor;
            open_doors(st, cfg, fx);
        } else {
            depart(st, cfg.recall_floor, cfg, fx);
        }
        return;
    }

    if st.motion != Motion::Idle {
        return;
    }

    match pick_nearest(st) {
        None => st.target_floor = st.current_floor,
        Some(floor) if floor == st.current_floor => serve_here(st, cfg, fx),
        Some(floor) => depart(st, floor, cfg, fx),
    }
}

fn depart(st: &mut CarState, target: i32, cfg: &PolicyConfig, fx: &mut Vec<Effect>) {
    debug!(from = st.current_floor, target, "departing");
    st.target_floor = target;
    st.motion = Motion::Departing { target };
    if st.door == DoorState::Closed {
        start_timer(st, Timer::Depart, cfg.depart_delay, fx);
    } else {
        st.door = DoorState::Closing;
        start_timer(st, Timer::CloseComplete, cfg.door_transition, fx);
    }
}

fn serve_here(st: &mut CarState, cfg: &PolicyConfig, fx: &mut Vec<Effect>) {
    let floor = st.current_floor;
    st.clear_floor(floor);
    st.target_floor = floor;
    st.motion = Motion::Serving;
    if st.door == DoorState::Open {
        start_timer(st, Timer::Dwell, cfg.dwell, fx);
    } else {
        st.door = DoorState::Opening;
        start_timer(st, Timer::OpenComplete, cfg.door_transition, fx);
    }
}

fn open_doors(st: &mut CarState, cfg: &PolicyConfig, fx: &mut Vec<Effect>) {
    if !matches!(st.door, DoorState::Open | DoorState::Opening) {
        st.door = DoorState::Opening;
        start_timer(st, Timer::OpenComplete, cfg.door_transition, fx);
    }
}

fn arrive(st: &mut CarState, cfg: &PolicyConfig, fx: &mut Vec<Effect>) {
    debug!(floor = st.current_floor, fire = st.fire_mode, "arrived");
    st.motion = Motion::Idle;
    st.target_floor = st.current_floor;
    if st.fire_mode {
        // Doors stay shut until the recall floor.
        schedule(st, cfg, fx);
    } else {
        serve_here(st, cfg, fx);
    }
}

fn floor_tick(st: &mut CarState, floor: i32, cfg: &PolicyConfig, fx: &mut Vec<Effect>) {
    st.current_floor = floor;
    match st.motion {
        Motion::Moving { target } if target == floor => arrive(st, cfg, fx),
        Motion::Moving { .. } => {}
        _ => {
            if st.interlock != Interlock::Clear {
                st.target_floor = floor;
            }
        }
    }
}

fn timer_fired(st: &mut CarState, timer: Timer, cfg: &PolicyConfig, fx: &mut Vec<Effect>) {
    match timer {
        Timer::OpenComplete => {
            st.door = DoorState::Open;
            if st.motion == Motion::Serving {
                start_timer(st, Timer::Dwell, cfg.dwell, fx);
            }
        }
        Timer::CloseComplete => {
            st.door = DoorState::Closed;
            if let Motion::Departing { .. } = st.motion {
                start_timer(st, Timer::Depart, cfg.depart_delay, fx);
            }
        }
        Timer::Depart => {
            if let Motion::Departing { target } = st.motion {
                st.motion = Motion::Moving { target };
                fx.push(Effect::Command(Command::MoveTo(target)));
            }
        }
        Timer::Dwell => {
            st.motion = Motion::Idle;
            schedule(st, cfg, fx);
        }
    }
}

fn fire(st: &mut CarState, on: bool, cfg: &PolicyConfig, fx: &mut Vec<Effect>) {
    if st.fire_mode == on {
        return;
    }
    st.fire_mode = on;
    if on {
        st.clear_all();
        if matches!(st.motion, Motion::Serving | Motion::Departing { .. }) {
            cancel_timer(st);
            st.motion = Motion::Idle;
        }
    } else if st.interlock == Interlock::Clear
        && st.motion == Motion::Idle
        && st.door != DoorState::Closed
    {
        st.door = DoorState::Closing;
        start_timer(st, Timer::CloseComplete, cfg.door_transition, fx);
    }
    schedule(st, cfg, fx);
}

fn interlock(
    st: &mut CarState,
    kind: Interlock,
    asserted: bool,
    cfg: &PolicyConfig,
    fx: &mut Vec<Effect>,
) {
    if asserted {
        if matches!(st.motion, Motion::Moving { .. } | Motion::Departing { .. }) {
            fx.push(Effect::Command(Command::Stop));
        }
        cancel_timer(st);
        st.motion = Motion::Idle;
        st.interlock = kind;
        st.target_floor = st.current_floor;
        st.door = match kind {
            Interlock::Obstructed => DoorState::Obstructed,
            _ => DoorState::Open,
        };
    } else if st.interlock == kind {
        st.interlock = Interlock::Clear;
        st.door = DoorState::Open;
        schedule(st, cfg, fx);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PolicyConfig {
        PolicyConfig::default()
    }

    /// Apply `input`, asserting it was accepted.
    fn apply(state: &CarState, input: Input) -> Transition {
        step(state, input, &cfg()).expect("input accepted")
    }

    /// Fire the single outstanding timer, which must be `timer`.
    fn fire_timer(t: &Transition, timer: Timer) -> Transition {
        let started = t.effects.iter().find_map(|e| match e {
            Effect::StartTimer {
                timer: kind,
                generation,
                ..
            } => Some((*kind, *generation)),
            _ => None,
        });
        let (kind, generation) = started.expect("a timer was started");
        assert_eq!(kind, timer);
        apply(&t.state, Input::TimerFired { timer, generation })
    }

    fn commands(t: &Transition) -> Vec<Command> {
        t.effects
            .iter()
            .filter_map(|e| match e {
                Effect::Command(c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    fn assert_invariants(s: &CarState) {
        if s.moving() {
            assert_eq!(s.door, DoorState::Closed, "moving with doors {:?}", s.door);
        }
        if s.fire_mode {
            assert!(!s.has_pending(), "fire mode with pending requests");
        }
    }

    /// Hall call at `floor` from an idle car at `from`, run until the move
    /// command is out.
    fn dispatched(from: i32, floor: i32) -> Transition {
        let t = apply(&CarState::parked_at(from), Input::HallCall {
            floor,
            direction: CallDirection::Up,
        });
        assert_eq!(t.state.door, DoorState::Closed);
        let t = fire_timer(&t, Timer::Depart);
        assert_eq!(commands(&t), vec![Command::MoveTo(floor)]);
        t
    }

    #[test]
    fn nearest_request_wins_with_hall_up_first_on_ties() {
        let mut s = CarState::parked_at(5);
        s.hall_up.insert(7);
        s.hall_down.insert(3);
        s.cabin.insert(7);
        assert_eq!(pick_nearest(&s), Some(7));

        s.hall_up.clear();
        assert_eq!(pick_nearest(&s), Some(3), "hall-down beats cabin on a tie");

        s.hall_down.insert(6);
        assert_eq!(pick_nearest(&s), Some(6));
    }

    #[test]
    fn ties_within_one_set_go_to_the_lowest_floor() {
        let mut s = CarState::parked_at(5);
        s.cabin.extend([4, 6]);
        assert_eq!(pick_nearest(&s), Some(4));
        assert_eq!(pick_nearest(&CarState::parked_at(0)), None);
    }

    #[test]
    fn request_closes_doors_then_departs_after_delay() {
        let mut s = CarState::parked_at(1);
        s.door = DoorState::Open;

        let t = apply(&s, Input::CabinSelect(4));
        assert_eq!(t.state.door, DoorState::Closing);
        assert_eq!(t.state.motion, Motion::Departing { target: 4 });
        assert_eq!(t.effects[0], Effect::Render);
        assert!(commands(&t).is_empty());

        let t = fire_timer(&t, Timer::CloseComplete);
        assert_eq!(t.state.door, DoorState::Closed);
        assert!(!t.state.moving());

        let t = fire_timer(&t, Timer::Depart);
        assert!(t.state.moving());
        assert_eq!(t.state.direction(), Direction::Up);
        assert_eq!(commands(&t), vec![Command::MoveTo(4)]);
        assert_invariants(&t.state);
    }

    #[test]
    fn arrival_clears_floor_opens_doors_and_dwells() {
        let t = dispatched(1, 3);
        let t = apply(&t.state, Input::FloorTick(2));
        assert_eq!(t.state.direction(), Direction::Up);
        let t = apply(&t.state, Input::FloorTick(3));

        assert!(!t.state.moving());
        assert!(t.state.hall_up.is_empty());
        assert_eq!(t.state.door, DoorState::Opening);
        let t = fire_timer(&t, Timer::OpenComplete);
        assert_eq!(t.state.door, DoorState::Open);
        let t = fire_timer(&t, Timer::Dwell);
        assert_eq!(t.state.motion, Motion::Idle);
        assert_eq!(t.state.door, DoorState::Open);
        assert_eq!(t.state.target_floor, 3);
    }

    #[test]
    fn arrived_after_tick_is_ignored() {
        let t = dispatched(1, 2);
        let t = apply(&t.state, Input::FloorTick(2));
        let again = apply(&t.state, Input::Arrived(2));
        assert_eq!(again.state, t.state);
        assert!(again.effects.is_empty());
    }

    #[test]
    fn arrived_without_tick_counts_as_arrival() {
        let t = dispatched(1, 2);
        let t = apply(&t.state, Input::Arrived(2));
        assert_eq!(t.state.current_floor, 2);
        assert_eq!(t.state.motion, Motion::Serving);
    }

    #[test]
    fn request_at_current_floor_is_served_without_moving() {
        let t = apply(&CarState::parked_at(4), Input::CabinSelect(4));
        assert!(t.state.cabin.is_empty());
        assert_eq!(t.state.motion, Motion::Serving);
        assert_eq!(t.state.door, DoorState::Opening);
        assert!(commands(&t).is_empty());
    }

    #[test]
    fn requests_while_busy_only_queue() {
        let t = dispatched(0, 5);
        let t = apply(&t.state, Input::CabinSelect(2));
        assert!(t.state.cabin.contains(&2));
        assert_eq!(t.state.motion, Motion::Moving { target: 5 });
        assert!(commands(&t).is_empty());
    }

    #[test]
    fn fire_mode_clears_requests_and_recalls() {
        let mut s = CarState::parked_at(4);
        s.cabin.insert(7);
        s.hall_down.insert(2);

        let t = apply(&s, Input::Fire(true));
        assert!(t.state.fire_mode);
        assert!(!t.state.has_pending());
        assert_eq!(t.state.motion, Motion::Departing { target: 0 });
        let t = fire_timer(&t, Timer::Depart);
        assert_eq!(commands(&t), vec![Command::MoveTo(0)]);
        assert_invariants(&t.state);

        let err = step(&t.state, Input::CabinSelect(6), &cfg()).unwrap_err();
        assert_eq!(
            err,
            LiftError::RequestDenied {
                floor: 6,
                reason: DenialReason::FireMode
            }
        );
    }

    #[test]
    fn fire_mode_at_recall_floor_opens_and_stays() {
        let t = apply(&CarState::parked_at(0), Input::Fire(true));
        assert_eq!(t.state.door, DoorState::Opening);
        let t = fire_timer(&t, Timer::OpenComplete);
        assert_eq!(t.state.door, DoorState::Open);
        assert_eq!(t.state.motion, Motion::Idle);
        assert!(!t.effects.iter().any(|e| matches!(e, Effect::StartTimer { .. })));
    }

    #[test]
    fn fire_mode_cancels_dwell() {
        let t = apply(&CarState::parked_at(3), Input::CabinSelect(3));
        let t = fire_timer(&t, Timer::OpenComplete);
        let dwell_generation = t.state.timer_generation;

        let t = apply(&t.state, Input::Fire(true));
        assert_eq!(t.state.motion, Motion::Departing { target: 0 });

        // The dwell timer started before fire mode is now stale.
        let stale = apply(&t.state, Input::TimerFired {
            timer: Timer::Dwell,
            generation: dwell_generation,
        });
        assert_eq!(stale.state, t.state);
    }

    #[test]
    fn fire_mode_lets_a_moving_car_finish_then_recalls() {
        let t = dispatched(2, 5);
        let t = apply(&t.state, Input::Fire(true));
        assert_eq!(t.state.motion, Motion::Moving { target: 5 });

        let t = apply(&t.state, Input::FloorTick(3));
        let t = apply(&t.state, Input::FloorTick(4));
        let t = apply(&t.state, Input::FloorTick(5));
        assert_eq!(t.state.door, DoorState::Closed, "no door cycle off the recall floor");
        assert_eq!(t.state.motion, Motion::Departing { target: 0 });
    }

    #[test]
    fn leaving_fire_mode_closes_doors() {
        let t = apply(&CarState::parked_at(0), Input::Fire(true));
        let t = fire_timer(&t, Timer::OpenComplete);
        let t = apply(&t.state, Input::Fire(false));
        assert!(!t.state.fire_mode);
        assert_eq!(t.state.door, DoorState::Closing);
        let t = fire_timer(&t, Timer::CloseComplete);
        assert_eq!(t.state.door, DoorState::Closed);
        assert_eq!(t.state.motion, Motion::Idle);
    }

    #[test]
    fn obstruction_halts_and_resumes() {
        let t = dispatched(3, 8);
        let t = apply(&t.state, Input::FloorTick(4));
        let t = apply(&t.state, Input::FloorTick(5));

        let t = apply(&t.state, Input::Obstruct(true));
        assert_eq!(commands(&t), vec![Command::Stop]);
        assert!(!t.state.moving());
        assert_eq!(t.state.target_floor, 5);
        assert_eq!(t.state.door, DoorState::Obstructed);
        assert!(t.state.hall_up.contains(&8));

        let err = step(&t.state, Input::CabinSelect(1), &cfg()).unwrap_err();
        assert_eq!(err.denial().map(|d| d.reason), Some(DenialReason::Obstructed));

        let t = apply(&t.state, Input::Obstruct(false));
        assert_eq!(t.state.interlock, Interlock::Clear);
        assert_eq!(t.state.motion, Motion::Departing { target: 8 });
        assert_eq!(t.state.door, DoorState::Closing);
    }

    #[test]
    fn overload_and_obstruction_exclude_each_other() {
        let t = apply(&CarState::parked_at(2), Input::Overload(true));
        assert!(t.state.overloaded());
        assert_eq!(t.state.door, DoorState::Open);

        let t = apply(&t.state, Input::Obstruct(true));
        assert!(t.state.obstructed());
        assert!(!t.state.overloaded());

        // Clearing the condition that is no longer active changes nothing.
        let t2 = apply(&t.state, Input::Overload(false));
        assert_eq!(t2.state, t.state);
    }

    #[test]
    fn overload_outranks_fire_mode_in_denials() {
        let t = apply(&CarState::parked_at(0), Input::Fire(true));
        let t = apply(&t.state, Input::Overload(true));
        let err = step(&t.state, Input::HallCall { floor: 3, direction: CallDirection::Down }, &cfg())
            .unwrap_err();
        assert_eq!(err.denial().map(|d| d.reason), Some(DenialReason::Overloaded));
    }

    #[test]
    fn interlock_during_departure_cancels_it() {
        let t = apply(&CarState::parked_at(1), Input::CabinSelect(6));
        let depart_generation = t.state.timer_generation;
        let t = apply(&t.state, Input::Overload(true));
        assert_eq!(commands(&t), vec![Command::Stop]);
        assert_eq!(t.state.motion, Motion::Idle);

        let stale = apply(&t.state, Input::TimerFired {
            timer: Timer::Depart,
            generation: depart_generation,
        });
        assert!(commands(&stale).is_empty());
    }

    #[test]
    fn late_tick_under_interlock_repins_target() {
        let t = dispatched(0, 6);
        let t = apply(&t.state, Input::Overload(true));
        let t = apply(&t.state, Input::FloorTick(1));
        assert_eq!(t.state.current_floor, 1);
        assert_eq!(t.state.target_floor, 1);
        assert!(!t.state.moving());
    }

    #[test]
    fn clear_requests_empties_every_set() {
        let t = dispatched(0, 6);
        let t = apply(&t.state, Input::CabinSelect(2));
        let t = apply(&t.state, Input::ClearRequests);
        assert!(!t.state.has_pending());
        assert_eq!(t.state.motion, Motion::Moving { target: 6 });
    }

    #[test]
    fn passing_floor_only_refreshes_display() {
        let t = dispatched(0, 6);
        let t = apply(&t.state, Input::FloorTick(1));
        assert_eq!(t.effects, vec![Effect::Render]);
        assert_eq!(t.state.current_floor, 1);
    }
}
