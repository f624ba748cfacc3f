//! [`ElevatorController`] – the dispatch controller.
//!
//! The controller is the single interception point between panels and the
//! motion hardware. Each input goes through two stages:
//!
//! 1. **Validation** ([`RequestValidator`]): malformed requests (floors
//!    outside the building, impossible hall directions) are rejected
//!    without touching state.
//! 2. **Policy** ([`policy::step`]): the pure state machine computes the
//!    next car state and a list of effects. Requests made while fire recall,
//!    overload or obstruction is active are denied here.
//!
//! Inputs take turns. One thread at a time steps the state and publishes
//! the resulting effects (panel pushes, timers and bus commands), so the
//! actuator sees commands in the order the state changed. An input that
//! arrives on another thread waits for the turn; one that a synchronous bus
//! feeds back on the thread holding the turn is queued and handled before
//! the turn is released.
//!
//! Every rejection produces a negative acknowledgment three ways: the
//! `Err` returned from [`ElevatorController::handle`], a
//! `Channel::RequestDenied` event on the bus, and each panel's
//! [`Panel::request_denied`] hook.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock, Weak};
use std::thread::{self, ThreadId};

use liftsim_middleware::{Clock, EventBus, handler};
use liftsim_types::{CallDirection, Channel, Denial, Event, LiftError, PanelSnapshot, Payload};
use tracing::{debug, info, warn};

use crate::policy::{self, CarState, Command, Effect, Input, PolicyConfig};
use crate::validator::RequestValidator;

/// Display surface driven by the controller (cabin panel, lobby panel,
/// device mirror, log).
pub trait Panel: Send + Sync {
    /// Receive the full display state after every visible change.
    fn render(&self, snapshot: &PanelSnapshot);

    /// A request was refused. Panels typically sound a buzzer.
    fn request_denied(&self, _denial: &Denial) {}
}

/// Channels the controller listens to.
const INPUT_CHANNELS: [Channel; 9] = [
    Channel::HallCallUp,
    Channel::HallCallDown,
    Channel::CabinSelect,
    Channel::FireToggled,
    Channel::OverloadToggled,
    Channel::ObstructToggled,
    Channel::ClearAllRequests,
    Channel::SimFloorTick,
    Channel::SimArrived,
];

/// Translate a bus event into a controller input.
pub fn input_for(event: &Event) -> Option<Input> {
    let p = event.payload;
    let input = match event.channel {
        Channel::HallCallUp => Input::HallCall {
            floor: p.floor()?,
            direction: CallDirection::Up,
        },
        Channel::HallCallDown => Input::HallCall {
            floor: p.floor()?,
            direction: CallDirection::Down,
        },
        Channel::CabinSelect => Input::CabinSelect(p.floor()?),
        Channel::FireToggled => Input::Fire(p.flag()?),
        Channel::OverloadToggled => Input::Overload(p.flag()?),
        Channel::ObstructToggled => Input::Obstruct(p.flag()?),
        Channel::ClearAllRequests => Input::ClearRequests,
        Channel::SimFloorTick => Input::FloorTick(p.floor()?),
        Channel::SimArrived => Input::Arrived(p.floor()?),
        Channel::CtrlMoveTo | Channel::CtrlStop | Channel::RequestDenied => return None,
    };
    Some(input)
}

/// Who is currently stepping the controller, and what was fed back to it
/// meanwhile.
#[derive(Default)]
struct Turn {
    owner: Option<ThreadId>,
    deferred: VecDeque<Input>,
}

pub struct ElevatorController {
    config: PolicyConfig,
    validator: RequestValidator,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    state: Mutex<CarState>,
    turn: Mutex<Turn>,
    turn_free: Condvar,
    panels: RwLock<Vec<Arc<dyn Panel>>>,
    this: Weak<ElevatorController>,
}

impl ElevatorController {
    /// Build a controller for the building described by `config`, with the
    /// built-in validation rules.
    pub fn new(config: PolicyConfig, bus: Arc<dyn EventBus>, clock: Arc<dyn Clock>) -> Arc<Self> {
        let validator = RequestValidator::for_building(&config);
        Self::with_validator(config, validator, bus, clock)
    }

    pub fn with_validator(
        config: PolicyConfig,
        validator: RequestValidator,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            state: Mutex::new(CarState::parked_at(config.start_floor)),
            turn: Mutex::new(Turn::default()),
            turn_free: Condvar::new(),
            config,
            validator,
            bus,
            clock,
            panels: RwLock::new(Vec::new()),
            this: this.clone(),
        })
    }

    /// Subscribe to panel and simulator channels on the bus.
    pub fn attach(&self) {
        for channel in INPUT_CHANNELS {
            let this = self.this.clone();
            self.bus.subscribe(
                channel,
                handler(move |event| {
                    let Some(ctrl) = this.upgrade() else {
                        return;
                    };
                    let Some(input) = input_for(event) else {
                        ctrl.reject_malformed(event);
                        return;
                    };
                    if let Err(e) = ctrl.handle(input) {
                        debug!(error = %e, "input rejected");
                    }
                }),
            );
        }
        info!(
            floors = ?self.config.floors(),
            recall = self.config.recall_floor,
            "controller attached"
        );
    }

    /// Register `panel` and push the current state to it.
    pub fn add_panel(&self, panel: Arc<dyn Panel>) {
        panel.render(&self.snapshot());
        self.panels
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(panel);
    }

    /// Process one input.
    ///
    /// Blocks while another thread is handling an input. An input fed back
    /// by the bus on the thread that is already handling one is queued and
    /// returns `Ok(())`; its outcome is reported on the bus once it runs.
    ///
    /// # Errors
    ///
    /// - [`LiftError::InvalidFloor`] / [`LiftError::InvalidDirection`] – the
    ///   request failed validation.
    /// - [`LiftError::RequestDenied`] – the request is not allowed in the
    ///   current mode.
    pub fn handle(&self, input: Input) -> Result<(), LiftError> {
        if let Err(e) = self.validator.validate(&input) {
            self.reject(&e);
            return Err(e);
        }
        let Some(_turn) = self.take_turn(input) else {
            debug!(?input, "input queued behind the one in progress");
            return Ok(());
        };
        self.process(input)
    }

    /// Refuse an event whose payload does not fit its channel.
    pub fn reject_malformed(&self, event: &Event) -> LiftError {
        let floor = event
            .payload
            .floor()
            .unwrap_or_else(|| self.snapshot().current_floor);
        let e = LiftError::MalformedInput {
            channel: event.channel,
            floor,
        };
        warn!(channel = ?event.channel, payload = ?event.payload, "malformed input");
        self.reject(&e);
        e
    }

    pub fn snapshot(&self) -> PanelSnapshot {
        self.lock().panel_snapshot()
    }

    /// Copy of the full car state.
    pub fn state(&self) -> CarState {
        self.lock().clone()
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    fn process(&self, input: Input) -> Result<(), LiftError> {
        let stepped = {
            let mut st = self.lock();
            policy::step(&st, input, &self.config).map(|t| {
                *st = t.state;
                t.effects
            })
        };
        match stepped {
            Ok(effects) => {
                self.apply(effects);
                Ok(())
            }
            Err(e) => {
                self.reject(&e);
                Err(e)
            }
        }
    }

    /// Claim the turn for the calling thread, waiting for any other thread
    /// to finish. Returns `None` after queueing `input` when the caller
    /// already holds the turn.
    fn take_turn(&self, input: Input) -> Option<TurnGuard<'_>> {
        let me = thread::current().id();
        let mut turn = self.lock_turn();
        loop {
            match turn.owner {
                None => {
                    turn.owner = Some(me);
                    return Some(TurnGuard { ctrl: self });
                }
                Some(owner) if owner == me => {
                    turn.deferred.push_back(input);
                    return None;
                }
                Some(_) => {
                    turn = self
                        .turn_free
                        .wait(turn)
                        .unwrap_or_else(|e| e.into_inner());
                }
            }
        }
    }

    /// Run whatever was queued during the turn, then hand the turn over.
    fn end_turn(&self) {
        loop {
            let next = {
                let mut turn = self.lock_turn();
                match turn.deferred.pop_front() {
                    Some(input) if !thread::panicking() => input,
                    _ => {
                        turn.deferred.clear();
                        turn.owner = None;
                        break;
                    }
                }
            };
            if let Err(e) = self.process(next) {
                debug!(error = %e, "queued input rejected");
            }
        }
        self.turn_free.notify_one();
    }

    fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Render => self.render(),
                Effect::StartTimer {
                    timer,
                    delay,
                    generation,
                } => {
                    let this = self.this.clone();
                    self.clock.schedule(
                        delay,
                        Box::new(move || {
                            let Some(ctrl) = this.upgrade() else {
                                return;
                            };
                            if let Err(e) = ctrl.handle(Input::TimerFired { timer, generation }) {
                                warn!(?timer, error = %e, "timer input failed");
                            }
                        }),
                    );
                }
                Effect::Command(Command::MoveTo(floor)) => {
                    info!(floor, "dispatching car");
                    self.send(Channel::CtrlMoveTo, Payload::Floor(floor));
                }
                Effect::Command(Command::Stop) => {
                    warn!("halting car");
                    self.send(Channel::CtrlStop, Payload::Empty);
                }
            }
        }
    }

    fn render(&self) {
        let snap = self.snapshot();
        for panel in self.panels() {
            panel.render(&snap);
        }
    }

    fn reject(&self, e: &LiftError) {
        if let Some(denial) = e.denial() {
            self.refuse(denial);
        }
    }

    fn refuse(&self, denial: Denial) {
        warn!(floor = denial.floor, reason = %denial.reason, "request denied");
        self.send(Channel::RequestDenied, Payload::Denial(denial));
        for panel in self.panels() {
            panel.request_denied(&denial);
        }
    }

    fn send(&self, channel: Channel, payload: Payload) {
        if let Err(e) = self.bus.publish(channel, payload) {
            warn!(?channel, error = %e, "publish failed");
        }
    }

    fn panels(&self) -> Vec<Arc<dyn Panel>> {
        self.panels.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn lock(&self) -> MutexGuard<'_, CarState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_turn(&self) -> MutexGuard<'_, Turn> {
        self.turn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Held while a thread owns the controller's turn.
struct TurnGuard<'a> {
    ctrl: &'a ElevatorController,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.ctrl.end_turn();
    }
}
