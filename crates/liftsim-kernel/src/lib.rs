//! `liftsim-kernel` – Dispatch & Safety
//!
//! Decides where the car goes and when its doors move. It never touches
//! the motor directly; it publishes commands and enforces the rules.
//!
//! # Modules
//!
//! - [`policy`] – the pure dispatch state machine:
//!   [`step`][policy::step] maps a [`CarState`][policy::CarState] and an
//!   [`Input`][policy::Input] to the next state plus effects. Covers
//!   nearest-request scheduling, the door cycle, fire recall and the
//!   overload/obstruction interlock.
//! - [`validator`] – [`RequestValidator`][validator::RequestValidator]:
//!   a rule engine that rejects requests for floors outside the building
//!   and impossible hall-call directions.
//! - [`controller`] – [`ElevatorController`][controller::ElevatorController]:
//!   wires validation and policy to the bus, the clock and the
//!   [`Panel`][controller::Panel]s.

pub mod controller;
pub mod policy;
pub mod validator;

pub use controller::{ElevatorController, Panel};
pub use policy::{CarState, Input, Interlock, Motion, PolicyConfig};
pub use validator::{FloorRangeRule, HallDirectionRule, RequestValidator, Rule};
