//! `liftsim-hal` – the car's motion hardware, simulated.
//!
//! - [`actuator`] – the [`Actuator`] command contract and bus wiring.
//! - [`sim`] – [`MotionSimulator`], one floor per tick.

pub mod actuator;
pub mod sim;

pub use actuator::{Actuator, attach_actuator};
pub use sim::{MotionSimulator, SimSnapshot, SimulatorConfig};
