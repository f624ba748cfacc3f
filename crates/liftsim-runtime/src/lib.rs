//! `liftsim-runtime` – process assembly
//!
//! Puts the bus, controller, simulator and panels together and sets up
//! logging.
//!
//! # Modules
//!
//! - [`system`] – [`ElevatorSystem`][system::ElevatorSystem]: builds one
//!   process's components on a local or networked bus according to its
//!   [`NodeRole`][system::NodeRole].
//! - [`panels`] – [`TracingPanel`][panels::TracingPanel] for the log and
//!   [`WirePanel`][panels::WirePanel], which mirrors display state onto the
//!   numeric bus for device firmware.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs
//!   the global `tracing` subscriber with an optional OTLP span exporter.

pub mod panels;
pub mod system;
pub mod telemetry;

pub use panels::{MessageSink, TracingPanel, WirePanel};
pub use system::{ElevatorSystem, NodeRole, SystemConfig, Transport};
pub use telemetry::{TracerProviderGuard, init_tracing};
