//! `liftsim-middleware` – message plumbing and time.
//!
//! Moves events between the panels, the dispatch controller and the motion
//! simulator without caring what they mean.
//!
//! # Modules
//!
//! - [`bus`] – the [`EventBus`] capability and the in-process [`LocalBus`].
//! - [`net`] – the networked numeric bus with bind-or-connect hub election.
//! - [`wire`] – numeric topic catalogue and typed ⇄ numeric codec.
//! - [`bridge`] – [`NetEventBus`], the typed bus carried over [`NetBus`].
//! - [`clock`] – injectable time source for timers and ticks.

pub mod bridge;
pub mod bus;
pub mod clock;
pub mod net;
pub mod wire;

pub use bridge::NetEventBus;
pub use bus::{EventBus, Handler, LocalBus, handler};
pub use clock::{Clock, ManualClock, Task, TokioClock};
pub use net::{BusRole, DEFAULT_PORT, NetBus};
