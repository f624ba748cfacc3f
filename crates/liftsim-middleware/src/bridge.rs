//! Typed [`EventBus`] carried over the networked numeric bus.
//!
//! [`NetEventBus`] lets the controller, simulator and panels run unchanged
//! across processes: publishing encodes through the [`wire`](crate::wire)
//! catalogue and sends via the hub, and a pump task decodes every inbound
//! frame and fans it out to local handlers in arrival order.

use std::ops::RangeInclusive;
use std::sync::Arc;

use liftsim_types::{Channel, Event, LiftError, Payload};
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::bus::{EventBus, Handler, LocalBus};
use crate::net::NetBus;
use crate::wire;

/// Network-backed implementation of [`EventBus`] for a single car.
pub struct NetEventBus {
    net: Arc<NetBus>,
    car: i32,
    floors: RangeInclusive<i32>,
    local: Arc<LocalBus>,
    pump: JoinHandle<()>,
}

impl NetEventBus {
    /// Bridge `net` for car `car` in a building spanning `floors`.
    ///
    /// Must be called from within a Tokio runtime; the pump task runs there.
    pub fn spawn(net: Arc<NetBus>, car: i32, floors: RangeInclusive<i32>) -> Self {
        let local = Arc::new(LocalBus::new());
        let pump = tokio::spawn(pump(Arc::clone(&net), Arc::clone(&local), car));
        Self {
            net,
            car,
            floors,
            local,
            pump,
        }
    }

    pub fn net(&self) -> &Arc<NetBus> {
        &self.net
    }
}

async fn pump(net: Arc<NetBus>, local: Arc<LocalBus>, car: i32) {
    loop {
        match net.recv().await {
            Ok(message) => match wire::decode(&message) {
                Ok(event) => local.deliver(&event),
                Err(e) => warn!(car, error = %e, "undecodable bus frame"),
            },
            Err(e) => {
                error!(car, error = %e, "bus link lost, event pump stopped");
                return;
            }
        }
    }
}

impl EventBus for NetEventBus {
    fn subscribe(&self, channel: Channel, handler: Handler) {
        for topic in wire::topics_for(channel, self.car, &self.floors) {
            self.net.subscribe(topic);
        }
        self.local.subscribe(channel, handler);
    }

    fn publish(&self, channel: Channel, payload: Payload) -> Result<(), LiftError> {
        let message = wire::encode(&Event::new(channel, payload), self.car)?;
        self.net.publish(message)
    }
}

impl Drop for NetEventBus {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
