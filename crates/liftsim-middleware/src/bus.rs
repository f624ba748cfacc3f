//! Typed, channel-based publish/subscribe event bus.
//!
//! Components talk to each other through the [`EventBus`] trait and never
//! through a concrete transport, so the same controller and simulator code
//! runs over an in-process [`LocalBus`] or over the networked hub via
//! [`NetEventBus`](crate::bridge::NetEventBus).
//!
//! # Delivery contract
//!
//! | Property | Guarantee |
//! |---|---|
//! | Ordering | Handlers run in registration order |
//! | Threading | `LocalBus` delivers on the publisher's thread before `publish` returns |
//! | Duplicates | Registering a handler twice delivers every event twice |
//! | No subscribers | `publish` is a silent no-op |
//! | Handler panics | Not caught; later handlers are skipped |

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use liftsim_types::{Channel, Event, LiftError, Payload};
use tracing::trace;

/// Subscriber callback. Handlers are shared so a delivery pass can run
/// without holding the routing table lock.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Capability shared by every typed bus transport.
pub trait EventBus: Send + Sync {
    /// Register `handler` for every future event on `channel`.
    fn subscribe(&self, channel: Channel, handler: Handler);

    /// Deliver `payload` to every handler registered on `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`LiftError::Transport`] when a networked transport has lost
    /// its link. The in-process bus never fails.
    fn publish(&self, channel: Channel, payload: Payload) -> Result<(), LiftError>;
}

/// In-process bus with synchronous, in-order fan-out.
#[derive(Default)]
pub struct LocalBus {
    routes: RwLock<HashMap<Channel, Vec<Handler>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handlers currently registered on `channel`.
    pub fn subscriber_count(&self, channel: Channel) -> usize {
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        routes.get(&channel).map_or(0, Vec::len)
    }

    /// Synchronous delivery used by both `publish` and the network bridge's
    /// pump task.
    pub(crate) fn deliver(&self, event: &Event) {
        // Snapshot so handlers may publish or subscribe re-entrantly.
        let handlers: Vec<Handler> = {
            let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
            match routes.get(&event.channel) {
                Some(list) => list.clone(),
                None => return,
            }
        };
        trace!(channel = ?event.channel, handlers = handlers.len(), "delivering event");
        for h in &handlers {
            h(event);
        }
    }
}

impl EventBus for LocalBus {
    fn subscribe(&self, channel: Channel, handler: Handler) {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        routes.entry(channel).or_default().push(handler);
    }

    fn publish(&self, channel: Channel, payload: Payload) -> Result<(), LiftError> {
        self.deliver(&Event::new(channel, payload));
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
