//! Networked numeric bus with bind-or-connect hub election.
//!
//! The first process to bind the bus port becomes the **hub**: it accepts
//! clients and forwards every frame it receives to every connected client,
//! the sender included. The hub process reaches its own bus through a
//! loopback client, so it takes the same path as every remote process.
//! Every later process finds the port taken and joins as a **client**.
//!
//! ```text
//!   client A ──publish──▶ ┌─────┐ ──▶ client A (own copy)
//!                         │ hub │ ──▶ client B
//!   client B ──publish──▶ └─────┘ ──▶ hub loopback client
//! ```
//!
//! Frames are one JSON-encoded [`Message`] per line. Each client filters
//! inbound frames against its own subscription set and queues the matches;
//! [`NetBus::get_message`] removes the oldest queued frame for a topic.
//!
//! The hub gives each client its own bounded outbox and writer task. A
//! client that stops reading fills its outbox and is disconnected; it never
//! delays delivery to the others.
//!
//! The link is never re-established. Once it fails, every later call
//! returns [`LiftError::Transport`].

use std::collections::{HashSet, VecDeque};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use liftsim_types::{LiftError, Message, Topic};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, mpsc};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Well-known bus port.
pub const DEFAULT_PORT: u16 = 1234;

/// Outcome of [`NetBus::bind_or_connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusRole {
    /// This process bound the port and distributes traffic.
    Hub,
    /// Another process owns the port; this one is a plain client.
    Client,
}

// ────────────────────────────────────────────────────────────────────────────
// Client-side inbox
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Inbox {
    queue: VecDeque<Message>,
    subscriptions: HashSet<Topic>,
    fault: Option<LiftError>,
}

#[derive(Default)]
struct Shared {
    inbox: Mutex<Inbox>,
    arrived: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inbox> {
        self.inbox.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn offer(&self, message: Message) {
        let queued = {
            let mut inbox = self.lock();
            if inbox.subscriptions.contains(&message.topic()) {
                inbox.queue.push_back(message);
                true
            } else {
                false
            }
        };
        if queued {
            self.arrived.notify_waiters();
        }
    }

    /// Record the first fatal link error. Later errors are consequences of it.
    fn fail(&self, err: LiftError) {
        {
            let mut inbox = self.lock();
            if inbox.fault.is_none() {
                inbox.fault = Some(err);
            }
        }
        self.arrived.notify_waiters();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// NetBus
// ────────────────────────────────────────────────────────────────────────────

/// One process's connection to the networked bus.
pub struct NetBus {
    node_id: Uuid,
    role: BusRole,
    hub_addr: SocketAddr,
    outbound: mpsc::UnboundedSender<String>,
    shared: Arc<Shared>,
    tasks: Vec<JoinHandle<()>>,
    hub: Option<Hub>,
}

impl NetBus {
    /// Become the hub on `addr`, or join the existing hub if the port is
    /// already bound.
    ///
    /// Binding port 0 yields an ephemeral hub; read the chosen address back
    /// with [`hub_addr`](Self::hub_addr).
    ///
    /// # Errors
    ///
    /// Returns [`LiftError::Transport`] if binding fails for any reason other
    /// than the address being in use, or if the connection to the hub
    /// cannot be established.
    pub async fn bind_or_connect(addr: SocketAddr) -> Result<Self, LiftError> {
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                let hub_addr = listener.local_addr()?;
                info!(addr = %hub_addr, "bus port bound, acting as hub");
                let hub = Hub::default();
                let accept = tokio::spawn(hub.clone().serve(listener));
                match Self::open(hub_addr, BusRole::Hub).await {
                    Ok(mut bus) => {
                        bus.tasks.push(accept);
                        bus.hub = Some(hub);
                        Ok(bus)
                    }
                    Err(e) => {
                        accept.abort();
                        hub.shutdown();
                        Err(e)
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                info!(addr = %addr, "bus port in use, joining as client");
                Self::open(addr, BusRole::Client).await
            }
            Err(e) => Err(LiftError::Transport(format!("bind {addr}: {e}"))),
        }
    }

    /// Join an existing hub without trying to bind.
    ///
    /// # Errors
    ///
    /// Returns [`LiftError::Transport`] if the hub is unreachable.
    pub async fn connect(addr: SocketAddr) -> Result<Self, LiftError> {
        Self::open(addr, BusRole::Client).await
    }

    async fn open(addr: SocketAddr, role: BusRole) -> Result<Self, LiftError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| LiftError::Transport(format!("connect {addr}: {e}")))?;
        stream.set_nodelay(true)?;
        let (read, write) = stream.into_split();

        let node_id = Uuid::new_v4();
        let shared = Arc::new(Shared::default());
        let (outbound, rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(write_loop(write, rx, Arc::clone(&shared)));
        let drain = tokio::spawn(drain_loop(read, Arc::clone(&shared), node_id));
        debug!(node = %node_id, ?role, hub = %addr, "bus link established");

        Ok(Self {
            node_id,
            role,
            hub_addr: addr,
            outbound,
            shared,
            tasks: vec![writer, drain],
            hub: None,
        })
    }

    pub fn role(&self) -> BusRole {
        self.role
    }

    pub fn node_id(&self) -> Uuid {
        self.node_id
    }

    /// Address of the hub this bus is connected to.
    pub fn hub_addr(&self) -> SocketAddr {
        self.hub_addr
    }

    /// The fatal link error, once one has occurred.
    pub fn link_error(&self) -> Option<LiftError> {
        self.shared.lock().fault.clone()
    }

    /// Add `topic` to the local filter. Nothing is sent to the hub.
    pub fn subscribe(&self, topic: Topic) {
        self.shared.lock().subscriptions.insert(topic);
    }

    /// Send `message` to the hub for distribution to every client.
    ///
    /// # Errors
    ///
    /// Returns [`LiftError::Transport`] after the link has failed.
    pub fn publish(&self, message: Message) -> Result<(), LiftError> {
        self.check_link()?;
        let mut line =
            serde_json::to_string(&message).map_err(|e| LiftError::Codec(e.to_string()))?;
        line.push('\n');
        self.outbound
            .send(line)
            .map_err(|_| LiftError::Transport("bus writer stopped".to_string()))
    }

    /// Remove and return the oldest queued message on `topic`, if any.
    /// Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`LiftError::Transport`] after the link has failed.
    pub fn get_message(&self, topic: Topic) -> Result<Option<Message>, LiftError> {
        let mut inbox = self.shared.lock();
        if let Some(e) = &inbox.fault {
            return Err(e.clone());
        }
        let pos = inbox.queue.iter().position(|m| m.topic() == topic);
        Ok(pos.and_then(|i| inbox.queue.remove(i)))
    }

    /// Remove and return the oldest queued message on any subscribed topic.
    ///
    /// # Errors
    ///
    /// Returns [`LiftError::Transport`] after the link has failed.
    pub fn next_message(&self) -> Result<Option<Message>, LiftError> {
        let mut inbox = self.shared.lock();
        if let Some(e) = &inbox.fault {
            return Err(e.clone());
        }
        Ok(inbox.queue.pop_front())
    }

    /// Wait for the next queued message on any subscribed topic.
    ///
    /// # Errors
    ///
    /// Returns [`LiftError::Transport`] once the link has failed.
    pub async fn recv(&self) -> Result<Message, LiftError> {
        loop {
            // Registered before the check so a wakeup in between is not lost.
            let arrived = self.shared.arrived.notified();
            if let Some(message) = self.next_message()? {
                return Ok(message);
            }
            arrived.await;
        }
    }

    /// Number of queued, not yet consumed messages.
    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }

    fn check_link(&self) -> Result<(), LiftError> {
        match &self.shared.lock().fault {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

impl Drop for NetBus {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        if let Some(hub) = &self.hub {
            hub.shutdown();
        }
    }
}

async fn write_loop(
    mut write: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<String>,
    shared: Arc<Shared>,
) {
    while let Some(line) = rx.recv().await {
        if let Err(e) = write.write_all(line.as_bytes()).await {
            error!(error = %e, "bus write failed");
            shared.fail(LiftError::Transport(format!("write to hub: {e}")));
            return;
        }
    }
}

async fn drain_loop(read: OwnedReadHalf, shared: Arc<Shared>, node: Uuid) {
    let mut lines = BufReader::new(read).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match serde_json::from_str::<Message>(&line) {
                Ok(message) => shared.offer(message),
                Err(e) => warn!(node = %node, error = %e, "discarding malformed bus frame"),
            },
            Ok(None) => {
                error!(node = %node, "hub closed the bus link");
                shared.fail(LiftError::Transport("hub closed the connection".to_string()));
                return;
            }
            Err(e) => {
                error!(node = %node, error = %e, "bus read failed");
                shared.fail(LiftError::Transport(format!("read from hub: {e}")));
                return;
            }
        }
    }
}

/// Hub-side writer for one client. Ends when the socket fails or the hub
/// drops the client.
async fn feed_client(
    mut write: OwnedWriteHalf,
    mut rx: mpsc::Receiver<Arc<str>>,
    peer: SocketAddr,
) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = write.write_all(frame.as_bytes()).await {
            warn!(peer = %peer, error = %e, "bus client write failed");
            return;
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Hub
// ────────────────────────────────────────────────────────────────────────────

/// Frames a hub client may have queued before it counts as stalled.
const CLIENT_BACKLOG: usize = 1024;

/// Hub-side handle on one connected client.
struct ClientLink {
    id: u64,
    peer: SocketAddr,
    outbox: mpsc::Sender<Arc<str>>,
    writer: AbortHandle,
}

impl Drop for ClientLink {
    fn drop(&mut self) {
        self.writer.abort();
    }
}

/// Fan-out state shared by the accept loop and every relay task.
#[derive(Clone, Default)]
struct Hub {
    clients: Arc<Mutex<Vec<ClientLink>>>,
    relays: Arc<Mutex<Vec<JoinHandle<()>>>>,
    next_id: Arc<AtomicU64>,
}

impl Hub {
    async fn serve(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(peer = %peer, error = %e, "could not disable nagle");
                    }
                    let (read, write) = stream.into_split();
                    let (outbox, rx) = mpsc::channel(CLIENT_BACKLOG);
                    let writer = tokio::spawn(feed_client(write, rx, peer));
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    // Registered before its reader starts, so a client always
                    // receives its own first frame.
                    let count = {
                        let mut clients = self.lock_clients();
                        clients.push(ClientLink {
                            id,
                            peer,
                            outbox,
                            writer: writer.abort_handle(),
                        });
                        clients.len()
                    };
                    info!(peer = %peer, clients = count, "bus client connected");

                    let hub = self.clone();
                    let relay = tokio::spawn(async move { hub.relay(read, id, peer).await });
                    self.relays
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push(relay);
                }
                Err(e) => error!(error = %e, "bus accept failed"),
            }
        }
    }

    async fn relay(&self, read: OwnedReadHalf, id: u64, peer: SocketAddr) {
        let mut lines = BufReader::new(read).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Err(e) = serde_json::from_str::<Message>(&line) {
                        warn!(peer = %peer, error = %e, "dropping malformed frame");
                        continue;
                    }
                    self.broadcast(&line);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "bus client read failed");
                    break;
                }
            }
        }
        self.remove(id);
        info!(peer = %peer, "bus client disconnected");
    }

    /// Queue `line` for every client. Never waits on a socket: a client
    /// whose backlog is full or whose writer has stopped is disconnected.
    fn broadcast(&self, line: &str) {
        let frame: Arc<str> = Arc::from(format!("{line}\n"));
        self.lock_clients()
            .retain(|link| match link.outbox.try_send(Arc::clone(&frame)) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        peer = %link.peer,
                        backlog = CLIENT_BACKLOG,
                        "dropping stalled bus client"
                    );
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    warn!(peer = %link.peer, "dropping unreachable bus client");
                    false
                }
            });
    }

    fn remove(&self, id: u64) {
        self.lock_clients().retain(|c| c.id != id);
    }

    fn shutdown(&self) {
        for relay in self.relays.lock().unwrap_or_else(|e| e.into_inner()).drain(..) {
            relay.abort();
        }
        self.lock_clients().clear();
    }

    fn lock_clients(&self) -> MutexGuard<'_, Vec<ClientLink>> {
        self.clients.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
