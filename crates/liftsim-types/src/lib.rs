use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of integer slots carried by every numeric [`Message`].
pub const BODY_LEN: usize = 4;

// ────────────────────────────────────────────────────────────────────────────
// Numeric bus addressing
// ────────────────────────────────────────────────────────────────────────────

/// Two-integer address of a logical channel on the numeric bus, e.g.
/// "door state of car 2" is `Topic::new(3, 2)`.
///
/// Equality and hashing are structural, so a `Topic` built anywhere compares
/// equal to the catalogue constant with the same fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Topic {
    category: i32,
    instance: i32,
}

impl Topic {
    pub const fn new(category: i32, instance: i32) -> Self {
        Self { category, instance }
    }

    pub const fn category(&self) -> i32 {
        self.category
    }

    pub const fn instance(&self) -> i32 {
        self.instance
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.category, self.instance)
    }
}

/// Immutable envelope on the numeric bus: a [`Topic`] plus a fixed
/// [`BODY_LEN`]-slot integer body. Unused slots are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    topic: Topic,
    body: [i32; BODY_LEN],
}

impl Message {
    pub const fn new(topic: Topic, body: [i32; BODY_LEN]) -> Self {
        Self { topic, body }
    }

    pub const fn topic(&self) -> Topic {
        self.topic
    }

    pub const fn body(&self) -> [i32; BODY_LEN] {
        self.body
    }

    /// Body slot `index` (0-based). Out-of-range indices read as zero.
    pub fn slot(&self, index: usize) -> i32 {
        self.body.get(index).copied().unwrap_or(0)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "topic {} body {:?}", self.topic, self.body)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Typed bus
// ────────────────────────────────────────────────────────────────────────────

/// Enumerated topics of the typed in-process bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    /// Lobby "up" button pressed. Payload: `Floor`.
    HallCallUp,
    /// Lobby "down" button pressed. Payload: `Floor`.
    HallCallDown,
    /// Cabin floor button pressed. Payload: `Floor`.
    CabinSelect,
    /// Fire key turned on/off. Payload: `Flag`.
    FireToggled,
    /// Load sensor over/under the limit. Payload: `Flag`.
    OverloadToggled,
    /// Door beam blocked/cleared. Payload: `Flag`.
    ObstructToggled,
    /// Operator wiped all outstanding requests. Payload: `Empty`.
    ClearAllRequests,
    /// Controller → actuator: travel to a floor. Payload: `Floor`.
    CtrlMoveTo,
    /// Controller → actuator: halt without completing the move. Payload: `Empty`.
    CtrlStop,
    /// Actuator → controller: car passed or reached a floor. Payload: `Floor`.
    SimFloorTick,
    /// Actuator → controller: car came to rest at a target. Payload: `Floor`.
    SimArrived,
    /// Controller → panels: a request was refused. Payload: `Denial`.
    RequestDenied,
}

impl Channel {
    pub const ALL: [Channel; 12] = [
        Channel::HallCallUp,
        Channel::HallCallDown,
        Channel::CabinSelect,
        Channel::FireToggled,
        Channel::OverloadToggled,
        Channel::ObstructToggled,
        Channel::ClearAllRequests,
        Channel::CtrlMoveTo,
        Channel::CtrlStop,
        Channel::SimFloorTick,
        Channel::SimArrived,
        Channel::RequestDenied,
    ];
}

/// Payload carried by a typed [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Empty,
    Floor(i32),
    Flag(bool),
    Denial(Denial),
}

impl Payload {
    pub fn floor(&self) -> Option<i32> {
        match self {
            Payload::Floor(f) => Some(*f),
            _ => None,
        }
    }

    pub fn flag(&self) -> Option<bool> {
        match self {
            Payload::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn denial(&self) -> Option<Denial> {
        match self {
            Payload::Denial(d) => Some(*d),
            _ => None,
        }
    }
}

/// Event object handed to typed-bus subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub channel: Channel,
    pub payload: Payload,
}

impl Event {
    pub const fn new(channel: Channel, payload: Payload) -> Self {
        Self { channel, payload }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Car vocabulary
// ────────────────────────────────────────────────────────────────────────────

/// Door sub-state of the car. Exactly one holds at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DoorState {
    Open,
    #[default]
    Closed,
    Opening,
    Closing,
    Obstructed,
}

impl DoorState {
    /// Integer code used for this state on the numeric bus.
    pub const fn wire_code(self) -> i32 {
        match self {
            DoorState::Open => 0,
            DoorState::Closed => 1,
            DoorState::Opening => 2,
            DoorState::Closing => 3,
            DoorState::Obstructed => 4,
        }
    }
}

impl fmt::Display for DoorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DoorState::Open => "OPEN",
            DoorState::Closed => "CLOSED",
            DoorState::Opening => "OPENING",
            DoorState::Closing => "CLOSING",
            DoorState::Obstructed => "OBSTRUCTED",
        };
        f.write_str(s)
    }
}

/// Travel direction shown on the cabin display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Direction {
    Up,
    Down,
    #[default]
    Idle,
}

impl Direction {
    pub const fn wire_code(self) -> i32 {
        match self {
            Direction::Idle => 0,
            Direction::Down => 1,
            Direction::Up => 2,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Idle => "IDLE",
        };
        f.write_str(s)
    }
}

/// Direction requested by a lobby hall-call button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallDirection {
    Up,
    Down,
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallDirection::Up => f.write_str("up"),
            CallDirection::Down => f.write_str("down"),
        }
    }
}

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DenialReason {
    FireMode,
    Overloaded,
    Obstructed,
    OutOfRange,
    InvalidDirection,
    /// Payload did not fit the channel it arrived on.
    Malformed,
}

impl DenialReason {
    pub const fn code(self) -> i32 {
        match self {
            DenialReason::FireMode => 1,
            DenialReason::Overloaded => 2,
            DenialReason::Obstructed => 3,
            DenialReason::OutOfRange => 4,
            DenialReason::InvalidDirection => 5,
            DenialReason::Malformed => 6,
        }
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(DenialReason::FireMode),
            2 => Some(DenialReason::Overloaded),
            3 => Some(DenialReason::Obstructed),
            4 => Some(DenialReason::OutOfRange),
            5 => Some(DenialReason::InvalidDirection),
            6 => Some(DenialReason::Malformed),
            _ => None,
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DenialReason::FireMode => "fire recall active",
            DenialReason::Overloaded => "car overloaded",
            DenialReason::Obstructed => "door obstructed",
            DenialReason::OutOfRange => "floor out of range",
            DenialReason::InvalidDirection => "no such hall direction",
            DenialReason::Malformed => "malformed request",
        };
        f.write_str(s)
    }
}

/// Negative acknowledgment for a refused request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Denial {
    pub floor: i32,
    pub reason: DenialReason,
}

/// Display state pushed to every panel on each controller state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PanelSnapshot {
    pub current_floor: i32,
    pub target_floor: i32,
    pub direction: Direction,
    pub door: DoorState,
    pub fire_mode: bool,
    pub moving: bool,
    pub hall_up: Vec<i32>,
    pub hall_down: Vec<i32>,
    pub cabin: Vec<i32>,
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type shared by every LiftSim crate.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiftError {
    #[error("Request for floor {floor} denied: {reason}")]
    RequestDenied { floor: i32, reason: DenialReason },

    #[error("Floor {floor} outside the building range [{lowest}, {highest}]")]
    InvalidFloor { floor: i32, lowest: i32, highest: i32 },

    #[error("Floor {floor} has no {direction} hall call")]
    InvalidDirection { floor: i32, direction: CallDirection },

    #[error("Malformed {channel:?} event")]
    MalformedInput { channel: Channel, floor: i32 },

    #[error("Bus transport failure: {0}")]
    Transport(String),

    #[error("Wire codec error: {0}")]
    Codec(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LiftError {
    /// The negative acknowledgment this error represents, if it is a refusal
    /// of a floor request rather than an infrastructure failure.
    pub fn denial(&self) -> Option<Denial> {
        match self {
            LiftError::RequestDenied { floor, reason } => Some(Denial {
                floor: *floor,
                reason: *reason,
            }),
            LiftError::InvalidFloor { floor, .. } => Some(Denial {
                floor: *floor,
                reason: DenialReason::OutOfRange,
            }),
            LiftError::InvalidDirection { floor, .. } => Some(Denial {
                floor: *floor,
                reason: DenialReason::InvalidDirection,
            }),
            LiftError::MalformedInput { floor, .. } => Some(Denial {
                floor: *floor,
                reason: DenialReason::Malformed,
            }),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LiftError {
    fn from(e: std::io::Error) -> Self {
        LiftError::Io(e.to_string())
    }
}
