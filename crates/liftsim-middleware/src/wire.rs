//! Numeric topic catalogue and the typed ⇄ numeric codec.
//!
//! Device firmware and panels on the networked bus speak in
//! `(category, instance)` topics with four-integer bodies. Most categories
//! are scoped by car id; hall calls and call-button resets are scoped by
//! floor.
//!
//! | Category | Name | Instance | Body |
//! |---|---|---|---|
//! | 0 | [`CAR_REQUEST`] | floor | `[2]` up, `[1]` down |
//! | 1 | [`ELEVATOR_POSITION`] | car | `[floor, aligned, arrived]` |
//! | 2 | [`ELEVATOR_DIRECTION`] | car | `[0 idle, 1 down, 2 up]` |
//! | 3 | [`ELEVATOR_DOOR`] | car | `[door code]` |
//! | 4 | [`ELEVATOR_OVERWEIGHT`] | car | `[0/1]` |
//! | 5 | [`FIRE_ALARM`] | car | `[0/1]` |
//! | 6 | [`FIRE_KEY`] | car | `[0/1]` |
//! | 7 | [`ELEVATOR_MODE`] | car | `[0 normal, 1 fire recall]` |
//! | 8 | [`FLOOR_SELECT`] | car | `[floor]` |
//! | 9 | [`DOOR_COMMAND`] | car | `[0 open, 1 close]` |
//! | 10 | [`MOTOR_COMMAND`] | car | `[0]` stop, `[1, floor]` move |
//! | 11 | [`CABIN_BUTTON_RESET`] | car | `[floor]` |
//! | 12 | [`CALL_BUTTON_RESET`] | floor | `[2]` up, `[1]` down |
//! | 14 | [`DOOR_OBSTRUCTION`] | car | `[0/1]` |
//! | 15 | [`CLEAR_REQUESTS`] | car | `[0]` |
//! | 16 | [`REQUEST_DENIED`] | car | `[floor, reason]` |
//!
//! Categories 2, 3, 5, 7, 9, 11 and 12 are display outputs with no typed
//! event counterpart; [`decode`] rejects them.

use std::ops::RangeInclusive;

use liftsim_types::{
    CallDirection, Channel, Denial, DenialReason, Event, LiftError, Message, Payload, Topic,
};

pub const CAR_REQUEST: i32 = 0;
pub const ELEVATOR_POSITION: i32 = 1;
pub const ELEVATOR_DIRECTION: i32 = 2;
pub const ELEVATOR_DOOR: i32 = 3;
pub const ELEVATOR_OVERWEIGHT: i32 = 4;
pub const FIRE_ALARM: i32 = 5;
pub const FIRE_KEY: i32 = 6;
pub const ELEVATOR_MODE: i32 = 7;
pub const FLOOR_SELECT: i32 = 8;
pub const DOOR_COMMAND: i32 = 9;
pub const MOTOR_COMMAND: i32 = 10;
pub const CABIN_BUTTON_RESET: i32 = 11;
pub const CALL_BUTTON_RESET: i32 = 12;
pub const DOOR_OBSTRUCTION: i32 = 14;
pub const CLEAR_REQUESTS: i32 = 15;
pub const REQUEST_DENIED: i32 = 16;

pub const CALL_UP: i32 = 2;
pub const CALL_DOWN: i32 = 1;

pub const MOTOR_STOP: i32 = 0;
pub const MOTOR_MOVE: i32 = 1;

pub const DOOR_OPEN_COMMAND: i32 = 0;
pub const DOOR_CLOSE_COMMAND: i32 = 1;

pub const MODE_NORMAL: i32 = 0;
pub const MODE_FIRE: i32 = 1;

pub const fn call_code(direction: CallDirection) -> i32 {
    match direction {
        CallDirection::Up => CALL_UP,
        CallDirection::Down => CALL_DOWN,
    }
}

fn flag(b: bool) -> i32 {
    i32::from(b)
}

fn read_flag(message: &Message) -> Result<bool, LiftError> {
    match message.slot(0) {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(malformed(message, &format!("flag value {other}"))),
    }
}

fn malformed(message: &Message, what: &str) -> LiftError {
    LiftError::Codec(format!("{what} in {message}"))
}

/// Encode a typed event for car `car`.
///
/// # Errors
///
/// Returns [`LiftError::Codec`] when the payload does not fit the channel.
pub fn encode(event: &Event, car: i32) -> Result<Message, LiftError> {
    let mismatch = || {
        LiftError::Codec(format!(
            "payload {:?} does not fit channel {:?}",
            event.payload, event.channel
        ))
    };
    let floor = || event.payload.floor().ok_or_else(mismatch);
    let on = || event.payload.flag().ok_or_else(mismatch);

    let msg = match event.channel {
        Channel::HallCallUp => Message::new(Topic::new(CAR_REQUEST, floor()?), [CALL_UP, 0, 0, 0]),
        Channel::HallCallDown => {
            Message::new(Topic::new(CAR_REQUEST, floor()?), [CALL_DOWN, 0, 0, 0])
        }
        Channel::CabinSelect => Message::new(Topic::new(FLOOR_SELECT, car), [floor()?, 0, 0, 0]),
        Channel::FireToggled => Message::new(Topic::new(FIRE_KEY, car), [flag(on()?), 0, 0, 0]),
        Channel::OverloadToggled => {
            Message::new(Topic::new(ELEVATOR_OVERWEIGHT, car), [flag(on()?), 0, 0, 0])
        }
        Channel::ObstructToggled => {
            Message::new(Topic::new(DOOR_OBSTRUCTION, car), [flag(on()?), 0, 0, 0])
        }
        Channel::ClearAllRequests => Message::new(Topic::new(CLEAR_REQUESTS, car), [0; 4]),
        Channel::CtrlMoveTo => {
            Message::new(Topic::new(MOTOR_COMMAND, car), [MOTOR_MOVE, floor()?, 0, 0])
        }
        Channel::CtrlStop => Message::new(Topic::new(MOTOR_COMMAND, car), [MOTOR_STOP, 0, 0, 0]),
        Channel::SimFloorTick => {
            Message::new(Topic::new(ELEVATOR_POSITION, car), [floor()?, 1, 0, 0])
        }
        Channel::SimArrived => {
            Message::new(Topic::new(ELEVATOR_POSITION, car), [floor()?, 1, 1, 0])
        }
        Channel::RequestDenied => {
            let d = event.payload.denial().ok_or_else(mismatch)?;
            Message::new(
                Topic::new(REQUEST_DENIED, car),
                [d.floor, d.reason.code(), 0, 0],
            )
        }
    };
    Ok(msg)
}

/// Decode a numeric message into the typed event it carries.
///
/// # Errors
///
/// Returns [`LiftError::Codec`] for display-only or unknown categories and
/// for bodies that do not match the category's layout.
pub fn decode(message: &Message) -> Result<Event, LiftError> {
    let topic = message.topic();
    let event = match topic.category() {
        CAR_REQUEST => {
            let channel = match message.slot(0) {
                CALL_UP => Channel::HallCallUp,
                CALL_DOWN => Channel::HallCallDown,
                other => return Err(malformed(message, &format!("call direction {other}"))),
            };
            Event::new(channel, Payload::Floor(topic.instance()))
        }
        FLOOR_SELECT => Event::new(Channel::CabinSelect, Payload::Floor(message.slot(0))),
        FIRE_KEY => Event::new(Channel::FireToggled, Payload::Flag(read_flag(message)?)),
        ELEVATOR_OVERWEIGHT => {
            Event::new(Channel::OverloadToggled, Payload::Flag(read_flag(message)?))
        }
        DOOR_OBSTRUCTION => {
            Event::new(Channel::ObstructToggled, Payload::Flag(read_flag(message)?))
        }
        CLEAR_REQUESTS => Event::new(Channel::ClearAllRequests, Payload::Empty),
        MOTOR_COMMAND => match message.slot(0) {
            MOTOR_STOP => Event::new(Channel::CtrlStop, Payload::Empty),
            MOTOR_MOVE => Event::new(Channel::CtrlMoveTo, Payload::Floor(message.slot(1))),
            other => return Err(malformed(message, &format!("motor command {other}"))),
        },
        ELEVATOR_POSITION => {
            let floor = Payload::Floor(message.slot(0));
            if message.slot(2) == 1 {
                Event::new(Channel::SimArrived, floor)
            } else {
                Event::new(Channel::SimFloorTick, floor)
            }
        }
        REQUEST_DENIED => {
            let reason = DenialReason::from_code(message.slot(1))
                .ok_or_else(|| malformed(message, "denial reason"))?;
            Event::new(
                Channel::RequestDenied,
                Payload::Denial(Denial {
                    floor: message.slot(0),
                    reason,
                }),
            )
        }
        ELEVATOR_DIRECTION | ELEVATOR_DOOR | FIRE_ALARM | ELEVATOR_MODE | DOOR_COMMAND
        | CABIN_BUTTON_RESET | CALL_BUTTON_RESET => {
            return Err(LiftError::Codec(format!(
                "category {} is display-only",
                topic.category()
            )));
        }
        other => return Err(LiftError::Codec(format!("unknown category {other}"))),
    };
    Ok(event)
}

/// Numeric topics a typed channel travels on for car `car`.
///
/// Hall calls are floor-scoped, so they expand to one topic per floor.
pub fn topics_for(channel: Channel, car: i32, floors: &RangeInclusive<i32>) -> Vec<Topic> {
    let car_topic = |category| vec![Topic::new(category, car)];
    match channel {
        Channel::HallCallUp | Channel::HallCallDown => floors
            .clone()
            .map(|f| Topic::new(CAR_REQUEST, f))
            .collect(),
        Channel::CabinSelect => car_topic(FLOOR_SELECT),
        Channel::FireToggled => car_topic(FIRE_KEY),
        Channel::OverloadToggled => car_topic(ELEVATOR_OVERWEIGHT),
        Channel::ObstructToggled => car_topic(DOOR_OBSTRUCTION),
        Channel::ClearAllRequests => car_topic(CLEAR_REQUESTS),
        Channel::CtrlMoveTo | Channel::CtrlStop => car_topic(MOTOR_COMMAND),
        Channel::SimFloorTick | Channel::SimArrived => car_topic(ELEVATOR_POSITION),
        Channel::RequestDenied => car_topic(REQUEST_DENIED),
    }
}
