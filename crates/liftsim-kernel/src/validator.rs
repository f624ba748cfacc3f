//! [`RequestValidator`] – boundary checks for panel requests.
//!
//! Every [`Input`] is passed through [`RequestValidator::validate`] before it
//! reaches the dispatch policy. Rules run in insertion order; the first
//! violation is returned and the input never touches car state.
//!
//! Two built-in rules are provided:
//! - [`FloorRangeRule`] – rejects hall calls and cabin selections outside
//!   the building.
//! - [`HallDirectionRule`] – rejects an "up" call at the top floor and a
//!   "down" call at the bottom floor.

use liftsim_types::{CallDirection, LiftError};
use tracing::debug;

use crate::policy::{Input, PolicyConfig};

/// A single condition an input must satisfy.
pub trait Rule: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &str;

    fn check(&self, input: &Input) -> Result<(), LiftError>;
}

/// Rule engine applied to every controller input.
///
/// ```
/// use liftsim_kernel::policy::{Input, PolicyConfig};
/// use liftsim_kernel::validator::RequestValidator;
///
/// let validator = RequestValidator::for_building(&PolicyConfig::default());
/// assert!(validator.validate(&Input::CabinSelect(4)).is_ok());
/// assert!(validator.validate(&Input::CabinSelect(42)).is_err());
/// ```
#[derive(Default)]
pub struct RequestValidator {
    rules: Vec<Box<dyn Rule>>,
}

impl RequestValidator {
    /// Empty validator that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validator with the built-in rules for the building in `cfg`.
    pub fn for_building(cfg: &PolicyConfig) -> Self {
        let mut v = Self::new();
        v.add_rule(Box::new(FloorRangeRule {
            lowest: cfg.lowest_floor,
            highest: cfg.highest_floor,
        }));
        v.add_rule(Box::new(HallDirectionRule {
            lowest: cfg.lowest_floor,
            highest: cfg.highest_floor,
        }));
        v
    }

    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    /// Run every rule against `input`, returning the first violation.
    pub fn validate(&self, input: &Input) -> Result<(), LiftError> {
        for rule in &self.rules {
            if let Err(e) = rule.check(input) {
                debug!(rule = rule.name(), error = %e, "request rejected");
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Floor of a panel request, if `input` is one.
fn requested_floor(input: &Input) -> Option<i32> {
    match input {
        Input::HallCall { floor, .. } | Input::CabinSelect(floor) => Some(*floor),
        _ => None,
    }
}

pub struct FloorRangeRule {
    pub lowest: i32,
    pub highest: i32,
}

impl Rule for FloorRangeRule {
    fn name(&self) -> &str {
        "floor_range"
    }

    fn check(&self, input: &Input) -> Result<(), LiftError> {
        match requested_floor(input) {
            Some(floor) if floor < self.lowest || floor > self.highest => {
                Err(LiftError::InvalidFloor {
                    floor,
                    lowest: self.lowest,
                    highest: self.highest,
                })
            }
            _ => Ok(()),
        }
    }
}

pub struct HallDirectionRule {
    pub lowest: i32,
    pub highest: i32,
}

impl Rule for HallDirectionRule {
    fn name(&self) -> &str {
        "hall_direction"
    }

    fn check(&self, input: &Input) -> Result<(), LiftError> {
        match *input {
            Input::HallCall {
                floor,
                direction: CallDirection::Up,
            } if floor == self.highest => Err(LiftError::InvalidDirection {
                floor,
                direction: CallDirection::Up,
            }),
            Input::HallCall {
                floor,
                direction: CallDirection::Down,
            } if floor == self.lowest => Err(LiftError::InvalidDirection {
                floor,
                direction: CallDirection::Down,
            }),
            _ => Ok(()),
        }
    }
}
