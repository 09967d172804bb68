// Differential-drive kinematics
// Converts a normalized (linear, angular) steering command into a direction and an
// open-loop duty for each side. No wheel geometry: duty is the speed proxy.

use crate::config::PWM_DUTY_CEILING;
use crate::error::ControlError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    Stopped,
}

/// Per-side actuation for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelCommand {
    pub side: Side,
    pub direction: Direction,
    pub duty: u16,
}

/// Both sides' actuation for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveOutput {
    pub left: WheelCommand,
    pub right: WheelCommand,
}

impl DriveOutput {
    pub fn stopped() -> Self {
        Self {
            left: WheelCommand {
                side: Side::Left,
                direction: Direction::Stopped,
                duty: 0,
            },
            right: WheelCommand {
                side: Side::Right,
                direction: Direction::Stopped,
                duty: 0,
            },
        }
    }

    pub fn as_array(&self) -> [WheelCommand; 2] {
        [self.left, self.right]
    }
}

/// Signed wheel speeds in [-1, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelVelocities {
    pub left: f32,
    pub right: f32,
}

/// Output duty range |v| in [0, 1] is scaled into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyRange {
    min: u16,
    max: u16,
}

impl DutyRange {
    pub fn new(min: u16, max: u16) -> Result<Self, ControlError> {
        if max > PWM_DUTY_CEILING {
            return Err(ControlError::Config(format!(
                "duty max {} exceeds PWM resolution ceiling {}",
                max, PWM_DUTY_CEILING
            )));
        }
        if min > max {
            return Err(ControlError::Config(format!(
                "duty min {} above duty max {}",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u16 {
        self.min
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    /// Linear map of a magnitude in [0, 1] onto [min, max], truncated.
    pub fn scale(&self, magnitude: f32) -> u16 {
        let m = clamp_unit(magnitude).abs();
        let span = (self.max - self.min) as f32;
        let duty = (self.min as f32 + m * span) as u16;
        duty.min(self.max)
    }
}

impl Default for DutyRange {
    fn default() -> Self {
        Self {
            min: 0,
            max: PWM_DUTY_CEILING,
        }
    }
}

/// Clamp to [-1, 1]; NaN becomes 0.
pub fn clamp_unit(x: f32) -> f32 {
    if x.is_nan() { 0.0 } else { x.clamp(-1.0, 1.0) }
}

/// Split a steering command into wheel speeds.
/// Positive angular speeds up the right wheel and slows the left (turn left).
pub fn body_to_wheel(linear: f32, angular: f32) -> WheelVelocities {
    let linear = clamp_unit(linear);
    let angular = clamp_unit(angular);

    WheelVelocities {
        left: (linear - angular) / 2.0,
        right: (linear + angular) / 2.0,
    }
}

fn direction_of(v: f32) -> Direction {
    if v > 0.0 {
        Direction::Forward
    } else if v < 0.0 {
        Direction::Backward
    } else {
        Direction::Stopped
    }
}

/// Maps steering commands to per-side wheel commands
#[derive(Debug, Clone, Copy, Default)]
pub struct KinematicMapper {
    duty: DutyRange,
}

impl KinematicMapper {
    pub fn new(duty: DutyRange) -> Self {
        Self { duty }
    }

    pub fn duty_range(&self) -> DutyRange {
        self.duty
    }

    pub fn wheel_command(&self, side: Side, v: f32) -> WheelCommand {
        let direction = direction_of(v);
        let duty = match direction {
            Direction::Stopped => 0,
            _ => self.duty.scale(v.abs()),
        };
        WheelCommand {
            side,
            direction,
            duty,
        }
    }

    pub fn map(&self, linear: f32, angular: f32) -> DriveOutput {
        let wheels = body_to_wheel(linear, angular);
        DriveOutput {
            left: self.wheel_command(Side::Left, wheels.left),
            right: self.wheel_command(Side::Right, wheels.right),
        }
    }
}
