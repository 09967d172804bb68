// Drive module for the differential-drive base
//
// Provides:
// - Differential kinematics (steering command -> per-side direction and duty)
// - Actuator driver over the four PWM channels

mod driver;
pub mod kinematics;

pub use driver::ActuatorDriver;
pub use kinematics::{
    Direction, DriveOutput, DutyRange, KinematicMapper, Side, WheelCommand, body_to_wheel,
};
