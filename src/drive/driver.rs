// Actuator driver for the two-sided H-bridge
//
// Each side has a forward and a backward PWM channel. Duties are staged by `apply`
// and reach the pins together on `commit`.

use tracing::{debug, info, warn};

use super::kinematics::{Direction, DriveOutput, Side, WheelCommand};
use crate::board::{Channel, PeripheralError, PwmBank};
use crate::config::PWM_DUTY_CEILING;

fn side_channels(side: Side) -> (Channel, Channel) {
    match side {
        Side::Left => (Channel::LeftForward, Channel::LeftBackward),
        Side::Right => (Channel::RightForward, Channel::RightBackward),
    }
}

pub struct ActuatorDriver<P: PwmBank> {
    pwm: P,
    staged: [u16; 4],
    committed: [u16; 4],
}

impl<P: PwmBank> ActuatorDriver<P> {
    pub fn new(pwm: P) -> Self {
        Self {
            pwm,
            staged: [0; 4],
            committed: [0; 4],
        }
    }

    /// Stage a duty on one side. The opposite channel is zeroed in the same step,
    /// so a side never has both channels staged nonzero.
    pub fn apply(&mut self, side: Side, direction: Direction, duty: u16) {
        let (forward, backward) = side_channels(side);
        let duty = duty.min(PWM_DUTY_CEILING);

        let (forward_duty, backward_duty) = match direction {
            Direction::Forward => (duty, 0),
            Direction::Backward => (0, duty),
            Direction::Stopped => (0, 0),
        };

        self.staged[forward.index()] = forward_duty;
        self.staged[backward.index()] = backward_duty;
    }

    pub fn apply_wheel(&mut self, wheel: WheelCommand) {
        self.apply(wheel.side, wheel.direction, wheel.duty);
    }

    pub fn apply_output(&mut self, output: &DriveOutput) {
        for wheel in output.as_array() {
            self.apply_wheel(wheel);
        }
    }

    /// Push staged duties to the outputs.
    ///
    /// Channels going to zero are latched before channels going nonzero, so a
    /// direction reversal never has both channels of a side live at once.
    pub fn commit(&mut self) -> Result<(), PeripheralError> {
        debug!(
            "Committing duties: lf={}, lb={}, rf={}, rb={}",
            self.staged[0], self.staged[1], self.staged[2], self.staged[3]
        );

        for channel in Channel::ALL {
            self.pwm.set_duty(channel, self.staged[channel.index()])?;
        }

        let (zeroing, driving): (Vec<Channel>, Vec<Channel>) = Channel::ALL
            .into_iter()
            .partition(|ch| self.staged[ch.index()] == 0);
        for channel in zeroing.into_iter().chain(driving) {
            self.pwm.update_duty(channel)?;
            self.committed[channel.index()] = self.staged[channel.index()];
        }

        Ok(())
    }

    /// Zero all four channels immediately
    pub fn stop(&mut self) -> Result<(), PeripheralError> {
        info!("Stopping both sides");
        self.staged = [0; 4];
        self.commit()
    }

    /// Duty last latched on a channel
    pub fn duty(&self, channel: Channel) -> u16 {
        self.committed[channel.index()]
    }

    /// Latched duties ordered as `Channel::ALL`
    pub fn duties(&self) -> [u16; 4] {
        self.committed
    }
}

impl<P: PwmBank> Drop for ActuatorDriver<P> {
    fn drop(&mut self) {
        // Leave the motors stopped when the driver goes away
        if let Err(e) = self.stop() {
            warn!("Failed to stop motors on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::SimBoard;

    #[test]
    fn test_forward_zeroes_backward() {
        let board = SimBoard::new();
        let mut driver = ActuatorDriver::new(board.clone());

        driver.apply(Side::Left, Direction::Backward, 400);
        driver.commit().unwrap();
        assert_eq!(board.live_duty(Channel::LeftBackward), 400);

        driver.apply(Side::Left, Direction::Forward, 250);
        driver.commit().unwrap();
        assert_eq!(board.live_duty(Channel::LeftForward), 250);
        assert_eq!(board.live_duty(Channel::LeftBackward), 0);
        assert!(!board.overlap_seen());
    }

    #[test]
    fn test_reversal_never_overlaps() {
        let board = SimBoard::new();
        let mut driver = ActuatorDriver::new(board.clone());

        for i in 0..20 {
            let (dir, other) = if i % 2 == 0 {
                (Direction::Forward, Direction::Backward)
            } else {
                (Direction::Backward, Direction::Forward)
            };
            driver.apply(Side::Left, dir, 1023);
            driver.apply(Side::Right, other, 700);
            driver.commit().unwrap();
        }
        assert!(!board.overlap_seen());
    }

    #[test]
    fn test_stopped_zeroes_side() {
        let board = SimBoard::new();
        let mut driver = ActuatorDriver::new(board.clone());
        driver.apply(Side::Right, Direction::Forward, 800);
        driver.commit().unwrap();

        driver.apply(Side::Right, Direction::Stopped, 800);
        driver.commit().unwrap();
        assert_eq!(driver.duties(), [0; 4]);
        assert_eq!(board.live_duties(), [0; 4]);
    }

    #[test]
    fn test_staged_values_not_live_before_commit() {
        let board = SimBoard::new();
        let mut driver = ActuatorDriver::new(board.clone());
        driver.apply(Side::Left, Direction::Forward, 500);
        assert_eq!(board.live_duty(Channel::LeftForward), 0);
        assert_eq!(driver.duty(Channel::LeftForward), 0);
        driver.commit().unwrap();
        assert_eq!(driver.duty(Channel::LeftForward), 500);
    }

    #[test]
    fn test_duty_capped_at_resolution() {
        let board = SimBoard::new();
        let mut driver = ActuatorDriver::new(board.clone());
        driver.apply(Side::Left, Direction::Forward, u16::MAX);
        driver.commit().unwrap();
        assert_eq!(board.live_duty(Channel::LeftForward), PWM_DUTY_CEILING);
    }

    #[test]
    fn test_drop_stops_motors() {
        let board = SimBoard::new();
        {
            let mut driver = ActuatorDriver::new(board.clone());
            driver.apply(Side::Left, Direction::Forward, 900);
            driver.apply(Side::Right, Direction::Backward, 900);
            driver.commit().unwrap();
            assert_ne!(board.live_duties(), [0; 4]);
        }
        assert_eq!(board.live_duties(), [0; 4]);
    }
}
