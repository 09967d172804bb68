// Latest-value command cell
//
// Written on every command arrival, read once per tick. Owned by the control loop,
// which handles arrivals and ticks one at a time, so no locking is involved.

use tracing::debug;

use crate::messages::SteeringCommand;

#[derive(Debug, Default)]
pub struct CommandIngress {
    latest: SteeringCommand,
    received: u64,
}

impl CommandIngress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the held command; any unread value is discarded.
    pub fn update(&mut self, cmd: SteeringCommand) {
        debug!("Command received: {:?}", cmd);
        self.latest = cmd;
        self.received += 1;
    }

    /// Most recent command, or the zero command before the first arrival. Never waits.
    pub fn latest(&self) -> SteeringCommand {
        self.latest
    }

    /// Number of commands received so far
    pub fn received(&self) -> u64 {
        self.received
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_stopped() {
        let ingress = CommandIngress::new();
        assert_eq!(ingress.latest(), SteeringCommand::default());
        assert_eq!(ingress.received(), 0);
    }

    #[test]
    fn test_latest_wins() {
        let mut ingress = CommandIngress::new();
        ingress.update(SteeringCommand::new(0.2, 0.0));
        ingress.update(SteeringCommand::new(-0.4, 0.9));
        assert_eq!(ingress.latest(), SteeringCommand::new(-0.4, 0.9));
        assert_eq!(ingress.received(), 2);
    }

    #[test]
    fn test_read_is_idempotent() {
        let mut ingress = CommandIngress::new();
        ingress.update(SteeringCommand::new(1.0, -0.5));
        let first = ingress.latest();
        let second = ingress.latest();
        assert_eq!(first, second);
    }
}
