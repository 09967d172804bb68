// Control-core error type. Every error carries a kind the loop branches on.

use crate::board::PeripheralError;

/// How the control task reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Control context could not be established; the task aborts.
    Fatal,
    /// Contained to a single tick; logged and the loop continues.
    Recoverable,
}

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("Failed to open session: {0}")]
    Session(#[source] zenoh::Error),

    #[error("Failed to declare {what} on '{topic}': {source}")]
    Declare {
        what: &'static str,
        topic: String,
        #[source]
        source: zenoh::Error,
    },

    #[error("Command subscription closed: {0}")]
    Subscription(#[source] zenoh::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Peripheral setup failed: {0}")]
    Setup(#[source] PeripheralError),

    #[error("Peripheral fault during tick: {0}")]
    Peripheral(#[from] PeripheralError),

    #[error("Failed to publish telemetry: {0}")]
    Publish(#[source] zenoh::Error),

    #[error("Telemetry publish did not complete within {0:?}")]
    PublishTimeout(std::time::Duration),

    #[error("Failed to encode telemetry: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ControlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControlError::Session(_)
            | ControlError::Declare { .. }
            | ControlError::Subscription(_)
            | ControlError::Config(_)
            | ControlError::Setup(_) => ErrorKind::Fatal,
            ControlError::Peripheral(_)
            | ControlError::Publish(_)
            | ControlError::PublishTimeout(_)
            | ControlError::Encode(_) => ErrorKind::Recoverable,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert!(ControlError::Config("bad".into()).is_fatal());
        assert!(ControlError::Setup(PeripheralError::Timeout).is_fatal());
        assert_eq!(
            ControlError::from(PeripheralError::Timeout).kind(),
            ErrorKind::Recoverable
        );
        assert_eq!(
            ControlError::Publish("link down".into()).kind(),
            ErrorKind::Recoverable
        );
        assert!(!ControlError::PublishTimeout(std::time::Duration::from_millis(100)).is_fatal());
    }

    #[test]
    fn test_closed_subscription_is_fatal() {
        assert!(ControlError::Subscription("session closed".into()).is_fatal());
    }
}
