//! Seam between the session and the messaging connection.
//!
//! A transport owns the network loop. It reports what happens on the wire
//! through the three callbacks of [`TransportHandler`], which the session
//! implements and registers once, right after construction.

use crate::error::TransportError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Weak;

/// Result of a connection attempt, as reported by the broker or the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// CONNACK with return code 0.
    Accepted,
    /// CONNACK with a non-zero return code.
    Refused(u8),
    /// The network failed or the broker dropped us.
    Lost(String),
}

impl ConnectOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConnectOutcome::Accepted)
    }

    /// MQTT 3.1.1 style code: 0 on success, the broker code when refused.
    pub fn code(&self) -> Option<u8> {
        match self {
            ConnectOutcome::Accepted => Some(0),
            ConnectOutcome::Refused(code) => Some(*code),
            ConnectOutcome::Lost(_) => None,
        }
    }

    pub fn from_code(code: u8) -> Self {
        if code == 0 {
            ConnectOutcome::Accepted
        } else {
            ConnectOutcome::Refused(code)
        }
    }
}

impl fmt::Display for ConnectOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectOutcome::Accepted => write!(f, "accepted"),
            ConnectOutcome::Refused(code) => write!(f, "refused (code {code})"),
            ConnectOutcome::Lost(reason) => write!(f, "lost ({reason})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Callbacks a transport fires from its network task.
#[async_trait]
pub trait TransportHandler: Send + Sync {
    /// Every connect result, successful or not.
    async fn on_connect(&self, outcome: ConnectOutcome);
    /// A message arrived on a subscribed topic.
    async fn on_message(&self, topic: &str, payload: &[u8]);
    /// Diagnostic line from the transport.
    fn on_log(&self, level: LogLevel, message: &str);
}

/// A publish/subscribe connection to the broker.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Registers the callback sink. Called once per session.
    fn register(&self, handler: Weak<dyn TransportHandler>);

    /// Starts (or restarts) connecting. Returns without waiting for the
    /// handshake; the outcome arrives through `on_connect`.
    async fn connect(&self) -> Result<(), TransportError>;

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError>;

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Stops the network task and closes the connection. Idempotent.
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_codes() {
        assert!(ConnectOutcome::from_code(0).is_success());
        assert_eq!(ConnectOutcome::from_code(5), ConnectOutcome::Refused(5));
        assert_eq!(ConnectOutcome::Refused(4).code(), Some(4));
        assert_eq!(ConnectOutcome::Lost("io".into()).code(), None);
        assert_eq!(ConnectOutcome::Refused(5).to_string(), "refused (code 5)");
    }
}
