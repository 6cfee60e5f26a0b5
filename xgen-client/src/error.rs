use thiserror::Error;

/// Failures raised by a transport implementation.
///
/// None of these reach the caller of `Session::request_tick`; the session
/// logs them and keeps going.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("mqtt client request failed: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("transport has no handler registered")]
    NoHandler,
    #[error("not connected to the broker")]
    NotConnected,
    #[error("transport closed")]
    Closed,
}

/// Why an inbound payload was dropped.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a JSON object at top level, got {0}")]
    NotAnObject(&'static str),
}

/// An observer failed while handling telemetry.
#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("{0}")]
    Failed(String),
    #[error("observer panicked: {0}")]
    Panicked(String),
}

impl ObserverError {
    pub fn failed(message: impl Into<String>) -> Self {
        ObserverError::Failed(message.into())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("inverter name must not be empty")]
    EmptyName,
    #[error("{name}: client id must not be empty")]
    EmptyClientId { name: String },
    #[error("{name}: username must not be empty")]
    EmptyUsername { name: String },
    #[error("{name}: scan interval must be at least one second")]
    ZeroInterval { name: String },
    #[error("{name}: retry multiplier must be >= 1.0, got {multiplier}")]
    RetryMultiplier { name: String, multiplier: String },
}
