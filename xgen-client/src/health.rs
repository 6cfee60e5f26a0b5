use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;

/// Where the connection supervisor currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionHealth {
    pub name: String,
    pub uptime_seconds: u64,
    pub connection: ConnectionState,
    pub connect_attempts: u32,
    pub connect_failures: u32,
    pub requests_sent: u64,
    pub messages_received: u64,
    pub decode_failures: u64,
    pub observer_failures: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_message_at: Option<OffsetDateTime>,
}

/// Counters shared between the network task and the tick path.
#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    state: Arc<parking_lot::Mutex<ConnectionState>>,
    connect_attempts: Arc<AtomicU32>,
    connect_failures: Arc<AtomicU32>,
    requests_sent: Arc<AtomicU64>,
    messages_received: Arc<AtomicU64>,
    decode_failures: Arc<AtomicU64>,
    observer_failures: Arc<AtomicU64>,
    last_message_at: Arc<parking_lot::Mutex<Option<OffsetDateTime>>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            state: Arc::new(parking_lot::Mutex::new(ConnectionState::Disconnected)),
            connect_attempts: Arc::new(AtomicU32::new(0)),
            connect_failures: Arc::new(AtomicU32::new(0)),
            requests_sent: Arc::new(AtomicU64::new(0)),
            messages_received: Arc::new(AtomicU64::new(0)),
            decode_failures: Arc::new(AtomicU64::new(0)),
            observer_failures: Arc::new(AtomicU64::new(0)),
            last_message_at: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
        self.set_state(ConnectionState::Connecting);
    }

    pub fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
        self.set_state(ConnectionState::Connecting);
    }

    pub fn record_request(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        *self.last_message_at.lock() = Some(OffsetDateTime::now_utc());
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_observer_failure(&self) {
        self.observer_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, name: &str) -> SessionHealth {
        SessionHealth {
            name: name.to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            connection: self.state(),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            observer_failures: self.observer_failures.load(Ordering::Relaxed),
            last_message_at: *self.last_message_at.lock(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}
