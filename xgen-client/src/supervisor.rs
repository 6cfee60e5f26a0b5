//! Connection supervision: initial connect, subscribe on every successful
//! (re)connect, retry forever on failure.
//!
//! `Disconnected → Connecting → Connected`, and back to `Connecting` on any
//! refused or lost connection.

use crate::config::RetryPolicy;
use crate::health::{ConnectionState, HealthTracker};
use crate::transport::{ConnectOutcome, Transport};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct ConnectionSupervisor {
    name: String,
    reply_topic: String,
    retry: RetryPolicy,
    failed_attempts: AtomicU32,
    health: HealthTracker,
    /// Set by the owning session on shutdown.
    closed: Arc<AtomicBool>,
}

impl ConnectionSupervisor {
    pub fn new(
        name: &str,
        reply_topic: String,
        retry: RetryPolicy,
        health: HealthTracker,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            name: name.to_string(),
            reply_topic,
            retry,
            failed_attempts: AtomicU32::new(0),
            health,
            closed,
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ConnectionState {
        self.health.state()
    }

    /// Kicks off a connection attempt without waiting for the handshake.
    pub async fn connect(&self, transport: &dyn Transport) {
        self.health.record_connect_attempt();
        info!("{}: Connecting to XGEN mqtt broker", self.name);
        if let Err(e) = transport.connect().await {
            error!("{}: Unable to start MQTT connection: {}", self.name, e);
        }
    }

    /// Reacts to a connect result reported by the transport.
    ///
    /// On failure this sleeps on the transport's own task before retrying,
    /// so neither `connect()` callers nor ticks are held up.
    pub async fn handle_connect(&self, transport: &dyn Transport, outcome: ConnectOutcome) {
        if outcome.is_success() {
            self.failed_attempts.store(0, Ordering::Relaxed);
            self.health.set_state(ConnectionState::Connected);
            info!(
                "{}: Connected to XGEN mqtt broker & subscribing to {}",
                self.name, self.reply_topic
            );
            if let Err(e) = transport.subscribe(&self.reply_topic).await {
                error!("{}: Subscribe to {} failed: {}", self.name, self.reply_topic, e);
            }
            return;
        }

        self.health.record_connect_failure();
        let attempt = self.failed_attempts.fetch_add(1, Ordering::Relaxed);
        let delay = self.retry.delay_for(attempt);
        match outcome.code() {
            Some(code) => error!(
                "{}: Unable to connect to XGEN mqtt broker, error code: {}",
                self.name, code
            ),
            None => warn!("{}: MQTT connection {}", self.name, outcome),
        }
        debug!("{}: retry #{} in {:?}", self.name, attempt + 1, delay);

        tokio::time::sleep(delay).await;
        if self.is_closed() {
            // A failure recorded after shutdown may have moved the state on.
            self.mark_closed();
            debug!("{}: session closed during retry pause", self.name);
            return;
        }
        self.connect(transport).await;
    }

    pub fn mark_closed(&self) {
        self.health.set_state(ConnectionState::Disconnected);
    }
}
