//! One session per inverter: connection, request timing, observer slot.

use crate::config::{SessionConfig, REQUEST_PAYLOAD};
use crate::dispatch::{Dispatch, Dispatcher};
use crate::error::ConfigError;
use crate::health::{ConnectionState, HealthTracker, SessionHealth};
use crate::mqtt::MqttTransport;
use crate::observer::{ObserverRegistry, TelemetryObserver};
use crate::supervisor::ConnectionSupervisor;
use crate::throttle::{RequestThrottler, ThrottleDecision, Timing};
use crate::transport::{ConnectOutcome, LogLevel, Transport, TransportHandler};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Result of one `request_tick()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A refresh request was published, for the given reason.
    Requested(ThrottleDecision),
    /// The previous request is still pending inside the interval.
    Suppressed,
    /// The session was shut down.
    Closed,
}

/// Handle to a running session. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    request_topic: String,
    transport: Arc<dyn Transport>,
    supervisor: ConnectionSupervisor,
    throttler: RequestThrottler,
    observers: ObserverRegistry,
    dispatcher: Dispatcher,
    health: HealthTracker,
    closed: Arc<AtomicBool>,
}

impl Session {
    /// Builds a session over `transport` and registers its callbacks.
    /// Nothing touches the network until [`Session::connect`].
    pub fn new(config: SessionConfig, transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        config.validate()?;

        let health = HealthTracker::new();
        let closed = Arc::new(AtomicBool::new(false));
        let inner = Arc::new(SessionInner {
            request_topic: config.request_topic(),
            supervisor: ConnectionSupervisor::new(
                &config.name,
                config.reply_topic(),
                config.retry.clone(),
                health.clone(),
                closed.clone(),
            ),
            throttler: RequestThrottler::new(config.interval()),
            observers: ObserverRegistry::new(),
            dispatcher: Dispatcher::new(&config.name, &config.full_telemetry_key, health.clone()),
            health,
            transport,
            closed,
            config,
        });

        let handler = Arc::downgrade(&inner);
        inner.transport.register(handler);
        Ok(Self { inner })
    }

    /// Builds a session on a real MQTT connection.
    pub fn mqtt(config: SessionConfig) -> Result<Self, ConfigError> {
        let transport = Arc::new(MqttTransport::new(&config));
        Self::new(config, transport)
    }

    /// Starts connecting. The handshake result arrives on the network task.
    pub async fn connect(&self) {
        if self.is_closed() {
            warn!("{}: connect() on a closed session ignored", self.name());
            return;
        }
        self.inner.supervisor.connect(self.inner.transport.as_ref()).await;
    }

    /// Publishes a refresh request unless one is pending inside the interval.
    ///
    /// The timestamp lock is held across decide-and-publish, so concurrent
    /// ticks cannot both publish for the same window.
    pub async fn request_tick(&self) -> TickOutcome {
        if self.is_closed() {
            return TickOutcome::Closed;
        }

        let inner = &self.inner;
        let mut timing = inner.throttler.lock().await;
        let now = Instant::now();
        let decision = timing.decide(now, inner.throttler.interval());
        if !decision.should_request() {
            debug!("{}: request suppressed, waiting for full telemetry", inner.config.name);
            return TickOutcome::Suppressed;
        }

        debug!("{}: Requesting update >>>>>>>>>>>>>>>> ({:?})", inner.config.name, decision);
        timing.mark_requested(now);
        inner.health.record_request();
        if let Err(e) = inner
            .transport
            .publish(&inner.request_topic, REQUEST_PAYLOAD.as_bytes())
            .await
        {
            warn!("{}: refresh request not sent: {}", inner.config.name, e);
        }
        TickOutcome::Requested(decision)
    }

    /// Installs the telemetry observer, returning the previous one.
    pub fn set_observer(&self, observer: Arc<dyn TelemetryObserver>) -> Option<Arc<dyn TelemetryObserver>> {
        self.inner.observers.replace(observer)
    }

    pub fn observer(&self) -> Option<Arc<dyn TelemetryObserver>> {
        self.inner.observers.current()
    }

    pub fn clear_observer(&self) -> Option<Arc<dyn TelemetryObserver>> {
        self.inner.observers.clear()
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.supervisor.state()
    }

    pub fn health(&self) -> SessionHealth {
        self.inner.health.snapshot(&self.inner.config.name)
    }

    pub async fn timing(&self) -> Timing {
        self.inner.throttler.snapshot().await
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Closes the network task and the connection. Safe to call twice, or
    /// on a session that never connected.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.supervisor.mark_closed();
        if let Err(e) = self.inner.transport.disconnect().await {
            warn!("{}: error while closing transport: {}", self.name(), e);
        }
        info!("{}: session closed", self.name());
    }
}

#[async_trait]
impl TransportHandler for SessionInner {
    async fn on_connect(&self, outcome: ConnectOutcome) {
        if self.closed.load(Ordering::SeqCst) {
            debug!("{}: connect result {} after shutdown ignored", self.config.name, outcome);
            return;
        }
        self.supervisor.handle_connect(self.transport.as_ref(), outcome).await;
    }

    async fn on_message(&self, topic: &str, payload: &[u8]) {
        debug!("{}: {} bytes on {}", self.config.name, payload.len(), topic);
        if let Dispatch::Delivered { full_telemetry: true } = self.dispatcher.dispatch(payload, &self.observers) {
            self.throttler.record_response().await;
            debug!("{}: Got full telemetry <<<<<<<<<<<<<<<<", self.config.name);
        }
    }

    fn on_log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Error => error!("{}: MQTT error: {}", self.config.name, message),
            LogLevel::Warning => warn!("{}: MQTT warning: {}", self.config.name, message),
            LogLevel::Info | LogLevel::Debug => debug!("{}: MQTT {:?}: {}", self.config.name, level, message),
        }
    }
}
