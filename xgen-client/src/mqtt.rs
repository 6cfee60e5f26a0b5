//! rumqttc-backed [`Transport`].
//!
//! The `EventLoop` is moved into a background task on the first `connect()`.
//! rumqttc reconnects on the next `poll()` after an error, so the session's
//! retry path only has to pause inside `on_connect` and return.
//!
//! Publishes are refused while the broker link is down. rumqttc does not
//! drain its request channel during an outage, and a full channel would make
//! the reply-topic subscribe fail right after the next CONNACK.

use crate::config::SessionConfig;
use crate::error::TransportError;
use crate::transport::{ConnectOutcome, LogLevel, Transport, TransportHandler};
use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Incoming, MqttOptions, Outgoing, Publish, QoS,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Capacity of the request channel between `AsyncClient` and the event loop.
const CLIENT_CAPACITY: usize = 10;

pub struct MqttTransport {
    name: String,
    client: AsyncClient,
    eventloop: parking_lot::Mutex<Option<EventLoop>>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    handler: parking_lot::Mutex<Option<Weak<dyn TransportHandler>>>,
    /// True between an accepted CONNACK and the next error or DISCONNECT.
    link_up: Arc<AtomicBool>,
}

impl MqttTransport {
    pub fn new(config: &SessionConfig) -> Self {
        let mut opts = MqttOptions::new(&config.client_id, &config.host, config.port);
        opts.set_keep_alive(config.keep_alive());
        opts.set_clean_session(true);
        opts.set_credentials(&config.username, &config.password);

        let (client, eventloop) = AsyncClient::new(opts, CLIENT_CAPACITY);
        Self {
            name: config.name.clone(),
            client,
            eventloop: parking_lot::Mutex::new(Some(eventloop)),
            task: parking_lot::Mutex::new(None),
            handler: parking_lot::Mutex::new(None),
            link_up: Arc::new(AtomicBool::new(false)),
        }
    }

    fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }
}

#[async_trait]
impl Transport for MqttTransport {
    fn register(&self, handler: Weak<dyn TransportHandler>) {
        *self.handler.lock() = Some(handler);
    }

    async fn connect(&self) -> Result<(), TransportError> {
        if self.is_running() {
            // The running loop reconnects by itself on its next poll.
            debug!("{}: reconnect scheduled on running MQTT loop", self.name);
            return Ok(());
        }

        let handler = self.handler.lock().clone().ok_or(TransportError::NoHandler)?;
        let eventloop = self.eventloop.lock().take().ok_or(TransportError::Closed)?;

        info!("{}: Connecting to XGEN MQTT broker", self.name);
        let task = tokio::spawn(drive(self.name.clone(), eventloop, handler, self.link_up.clone()));
        *self.task.lock() = Some(task);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        // try_* never waits on the request channel: this runs on the loop task.
        self.client.try_subscribe(topic, QoS::AtMostOnce)?;
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if !self.link_up.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.to_vec())?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.link_up.store(false, Ordering::SeqCst);
        let task = self.task.lock().take();
        // Dropping the loop makes a later connect() fail with Closed.
        self.eventloop.lock().take();
        if let Some(task) = task {
            if let Err(e) = self.client.try_disconnect() {
                debug!("{}: MQTT disconnect request not delivered: {}", self.name, e);
            }
            task.abort();
            info!("{}: MQTT connection closed", self.name);
        }
        Ok(())
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

/// A handler callback derived from one event-loop poll.
#[derive(Debug, PartialEq)]
enum Routed {
    Connect(ConnectOutcome),
    Message(Publish),
    Log(LogLevel, String),
}

/// New state of the broker link after `event`, if it changes it.
fn link_state(event: &Result<Event, ConnectionError>) -> Option<bool> {
    match event {
        Ok(Event::Incoming(Incoming::ConnAck(ack))) => Some(ack.code == ConnectReturnCode::Success),
        Ok(Event::Incoming(Incoming::Disconnect)) => Some(false),
        Ok(_) => None,
        Err(_) => Some(false),
    }
}

fn route(event: Result<Event, ConnectionError>) -> Vec<Routed> {
    match event {
        Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
            vec![Routed::Connect(ConnectOutcome::from_code(return_code(ack.code)))]
        }
        Ok(Event::Incoming(Incoming::Publish(publish))) => vec![Routed::Message(publish)],
        Ok(Event::Incoming(Incoming::SubAck(ack))) => {
            vec![Routed::Log(LogLevel::Info, format!("subscription {} acknowledged", ack.pkid))]
        }
        Ok(Event::Incoming(Incoming::Disconnect)) => {
            vec![Routed::Log(LogLevel::Warning, "broker sent DISCONNECT".into())]
        }
        Ok(Event::Outgoing(Outgoing::Subscribe(pkid))) => {
            vec![Routed::Log(LogLevel::Debug, format!("subscribe {pkid} sent"))]
        }
        Ok(_) => Vec::new(),
        Err(ConnectionError::ConnectionRefused(code)) => {
            vec![Routed::Connect(ConnectOutcome::Refused(return_code(code)))]
        }
        Err(e) => {
            let reason = e.to_string();
            vec![
                Routed::Log(LogLevel::Error, reason.clone()),
                Routed::Connect(ConnectOutcome::Lost(reason)),
            ]
        }
    }
}

async fn drive(name: String, mut eventloop: EventLoop, sink: Weak<dyn TransportHandler>, link_up: Arc<AtomicBool>) {
    loop {
        let event = eventloop.poll().await;
        // Before the callbacks, so the subscribe after CONNACK sees the link up.
        if let Some(up) = link_state(&event) {
            link_up.store(up, Ordering::SeqCst);
        }

        let Some(handler) = sink.upgrade() else {
            debug!("{}: session dropped, stopping MQTT loop", name);
            return;
        };

        for routed in route(event) {
            match routed {
                Routed::Connect(outcome) => handler.on_connect(outcome).await,
                Routed::Message(publish) => handler.on_message(&publish.topic, &publish.payload).await,
                Routed::Log(level, message) => handler.on_log(level, &message),
            }
        }
    }
}

fn return_code(code: ConnectReturnCode) -> u8 {
    match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::BadUserNamePassword => 4,
        ConnectReturnCode::NotAuthorized => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, SubAck};

    fn transport() -> MqttTransport {
        let mut cfg = SessionConfig::new("Roof", "c1", "u1", "p1");
        cfg.host = "127.0.0.1".into();
        cfg.port = 1;
        MqttTransport::new(&cfg)
    }

    fn connack(code: ConnectReturnCode) -> Result<Event, ConnectionError> {
        Ok(Event::Incoming(Incoming::ConnAck(ConnAck {
            session_present: false,
            code,
        })))
    }

    #[test]
    fn test_return_codes_match_mqtt_311() {
        assert_eq!(return_code(ConnectReturnCode::Success), 0);
        assert_eq!(return_code(ConnectReturnCode::BadUserNamePassword), 4);
        assert_eq!(return_code(ConnectReturnCode::NotAuthorized), 5);
    }

    #[test]
    fn test_route_connack() {
        assert_eq!(
            route(connack(ConnectReturnCode::Success)),
            vec![Routed::Connect(ConnectOutcome::Accepted)]
        );
        assert_eq!(
            route(connack(ConnectReturnCode::NotAuthorized)),
            vec![Routed::Connect(ConnectOutcome::Refused(5))]
        );
    }

    #[test]
    fn test_route_refused_and_network_errors() {
        let refused = Err(ConnectionError::ConnectionRefused(ConnectReturnCode::BadUserNamePassword));
        assert_eq!(route(refused), vec![Routed::Connect(ConnectOutcome::Refused(4))]);

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "nothing listening");
        let routed = route(Err(ConnectionError::Io(io)));
        assert_eq!(routed.len(), 2);
        assert!(matches!(&routed[0], Routed::Log(LogLevel::Error, msg) if msg.contains("nothing listening")));
        assert!(matches!(&routed[1], Routed::Connect(ConnectOutcome::Lost(_))));
    }

    #[test]
    fn test_route_publish_and_bookkeeping_events() {
        let publish = Publish::new("xgen/u1/dev", QoS::AtMostOnce, r#"{"oth":{}}"#);
        assert_eq!(
            route(Ok(Event::Incoming(Incoming::Publish(publish.clone())))),
            vec![Routed::Message(publish)]
        );

        let suback = Incoming::SubAck(SubAck {
            pkid: 7,
            return_codes: Vec::new(),
        });
        assert!(matches!(&route(Ok(Event::Incoming(suback)))[..], [Routed::Log(LogLevel::Info, _)]));
        assert!(matches!(
            &route(Ok(Event::Outgoing(Outgoing::Subscribe(7))))[..],
            [Routed::Log(LogLevel::Debug, _)]
        ));
        assert!(matches!(
            &route(Ok(Event::Incoming(Incoming::Disconnect)))[..],
            [Routed::Log(LogLevel::Warning, _)]
        ));
        assert!(route(Ok(Event::Incoming(Incoming::PingResp))).is_empty());
    }

    #[test]
    fn test_link_state_follows_broker() {
        assert_eq!(link_state(&connack(ConnectReturnCode::Success)), Some(true));
        assert_eq!(link_state(&connack(ConnectReturnCode::ServiceUnavailable)), Some(false));
        assert_eq!(link_state(&Ok(Event::Incoming(Incoming::Disconnect))), Some(false));
        assert_eq!(link_state(&Ok(Event::Incoming(Incoming::PingResp))), None);
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert_eq!(link_state(&Err(ConnectionError::Io(io))), Some(false));
    }

    #[tokio::test]
    async fn test_outage_requests_do_not_block_resubscribe() {
        let transport = transport();

        // Far more refresh requests than the client channel can hold.
        for _ in 0..(CLIENT_CAPACITY * 3) {
            assert!(matches!(
                transport.publish("xgen/u1/app", b"ts").await,
                Err(TransportError::NotConnected)
            ));
        }

        // CONNACK arrives: the reply topic still fits in the channel.
        transport.link_up.store(true, Ordering::SeqCst);
        assert!(transport.subscribe("xgen/u1/dev").await.is_ok());
        assert!(transport.publish("xgen/u1/app", b"ts").await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_without_handler_fails() {
        let transport = transport();
        assert!(matches!(transport.connect().await, Err(TransportError::NoHandler)));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_before_connect() {
        let transport = transport();
        assert!(transport.disconnect().await.is_ok());
        assert!(transport.disconnect().await.is_ok());
        assert!(matches!(
            transport.publish("xgen/u1/app", b"ts").await,
            Err(TransportError::NotConnected)
        ));
    }
}
