/*!
Mock transport for working without a broker

Records everything the session sends and lets a test play the broker's side:
connect results and incoming replies are pushed straight into the session's
callbacks.
*/

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use xgen_client::{ConnectOutcome, Transport, TransportError, TransportHandler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl MockMessage {
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// In-memory [`Transport`]. Never fires callbacks on its own.
#[derive(Default)]
pub struct MockTransport {
    handler: Mutex<Option<Weak<dyn TransportHandler>>>,
    published_messages: Mutex<Vec<MockMessage>>,
    subscriptions: Mutex<Vec<String>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    closed: AtomicBool,
    fail_publish: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following publish fail, as a dead connection would.
    pub fn set_publish_failure(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    fn handler(&self) -> Result<Arc<dyn TransportHandler>> {
        self.handler
            .lock()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| anyhow!("no live session registered on the mock transport"))
    }

    /// Plays a CONNACK (or a network failure) into the session.
    ///
    /// Returns once the session has handled it, which includes the retry
    /// pause after a failure.
    pub async fn simulate_connect(&self, outcome: ConnectOutcome) -> Result<()> {
        let handler = self.handler()?;
        log::info!("🔌 [MOCK] Connect result: {}", outcome);
        handler.on_connect(outcome).await;
        Ok(())
    }

    /// Simulates a message arriving from the broker.
    pub async fn simulate_incoming<S, V>(&self, topic: S, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let handler = self.handler()?;
        let message = MockMessage {
            topic: topic.into(),
            payload: payload.into(),
        };
        log::info!("📨 [MOCK] Simulated incoming: {} ({} bytes)", message.topic, message.payload.len());
        handler.on_message(&message.topic, &message.payload).await;
        Ok(())
    }

    pub async fn simulate_json(&self, topic: &str, payload: &Value) -> Result<()> {
        self.simulate_incoming(topic, serde_json::to_vec(payload)?).await
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().clone()
    }

    pub fn get_subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }

    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Forgets recorded traffic. Counters and the handler are kept.
    pub fn clear(&self) {
        self.published_messages.lock().clear();
        self.subscriptions.lock().clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn register(&self, handler: Weak<dyn TransportHandler>) {
        *self.handler.lock() = Some(handler);
    }

    async fn connect(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.handler.lock().is_none() {
            return Err(TransportError::NoHandler);
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        log::info!("🔌 [MOCK] Connect requested");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.subscriptions.lock().push(topic.to_string());
        log::info!("📥 [MOCK] Subscribed to {}", topic);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.published_messages.lock().push(MockMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        log::info!("📤 [MOCK] Published to {}: {} bytes", topic, payload.len());
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        log::info!("🔌 [MOCK] Disconnected");
        Ok(())
    }
}

/// Reply payloads shaped like the ones an XGEN inverter sends.
pub struct InverterPayload;

impl InverterPayload {
    /// Full telemetry: every group including the `oth` energy counters.
    pub fn full(grid_watts: i64, solar_watts: i64, energy_total: f64) -> Value {
        let mut reply = Self::partial(grid_watts, solar_watts);
        reply["oth"] = serde_json::json!({
            "et": energy_total,
            "ey": 1520.4,
            "em": 210.7,
            "ed": 12.3
        });
        reply
    }

    /// Live update without the `oth` group.
    pub fn partial(grid_watts: i64, solar_watts: i64) -> Value {
        let grid_mode = if grid_watts > 0 { 1 } else { 2 };
        serde_json::json!({
            "grid": { "v": 231, "w": grid_watts, "f": 50.0, "pt": 12, "d": grid_mode },
            "load": { "v": 230, "w": 640, "f": 50.0, "pt": 8 },
            "battery": { "v": 524, "pt": 87, "d": 1 },
            "pv": { "v": 310, "w": solar_watts }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_traffic() {
        let transport = MockTransport::new();

        transport.subscribe("xgen/u/dev").await.unwrap();
        assert_eq!(transport.get_subscriptions(), vec!["xgen/u/dev"]);

        transport.publish("xgen/u/app", b"ts").await.unwrap();
        let messages = transport.get_published_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload_str(), "ts");
        assert_eq!(transport.find_messages_by_topic("xgen/u/app").len(), 1);
        assert!(transport.find_messages_by_topic("other").is_empty());

        transport.clear();
        assert!(transport.get_published_messages().is_empty());
    }

    #[tokio::test]
    async fn test_connect_needs_handler_and_open_transport() {
        let transport = MockTransport::new();
        assert!(matches!(transport.connect().await, Err(TransportError::NoHandler)));

        transport.disconnect().await.unwrap();
        assert!(matches!(transport.connect().await, Err(TransportError::Closed)));
        assert_eq!(transport.connect_count(), 0);
        assert_eq!(transport.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_simulate_without_session_fails() {
        let transport = MockTransport::new();
        assert!(transport.simulate_incoming("xgen/u/dev", "{}").await.is_err());
        assert!(transport.simulate_connect(ConnectOutcome::Accepted).await.is_err());
    }

    #[tokio::test]
    async fn test_publish_failure_switch() {
        let transport = MockTransport::new();
        transport.set_publish_failure(true);
        assert!(transport.publish("t", b"ts").await.is_err());
        transport.set_publish_failure(false);
        assert!(transport.publish("t", b"ts").await.is_ok());
        assert_eq!(transport.get_published_messages().len(), 1);
    }

    #[test]
    fn test_payload_builders() {
        let full = InverterPayload::full(-300, 2400, 4521.5);
        assert_eq!(full["oth"]["et"], 4521.5);
        assert_eq!(full["pv"]["w"], 2400);
        assert_eq!(full["grid"]["d"], 2);

        let partial = InverterPayload::partial(150, 0);
        assert!(partial.get("oth").is_none());
        assert_eq!(partial["grid"]["d"], 1);
    }
}
