/*!
Test harness for inverter sessions

Wires a [`Session`] to a [`MockTransport`] and a collecting observer, so a
test can play the broker and assert on what the session sent and delivered.
*/

use crate::mock_transport::{InverterPayload, MockTransport};
use anyhow::{bail, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use xgen_client::{observer_fn, ConnectOutcome, Session, SessionConfig, Telemetry};

pub struct TestHarness {
    pub transport: Arc<MockTransport>,
    pub session: Session,
    received: Arc<Mutex<Vec<Telemetry>>>,
}

impl TestHarness {
    /// Session named "Test Inverter" for account `acct`.
    pub fn new() -> Result<Self> {
        Self::with_config(SessionConfig::new("Test Inverter", "test-client", "acct", "secret"))
    }

    pub fn with_config(config: SessionConfig) -> Result<Self> {
        env_logger::try_init().ok();

        let transport = Arc::new(MockTransport::new());
        let session = Session::new(config, transport.clone())?;
        let received = Arc::new(Mutex::new(Vec::new()));

        let sink = received.clone();
        session.set_observer(observer_fn("test-harness", move |telemetry| {
            sink.lock().push(telemetry);
            Ok(())
        }));

        Ok(Self {
            transport,
            session,
            received,
        })
    }

    pub fn request_topic(&self) -> String {
        self.session.config().request_topic()
    }

    pub fn reply_topic(&self) -> String {
        self.session.config().reply_topic()
    }

    /// Connects and lets the broker accept.
    pub async fn connect_accepted(&self) -> Result<()> {
        self.session.connect().await;
        self.transport.simulate_connect(ConnectOutcome::Accepted).await?;
        log::info!("✅ {} connected", self.session.name());
        Ok(())
    }

    pub async fn send_full(&self, grid_watts: i64, solar_watts: i64, energy_total: f64) -> Result<()> {
        let payload = InverterPayload::full(grid_watts, solar_watts, energy_total);
        self.transport.simulate_json(&self.reply_topic(), &payload).await
    }

    pub async fn send_partial(&self, grid_watts: i64, solar_watts: i64) -> Result<()> {
        let payload = InverterPayload::partial(grid_watts, solar_watts);
        self.transport.simulate_json(&self.reply_topic(), &payload).await
    }

    pub async fn send_raw(&self, payload: impl Into<Vec<u8>>) -> Result<()> {
        self.transport.simulate_incoming(self.reply_topic(), payload).await
    }

    /// Every telemetry map the observer saw, oldest first.
    pub fn received(&self) -> Vec<Telemetry> {
        self.received.lock().clone()
    }

    pub fn received_count(&self) -> usize {
        self.received.lock().len()
    }

    pub fn requests_sent(&self) -> usize {
        self.transport.find_messages_by_topic(&self.request_topic()).len()
    }

    pub fn assert_requests(&self, expected: usize) -> Result<()> {
        let actual = self.requests_sent();
        if actual != expected {
            bail!(
                "expected {} refresh requests on {}, got {}",
                expected,
                self.request_topic(),
                actual
            );
        }
        Ok(())
    }

    /// Asserts the reply topic was subscribed exactly `expected` times.
    pub fn assert_subscriptions(&self, expected: usize) -> Result<()> {
        let topic = self.reply_topic();
        let subscriptions = self.transport.get_subscriptions();
        if subscriptions.iter().any(|s| *s != topic) {
            bail!("unexpected subscription in {:?}", subscriptions);
        }
        if subscriptions.len() != expected {
            bail!(
                "expected {} subscriptions to {}, got {}",
                expected,
                topic,
                subscriptions.len()
            );
        }
        Ok(())
    }

    /// Asserts the latest delivered telemetry has `key` set to `expected`.
    pub fn assert_last_value(&self, key: &str, expected: &Value) -> Result<()> {
        let received = self.received.lock();
        let Some(last) = received.last() else {
            bail!("no telemetry delivered yet");
        };
        match last.get(key) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => bail!("field '{}' mismatch: expected {}, got {}", key, expected, actual),
            None => bail!("field '{}' missing from latest telemetry", key),
        }
    }

    pub fn get_stats(&self) -> TestStats {
        TestStats {
            published: self.transport.get_published_messages().len(),
            subscriptions: self.transport.get_subscriptions(),
            delivered: self.received_count(),
            connects: self.transport.connect_count(),
        }
    }

    pub async fn shutdown(&self) {
        self.session.shutdown().await;
        log::info!("🧹 {} shut down", self.session.name());
    }
}

#[derive(Debug)]
pub struct TestStats {
    pub published: usize,
    pub subscriptions: Vec<String>,
    pub delivered: usize,
    pub connects: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_harness_basic_flow() {
        let harness = TestHarness::new().unwrap();
        assert_eq!(harness.request_topic(), "xgen/acct/app");
        assert_eq!(harness.reply_topic(), "xgen/acct/dev");

        harness.connect_accepted().await.unwrap();
        harness.assert_subscriptions(1).unwrap();

        harness.session.request_tick().await;
        harness.assert_requests(1).unwrap();

        harness.send_full(-250, 1800, 4521.5).await.unwrap();
        harness.assert_last_value("oth.et", &json!(4521.5)).unwrap();
        harness.assert_last_value("pv.w", &json!(1800)).unwrap();
        assert!(harness.assert_last_value("nope", &json!(1)).is_err());

        let stats = harness.get_stats();
        assert_eq!(stats.published, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.connects, 1);
    }

    #[tokio::test]
    async fn test_assertions_report_mismatch() {
        let harness = TestHarness::new().unwrap();
        assert!(harness.assert_requests(1).is_err());
        assert!(harness.assert_subscriptions(1).is_err());
        assert!(harness.assert_last_value("grid.w", &json!(0)).is_err());

        harness.send_partial(100, 0).await.unwrap();
        assert!(harness.assert_last_value("grid.w", &json!(101)).is_err());
        harness.assert_last_value("grid.w", &json!(100)).unwrap();
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = SessionConfig::new("", "c", "u", "p");
        assert!(TestHarness::with_config(config).is_err());
    }
}
