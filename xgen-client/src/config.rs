use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "teslasm.art";
pub const DEFAULT_PORT: u16 = 1883;
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;
pub const DEFAULT_FULL_TELEMETRY_KEY: &str = "oth";

/// Topic prefix shared by every inverter account.
pub const TOPIC_ROOT: &str = "xgen";
/// Payload that asks the device for a telemetry snapshot.
pub const REQUEST_PAYLOAD: &str = "ts";

/// Everything one session needs to reach its inverter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub name: String,
    pub client_id: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Top-level field whose presence marks a complete snapshot.
    #[serde(default = "default_full_telemetry_key")]
    pub full_telemetry_key: String,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL_SECS
}

fn default_keep_alive() -> u64 {
    DEFAULT_KEEP_ALIVE_SECS
}

fn default_full_telemetry_key() -> String {
    DEFAULT_FULL_TELEMETRY_KEY.to_string()
}

impl SessionConfig {
    pub fn new(
        name: impl Into<String>,
        client_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            client_id: client_id.into(),
            host: default_host(),
            port: DEFAULT_PORT,
            username: username.into(),
            password: password.into(),
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            retry: RetryPolicy::default(),
            full_telemetry_key: default_full_telemetry_key(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = self.name.clone();
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::EmptyClientId { name });
        }
        if self.username.trim().is_empty() {
            return Err(ConfigError::EmptyUsername { name });
        }
        if self.scan_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval { name });
        }
        if !(self.retry.multiplier >= 1.0) {
            return Err(ConfigError::RetryMultiplier {
                name,
                multiplier: self.retry.multiplier.to_string(),
            });
        }
        Ok(())
    }

    fn base_topic(&self) -> String {
        format!("{TOPIC_ROOT}/{}", self.username)
    }

    /// `xgen/<username>/app`, where refresh requests go.
    pub fn request_topic(&self) -> String {
        format!("{}/app", self.base_topic())
    }

    /// `xgen/<username>/dev`, where the device answers.
    pub fn reply_topic(&self) -> String {
        format!("{}/dev", self.base_topic())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    /// Cadence the scheduling host should tick at: half the interval.
    pub fn tick_period(&self) -> Duration {
        (self.interval() / 2).max(Duration::from_millis(1))
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// Pause between reconnect attempts. Retries never stop.
///
/// Defaults to a flat one second (initial == max). Early bridge releases
/// slept 1000 s at this point, a seconds/milliseconds slip; raise
/// `max_delay_ms` to get capped exponential growth instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_ms: 1000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let cap = self.max_delay_ms.max(self.initial_delay_ms) as f64;
        let grown = self.initial_delay_ms as f64 * self.multiplier.powi(attempt.min(64) as i32);
        Duration::from_millis(grown.min(cap) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics_follow_username() {
        let cfg = SessionConfig::new("Roof", "client-1", "acct42", "secret");
        assert_eq!(cfg.request_topic(), "xgen/acct42/app");
        assert_eq!(cfg.reply_topic(), "xgen/acct42/dev");
    }

    #[test]
    fn test_defaults() {
        let cfg = SessionConfig::new("Roof", "client-1", "acct42", "secret");
        assert_eq!(cfg.host, "teslasm.art");
        assert_eq!(cfg.port, 1883);
        assert_eq!(cfg.interval(), Duration::from_secs(300));
        assert_eq!(cfg.tick_period(), Duration::from_secs(150));
        assert_eq!(cfg.full_telemetry_key, "oth");
        assert_eq!(cfg.retry.delay_for(0), Duration::from_secs(1));
        assert_eq!(cfg.retry.delay_for(10), Duration::from_secs(1));
    }

    #[test]
    fn test_tick_period_for_extreme_intervals() {
        let mut cfg = SessionConfig::new("Roof", "c1", "u1", "p1");
        cfg.scan_interval_secs = 1;
        assert_eq!(cfg.tick_period(), Duration::from_millis(500));

        cfg.scan_interval_secs = u64::MAX;
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.tick_period(), Duration::new(u64::MAX / 2, 500_000_000));
    }

    #[test]
    fn test_deserialize_minimal_yaml() {
        let yaml = "name: Roof\nclient_id: c1\nusername: u1\npassword: p1\n";
        let cfg: SessionConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.port, 1883);
        assert_eq!(cfg.scan_interval_secs, 300);
        assert_eq!(cfg.retry, RetryPolicy::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = SessionConfig::new("Roof", "c1", "", "p");
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::EmptyUsername { name: "Roof".into() })
        );
        cfg.username = "u".into();
        cfg.scan_interval_secs = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroInterval { name: "Roof".into() }));
        cfg.scan_interval_secs = 10;
        cfg.client_id = " ".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::EmptyClientId { .. })));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = RetryPolicy {
            initial_delay_ms: 500,
            max_delay_ms: 4000,
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(30), Duration::from_millis(4000));
    }
}
