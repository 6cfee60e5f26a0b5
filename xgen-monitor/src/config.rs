use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use xgen_client::SessionConfig;

pub const CONFIG_ENV: &str = "XGEN_MONITOR_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "xgen.yaml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitorConfig {
    pub inverters: Vec<InverterConf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InverterConf {
    /// Stable identifier for sensor ids; defaults to the underscored name.
    pub id: Option<String>,
    /// Environment variable holding the broker password, if not inline.
    pub password_env: Option<String>,
    #[serde(flatten)]
    pub session: SessionConfig,
}

impl InverterConf {
    fn resolve_password(&mut self) -> Result<()> {
        if let Some(var) = &self.password_env {
            self.session.password = std::env::var(var)
                .with_context(|| format!("{}: password variable {var} is not set", self.session.name))?;
        }
        Ok(())
    }
}

pub fn config_path() -> String {
    std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into())
}

pub async fn load_config() -> Result<MonitorConfig> {
    load_config_from(config_path()).await
}

pub async fn load_config_from(path: impl AsRef<Path>) -> Result<MonitorConfig> {
    let path = path.as_ref();
    let txt = fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    parse_config(&txt).with_context(|| format!("invalid config {}", path.display()))
}

pub fn parse_config(txt: &str) -> Result<MonitorConfig> {
    let mut cfg: MonitorConfig = serde_yaml::from_str(txt)?;
    if cfg.inverters.is_empty() {
        bail!("no inverters configured");
    }
    for inverter in &mut cfg.inverters {
        inverter.resolve_password()?;
        inverter.session.validate()?;
    }
    Ok(cfg)
}
