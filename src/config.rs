use crate::prelude::*;

use serde::Deserialize;
use std::time::Duration;

// Fixed by the charger vendor's cloud; not something a deployment chooses.
pub const BROKER_HOST: &str = "iot.nayax.com";
pub const BROKER_PORT: u16 = 1883;
pub const BROKER_USERNAME: &str = "deviceEV";
pub const BROKER_PASSWORD: &str = "ng4GycjMmuvpSJU6";
pub const KEEP_ALIVE: Duration = Duration::from_secs(30);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(deserialize_with = "de_charger_id")]
    pub charger_id: ChargerId,
    pub user_id: String,

    /// Seconds between poll cycles
    #[serde(default = "Config::default_scan_interval")]
    pub scan_interval: u64,

    /// Seconds to wait for a charger reply
    #[serde(default = "Config::default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,
}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        info!("Reading configuration from {}", file);
        let content = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("error reading {}: {}", file, err))?;

        let config = Self::from_yaml(&content)?;

        info!("Configuration loaded successfully:");
        info!("  Charger: {}", config.charger_id);
        info!("  User: {}", config.user_id);
        info!("  Scan Interval: {}s", config.scan_interval);
        info!("  Request Timeout: {}s", config.request_timeout);
        info!("  Log Level: {}", config.loglevel);

        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            bail!("user_id cannot be empty");
        }
        if self.user_id.contains(['/', '+', '#']) {
            bail!("user_id {} cannot contain topic separators or wildcards", self.user_id);
        }
        if self.scan_interval == 0 {
            bail!("scan_interval must be at least 1 second");
        }
        if self.request_timeout == 0 {
            bail!("request_timeout must be at least 1 second");
        }

        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            host: BROKER_HOST.to_string(),
            port: BROKER_PORT,
            username: BROKER_USERNAME.to_string(),
            password: BROKER_PASSWORD.to_string(),
            user_id: self.user_id.clone(),
            keep_alive: KEEP_ALIVE,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    fn default_scan_interval() -> u64 {
        60
    }

    fn default_request_timeout() -> u64 {
        10
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }
}

fn de_charger_id<'de, D>(deserializer: D) -> Result<ChargerId, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    ChargerId::from_str(&s).map_err(serde::de::Error::custom)
}
