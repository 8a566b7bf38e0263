use crate::prelude::*;

use crate::attributes::Snapshot;
use crate::bridge::Bridge;
use crate::error::Error;
use crate::guardian::{Guardian, Verdict};
use crate::transport::MqttTransport;

use std::sync::Arc;
use tokio::sync::Mutex;

/// Result of setup validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SetupOutcome {
    /// Broker reachable and the charger answered.
    Verified,
    /// Broker reachable, charger silent. Accepted: chargers sleep.
    DeviceOffline(String),
}

/// Everything a poller needs for one charger.
pub struct Client {
    config: Config,
    guardian: Mutex<Guardian>,
    bridge: Bridge,
    cycle: Mutex<()>,
}

impl Client {
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Self {
        let guardian = Guardian::new(transport, config.credentials());
        let bridge = guardian.bridge().clone();

        Self {
            config,
            guardian: Mutex::new(guardian),
            bridge,
            cycle: Mutex::new(()),
        }
    }

    pub fn mqtt(config: Config) -> Self {
        Self::new(config, Arc::new(MqttTransport::new()))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn connect(&self) -> Result<Verdict, Error> {
        Ok(self.guardian.lock().await.ensure_ready().await?)
    }

    pub async fn disconnect(&self) {
        self.guardian.lock().await.shutdown().await
    }

    pub async fn get_status(&self) -> Result<ChargerStatus, Error> {
        self.connect().await?;
        let r = self
            .bridge
            .get_status(self.config.charger_id, self.config.request_timeout())
            .await;
        self.settle(r).await
    }

    pub async fn get_metrics(&self) -> Result<ChargerMetrics, Error> {
        self.connect().await?;
        let r = self
            .bridge
            .get_metrics(self.config.charger_id, self.config.request_timeout())
            .await;
        self.settle(r).await
    }

    /// One full cycle: status then metrics. Overlapping calls fail fast.
    pub async fn poll(&self) -> Result<Snapshot, Error> {
        let _cycle = self.cycle.try_lock().map_err(|_| Error::CycleInFlight)?;

        let status = self.get_status().await?;
        let metrics = self.get_metrics().await?;

        Ok(Snapshot::new(status, metrics))
    }

    /// Connect, ask for status once, disconnect.
    pub async fn validate(&self) -> Result<SetupOutcome, Error> {
        let r = self.get_status().await;
        self.disconnect().await;

        match r {
            Ok(status) => {
                info!(
                    "charger {} answered, state {}",
                    self.config.charger_id,
                    status.state.as_str()
                );
                Ok(SetupOutcome::Verified)
            }
            Err(err) if err.class() == FailureClass::DeviceUnresponsive => {
                warn!(
                    "broker reachable but charger {} did not answer: {}",
                    self.config.charger_id, err
                );
                Ok(SetupOutcome::DeviceOffline(err.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    async fn settle<T>(&self, r: Result<T, BridgeError>) -> Result<T, Error> {
        if let Err(err) = &r {
            self.guardian.lock().await.report(err);
        }
        Ok(r?)
    }
}
