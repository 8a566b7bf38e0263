use crate::prelude::*;

use crate::attributes::Snapshot;
use crate::client::Client;
use crate::error::Error;

use std::sync::Arc;
use tokio::time::MissedTickBehavior;

pub struct Scheduler {
    client: Arc<Client>,
}

impl Scheduler {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    /// Polls every `scan_interval` until `shutdown` fires.
    pub async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let period = self.client.config().scan_interval();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("polling {} every {}s", self.client.config().charger_id, period.as_secs());

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("scheduler shutting down");
                    break;
                }
                _ = interval.tick() => {
                    // a slow cycle is allowed to finish before shutdown is noticed
                    self.tick().await;
                }
            }
        }

        self.client.disconnect().await;
        Ok(())
    }

    pub async fn tick(&self) -> Option<Snapshot> {
        match self.client.poll().await {
            Ok(snapshot) => {
                Self::log_snapshot(&snapshot);
                Some(snapshot)
            }
            Err(err) => {
                Self::log_failure(&err);
                None
            }
        }
    }

    fn log_snapshot(snapshot: &Snapshot) {
        info!(
            "{} {:.2} kW, session {:.3} kWh",
            snapshot.status.state.as_str(),
            snapshot.metrics.power_kw,
            snapshot.metrics.session_energy_kwh
        );
        match serde_json::to_string(&snapshot.to_json()) {
            Ok(json) => debug!("attributes: {}", json),
            Err(err) => warn!("cannot serialize attributes: {}", err),
        }
    }

    fn log_failure(err: &Error) {
        match err.class() {
            FailureClass::Fatal => error!("poll failed: {}", err),
            FailureClass::DeviceUnresponsive => warn!("poll skipped: {}", err),
            FailureClass::MalformedReply => warn!("poll discarded: {}", err),
            FailureClass::Busy => debug!("poll skipped: {}", err),
            FailureClass::InvalidRequest => error!("poll rejected: {}", err),
        }
    }
}
