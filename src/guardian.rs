use crate::prelude::*;

use crate::bridge::Bridge;
use crate::error::Error;

use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardianState {
    Disconnected,
    Connecting,
    Ready,
    /// An exchange reported the session gone; rebuilt on the next check.
    Degraded,
}

/// Outcome of a pre-flight check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Ready,
    Reconnected,
    Failed(GuardianError),
}

/// Keeps one usable session in place before each exchange.
pub struct Guardian {
    transport: Arc<dyn Transport>,
    bridge: Bridge,
    credentials: Credentials,
    state: GuardianState,
    force_reconnect: bool,
}

impl Guardian {
    pub fn new(transport: Arc<dyn Transport>, credentials: Credentials) -> Self {
        let bridge = Bridge::new(transport.clone());
        Self::with_bridge(transport, bridge, credentials)
    }

    pub fn with_bridge(transport: Arc<dyn Transport>, bridge: Bridge, credentials: Credentials) -> Self {
        Self {
            transport,
            bridge,
            credentials,
            state: GuardianState::Disconnected,
            force_reconnect: false,
        }
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn state(&self) -> GuardianState {
        self.state
    }

    fn set_state(&mut self, state: GuardianState) {
        if self.state != state {
            debug!("guardian {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    pub async fn preflight(&mut self) -> Verdict {
        match self.ensure_ready().await {
            Ok(verdict) => verdict,
            Err(err) => Verdict::Failed(err),
        }
    }

    pub async fn ensure_ready(&mut self) -> Result<Verdict, GuardianError> {
        if self.state == GuardianState::Ready && !self.force_reconnect {
            if !self.bridge.is_live() {
                warn!("inbound stream ended, reconnecting");
            } else if !self.transport.is_alive() {
                warn!("session no longer alive, reconnecting");
            } else {
                return Ok(Verdict::Ready);
            }
        }

        self.set_state(GuardianState::Connecting);

        // tear down whatever is left; harmless when nothing is
        self.bridge.detach();
        self.transport.disconnect().await;

        if let Err(err) = self.transport.connect(&self.credentials).await {
            error!("connect to {}:{} failed: {}", self.credentials.host, self.credentials.port, err);
            self.set_state(GuardianState::Disconnected);
            return Err(GuardianError::ConnectFailed(err));
        }

        let Some(inbound) = self.transport.take_inbound() else {
            self.transport.disconnect().await;
            self.set_state(GuardianState::Disconnected);
            return Err(GuardianError::ConnectFailed(ConnectError::Protocol(
                "session came up without an inbound stream".to_string(),
            )));
        };
        self.bridge.attach(inbound);

        self.force_reconnect = false;
        self.set_state(GuardianState::Ready);
        info!("session ready");

        Ok(Verdict::Reconnected)
    }

    /// Feed back the outcome of an exchange.
    pub fn report(&mut self, err: &BridgeError) {
        if err.session_lost() {
            warn!("session lost ({}), forcing reconnect", err);
            self.force_reconnect = true;
            if self.state == GuardianState::Ready {
                self.set_state(GuardianState::Degraded);
            }
        }
    }

    pub fn classify(err: &Error) -> FailureClass {
        err.class()
    }

    pub async fn shutdown(&mut self) {
        self.bridge.detach();
        self.transport.disconnect().await;
        self.force_reconnect = false;
        self.set_state(GuardianState::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryBus, MemoryTransport};
    use std::time::Duration;

    fn credentials() -> Credentials {
        Credentials {
            host: "localhost".to_string(),
            port: 1883,
            username: "u".to_string(),
            password: "p".to_string(),
            user_id: "user1".to_string(),
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn first_check_connects() {
        let transport = Arc::new(MemoryTransport::new(MemoryBus::new()));
        let mut guardian = Guardian::new(transport.clone(), credentials());

        assert_eq!(guardian.state(), GuardianState::Disconnected);
        assert_eq!(guardian.ensure_ready().await, Ok(Verdict::Reconnected));
        assert_eq!(guardian.state(), GuardianState::Ready);
        assert!(guardian.bridge().is_live());

        assert_eq!(guardian.ensure_ready().await, Ok(Verdict::Ready));
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn report_only_reacts_to_session_loss() {
        let transport = Arc::new(MemoryTransport::new(MemoryBus::new()));
        let mut guardian = Guardian::new(transport.clone(), credentials());
        guardian.ensure_ready().await.unwrap();

        guardian.report(&BridgeError::Timeout(Duration::from_secs(1)));
        assert_eq!(guardian.state(), GuardianState::Ready);

        guardian.report(&BridgeError::Disconnected);
        assert_eq!(guardian.state(), GuardianState::Degraded);
        assert_eq!(guardian.ensure_ready().await, Ok(Verdict::Reconnected));
        assert_eq!(transport.connect_count(), 2);
    }

    #[tokio::test]
    async fn shutdown_returns_to_disconnected() {
        let transport = Arc::new(MemoryTransport::new(MemoryBus::new()));
        let mut guardian = Guardian::new(transport.clone(), credentials());
        guardian.ensure_ready().await.unwrap();

        guardian.shutdown().await;

        assert_eq!(guardian.state(), GuardianState::Disconnected);
        assert!(!transport.is_alive());
        assert!(!guardian.bridge().is_live());
    }
}
