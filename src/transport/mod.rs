pub mod memory;
pub mod mqtt;

use crate::prelude::*;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::time::Duration;

pub use memory::{MemoryBus, MemoryTransport};
pub use mqtt::MqttTransport;

pub const INBOUND_CAPACITY: usize = 64;

/// Everything needed to open a session as a given user.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub user_id: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
}

impl Credentials {
    pub fn response_topic(&self) -> String {
        topics::response_topic(&self.user_id)
    }

    pub fn session_topic(&self) -> String {
        topics::session_topic(&self.user_id)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub arrival: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            arrival: Utc::now(),
        }
    }
}

/// Messages from the subscribed topics, in arrival order. Ends with the session.
pub type Inbound = mpsc::Receiver<InboundMessage>;

/// One connection to the bus at a time.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens the link, authenticates and subscribes to the response topic.
    /// Must not be called on a live session.
    async fn connect(&self, credentials: &Credentials) -> Result<(), ConnectError>;

    /// Fire-and-forget; Ok only means the local session took the write.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;

    /// The current session's inbound stream. Can be taken once per session.
    fn take_inbound(&self) -> Option<Inbound>;

    /// Safe to call when already down.
    async fn disconnect(&self);

    /// Advisory only: a session can die without telling us.
    fn is_alive(&self) -> bool;

    fn subscribed_topics(&self) -> Vec<String>;

    fn last_activity(&self) -> Option<DateTime<Utc>>;
}

// SessionState {{{
/// Book-keeping for one session. Only the owning transport mutates it.
#[derive(Debug, Default)]
pub struct SessionState {
    connected: bool,
    subscribed_topics: BTreeSet<String>,
    last_activity: Option<DateTime<Utc>>,
}

impl SessionState {
    pub(crate) fn opened(&mut self, topics: impl IntoIterator<Item = String>) {
        self.connected = true;
        self.subscribed_topics = topics.into_iter().collect();
        self.touch();
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Some(Utc::now());
    }

    pub(crate) fn closed(&mut self) {
        self.connected = false;
        self.subscribed_topics.clear();
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        self.subscribed_topics.iter().cloned().collect()
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_activity
    }
} // }}}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_state_lifecycle() {
        let mut state = SessionState::default();
        assert!(!state.connected());
        assert!(state.last_activity().is_none());

        state.opened(vec!["evmeter/user/u/response".to_string()]);
        assert!(state.connected());
        assert_eq!(state.subscribed_topics(), vec!["evmeter/user/u/response"]);
        assert!(state.last_activity().is_some());

        state.closed();
        assert!(!state.connected());
        assert!(state.subscribed_topics().is_empty());
        // last activity survives teardown for diagnostics
        assert!(state.last_activity().is_some());
    }
}
