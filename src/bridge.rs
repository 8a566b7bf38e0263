use crate::prelude::*;

use crate::evmeter::charger::TokenSource;
use crate::evmeter::packet::{self, CommandEnvelope, RecordKind, ResponseEnvelope};
use crate::transport::Inbound;

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

struct Pending {
    token: Token,
    reply: oneshot::Sender<ResponseEnvelope>,
}

#[derive(Default)]
struct Registry {
    // bumped on every attach/detach so a stale dispatcher can't clobber a newer session
    generation: u64,
    live: bool,
    awaiting: HashMap<ChargerId, Pending>,
}

impl Registry {
    fn fail_all(&mut self) -> usize {
        // dropping the senders wakes every waiter with Disconnected
        let n = self.awaiting.len();
        self.awaiting.clear();
        n
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    registry: Mutex<Registry>,
    tokens: TokenSource,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

/// Request/response over the shared response topic.
///
/// At most one request per charger is outstanding. Replies are matched on
/// both charger id and token by a single dispatcher task which owns the
/// session's inbound stream.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
}

// Deregister {{{
// Removes our registry entry however the request ends, including when the
// request future is dropped mid-await.
struct Deregister<'a> {
    inner: &'a Inner,
    charger_id: ChargerId,
    token: Token,
}

impl Drop for Deregister<'_> {
    fn drop(&mut self) {
        let mut registry = self.inner.registry.lock().unwrap();
        if registry
            .awaiting
            .get(&self.charger_id)
            .is_some_and(|p| p.token == self.token)
        {
            registry.awaiting.remove(&self.charger_id);
        }
    }
} // }}}

impl Bridge {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_tokens(transport, TokenSource::default())
    }

    pub fn with_tokens(transport: Arc<dyn Transport>, tokens: TokenSource) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                registry: Mutex::new(Registry::default()),
                tokens,
                dispatcher: Mutex::new(None),
            }),
        }
    }

    /// Start consuming a freshly connected session's inbound stream. Any
    /// previous stream is abandoned and its waiters fail.
    pub fn attach(&self, inbound: Inbound) {
        let generation = {
            let mut registry = self.inner.registry.lock().unwrap();
            registry.generation += 1;
            registry.live = true;
            let failed = registry.fail_all();
            if failed > 0 {
                warn!("abandoning {} request(s) from the previous session", failed);
            }
            registry.generation
        };

        let handle = tokio::spawn(Self::dispatch(
            Arc::downgrade(&self.inner),
            inbound,
            generation,
        ));

        if let Some(old) = self.inner.dispatcher.lock().unwrap().replace(handle) {
            old.abort();
        }
    }

    /// Stop consuming and fail everything outstanding.
    pub fn detach(&self) {
        if let Some(old) = self.inner.dispatcher.lock().unwrap().take() {
            old.abort();
        }

        let mut registry = self.inner.registry.lock().unwrap();
        registry.generation += 1;
        registry.live = false;
        registry.fail_all();
    }

    pub fn is_live(&self) -> bool {
        self.inner.registry.lock().unwrap().live
    }

    pub fn pending(&self) -> usize {
        self.inner.registry.lock().unwrap().awaiting.len()
    }

    async fn dispatch(inner: Weak<Inner>, mut inbound: Inbound, generation: u64) {
        while let Some(message) = inbound.recv().await {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            Self::route(&inner, message);
        }

        if let Some(inner) = inner.upgrade() {
            let mut registry = inner.registry.lock().unwrap();
            if registry.generation == generation {
                registry.live = false;
                let failed = registry.fail_all();
                info!("inbound stream ended, failed {} waiting request(s)", failed);
            }
        }
    }

    fn route(inner: &Inner, message: InboundMessage) {
        let envelope = match packet::decode_reply_frame(&message.payload, message.arrival) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!("discarding frame on {}: {}", message.topic, err);
                return;
            }
        };

        let mut registry = inner.registry.lock().unwrap();
        match registry.awaiting.get(&envelope.charger_id) {
            Some(pending) if pending.token == envelope.token => {
                if let Some(pending) = registry.awaiting.remove(&envelope.charger_id) {
                    // the waiter may have given up a moment ago; nothing to do then
                    let _ = pending.reply.send(envelope);
                }
            }
            Some(pending) => debug!(
                "discarding reply from {} with token {}, waiting for {}",
                envelope.charger_id, envelope.token, pending.token
            ),
            None => debug!(
                "discarding unsolicited reply from {} with token {}",
                envelope.charger_id, envelope.token
            ),
        }
    }

    pub async fn request(
        &self,
        charger_id: ChargerId,
        command: CommandCode,
        args: &[u8],
        timeout: Duration,
    ) -> Result<Record, BridgeError> {
        let envelope = CommandEnvelope::new(charger_id, command, self.inner.tokens.next(), args)?;

        let rx = {
            let mut registry = self.inner.registry.lock().unwrap();
            if registry.awaiting.contains_key(&charger_id) {
                return Err(BridgeError::AlreadyInFlight(charger_id.to_string()));
            }
            if !registry.live {
                return Err(BridgeError::Disconnected);
            }

            let (tx, rx) = oneshot::channel();
            registry.awaiting.insert(
                charger_id,
                Pending {
                    token: envelope.token(),
                    reply: tx,
                },
            );
            rx
        };
        let _deregister = Deregister {
            inner: &self.inner,
            charger_id,
            token: envelope.token(),
        };

        let topic = topics::command_topic(charger_id.as_str());
        debug!("TX {:?} to {} token {}", command, charger_id, envelope.token());
        self.inner.transport.publish(&topic, envelope.bytes()).await?;

        let sent = Utc::now();
        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(BridgeError::Disconnected),
            Err(_) => return Err(BridgeError::Timeout(timeout)),
        };
        debug!(
            "RX reply from {} token {} after {}ms",
            response.charger_id,
            response.token,
            (response.arrival - sent).num_milliseconds()
        );

        let record = response.decode()?;
        Self::expect_kind(command.reply_kind(), &record)?;

        Ok(record)
    }

    pub async fn get_status(
        &self,
        charger_id: ChargerId,
        timeout: Duration,
    ) -> Result<ChargerStatus, BridgeError> {
        match self.request(charger_id, CommandCode::GetStatus, &[], timeout).await? {
            Record::Status(status) => Ok(status),
            other => Err(Self::unexpected(RecordKind::Status, &other)),
        }
    }

    pub async fn get_metrics(
        &self,
        charger_id: ChargerId,
        timeout: Duration,
    ) -> Result<ChargerMetrics, BridgeError> {
        match self.request(charger_id, CommandCode::GetMetrics, &[], timeout).await? {
            Record::Metrics(metrics) => Ok(metrics),
            other => Err(Self::unexpected(RecordKind::Metrics, &other)),
        }
    }

    fn expect_kind(expected: RecordKind, record: &Record) -> Result<(), BridgeError> {
        if record.kind() != expected {
            return Err(Self::unexpected(expected, record));
        }
        Ok(())
    }

    fn unexpected(expected: RecordKind, record: &Record) -> BridgeError {
        BridgeError::UnexpectedReply {
            expected: expected.name(),
            actual: record.kind().name(),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.dispatcher.get_mut().ok().and_then(|d| d.take()) {
            handle.abort();
        }
    }
}
