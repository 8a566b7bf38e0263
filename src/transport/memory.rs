//! In-process bus with exact-match topics. Backs `--simulate` runs and the
//! test suite; `MemoryTransport` can be made to fail or die on demand.

use crate::prelude::*;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{Inbound, SessionState, INBOUND_CAPACITY};

type SubscriptionId = usize;

#[derive(Default)]
struct BusInner {
    next_id: SubscriptionId,
    subscriptions: Vec<(SubscriptionId, String, mpsc::Sender<InboundMessage>)>,
    retained: HashMap<String, Bytes>,
}

#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<Mutex<BusInner>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: &str) -> Inbound {
        self.subscribe_with_id(topic).1
    }

    fn subscribe_with_id(&self, topic: &str) -> (SubscriptionId, Inbound) {
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscriptions.push((id, topic.to_owned(), tx));
        (id, rx)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .retain(|(sid, _, _)| *sid != id);
    }

    pub async fn publish(&self, topic: &str, payload: impl Into<Bytes>, retain: bool) {
        let payload = payload.into();
        let targets: Vec<mpsc::Sender<InboundMessage>> = {
            let mut inner = self.inner.lock().unwrap();
            if retain {
                inner.retained.insert(topic.to_owned(), payload.clone());
            }
            inner
                .subscriptions
                .iter()
                .filter(|(_, t, _)| t == topic)
                .map(|(_, _, tx)| tx.clone())
                .collect()
        };

        for tx in targets {
            // a gone subscriber is not the publisher's problem
            let _ = tx.send(InboundMessage::new(topic, payload.clone())).await;
        }
    }

    pub fn retained(&self, topic: &str) -> Option<Bytes> {
        self.inner.lock().unwrap().retained.get(topic).cloned()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .filter(|(_, t, _)| t == topic)
            .count()
    }
}

struct Link {
    subscription: SubscriptionId,
    session_topic: String,
    inbound: Option<Inbound>,
    kill: Option<oneshot::Sender<()>>,
    broken: bool,
}

/// A `Transport` over a `MemoryBus`.
pub struct MemoryTransport {
    bus: MemoryBus,
    session: Arc<Mutex<SessionState>>,
    link: Mutex<Option<Link>>,
    faults: Mutex<VecDeque<ConnectError>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl MemoryTransport {
    pub fn new(bus: MemoryBus) -> Self {
        Self {
            bus,
            session: Arc::new(Mutex::new(SessionState::default())),
            link: Mutex::new(None),
            faults: Mutex::new(VecDeque::new()),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// The next `connect` fails with `err`.
    pub fn fail_next_connect(&self, err: ConnectError) {
        self.faults.lock().unwrap().push_back(err);
    }

    /// Kill the session the way a dropped TCP link would: the inbound stream
    /// ends and publishes fail. With `silent`, `is_alive` keeps claiming the
    /// session is fine.
    pub fn sever(&self, silent: bool) {
        let mut link = self.link.lock().unwrap();
        if let Some(link) = link.as_mut() {
            if let Some(kill) = link.kill.take() {
                let _ = kill.send(());
            }
            self.bus.unsubscribe(link.subscription);
            link.broken = true;
        }
        if !silent {
            self.session.lock().unwrap().closed();
        }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn forward(
        mut subscription: Inbound,
        tx: mpsc::Sender<InboundMessage>,
        mut kill: oneshot::Receiver<()>,
        session: Arc<Mutex<SessionState>>,
    ) {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut kill => break,
                    message = subscription.recv() => match message {
                        Some(message) => {
                            session.lock().unwrap().touch();
                            if tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, credentials: &Credentials) -> Result<(), ConnectError> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        if self.link.lock().unwrap().is_some() {
            return Err(ConnectError::AlreadyConnected);
        }
        let fault = self.faults.lock().unwrap().pop_front();
        if let Some(err) = fault {
            return Err(err);
        }

        let response_topic = credentials.response_topic();
        let (subscription, bus_rx) = self.bus.subscribe_with_id(&response_topic);
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let (kill_tx, kill_rx) = oneshot::channel();
        Self::forward(bus_rx, tx, kill_rx, self.session.clone());

        *self.link.lock().unwrap() = Some(Link {
            subscription,
            session_topic: credentials.session_topic(),
            inbound: Some(rx),
            kill: Some(kill_tx),
            broken: false,
        });
        self.session.lock().unwrap().opened([response_topic]);

        self.bus
            .publish(&credentials.session_topic(), topics::SESSION_ONLINE, true)
            .await;

        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        {
            let link = self.link.lock().unwrap();
            match link.as_ref() {
                None => return Err(PublishError::NotConnected),
                Some(link) if link.broken => {
                    return Err(PublishError::SessionClosed("link severed".to_string()))
                }
                Some(_) => {}
            }
        }

        self.bus.publish(topic, payload, false).await;
        self.session.lock().unwrap().touch();
        Ok(())
    }

    fn take_inbound(&self) -> Option<Inbound> {
        self.link.lock().unwrap().as_mut()?.inbound.take()
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);

        let link = self.link.lock().unwrap().take();
        if let Some(mut link) = link {
            if let Some(kill) = link.kill.take() {
                let _ = kill.send(());
            }
            self.bus.unsubscribe(link.subscription);
            if !link.broken {
                self.bus
                    .publish(&link.session_topic, topics::SESSION_OFFLINE, true)
                    .await;
            }
        }
        self.session.lock().unwrap().closed();
    }

    fn is_alive(&self) -> bool {
        self.session.lock().unwrap().connected()
    }

    fn subscribed_topics(&self) -> Vec<String> {
        self.session.lock().unwrap().subscribed_topics()
    }

    fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.session.lock().unwrap().last_activity()
    }
}
