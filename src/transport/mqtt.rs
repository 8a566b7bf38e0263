use crate::prelude::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Incoming, LastWill,
    MqttOptions, Outgoing, QoS, SubscribeReasonCode,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{Inbound, SessionState, INBOUND_CAPACITY};

// outstanding requests rumqttc buffers between us and the event loop
const REQUEST_CAPACITY: usize = 10;
const TEARDOWN_GRACE: Duration = Duration::from_secs(1);

struct Link {
    client: AsyncClient,
    pump: JoinHandle<()>,
    session_topic: String,
    inbound: Option<Inbound>,
}

/// `Transport` over a real MQTT broker. rumqttc's own reconnect is never
/// used; once the event loop errors the session is over.
pub struct MqttTransport {
    session: Arc<Mutex<SessionState>>,
    link: Mutex<Option<Link>>,
}

impl Default for MqttTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MqttTransport {
    pub fn new() -> Self {
        Self {
            session: Arc::new(Mutex::new(SessionState::default())),
            link: Mutex::new(None),
        }
    }

    fn client_id() -> String {
        format!(
            "evmeter-bridge-{}-{}",
            std::process::id(),
            Utc::now().timestamp_millis()
        )
    }

    fn options(credentials: &Credentials) -> MqttOptions {
        let mut options =
            MqttOptions::new(Self::client_id(), &credentials.host, credentials.port);

        let will = LastWill {
            topic: credentials.session_topic(),
            message: bytes::Bytes::from(topics::SESSION_OFFLINE),
            qos: QoS::AtLeastOnce,
            retain: true,
        };
        options.set_last_will(will);

        options.set_keep_alive(credentials.keep_alive);
        options.set_clean_session(true);
        options.set_credentials(&credentials.username, &credentials.password);

        options
    }

    async fn resolve(host: &str, port: u16) -> Result<(), ConnectError> {
        let mut addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(|err| ConnectError::Dns {
                host: host.to_owned(),
                reason: err.to_string(),
            })?;

        if addrs.next().is_none() {
            return Err(ConnectError::Dns {
                host: host.to_owned(),
                reason: "no addresses".to_string(),
            });
        }

        Ok(())
    }

    fn classify(err: ConnectionError, timeout: Duration) -> ConnectError {
        match err {
            ConnectionError::ConnectionRefused(code) => match code {
                ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized => {
                    ConnectError::Auth(format!("{:?}", code))
                }
                code => ConnectError::Refused(format!("{:?}", code)),
            },
            ConnectionError::Io(err) if err.kind() == std::io::ErrorKind::ConnectionRefused => {
                ConnectError::Refused(err.to_string())
            }
            ConnectionError::Io(err) => ConnectError::Io(err.to_string()),
            ConnectionError::NetworkTimeout => ConnectError::Timeout(timeout.as_secs()),
            other => ConnectError::Protocol(other.to_string()),
        }
    }

    // Drives the event loop until the broker has acked both the connect and
    // our subscription. Publishes that race the SUBACK are kept.
    async fn handshake(
        client: &AsyncClient,
        eventloop: &mut EventLoop,
        topic: &str,
        tx: &mpsc::Sender<InboundMessage>,
        timeout: Duration,
    ) -> Result<(), ConnectError> {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(Self::classify(
                            ConnectionError::ConnectionRefused(ack.code),
                            timeout,
                        ));
                    }
                    debug!("CONNACK, subscribing to {}", topic);
                    client
                        .subscribe(topic, QoS::AtLeastOnce)
                        .await
                        .map_err(|err| ConnectError::Protocol(err.to_string()))?;
                }
                Ok(Event::Incoming(Incoming::SubAck(ack))) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        return Err(ConnectError::Protocol(format!(
                            "subscription to {} rejected",
                            topic
                        )));
                    }
                    return Ok(());
                }
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    let _ = tx.try_send(InboundMessage::new(publish.topic, publish.payload));
                }
                Ok(_) => {}
                Err(err) => return Err(Self::classify(err, timeout)),
            }
        }
    }

    async fn pump(
        mut eventloop: EventLoop,
        tx: mpsc::Sender<InboundMessage>,
        session: Arc<Mutex<SessionState>>,
    ) {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    session.lock().unwrap().touch();
                    debug!("RX: {} ({} bytes)", publish.topic, publish.payload.len());
                    // a missing reader is fine, the session stays usable for publishing
                    let _ = tx
                        .send(InboundMessage::new(publish.topic, publish.payload))
                        .await;
                }
                Ok(Event::Incoming(Incoming::Disconnect)) => {
                    warn!("broker closed the session");
                    break;
                }
                Ok(Event::Incoming(_)) => session.lock().unwrap().touch(),
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    debug!("disconnect sent");
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt session ended: {}", err);
                    break;
                }
            }
        }

        session.lock().unwrap().closed();
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&self, credentials: &Credentials) -> Result<(), ConnectError> {
        if self.link.lock().unwrap().is_some() {
            return Err(ConnectError::AlreadyConnected);
        }

        Self::resolve(&credentials.host, credentials.port).await?;

        info!(
            "connecting to mqtt at {}:{} as {}",
            credentials.host, credentials.port, credentials.username
        );

        let (client, mut eventloop) = AsyncClient::new(Self::options(credentials), REQUEST_CAPACITY);
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let response_topic = credentials.response_topic();

        let handshake = Self::handshake(
            &client,
            &mut eventloop,
            &response_topic,
            &tx,
            credentials.connect_timeout,
        );
        match tokio::time::timeout(credentials.connect_timeout, handshake).await {
            Err(_) => return Err(ConnectError::Timeout(credentials.connect_timeout.as_secs())),
            Ok(Err(err)) => return Err(err),
            Ok(Ok(())) => {}
        }

        let session_topic = credentials.session_topic();
        client
            .try_publish(&session_topic, QoS::AtLeastOnce, true, topics::SESSION_ONLINE)
            .map_err(|err| ConnectError::Protocol(err.to_string()))?;

        self.session.lock().unwrap().opened([response_topic.clone()]);
        let pump = tokio::spawn(Self::pump(eventloop, tx, self.session.clone()));

        *self.link.lock().unwrap() = Some(Link {
            client,
            pump,
            session_topic,
            inbound: Some(rx),
        });

        info!("mqtt session up, subscribed to {}", response_topic);

        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        let client = {
            let link = self.link.lock().unwrap();
            match link.as_ref() {
                None => return Err(PublishError::NotConnected),
                Some(link) if link.pump.is_finished() => {
                    return Err(PublishError::SessionClosed("event loop stopped".to_string()))
                }
                Some(link) => link.client.clone(),
            }
        };

        debug!("TX: {} ({} bytes)", topic, payload.len());
        client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|err| PublishError::SessionClosed(err.to_string()))?;

        self.session.lock().unwrap().touch();
        Ok(())
    }

    fn take_inbound(&self) -> Option<Inbound> {
        self.link.lock().unwrap().as_mut()?.inbound.take()
    }

    async fn disconnect(&self) {
        let link = self.link.lock().unwrap().take();

        if let Some(link) = link {
            if !link.pump.is_finished() {
                let _ = link.client.try_publish(
                    &link.session_topic,
                    QoS::AtLeastOnce,
                    true,
                    topics::SESSION_OFFLINE,
                );
                let _ = link.client.try_disconnect();
            }

            let mut pump = link.pump;
            if tokio::time::timeout(TEARDOWN_GRACE, &mut pump).await.is_err() {
                debug!("event loop did not stop in time, aborting");
                pump.abort();
            }
            info!("mqtt session closed");
        }

        self.session.lock().unwrap().closed();
    }

    fn is_alive(&self) -> bool {
        let link_running = self
            .link
            .lock()
            .unwrap()
            .as_ref()
            .map(|link| !link.pump.is_finished())
            .unwrap_or(false);

        link_running && self.session.lock().unwrap().connected()
    }

    fn subscribed_topics(&self) -> Vec<String> {
        self.session.lock().unwrap().subscribed_topics()
    }

    fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.session.lock().unwrap().last_activity()
    }
}
