mod common;
use common::*;
use evmeter_bridge::client::{Client, SetupOutcome};
use evmeter_bridge::error::Error;
use evmeter_bridge::prelude::*;
use evmeter_bridge::scheduler::Scheduler;
use evmeter_bridge::simulator::Mode;
use evmeter_bridge::transport::{MemoryBus, MemoryTransport};

use std::sync::Arc;
use std::time::Duration;

fn client(bus: &MemoryBus) -> (Arc<MemoryTransport>, Arc<Client>) {
    let transport = Arc::new(MemoryTransport::new(bus.clone()));
    let client = Client::new(Factory::config(), transport.clone());
    (transport, Arc::new(client))
}

#[tokio::test]
async fn poll_returns_a_snapshot() {
    common_setup();
    let bus = MemoryBus::new();
    let _charger = Factory::simulator(&bus, Factory::charger_id());
    let (_, client) = client(&bus);

    let snapshot = client.poll().await.unwrap();

    assert_eq!(snapshot.status, Factory::status());
    assert_eq!(snapshot.metrics, Factory::metrics());
    assert_eq!(snapshot.to_json()["firmware_version"], "2.4.1");
}

#[tokio::test]
async fn overlapping_polls_fail_fast() {
    common_setup();
    let bus = MemoryBus::new();
    let charger = Factory::simulator(&bus, Factory::charger_id());
    charger.set_mode(Mode::Delay(Duration::from_millis(200)));
    let (_, client) = client(&bus);

    let first = {
        let client = client.clone();
        tokio::spawn(async move { client.poll().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = client.poll().await.unwrap_err();
    assert_eq!(err, Error::CycleInFlight);
    assert_eq!(err.class(), FailureClass::Busy);

    assert!(first.await.unwrap().is_ok());
}

#[tokio::test]
async fn poll_recovers_after_session_loss() {
    common_setup();
    let bus = MemoryBus::new();
    let _charger = Factory::simulator(&bus, Factory::charger_id());
    let (transport, client) = client(&bus);

    client.poll().await.unwrap();

    transport.sever(true);
    tokio::time::sleep(Duration::from_millis(20)).await;

    // the very next cycle rebuilds the session instead of failing
    assert!(client.poll().await.is_ok());
    assert_eq!(transport.connect_count(), 2);
}

#[tokio::test]
async fn validate_verified() {
    common_setup();
    let bus = MemoryBus::new();
    let _charger = Factory::simulator(&bus, Factory::charger_id());
    let (transport, client) = client(&bus);

    assert_eq!(client.validate().await, Ok(SetupOutcome::Verified));
    assert!(!transport.is_alive());
}

#[tokio::test]
async fn validate_accepts_a_silent_charger() {
    common_setup();
    let bus = MemoryBus::new();
    let charger = Factory::simulator(&bus, Factory::charger_id());
    charger.set_mode(Mode::Silent);
    let (_, client) = client(&bus);

    assert!(matches!(
        client.validate().await,
        Ok(SetupOutcome::DeviceOffline(_))
    ));
    assert_eq!(charger.commands_seen(), 1);
}

#[tokio::test]
async fn validate_rejects_broker_failure() {
    common_setup();
    let bus = MemoryBus::new();
    let (transport, client) = client(&bus);
    transport.fail_next_connect(ConnectError::Refused("ServiceUnavailable".to_string()));

    let err = client.validate().await.unwrap_err();

    assert!(matches!(
        err,
        Error::Guardian(GuardianError::ConnectFailed(ConnectError::Refused(_)))
    ));
    assert!(err.class().is_fatal());
}

#[tokio::test]
async fn scheduler_tick_and_shutdown() {
    common_setup();
    let bus = MemoryBus::new();
    let _charger = Factory::simulator(&bus, Factory::charger_id());
    let (transport, client) = client(&bus);

    let scheduler = Scheduler::new(client.clone());
    let snapshot = scheduler.tick().await.unwrap();
    assert_eq!(snapshot.metrics.power_kw, 11.04);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let running = tokio::spawn(async move { scheduler.start(shutdown_rx).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(()).unwrap();

    running.await.unwrap().unwrap();
    assert!(!transport.is_alive());
}
