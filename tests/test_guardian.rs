mod common;
use common::*;
use evmeter_bridge::error::Error;
use evmeter_bridge::guardian::{Guardian, GuardianState, Verdict};
use evmeter_bridge::prelude::*;
use evmeter_bridge::transport::{MemoryBus, MemoryTransport};

use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn guardian(bus: &MemoryBus) -> (Arc<MemoryTransport>, Guardian) {
    let transport = Arc::new(MemoryTransport::new(bus.clone()));
    let guardian = Guardian::new(transport.clone(), Factory::credentials());
    (transport, guardian)
}

#[tokio::test]
async fn reconnects_after_session_death() {
    common_setup();
    let bus = MemoryBus::new();
    let _charger = Factory::simulator(&bus, Factory::charger_id());
    let (transport, mut guardian) = guardian(&bus);

    assert_eq!(guardian.ensure_ready().await, Ok(Verdict::Reconnected));
    let connects = transport.connect_count();
    let disconnects = transport.disconnect_count();

    transport.sever(false);
    assert!(!transport.is_alive());

    assert_eq!(guardian.ensure_ready().await, Ok(Verdict::Reconnected));
    assert_eq!(transport.connect_count(), connects + 1);
    assert_eq!(transport.disconnect_count(), disconnects + 1);
    assert!(transport.is_alive());

    let status = guardian
        .bridge()
        .get_status(Factory::charger_id(), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(status, Factory::status());
}

#[tokio::test]
async fn healthy_session_is_left_alone() {
    common_setup();
    let bus = MemoryBus::new();
    let (transport, mut guardian) = guardian(&bus);

    guardian.ensure_ready().await.unwrap();
    for _ in 0..3 {
        assert_eq!(guardian.preflight().await, Verdict::Ready);
    }
    assert_eq!(transport.connect_count(), 1);
}

#[tokio::test]
async fn ended_stream_reconnects_even_if_transport_claims_alive() {
    common_setup();
    let bus = MemoryBus::new();
    let _charger = Factory::simulator(&bus, Factory::charger_id());
    let (transport, mut guardian) = guardian(&bus);
    guardian.ensure_ready().await.unwrap();

    // dies without the transport noticing
    transport.sever(true);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(transport.is_alive());
    assert!(!guardian.bridge().is_live());

    assert_eq!(guardian.preflight().await, Verdict::Reconnected);
    assert_eq!(guardian.state(), GuardianState::Ready);
    assert_eq!(transport.connect_count(), 2);
    assert!(guardian
        .bridge()
        .get_status(Factory::charger_id(), TIMEOUT)
        .await
        .is_ok());
}

#[tokio::test]
async fn reported_loss_forces_reconnect() {
    common_setup();
    let bus = MemoryBus::new();
    let _charger = Factory::simulator(&bus, Factory::charger_id());
    let (transport, mut guardian) = guardian(&bus);
    guardian.ensure_ready().await.unwrap();
    assert!(transport.is_alive());

    guardian.report(&BridgeError::Publish(PublishError::SessionClosed(
        "broken pipe".to_string(),
    )));
    assert_eq!(guardian.state(), GuardianState::Degraded);

    assert_eq!(guardian.preflight().await, Verdict::Reconnected);
    assert_eq!(transport.connect_count(), 2);
    assert!(guardian
        .bridge()
        .get_status(Factory::charger_id(), TIMEOUT)
        .await
        .is_ok());
}

#[tokio::test]
async fn connect_failure_leaves_guardian_disconnected() {
    common_setup();
    let bus = MemoryBus::new();
    let (transport, mut guardian) = guardian(&bus);
    transport.fail_next_connect(ConnectError::Auth("BadUserNamePassword".to_string()));

    assert_eq!(
        guardian.ensure_ready().await,
        Err(GuardianError::ConnectFailed(ConnectError::Auth(
            "BadUserNamePassword".to_string()
        )))
    );
    assert_eq!(guardian.state(), GuardianState::Disconnected);
    assert!(!guardian.bridge().is_live());

    assert_eq!(guardian.preflight().await, Verdict::Reconnected);
}

#[tokio::test]
async fn preflight_reports_failure_as_verdict() {
    common_setup();
    let bus = MemoryBus::new();
    let (transport, mut guardian) = guardian(&bus);
    transport.fail_next_connect(ConnectError::Dns {
        host: "iot.nayax.com".to_string(),
        reason: "no addresses".to_string(),
    });

    assert!(matches!(
        guardian.preflight().await,
        Verdict::Failed(GuardianError::ConnectFailed(ConnectError::Dns { .. }))
    ));
}

#[tokio::test]
async fn timeout_is_not_a_connectivity_fault() {
    common_setup();
    let timeout = Error::from(BridgeError::Timeout(Duration::from_secs(10)));
    let refused = Error::from(GuardianError::ConnectFailed(ConnectError::Refused(
        "ServiceUnavailable".to_string(),
    )));
    let busy = Error::from(BridgeError::AlreadyInFlight(CHARGER_ID.to_string()));

    assert_eq!(Guardian::classify(&timeout), FailureClass::DeviceUnresponsive);
    assert_eq!(Guardian::classify(&refused), FailureClass::Fatal);
    assert_eq!(Guardian::classify(&busy), FailureClass::Busy);
    assert_eq!(Guardian::classify(&Error::CycleInFlight), FailureClass::Busy);
    assert_eq!(
        Guardian::classify(&Error::from(BridgeError::Disconnected)),
        FailureClass::Fatal
    );
}

#[tokio::test]
async fn timeouts_do_not_degrade_the_session() {
    common_setup();
    let bus = MemoryBus::new();
    let (transport, mut guardian) = guardian(&bus);
    guardian.ensure_ready().await.unwrap();

    // nobody answers for this charger
    let err = guardian
        .bridge()
        .get_status(Factory::charger_id(), Duration::from_millis(50))
        .await
        .unwrap_err();
    guardian.report(&err);

    assert_eq!(guardian.state(), GuardianState::Ready);
    assert_eq!(guardian.preflight().await, Verdict::Ready);
    assert_eq!(transport.connect_count(), 1);
}
