#![allow(dead_code)]

use evmeter_bridge::bridge::Bridge;
use evmeter_bridge::prelude::*;
use evmeter_bridge::simulator::SimulatedCharger;
use evmeter_bridge::transport::{MemoryBus, MemoryTransport};

use std::sync::Arc;
use std::time::Duration;

pub const CHARGER_ID: &str = "EXAMPLE123456";
pub const OTHER_CHARGER_ID: &str = "EXAMPLE654321";
pub const USER_ID: &str = "6578616D706C652D757365722D69642D31323334352D366578616D706C65";

pub fn common_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct Factory;
impl Factory {
    pub fn charger_id() -> ChargerId {
        ChargerId::from_str(CHARGER_ID).unwrap()
    }

    pub fn other_charger_id() -> ChargerId {
        ChargerId::from_str(OTHER_CHARGER_ID).unwrap()
    }

    pub fn credentials() -> Credentials {
        Credentials {
            host: "localhost".to_string(),
            port: 1883,
            username: "deviceEV".to_string(),
            password: "secret".to_string(),
            user_id: USER_ID.to_string(),
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(1),
        }
    }

    pub fn config() -> Config {
        Config::from_yaml(&format!(
            "charger_id: {}\nuser_id: {}\nrequest_timeout: 1\n",
            CHARGER_ID, USER_ID
        ))
        .unwrap()
    }

    pub fn status() -> ChargerStatus {
        SimulatedCharger::sample_status()
    }

    pub fn metrics() -> ChargerMetrics {
        SimulatedCharger::sample_metrics()
    }

    pub fn simulator(bus: &MemoryBus, charger_id: ChargerId) -> SimulatedCharger {
        SimulatedCharger::spawn(bus.clone(), charger_id, USER_ID, Self::status(), Self::metrics())
    }
}

/// A connected transport with a bridge reading its inbound stream.
pub struct Rig {
    pub bus: MemoryBus,
    pub transport: Arc<MemoryTransport>,
    pub bridge: Bridge,
}

impl Rig {
    pub async fn connected() -> Self {
        let bus = MemoryBus::new();
        let transport = Arc::new(MemoryTransport::new(bus.clone()));
        transport.connect(&Factory::credentials()).await.unwrap();

        let bridge = Bridge::new(transport.clone());
        bridge.attach(transport.take_inbound().unwrap());

        Self {
            bus,
            transport,
            bridge,
        }
    }

    pub fn response_topic(&self) -> String {
        topics::response_topic(USER_ID)
    }
}
