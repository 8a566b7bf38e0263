//! A charger living on a `MemoryBus`, for `--simulate` runs and tests.

use crate::prelude::*;

use crate::evmeter::packet::{
    self, ChargerState, ChargingState, EvStatus, GridType, MqttType, PhaseType, StatusDetail,
};
use crate::transport::MemoryBus;

use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Answer,
    /// Swallow every command.
    Silent,
    Delay(Duration),
    /// Reply with a record cut short.
    Truncated,
}

struct State {
    mode: Mode,
    status: ChargerStatus,
    metrics: ChargerMetrics,
}

pub struct SimulatedCharger {
    state: Arc<Mutex<State>>,
    commands: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl SimulatedCharger {
    /// Subscribes before returning, so commands published afterwards are seen.
    pub fn spawn(
        bus: MemoryBus,
        charger_id: ChargerId,
        user_id: &str,
        status: ChargerStatus,
        metrics: ChargerMetrics,
    ) -> Self {
        let state = Arc::new(Mutex::new(State {
            mode: Mode::Answer,
            status,
            metrics,
        }));
        let commands = Arc::new(AtomicUsize::new(0));

        let mut inbox = bus.subscribe(&topics::command_topic(charger_id.as_str()));
        let response_topic = topics::response_topic(user_id);

        let task = {
            let state = state.clone();
            let commands = commands.clone();
            tokio::spawn(async move {
                while let Some(message) = inbox.recv().await {
                    let command = match packet::decode_command(&message.payload) {
                        Ok(command) if command.charger_id() == charger_id => command,
                        Ok(command) => {
                            debug!("simulator {}: ignoring command for {}", charger_id, command.charger_id());
                            continue;
                        }
                        Err(err) => {
                            warn!("simulator {}: bad command: {}", charger_id, err);
                            continue;
                        }
                    };
                    commands.fetch_add(1, Ordering::SeqCst);

                    let (mode, mut record) = {
                        let state = state.lock().unwrap();
                        let record = match command.command() {
                            CommandCode::GetStatus => packet::encode_status(&state.status),
                            CommandCode::GetMetrics => packet::encode_metrics(&state.metrics),
                        };
                        (state.mode, record)
                    };

                    let delay = match mode {
                        Mode::Silent => continue,
                        Mode::Answer => Duration::ZERO,
                        Mode::Delay(delay) => delay,
                        Mode::Truncated => {
                            record.truncate(3);
                            Duration::ZERO
                        }
                    };

                    let frame = packet::encode_reply_frame(charger_id, command.token(), &record);
                    let bus = bus.clone();
                    let topic = response_topic.clone();
                    tokio::spawn(async move {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        bus.publish(&topic, frame, false).await;
                    });
                }
            })
        };

        Self {
            state,
            commands,
            task,
        }
    }

    pub fn set_mode(&self, mode: Mode) {
        self.state.lock().unwrap().mode = mode;
    }

    pub fn set_status(&self, status: ChargerStatus) {
        self.state.lock().unwrap().status = status;
    }

    pub fn set_metrics(&self, metrics: ChargerMetrics) {
        self.state.lock().unwrap().metrics = metrics;
    }

    /// Commands addressed to this charger so far, answered or not.
    pub fn commands_seen(&self) -> usize {
        self.commands.load(Ordering::SeqCst)
    }

    pub fn sample_status() -> ChargerStatus {
        ChargerStatus {
            state: ChargerState::Charging,
            ev_status: EvStatus::Charging,
            charging_state: ChargingState::Charging,
            phase_type: PhaseType::ThreePhase,
            power_kw: 11.04,
            set_current: 16,
            circuit_breaker: 32,
            grid_type: GridType::Tn,
            warning_bits: 0,
            error_bits: 0,
            detail: Some(StatusDetail {
                firmware_version: "2.4.1".to_string(),
                kubis_version: "1.9.0".to_string(),
                scheduler_version: "3.1".to_string(),
                evse: "IL*EVM*E000123".to_string(),
                wifi_network: "garage".to_string(),
                wifi_rssi: -61,
                mqtt_type: MqttType::Wifi,
                start_time: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default(),
                timestamp: Utc.timestamp_opt(1_700_003_600, 0).single().unwrap_or_default(),
            }),
        }
    }

    pub fn sample_metrics() -> ChargerMetrics {
        ChargerMetrics {
            power_kw: 11.04,
            session_energy_kwh: 8.125,
            total_energy_kwh: 4821.7,
            voltage_ph1: 230.1,
            voltage_ph2: 229.8,
            voltage_ph3: 231.0,
            current_ph1: 16.0,
            current_ph2: 16.1,
            current_ph3: 15.9,
            temperature: 38.5,
            avg_ping_latency: 48,
            link_quality: 87,
            peer_serial_number: "EVM-PEER-0042".to_string(),
        }
    }
}

impl Drop for SimulatedCharger {
    fn drop(&mut self) {
        self.task.abort();
    }
}
