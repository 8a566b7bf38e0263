use crate::prelude::*;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// One complete poll: a status and a metrics record taken back to back.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub status: ChargerStatus,
    pub metrics: ChargerMetrics,
    pub taken_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Attribute {
    pub key: &'static str,
    pub name: &'static str,
    pub unit: Option<&'static str>,
    pub value: Value,
}

// key, display name, unit
const DESCRIPTIONS: &[(&str, &str, Option<&str>)] = &[
    ("status", "Charger Status", None),
    ("ev_status", "EV Status", None),
    ("charging_state", "Charging State", None),
    ("phase_type", "Phase Type", None),
    ("power", "Charging Power", Some("kW")),
    ("session_energy", "Session Energy", Some("kWh")),
    ("total_energy", "Total Energy", Some("kWh")),
    ("voltage_ph1", "Voltage Phase 1", Some("V")),
    ("voltage_ph2", "Voltage Phase 2", Some("V")),
    ("voltage_ph3", "Voltage Phase 3", Some("V")),
    ("voltage_avg", "Average Voltage", Some("V")),
    ("current_ph1", "Current Phase 1", Some("A")),
    ("current_ph2", "Current Phase 2", Some("A")),
    ("current_ph3", "Current Phase 3", Some("A")),
    ("current_avg", "Average Current", Some("A")),
    ("set_current", "Set Current", Some("A")),
    ("circuit_breaker", "Circuit Breaker", Some("A")),
    ("temperature", "Temperature", Some("°C")),
    ("wifi_network", "WiFi Network", None),
    ("firmware_version", "Firmware Version", None),
    ("kubis_version", "Kubis Version", None),
    ("warnings", "Warnings", None),
    ("errors", "Errors", None),
    ("evse", "EVSE ID", None),
    ("ping_latency", "Ping Latency", Some("ms")),
    ("grid_type", "Grid Type", None),
    ("mqtt_type", "MQTT Status", None),
    ("start_time", "Start Time", None),
    ("scheduler_version", "Scheduler Version", None),
    ("peer_serial", "Peer Serial Number", None),
];

impl Snapshot {
    pub fn new(status: ChargerStatus, metrics: ChargerMetrics) -> Self {
        Self {
            status,
            metrics,
            taken_at: Utc::now(),
        }
    }

    pub fn attributes(&self) -> Vec<Attribute> {
        DESCRIPTIONS
            .iter()
            .map(|&(key, name, unit)| Attribute {
                key,
                name,
                unit,
                value: self.value(key),
            })
            .collect()
    }

    /// `{key: value}` for every attribute.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .attributes()
            .into_iter()
            .map(|a| (a.key.to_string(), a.value))
            .collect();
        Value::Object(map)
    }

    fn value(&self, key: &str) -> Value {
        let s = &self.status;
        let m = &self.metrics;
        let d = s.detail.as_ref();

        match key {
            "status" => json!(s.state.as_str()),
            "ev_status" => json!(s.ev_status.as_str()),
            "charging_state" => json!(s.charging_state.as_str()),
            "phase_type" => json!(s.phase_type.as_str()),
            "power" => json!(m.power_kw),
            "session_energy" => json!(m.session_energy_kwh),
            "total_energy" => json!(m.total_energy_kwh),
            "voltage_ph1" => json!(m.voltage_ph1),
            "voltage_ph2" => json!(m.voltage_ph2),
            "voltage_ph3" => json!(m.voltage_ph3),
            "voltage_avg" => json!(m.voltage_avg()),
            "current_ph1" => json!(m.current_ph1),
            "current_ph2" => json!(m.current_ph2),
            "current_ph3" => json!(m.current_ph3),
            "current_avg" => json!(m.current_avg()),
            "set_current" => json!(s.set_current),
            "circuit_breaker" => json!(s.circuit_breaker),
            "temperature" => json!(m.temperature),
            "wifi_network" => json!(d.map(|d| &d.wifi_network)),
            "firmware_version" => json!(s.firmware_version()),
            "kubis_version" => json!(s.kubis_version()),
            "warnings" => json!(s.warnings()),
            "errors" => json!(s.errors()),
            "evse" => json!(d.map(|d| &d.evse)),
            "ping_latency" => json!(m.avg_ping_latency),
            "grid_type" => json!(s.grid_type.as_str()),
            "mqtt_type" => json!(d.map(|d| d.mqtt_type.as_str())),
            "start_time" => json!(d.map(|d| d.start_time.to_rfc3339())),
            "scheduler_version" => json!(d.map(|d| &d.scheduler_version)),
            "peer_serial" => json!(m.peer_serial_number),
            _ => Value::Null,
        }
    }
}
