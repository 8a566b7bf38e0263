//! Binary payloads exchanged with the charger.
//!
//! Every multi-byte integer is little-endian. Decimal quantities travel as
//! fixed-point integers and are divided by their scale on decode, so a current
//! of `164` at scale 10 decodes to exactly `16.4`.
//!
//! Command frame (client -> charger):
//!
//! | off | len | field                                  |
//! |-----|-----|----------------------------------------|
//! | 0   | 1   | protocol version (1)                   |
//! | 1   | 4   | correlation token                      |
//! | 5   | 16  | charger id, NUL padded                 |
//! | 21  | 1   | command code                           |
//! | 22  | 1   | argument length N                      |
//! | 23  | N   | arguments                              |
//!
//! Reply frame (charger -> client) is the same 21-byte header followed by a
//! record whose first byte is the record kind.
//!
//! Status record, kind 0x01, 14-byte core:
//!
//! | off | len | scale | field               |
//! |-----|-----|-------|---------------------|
//! | 0   | 1   |       | kind                |
//! | 1   | 1   | enum  | charger state       |
//! | 2   | 1   | enum  | EV status           |
//! | 3   | 1   | enum  | charging state      |
//! | 4   | 1   | enum  | phase type          |
//! | 5   | 2   | /100  | power, kW           |
//! | 7   | 1   |       | set current, A      |
//! | 8   | 1   |       | circuit breaker, A  |
//! | 9   | 1   | enum  | grid type           |
//! | 10  | 2   | bits  | warnings            |
//! | 12  | 2   | bits  | errors              |
//!
//! followed by an optional 106-byte detail block (record length 120):
//!
//! | off | len | field                         |
//! |-----|-----|-------------------------------|
//! | 14  | 16  | firmware version              |
//! | 30  | 16  | kubis version                 |
//! | 46  | 8   | scheduler version             |
//! | 54  | 24  | EVSE id                       |
//! | 78  | 32  | wifi network                  |
//! | 110 | 1   | wifi rssi, i8 dBm             |
//! | 111 | 1   | bus link type                 |
//! | 112 | 4   | session start, unix seconds   |
//! | 116 | 4   | report time, unix seconds     |
//!
//! Metrics record, kind 0x02, 44 bytes:
//!
//! | off        | len | scale | field                 |
//! |------------|-----|-------|-----------------------|
//! | 0          | 1   |       | kind                  |
//! | 1          | 2   | /100  | power, kW             |
//! | 3          | 4   | /1000 | session energy, kWh   |
//! | 7          | 4   | /10   | total energy, kWh     |
//! | 11, 13, 15 | 2   | /10   | voltage L1-L3, V      |
//! | 17, 19, 21 | 2   | /10   | current L1-L3, A      |
//! | 23         | 2   | /10   | temperature, C (i16)  |
//! | 25         | 2   |       | ping latency, ms      |
//! | 27         | 1   |       | link quality, %       |
//! | 28         | 16  |       | peer serial           |

use crate::prelude::*;
use crate::utils::Utils;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use nom_derive::{Nom, Parse};
use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};
use serde::Serialize;

use super::charger::CHARGER_ID_LEN;

pub const PROTOCOL_VERSION: u8 = 1;
pub const REPLY_HEADER_LEN: usize = 1 + 4 + CHARGER_ID_LEN;
pub const COMMAND_HEADER_LEN: usize = REPLY_HEADER_LEN + 2;
pub const MAX_ARGS_LEN: usize = u8::MAX as usize;

pub const STATUS_LEN: usize = 14;
pub const STATUS_DETAIL_LEN: usize = 120;
pub const METRICS_LEN: usize = 44;

// {{{ RecordKind / CommandCode
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum RecordKind {
    Status = 0x01,
    Metrics = 0x02,
}

impl RecordKind {
    pub fn name(&self) -> &'static str {
        match self {
            RecordKind::Status => "status",
            RecordKind::Metrics => "metrics",
        }
    }

    fn min_len(&self) -> usize {
        match self {
            RecordKind::Status => STATUS_LEN,
            RecordKind::Metrics => METRICS_LEN,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CommandCode {
    GetStatus = 0x01,
    GetMetrics = 0x02,
}

impl CommandCode {
    /// Record kind the charger answers this command with.
    pub fn reply_kind(&self) -> RecordKind {
        match self {
            CommandCode::GetStatus => RecordKind::Status,
            CommandCode::GetMetrics => RecordKind::Metrics,
        }
    }
}
// }}}

// {{{ enumerated fields
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ChargerState {
    Available = 0,
    Preparing = 1,
    Charging = 2,
    SuspendedEv = 3,
    SuspendedEvse = 4,
    Finishing = 5,
    Faulted = 6,
    Unavailable = 7,
    #[num_enum(catch_all)]
    Unknown(u8),
}

impl ChargerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargerState::Available => "available",
            ChargerState::Preparing => "preparing",
            ChargerState::Charging => "charging",
            ChargerState::SuspendedEv => "suspended_ev",
            ChargerState::SuspendedEvse => "suspended_evse",
            ChargerState::Finishing => "finishing",
            ChargerState::Faulted => "faulted",
            ChargerState::Unavailable => "unavailable",
            ChargerState::Unknown(_) => "unknown",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum EvStatus {
    Disconnected = 0,
    Connected = 1,
    Ready = 2,
    Charging = 3,
    Error = 4,
    #[num_enum(catch_all)]
    Unknown(u8),
}

impl EvStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvStatus::Disconnected => "disconnected",
            EvStatus::Connected => "connected",
            EvStatus::Ready => "ready",
            EvStatus::Charging => "charging",
            EvStatus::Error => "error",
            EvStatus::Unknown(_) => "unknown",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ChargingState {
    Idle = 0,
    Charging = 1,
    Paused = 2,
    Scheduled = 3,
    Complete = 4,
    #[num_enum(catch_all)]
    Unknown(u8),
}

impl ChargingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargingState::Idle => "idle",
            ChargingState::Charging => "charging",
            ChargingState::Paused => "paused",
            ChargingState::Scheduled => "scheduled",
            ChargingState::Complete => "complete",
            ChargingState::Unknown(_) => "unknown",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum PhaseType {
    SinglePhase = 1,
    ThreePhase = 3,
    #[num_enum(catch_all)]
    Unknown(u8),
}

impl PhaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseType::SinglePhase => "single_phase",
            PhaseType::ThreePhase => "three_phase",
            PhaseType::Unknown(_) => "unknown",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum GridType {
    Tn = 0,
    Tt = 1,
    It = 2,
    #[num_enum(catch_all)]
    Unknown(u8),
}

impl GridType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GridType::Tn => "TN",
            GridType::Tt => "TT",
            GridType::It => "IT",
            GridType::Unknown(_) => "unknown",
        }
    }
}

/// How the charger itself reaches the bus.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MqttType {
    None = 0,
    Wifi = 1,
    Cellular = 2,
    Ethernet = 3,
    #[num_enum(catch_all)]
    Unknown(u8),
}

impl MqttType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MqttType::None => "none",
            MqttType::Wifi => "wifi",
            MqttType::Cellular => "cellular",
            MqttType::Ethernet => "ethernet",
            MqttType::Unknown(_) => "unknown",
        }
    }
}
// }}}

// {{{ ChargerStatus
#[derive(Clone, Debug, PartialEq, Serialize, Nom)]
#[nom(LittleEndian)]
pub struct ChargerStatus {
    #[nom(Parse = "Utils::enum_u8")]
    pub state: ChargerState,
    #[nom(Parse = "Utils::enum_u8")]
    pub ev_status: EvStatus,
    #[nom(Parse = "Utils::enum_u8")]
    pub charging_state: ChargingState,
    #[nom(Parse = "Utils::enum_u8")]
    pub phase_type: PhaseType,
    #[nom(Parse = "Utils::le_u16_div100")]
    pub power_kw: f64,
    pub set_current: u8,
    pub circuit_breaker: u8,
    #[nom(Parse = "Utils::enum_u8")]
    pub grid_type: GridType,
    pub warning_bits: u16,
    pub error_bits: u16,

    #[nom(Ignore)]
    pub detail: Option<StatusDetail>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Nom)]
#[nom(LittleEndian)]
pub struct StatusDetail {
    #[nom(Parse = "Utils::ascii16")]
    pub firmware_version: String,
    #[nom(Parse = "Utils::ascii16")]
    pub kubis_version: String,
    #[nom(Parse = "Utils::ascii8")]
    pub scheduler_version: String,
    #[nom(Parse = "Utils::ascii24")]
    pub evse: String,
    #[nom(Parse = "Utils::ascii32")]
    pub wifi_network: String,
    pub wifi_rssi: i8,
    #[nom(Parse = "Utils::enum_u8")]
    pub mqtt_type: MqttType,
    #[nom(Parse = "Utils::le_u32_unixtime")]
    pub start_time: DateTime<Utc>,
    #[nom(Parse = "Utils::le_u32_unixtime")]
    pub timestamp: DateTime<Utc>,
}

impl ChargerStatus {
    pub fn warnings(&self) -> Vec<String> {
        WarningCodeString::from_bits(self.warning_bits)
    }

    pub fn errors(&self) -> Vec<String> {
        FaultCodeString::from_bits(self.error_bits)
    }

    pub fn firmware_version(&self) -> Option<&str> {
        self.detail.as_ref().map(|d| d.firmware_version.as_str())
    }

    pub fn kubis_version(&self) -> Option<&str> {
        self.detail.as_ref().map(|d| d.kubis_version.as_str())
    }
} // }}}

// {{{ ChargerMetrics
#[derive(Clone, Debug, PartialEq, Serialize, Nom)]
#[nom(LittleEndian)]
pub struct ChargerMetrics {
    #[nom(Parse = "Utils::le_u16_div100")]
    pub power_kw: f64,
    #[nom(Parse = "Utils::le_u32_div1000")]
    pub session_energy_kwh: f64,
    #[nom(Parse = "Utils::le_u32_div10")]
    pub total_energy_kwh: f64,

    #[nom(Parse = "Utils::le_u16_div10")]
    pub voltage_ph1: f64,
    #[nom(Parse = "Utils::le_u16_div10")]
    pub voltage_ph2: f64,
    #[nom(Parse = "Utils::le_u16_div10")]
    pub voltage_ph3: f64,

    #[nom(Parse = "Utils::le_u16_div10")]
    pub current_ph1: f64,
    #[nom(Parse = "Utils::le_u16_div10")]
    pub current_ph2: f64,
    #[nom(Parse = "Utils::le_u16_div10")]
    pub current_ph3: f64,

    #[nom(Parse = "Utils::le_i16_div10")]
    pub temperature: f64,
    pub avg_ping_latency: u16,
    pub link_quality: u8,
    #[nom(Parse = "Utils::ascii16")]
    pub peer_serial_number: String,
}

impl ChargerMetrics {
    pub fn voltage_avg(&self) -> f64 {
        Utils::avg_energised(&[self.voltage_ph1, self.voltage_ph2, self.voltage_ph3])
    }

    pub fn current_avg(&self) -> f64 {
        Utils::avg_energised(&[self.current_ph1, self.current_ph2, self.current_ph3])
    }
} // }}}

// {{{ Record
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    Status(ChargerStatus),
    Metrics(ChargerMetrics),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Status(_) => RecordKind::Status,
            Record::Metrics(_) => RecordKind::Metrics,
        }
    }
} // }}}

// {{{ envelopes
/// One outbound command; immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEnvelope {
    charger_id: ChargerId,
    command: CommandCode,
    token: Token,
    args: Vec<u8>,
}

impl CommandEnvelope {
    pub fn new(
        charger_id: ChargerId,
        command: CommandCode,
        token: Token,
        args: &[u8],
    ) -> Result<Self, EncodeError> {
        if args.len() > MAX_ARGS_LEN {
            return Err(EncodeError::ArgsTooLong {
                len: args.len(),
                max: MAX_ARGS_LEN,
            });
        }

        Ok(Self {
            charger_id,
            command,
            token,
            args: args.to_vec(),
        })
    }

    pub fn charger_id(&self) -> ChargerId {
        self.charger_id
    }

    pub fn command(&self) -> CommandCode {
        self.command
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn bytes(&self) -> Vec<u8> {
        let mut r = Vec::with_capacity(COMMAND_HEADER_LEN + self.args.len());

        r.push(PROTOCOL_VERSION);
        r.extend_from_slice(&self.token.0.to_le_bytes());
        r.extend_from_slice(&self.charger_id.data());
        r.push(self.command.into());
        // length checked in new()
        r.push(self.args.len() as u8);
        r.extend_from_slice(&self.args);

        r
    }
}

/// A reply frame as it came off the response topic, record still undecoded.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseEnvelope {
    pub token: Token,
    pub charger_id: ChargerId,
    pub record: Bytes,
    pub arrival: DateTime<Utc>,
}

impl ResponseEnvelope {
    pub fn decode(&self) -> Result<Record, DecodeError> {
        decode_record(&self.record)
    }
} // }}}

// {{{ decoding
pub fn decode_record(input: &[u8]) -> Result<Record, DecodeError> {
    match Parser::kind(input)? {
        RecordKind::Status => decode_status(input).map(Record::Status),
        RecordKind::Metrics => decode_metrics(input).map(Record::Metrics),
    }
}

pub fn decode_status(input: &[u8]) -> Result<ChargerStatus, DecodeError> {
    Parser::expect(input, RecordKind::Status)?;

    let (_, mut status) = ChargerStatus::parse(&input[1..STATUS_LEN])
        .map_err(|_| Parser::too_short(RecordKind::Status.name(), STATUS_LEN, input.len()))?;

    if input.len() > STATUS_LEN {
        if input.len() < STATUS_DETAIL_LEN {
            return Err(Parser::too_short("status detail", STATUS_DETAIL_LEN, input.len()));
        }
        let (_, detail) = StatusDetail::parse(&input[STATUS_LEN..STATUS_DETAIL_LEN])
            .map_err(|_| Parser::too_short("status detail", STATUS_DETAIL_LEN, input.len()))?;
        status.detail = Some(detail);
    }

    Ok(status)
}

pub fn decode_metrics(input: &[u8]) -> Result<ChargerMetrics, DecodeError> {
    Parser::expect(input, RecordKind::Metrics)?;

    let (_, metrics) = ChargerMetrics::parse(&input[1..METRICS_LEN])
        .map_err(|_| Parser::too_short(RecordKind::Metrics.name(), METRICS_LEN, input.len()))?;

    Ok(metrics)
}

pub fn decode_reply_frame(input: &[u8], arrival: DateTime<Utc>) -> Result<ResponseEnvelope, DecodeError> {
    if input.len() < REPLY_HEADER_LEN {
        return Err(Parser::too_short("reply frame", REPLY_HEADER_LEN, input.len()));
    }
    if input[0] != PROTOCOL_VERSION {
        return Err(DecodeError::UnsupportedVersion(input[0]));
    }

    let mut token = [0u8; 4];
    token.copy_from_slice(&input[1..5]);
    let mut charger_id = [0u8; CHARGER_ID_LEN];
    charger_id.copy_from_slice(&input[5..REPLY_HEADER_LEN]);

    Ok(ResponseEnvelope {
        token: Token(u32::from_le_bytes(token)),
        charger_id: ChargerId::from(charger_id),
        record: Bytes::copy_from_slice(&input[REPLY_HEADER_LEN..]),
        arrival,
    })
}

struct Parser;
impl Parser {
    fn kind(input: &[u8]) -> Result<RecordKind, DecodeError> {
        let first = *input.first().ok_or(DecodeError::Empty)?;
        let kind = RecordKind::try_from(first).map_err(|_| DecodeError::UnknownKind(first))?;
        if input.len() < kind.min_len() {
            return Err(Self::too_short(kind.name(), kind.min_len(), input.len()));
        }
        Ok(kind)
    }

    fn expect(input: &[u8], wanted: RecordKind) -> Result<(), DecodeError> {
        let kind = Self::kind(input)?;
        if kind != wanted {
            // a known discriminant, just not one this decoder understands
            return Err(DecodeError::UnknownKind(kind.into()));
        }
        Ok(())
    }

    fn too_short(kind: &'static str, expected: usize, actual: usize) -> DecodeError {
        DecodeError::TooShort {
            kind,
            expected,
            actual,
        }
    }
}
// }}}

// {{{ encoding
pub fn encode_command(
    charger_id: ChargerId,
    command: CommandCode,
    token: Token,
    args: &[u8],
) -> Result<Vec<u8>, EncodeError> {
    Ok(CommandEnvelope::new(charger_id, command, token, args)?.bytes())
}

/// Inverse of `encode_command`, for the charger side of the exchange.
pub fn decode_command(input: &[u8]) -> Result<CommandEnvelope, DecodeError> {
    if input.len() < COMMAND_HEADER_LEN {
        return Err(Parser::too_short("command frame", COMMAND_HEADER_LEN, input.len()));
    }
    if input[0] != PROTOCOL_VERSION {
        return Err(DecodeError::UnsupportedVersion(input[0]));
    }

    let header = decode_reply_frame(&input[..REPLY_HEADER_LEN], Utc::now())?;
    let code = input[REPLY_HEADER_LEN];
    let command = CommandCode::try_from(code).map_err(|_| DecodeError::UnknownKind(code))?;
    let args_len = input[REPLY_HEADER_LEN + 1] as usize;
    if input.len() < COMMAND_HEADER_LEN + args_len {
        return Err(Parser::too_short(
            "command frame",
            COMMAND_HEADER_LEN + args_len,
            input.len(),
        ));
    }

    // args_len came from a single byte, so it always fits
    Ok(CommandEnvelope {
        charger_id: header.charger_id,
        command,
        token: header.token,
        args: input[COMMAND_HEADER_LEN..COMMAND_HEADER_LEN + args_len].to_vec(),
    })
}

pub fn encode_reply_frame(charger_id: ChargerId, token: Token, record: &[u8]) -> Vec<u8> {
    let mut r = Vec::with_capacity(REPLY_HEADER_LEN + record.len());
    r.push(PROTOCOL_VERSION);
    r.extend_from_slice(&token.0.to_le_bytes());
    r.extend_from_slice(&charger_id.data());
    r.extend_from_slice(record);
    r
}

pub fn encode_status(status: &ChargerStatus) -> Vec<u8> {
    let mut r = Vec::with_capacity(STATUS_DETAIL_LEN);

    r.push(RecordKind::Status.into());
    r.push(status.state.into());
    r.push(status.ev_status.into());
    r.push(status.charging_state.into());
    r.push(status.phase_type.into());
    r.extend_from_slice(&Utils::fixed_u16(status.power_kw, 100.0));
    r.push(status.set_current);
    r.push(status.circuit_breaker);
    r.push(status.grid_type.into());
    r.extend_from_slice(&status.warning_bits.to_le_bytes());
    r.extend_from_slice(&status.error_bits.to_le_bytes());

    if let Some(d) = &status.detail {
        r.extend(Utils::padded_ascii(&d.firmware_version, 16));
        r.extend(Utils::padded_ascii(&d.kubis_version, 16));
        r.extend(Utils::padded_ascii(&d.scheduler_version, 8));
        r.extend(Utils::padded_ascii(&d.evse, 24));
        r.extend(Utils::padded_ascii(&d.wifi_network, 32));
        r.push(d.wifi_rssi as u8);
        r.push(d.mqtt_type.into());
        r.extend_from_slice(&Utils::unixtime(&d.start_time));
        r.extend_from_slice(&Utils::unixtime(&d.timestamp));
    }

    r
}

pub fn encode_metrics(metrics: &ChargerMetrics) -> Vec<u8> {
    let mut r = Vec::with_capacity(METRICS_LEN);

    r.push(RecordKind::Metrics.into());
    r.extend_from_slice(&Utils::fixed_u16(metrics.power_kw, 100.0));
    r.extend_from_slice(&Utils::fixed_u32(metrics.session_energy_kwh, 1000.0));
    r.extend_from_slice(&Utils::fixed_u32(metrics.total_energy_kwh, 10.0));
    for v in [metrics.voltage_ph1, metrics.voltage_ph2, metrics.voltage_ph3] {
        r.extend_from_slice(&Utils::fixed_u16(v, 10.0));
    }
    for i in [metrics.current_ph1, metrics.current_ph2, metrics.current_ph3] {
        r.extend_from_slice(&Utils::fixed_u16(i, 10.0));
    }
    r.extend_from_slice(&Utils::fixed_i16(metrics.temperature, 10.0));
    r.extend_from_slice(&metrics.avg_ping_latency.to_le_bytes());
    r.push(metrics.link_quality);
    r.extend(Utils::padded_ascii(&metrics.peer_serial_number, 16));

    r
}

pub fn encode_record(record: &Record) -> Vec<u8> {
    match record {
        Record::Status(s) => encode_status(s),
        Record::Metrics(m) => encode_metrics(m),
    }
}
// }}}

// {{{ warning / fault strings
pub struct WarningCodeString;
impl WarningCodeString {
    pub fn from_bits(value: u16) -> Vec<String> {
        (0..16)
            .filter(|bit| value & (1 << bit) != 0)
            .map(Self::from_bit)
            .collect()
    }

    fn from_bit(bit: usize) -> String {
        match bit {
            0 => "W01: Overtemperature derating".to_string(),
            1 => "W02: Grid voltage out of range".to_string(),
            2 => "W03: Ground monitoring disabled".to_string(),
            3 => "W04: Meter communication lost".to_string(),
            4 => "W05: Load balancing limit active".to_string(),
            5 => "W06: Cloud connection lost".to_string(),
            n => format!("W{:02}: Reserved", n + 1),
        }
    }
}

pub struct FaultCodeString;
impl FaultCodeString {
    pub fn from_bits(value: u16) -> Vec<String> {
        (0..16)
            .filter(|bit| value & (1 << bit) != 0)
            .map(Self::from_bit)
            .collect()
    }

    fn from_bit(bit: usize) -> String {
        match bit {
            0 => "E01: Residual current detected".to_string(),
            1 => "E02: Contactor welded".to_string(),
            2 => "E03: Overcurrent".to_string(),
            3 => "E04: Overvoltage".to_string(),
            4 => "E05: Undervoltage".to_string(),
            5 => "E06: Overtemperature shutdown".to_string(),
            6 => "E07: Control pilot fault".to_string(),
            7 => "E08: Internal communication fault".to_string(),
            n => format!("E{:02}: Reserved", n + 1),
        }
    }
}
// }}}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_keep_unknown_values() {
        assert_eq!(ChargerState::from(42u8), ChargerState::Unknown(42));
        assert_eq!(u8::from(ChargerState::Unknown(42)), 42);
        assert_eq!(PhaseType::from(3u8), PhaseType::ThreePhase);
    }

    #[test]
    fn warning_bits_to_strings() {
        assert!(WarningCodeString::from_bits(0).is_empty());
        assert_eq!(
            WarningCodeString::from_bits(0b10_0001),
            vec!["W01: Overtemperature derating", "W06: Cloud connection lost"]
        );
        assert_eq!(FaultCodeString::from_bits(1 << 15), vec!["E16: Reserved"]);
    }

    #[test]
    fn command_frame_layout() {
        let id = ChargerId::from_str("EXAMPLE123456").unwrap();
        let bytes = encode_command(id, CommandCode::GetMetrics, Token(0x0403_0201), &[]).unwrap();

        assert_eq!(bytes.len(), COMMAND_HEADER_LEN);
        assert_eq!(bytes[0], PROTOCOL_VERSION);
        assert_eq!(&bytes[1..5], &[1, 2, 3, 4]);
        assert_eq!(&bytes[5..18], b"EXAMPLE123456");
        assert_eq!(&bytes[18..21], &[0, 0, 0]);
        assert_eq!(bytes[21], 0x02);
        assert_eq!(bytes[22], 0);
    }

    #[test]
    fn command_frame_decodes_back() {
        let id = ChargerId::from_str("EXAMPLE123456").unwrap();
        let envelope = CommandEnvelope::new(id, CommandCode::GetStatus, Token(7), &[9, 8]).unwrap();
        assert_eq!(decode_command(&envelope.bytes()).unwrap(), envelope);
    }

    #[test]
    fn oversized_args_are_refused() {
        let id = ChargerId::from_str("EXAMPLE123456").unwrap();

        let bytes = encode_command(id, CommandCode::GetStatus, Token(1), &[7; MAX_ARGS_LEN]).unwrap();
        assert_eq!(bytes.len(), COMMAND_HEADER_LEN + MAX_ARGS_LEN);
        assert_eq!(bytes[22], 255);

        assert_eq!(
            encode_command(id, CommandCode::GetStatus, Token(1), &[7; MAX_ARGS_LEN + 1]),
            Err(EncodeError::ArgsTooLong { len: 256, max: 255 })
        );
    }

    #[test]
    fn truncated_command_args() {
        let id = ChargerId::from_str("EXAMPLE123456").unwrap();
        let mut bytes = encode_command(id, CommandCode::GetStatus, Token(7), &[1, 2, 3]).unwrap();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            decode_command(&bytes),
            Err(DecodeError::TooShort { kind: "command frame", .. })
        ));
    }

    #[test]
    fn reply_frame_header_too_short() {
        assert_eq!(
            decode_reply_frame(&[1, 2, 3], Utc::now()),
            Err(DecodeError::TooShort {
                kind: "reply frame",
                expected: REPLY_HEADER_LEN,
                actual: 3
            })
        );
    }

    #[test]
    fn reply_frame_wrong_version() {
        let mut bytes = vec![0u8; REPLY_HEADER_LEN + 1];
        bytes[0] = 9;
        assert_eq!(
            decode_reply_frame(&bytes, Utc::now()),
            Err(DecodeError::UnsupportedVersion(9))
        );
    }

    #[test]
    fn metrics_decoder_rejects_status_record() {
        let mut bytes = vec![0u8; METRICS_LEN];
        bytes[0] = 0x01;
        assert_eq!(decode_metrics(&bytes), Err(DecodeError::UnknownKind(0x01)));
    }

    #[test]
    fn empty_record() {
        assert_eq!(decode_record(&[]), Err(DecodeError::Empty));
    }
}
