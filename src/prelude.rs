pub use anyhow::{anyhow, bail, Result};
pub use log::{debug, error, info, trace, warn};
pub use std::io::Write;
pub use std::str::FromStr;
pub use tokio::sync::{broadcast, mpsc, oneshot};

pub use crate::config::{self, Config};
pub use crate::error::{
    BridgeError, ConnectError, DecodeError, EncodeError, FailureClass, GuardianError, PublishError,
};
pub use crate::evmeter::{
    self,
    charger::{ChargerId, Token},
    packet::{ChargerMetrics, ChargerStatus, CommandCode, Record},
};
pub use crate::options::Options;
pub use crate::topics;
pub use crate::transport::{self, Credentials, InboundMessage, Transport};
