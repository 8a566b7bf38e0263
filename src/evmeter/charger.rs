use crate::prelude::*;

use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicU32, Ordering};

pub const CHARGER_ID_LEN: usize = 16;

// ChargerId {{{
/// Charger identifier as carried on the wire: up to 16 ASCII bytes, NUL padded.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChargerId([u8; CHARGER_ID_LEN]);

impl ChargerId {
    /// Build from a raw wire field; trailing padding is kept as-is.
    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        Ok(Self(bytes.try_into()?))
    }

    pub fn data(&self) -> [u8; CHARGER_ID_LEN] {
        self.0
    }

    pub fn as_str(&self) -> &str {
        let end = self
            .0
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(CHARGER_ID_LEN);
        // garbage from the wire displays as empty; it can never match a configured id
        std::str::from_utf8(&self.0[..end]).unwrap_or_default()
    }
}

impl From<[u8; CHARGER_ID_LEN]> for ChargerId {
    fn from(bytes: [u8; CHARGER_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Display for ChargerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::fmt::Debug for ChargerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for ChargerId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl std::str::FromStr for ChargerId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            bail!("charger id cannot be empty");
        }
        if s.len() > CHARGER_ID_LEN {
            bail!("charger id {} is longer than {} characters", s, CHARGER_ID_LEN);
        }
        if !s.bytes().all(|b| b.is_ascii_graphic()) {
            bail!("charger id {} must be printable ASCII", s);
        }

        let mut r = [0u8; CHARGER_ID_LEN];
        r[..s.len()].copy_from_slice(s.as_bytes());
        Ok(Self(r))
    }
} // }}}

// Token {{{
/// Correlation token echoed by the charger in its reply header.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize)]
pub struct Token(pub u32);

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Hands out a fresh token per request.
#[derive(Debug)]
pub struct TokenSource {
    next: AtomicU32,
}

impl Default for TokenSource {
    fn default() -> Self {
        // seed from the clock so tokens from a previous process run don't repeat straight away
        let seed = chrono::Utc::now().timestamp_subsec_nanos() ^ std::process::id();
        Self::starting_at(seed)
    }
}

impl TokenSource {
    pub fn starting_at(seed: u32) -> Self {
        Self {
            next: AtomicU32::new(seed),
        }
    }

    pub fn next(&self) -> Token {
        Token(self.next.fetch_add(1, Ordering::Relaxed))
    }
} // }}}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_pads() {
        let id = ChargerId::from_str("EXAMPLE123456").unwrap();
        assert_eq!(id.to_string(), "EXAMPLE123456");
        assert_eq!(&id.data()[13..], &[0, 0, 0]);
    }

    #[test]
    fn rejects_bad_ids() {
        assert!(ChargerId::from_str("").is_err());
        assert!(ChargerId::from_str("THIS-ID-IS-WAY-TOO-LONG").is_err());
        assert!(ChargerId::from_str("has space").is_err());
    }

    #[test]
    fn wire_round_trip() {
        let id = ChargerId::from_str("EXAMPLE123456").unwrap();
        assert_eq!(ChargerId::from_wire(&id.data()).unwrap(), id);
    }

    #[test]
    fn tokens_are_fresh() {
        let source = TokenSource::starting_at(u32::MAX);
        assert_eq!(source.next(), Token(u32::MAX));
        assert_eq!(source.next(), Token(0));
    }
}
