//! Scan events and the identifiers they carry.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// A 4-byte RFID card identifier.
///
/// Rendered as `0x` followed by 8 lowercase hex digits, zero-padded per byte,
/// which is the exact form the ingestion endpoint receives as `card_id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CardUid([u8; 4]);

impl CardUid {
    pub const fn new(bytes: [u8; 4]) -> Self {
        CardUid(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for CardUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "0x{:02x}{:02x}{:02x}{:02x}", a, b, c, d)
    }
}

/// Errors produced while parsing a card identifier from reader output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardUidError {
    /// Input did not contain exactly 8 hex digits
    Length(usize),

    /// Input contained a character that is not a hex digit or separator
    InvalidDigit(char),
}

impl fmt::Display for CardUidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardUidError::Length(n) => write!(f, "expected 8 hex digits, found {}", n),
            CardUidError::InvalidDigit(c) => write!(f, "invalid character {:?} in card id", c),
        }
    }
}

impl std::error::Error for CardUidError {}

impl FromStr for CardUid {
    type Err = CardUidError;

    /// Accepts `0x04a1b2c3`, `04a1b2c3`, `04:a1:b2:c3` and `04 a1 b2 c3`, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);

        let mut digits = Vec::with_capacity(8);
        for c in s.chars() {
            match c {
                ':' | ' ' | '-' => continue,
                _ => digits.push(c.to_digit(16).ok_or(CardUidError::InvalidDigit(c))? as u8),
            }
        }

        if digits.len() != 8 {
            return Err(CardUidError::Length(digits.len()));
        }

        let mut bytes = [0u8; 4];
        for (byte, pair) in bytes.iter_mut().zip(digits.chunks_exact(2)) {
            *byte = (pair[0] << 4) | pair[1];
        }
        Ok(CardUid(bytes))
    }
}

impl Serialize for CardUid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CardUid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// One captured reading. Serializes to the canonical wire body
/// `{"location": "...", "card_id": "0x........"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEvent {
    #[serde(rename = "location")]
    pub location_id: String,
    pub card_id: CardUid,
}

impl ScanEvent {
    pub fn new(location_id: impl Into<String>, card_id: CardUid) -> Self {
        ScanEvent {
            location_id: location_id.into(),
            card_id,
        }
    }
}

/// Monotonic millisecond counter since process start. The device clock is not
/// trusted, so queued records are tagged with uptime rather than wall time.
#[derive(Clone, Copy, Debug)]
pub struct LocalClock {
    origin: Instant,
}

impl LocalClock {
    pub fn start() -> Self {
        LocalClock {
            origin: Instant::now(),
        }
    }

    pub fn ticks(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

impl Default for LocalClock {
    fn default() -> Self {
        Self::start()
    }
}
