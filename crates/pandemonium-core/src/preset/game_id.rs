use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// 128-bit game identifier, written as a hyphenated UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GameId(u128);

impl GameId {
    /// Build from the most and least significant halves.
    pub const fn from_parts(high: i64, low: i64) -> Self {
        GameId(((high as u64 as u128) << 64) | (low as u64 as u128))
    }

    pub const fn from_u128(value: u128) -> Self {
        GameId(value)
    }

    pub fn high(self) -> i64 {
        (self.0 >> 64) as u64 as i64
    }

    pub fn low(self) -> i64 {
        self.0 as u64 as i64
    }

    pub fn as_u128(self) -> u128 {
        self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = format!("{:032x}", self.0);
        write!(
            f,
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        )
    }
}

impl FromStr for GameId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let digits: String = s.trim().chars().filter(|c| *c != '-').collect();
        if digits.len() != 32 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidConfig(format!("invalid game id: {}", s)));
        }
        u128::from_str_radix(&digits, 16)
            .map(GameId)
            .map_err(|e| Error::InvalidConfig(format!("invalid game id {}: {}", s, e)))
    }
}

impl Serialize for GameId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GameId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
