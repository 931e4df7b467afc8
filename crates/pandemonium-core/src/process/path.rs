use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Pointer address in the notation used by memory debuggers:
/// `module+offset[, offset...]`, offsets in hex with an optional `0x` prefix.
///
/// ```
/// use pandemonium_core::process::PointerPath;
///
/// let path: PointerPath = "dxhr.exe+0x1858238, 0x70, 0x14".parse().unwrap();
/// assert_eq!(path.module(), "dxhr.exe");
/// assert_eq!(path.offsets(), &[0x1858238, 0x70, 0x14]);
/// assert!(path.is_deep());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PointerPath {
    module: String,
    offsets: Vec<u64>,
}

impl PointerPath {
    pub fn new(module: impl Into<String>, offset: u64, extra: &[u64]) -> Self {
        let mut offsets = Vec::with_capacity(extra.len() + 1);
        offsets.push(offset);
        offsets.extend_from_slice(extra);
        Self {
            module: module.into(),
            offsets,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn is_deep(&self) -> bool {
        self.offsets.len() > 1
    }
}

fn parse_hex(value: &str) -> Option<u64> {
    let value = value.trim();
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

impl FromStr for PointerPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidPointerPath(s.to_string());

        let (module, rest) = s.split_once('+').ok_or_else(invalid)?;
        let module = module.trim();
        if module.is_empty() {
            return Err(invalid());
        }

        let offsets = rest
            .split(',')
            .map(parse_hex)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(invalid)?;

        Ok(Self {
            module: module.to_string(),
            offsets,
        })
    }
}

impl fmt::Display for PointerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+", self.module)?;
        for (i, offset) in self.offsets.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:#x}", offset)?;
        }
        Ok(())
    }
}

impl Serialize for PointerPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PointerPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
