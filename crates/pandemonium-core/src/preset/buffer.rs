//! Varint byte buffer used by the preset wire format.
//!
//! Unsigned integers are written in base-128 groups, least significant group
//! first, with the high bit of each byte marking a continuation. Signed
//! integers are zigzag-mapped first. Reals are stored as signed integers in
//! units of 1/32.

use std::collections::BTreeSet;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};

const MAX_VARINT32_BYTES: usize = 5;
const MAX_VARINT64_BYTES: usize = 10;

/// Fixed-point scale of quantized reals.
pub const QUANTIZATION_SCALE: f64 = 32.0;

pub fn zigzag_encode_32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

pub fn zigzag_decode_32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

pub fn zigzag_encode_64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

pub fn zigzag_decode_64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// `value * 32`, truncated toward zero (saturating at the `i32` range).
pub fn quantize(value: f64) -> i32 {
    (value * QUANTIZATION_SCALE) as i32
}

pub fn dequantize(stored: i32) -> f64 {
    stored as f64 / QUANTIZATION_SCALE
}

/// Growable buffer with a read cursor.
///
/// One buffer serves one encode or one decode; it is not meant to be shared.
#[derive(Debug, Clone, Default)]
pub struct PresetBuffer {
    data: Vec<u8>,
    position: usize,
}

impl PresetBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data, position: 0 }
    }

    pub fn from_base64(text: &str) -> Result<Self> {
        let data = STANDARD
            .decode(text.trim())
            .map_err(|e| Error::MalformedPresetText(e.to_string()))?;
        Ok(Self::from_bytes(data))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn write_varint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.data.push((value as u8 & 0x7F) | 0x80);
            value >>= 7;
        }
        self.data.push(value as u8);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_varint(value as u64);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_u32(zigzag_encode_32(value));
    }

    pub fn write_i64(&mut self, value: i64) {
        self.write_varint(zigzag_encode_64(value));
    }

    /// Length-prefixed UTF-8.
    pub fn write_string(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.data.extend_from_slice(value.as_bytes());
    }

    pub fn write_quantized(&mut self, value: f64) {
        self.write_i32(quantize(value));
    }

    /// Count-prefixed collection of unsigned 32-bit values.
    pub fn write_u32_set<I>(&mut self, values: I)
    where
        I: IntoIterator<Item = u32>,
        I::IntoIter: ExactSizeIterator,
    {
        let values = values.into_iter();
        self.write_u32(values.len() as u32);
        for value in values {
            self.write_u32(value);
        }
    }

    fn read_byte(&mut self, field: &'static str) -> Result<u8> {
        let byte = *self
            .data
            .get(self.position)
            .ok_or(Error::PresetTruncated(field))?;
        self.position += 1;
        Ok(byte)
    }

    fn read_varint(&mut self, max_bytes: usize, field: &'static str) -> Result<u64> {
        let mut result = 0u64;
        for i in 0..max_bytes {
            let byte = self.read_byte(field)?;
            let payload = (byte & 0x7F) as u64;
            // Payload bits past bit 63 cannot be represented
            if 7 * i >= 57 && payload >> (64 - 7 * i) != 0 {
                return Err(Error::MalformedVarint { max_bytes });
            }
            result |= payload << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(Error::MalformedVarint { max_bytes })
    }

    pub fn read_u32(&mut self, field: &'static str) -> Result<u32> {
        let value = self.read_varint(MAX_VARINT32_BYTES, field)?;
        u32::try_from(value).map_err(|_| Error::MalformedVarint {
            max_bytes: MAX_VARINT32_BYTES,
        })
    }

    pub fn read_u64(&mut self, field: &'static str) -> Result<u64> {
        self.read_varint(MAX_VARINT64_BYTES, field)
    }

    pub fn read_i32(&mut self, field: &'static str) -> Result<i32> {
        self.read_u32(field).map(zigzag_decode_32)
    }

    pub fn read_i64(&mut self, field: &'static str) -> Result<i64> {
        self.read_u64(field).map(zigzag_decode_64)
    }

    pub fn read_string(&mut self, field: &'static str) -> Result<String> {
        let len = self.read_u32(field)? as usize;
        if len > self.remaining() {
            return Err(Error::PresetTruncated(field));
        }
        let bytes = &self.data[self.position..self.position + len];
        let value = std::str::from_utf8(bytes)
            .map_err(|_| Error::InvalidSeedEncoding)?
            .to_string();
        self.position += len;
        Ok(value)
    }

    pub fn read_quantized(&mut self, field: &'static str) -> Result<f64> {
        self.read_i32(field).map(dequantize)
    }

    /// Read a count-prefixed collection; duplicates collapse.
    pub fn read_u32_set(&mut self, field: &'static str) -> Result<BTreeSet<u32>> {
        let count = self.read_u32(field)?;
        let mut values = BTreeSet::new();
        for _ in 0..count {
            values.insert(self.read_u32(field)?);
        }
        Ok(values)
    }
}
