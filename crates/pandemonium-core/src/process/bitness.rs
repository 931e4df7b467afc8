use serde::Serialize;

/// Pointer width of an attached process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
pub enum Bitness {
    #[strum(serialize = "32-bit")]
    Bits32,
    #[strum(serialize = "64-bit")]
    Bits64,
}

impl Bitness {
    /// Decide a target's pointer width.
    ///
    /// A process is 64-bit only when the host OS is 64-bit and the process
    /// does not run under the 32-bit compatibility layer (WoW64, or a 32-bit
    /// ELF image on Linux).
    pub fn determine(host_is_64_bit: bool, target_is_compat_32: bool) -> Self {
        if host_is_64_bit && !target_is_compat_32 {
            Bitness::Bits64
        } else {
            Bitness::Bits32
        }
    }

    /// Size in bytes of a pointer in the target.
    pub fn pointer_width(self) -> usize {
        match self {
            Bitness::Bits32 => 4,
            Bitness::Bits64 => 8,
        }
    }

    /// Highest address the target can refer to.
    pub fn max_address(self) -> u64 {
        match self {
            Bitness::Bits32 => u32::MAX as u64,
            Bitness::Bits64 => u64::MAX,
        }
    }

    /// Decode a little-endian pointer value of this width.
    pub(crate) fn decode_pointer(self, bytes: &[u8]) -> u64 {
        let mut raw = [0u8; 8];
        let width = self.pointer_width().min(bytes.len());
        raw[..width].copy_from_slice(&bytes[..width]);
        u64::from_le_bytes(raw)
    }
}
