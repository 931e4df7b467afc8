use thiserror::Error;

use crate::effect::EffectId;

#[derive(Debug, Error)]
pub enum Error {
    // Process state
    #[error("Process is not open")]
    ProcessNotOpen,

    #[error("Process is already open")]
    ProcessAlreadyOpen,

    #[error("Process {pid} has terminated")]
    ProcessTerminated { pid: u32 },

    // Attachment
    #[error("Permission denied while attaching to process {pid}: {message}")]
    PermissionDenied { pid: u32, message: String },

    #[error("Failed to attach to process {pid}: {message}")]
    AttachFailed { pid: u32, message: String },

    #[error("Failed to enumerate processes: {0}")]
    EnumerationFailed(String),

    // Memory transfer
    #[error("Short read at address {address:#x}: expected {expected} bytes, got {actual}")]
    ShortRead {
        address: u64,
        expected: usize,
        actual: usize,
    },

    #[error("Short write at address {address:#x}: expected {expected} bytes, wrote {actual}")]
    ShortWrite {
        address: u64,
        expected: usize,
        actual: usize,
    },

    // Address
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Address out of bounds: {base:#x} + {offset:#x}")]
    AddressOutOfBounds { base: u64, offset: u64 },

    #[error("Invalid or unmapped address {0:#x}")]
    InvalidAddress(u64),

    #[error("Pointer belongs to process {expected}, not {actual}")]
    ForeignPointer { expected: u32, actual: u32 },

    #[error("Invalid pointer path: {0}")]
    InvalidPointerPath(String),

    // Preset decoding
    #[error("Preset version mismatch: expected {expected}, got {actual}")]
    PresetVersionMismatch { expected: u32, actual: u32 },

    #[error("Preset buffer truncated while reading {0}")]
    PresetTruncated(&'static str),

    #[error("Malformed varint: exceeds {max_bytes} bytes")]
    MalformedVarint { max_bytes: usize },

    #[error("Malformed preset text: {0}")]
    MalformedPresetText(String),

    #[error("Preset seed is not valid UTF-8")]
    InvalidSeedEncoding,

    #[error("Preset targets game {actual}, expected {expected}")]
    PresetGameMismatch { expected: String, actual: String },

    // Configuration
    #[error("Incomplete matcher: {0}")]
    IncompleteMatcher(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Duplicate effect id {0}")]
    DuplicateEffect(EffectId),

    #[error("Unknown game: {0}")]
    UnknownGame(String),

    // Effects
    #[error("Effect {effect} failed to {phase}: {source}")]
    EffectFailed {
        effect: EffectId,
        phase: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Broad error category, used by callers that only care about how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ErrorKind {
    /// Not open / already open / terminated. Recover by re-scanning.
    State,
    /// Fatal for the current session.
    Attachment,
    /// Short read or write. The caller decides whether to retry.
    Transfer,
    /// Bad address, unknown module. A configuration mistake.
    Address,
    Preset,
    Configuration,
    Effect,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ProcessNotOpen | Error::ProcessAlreadyOpen | Error::ProcessTerminated { .. } => {
                ErrorKind::State
            }
            Error::PermissionDenied { .. }
            | Error::AttachFailed { .. }
            | Error::EnumerationFailed(_) => ErrorKind::Attachment,
            Error::ShortRead { .. } | Error::ShortWrite { .. } => ErrorKind::Transfer,
            Error::ModuleNotFound(_)
            | Error::AddressOutOfBounds { .. }
            | Error::InvalidAddress(_)
            | Error::ForeignPointer { .. }
            | Error::InvalidPointerPath(_) => ErrorKind::Address,
            Error::PresetVersionMismatch { .. }
            | Error::PresetTruncated(_)
            | Error::MalformedVarint { .. }
            | Error::MalformedPresetText(_)
            | Error::InvalidSeedEncoding
            | Error::PresetGameMismatch { .. } => ErrorKind::Preset,
            Error::IncompleteMatcher(_)
            | Error::InvalidConfig(_)
            | Error::DuplicateEffect(_)
            | Error::UnknownGame(_) => ErrorKind::Configuration,
            Error::EffectFailed { .. } => ErrorKind::Effect,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Only transfer errors are worth retrying; everything else needs a
    /// re-attach or a configuration change.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transfer
    }

    /// True when the process went away underneath us.
    pub fn is_terminated(&self) -> bool {
        match self {
            Error::ProcessTerminated { .. } => true,
            Error::EffectFailed { source, .. } => source.is_terminated(),
            _ => false,
        }
    }
}
