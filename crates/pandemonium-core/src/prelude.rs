//! Prelude module for convenient imports
//!
//! This module re-exports the most commonly used types and traits from
//! pandemonium-core.
//!
//! # Usage
//!
//! ```ignore
//! use pandemonium_core::prelude::*;
//! ```
//!
//! This brings the following into scope:
//!
//! - Session types: `RaceSession`, `SessionConfig`, `ProcessWatcher`
//! - Games: `GameCatalog`, `GameDefinition`, `GameConfiguration`
//! - Presets: `Preset`, `PresetBuilder`, `GameId`
//! - Effects: `EffectDescriptor`, `EffectId`, `EffectEvent`, `Patch`
//! - Error handling: `Error`, `Result`

// Session
pub use crate::config::SessionConfig;
pub use crate::session::RaceSession;
pub use crate::watcher::ProcessWatcher;

// Error handling
pub use crate::error::{Error, ErrorKind, Result};

// Games
pub use crate::game::{GameCatalog, GameConfiguration, GameDefinition, GameStateMapper};

// Presets
pub use crate::preset::{GameId, Preset, PresetBuilder};

// Effects
pub use crate::effect::{Effect, EffectDescriptor, EffectEvent, EffectId, Patch};
pub use crate::engine::{EffectEngine, EngineState, GameStatus};

// Process access
pub use crate::matcher::MatcherChain;
pub use crate::process::{PointerPath, Process, ProcessProvider, native_provider};
