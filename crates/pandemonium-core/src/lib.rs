//! # pandemonium-core
//!
//! Core library for the Pandemonium race randomizer.
//!
//! This crate provides:
//! - Process memory access with deep pointers (Windows and Linux)
//! - Matcher chains that decide whether a process is a supported game
//! - The shareable preset codec
//! - The seeded effect scheduling engine
//! - Game definitions, the process watcher and the race session
//!
//! Everything is driven by the caller: the crate spawns no threads and owns
//! no clock. See [`session::RaceSession`] for the three ticks a front end
//! runs.

pub mod config;
pub mod effect;
pub mod engine;
pub mod error;
pub mod game;
pub mod matcher;
pub mod prelude;
pub mod preset;
pub mod process;
pub mod retry;
pub mod session;
pub mod watcher;

pub use config::SessionConfig;
pub use effect::{
    Effect, EffectDescriptor, EffectEvent, EffectId, EffectObserver, EffectRegistry, Patch,
    PatchEffect,
};
pub use engine::{EffectEngine, EngineState, GameStatus};
pub use error::{Error, ErrorKind, Result};
pub use game::{GameCatalog, GameConfiguration, GameDefinition, GameStateMapper, Metadata};
pub use matcher::MatcherChain;
pub use preset::{GameId, Preset, PresetBuilder};
pub use process::{Pointer, PointerPath, Process, ProcessEntry, ProcessProvider, native_provider};
pub use retry::{ExponentialBackoff, FixedDelay, NoRetry, RetryPolicy, RetryStrategy};
pub use session::RaceSession;
pub use watcher::ProcessWatcher;
