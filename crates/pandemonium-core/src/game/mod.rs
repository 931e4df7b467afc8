//! Game definitions.
//!
//! A [`GameDefinition`] describes one supported game: how to recognize its
//! process, which effects exist for it, and how to read its state (title
//! screen, pause, reset) from memory.

mod catalog;
mod configuration;
pub mod dxhr;
mod state;

pub use catalog::GameCatalog;
pub use configuration::GameConfiguration;
pub use state::{DefaultStateMapper, GameStateMapper};

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::effect::{EffectDescriptor, EffectRegistry};
use crate::error::{Error, Result};
use crate::matcher::{MatcherChain, executable};
use crate::preset::{GameId, Preset, PresetBuilder};
use crate::process::Process;

pub type StateMapperFactory =
    Arc<dyn Fn(&Process) -> Result<Box<dyn GameStateMapper>> + Send + Sync>;

/// Descriptive information about a game definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub version: String,
    /// Bumped whenever effects or pointers change meaning
    pub revision: u32,
    pub project_url: Option<String>,
    pub reporting_url: Option<String>,
    pub authors: Vec<String>,
}

#[derive(Clone)]
pub struct GameDefinition {
    id: GameId,
    name: String,
    metadata: Metadata,
    executables: Vec<String>,
    matcher: MatcherChain,
    effects: Arc<EffectRegistry>,
    state_mapper: StateMapperFactory,
}

impl GameDefinition {
    pub fn builder(id: GameId, name: impl Into<String>) -> GameDefinitionBuilder {
        GameDefinitionBuilder::new(id, name)
    }

    pub fn id(&self) -> GameId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn revision(&self) -> u32 {
        self.metadata.revision
    }

    /// Executable names the game runs as.
    pub fn executables(&self) -> &[String] {
        &self.executables
    }

    pub fn matcher(&self) -> &MatcherChain {
        &self.matcher
    }

    pub fn effects(&self) -> &Arc<EffectRegistry> {
        &self.effects
    }

    pub fn state_mapper(&self, process: &Process) -> Result<Box<dyn GameStateMapper>> {
        (self.state_mapper)(process)
    }

    /// Preset builder for this game with every effect enabled.
    pub fn preset_builder(&self) -> PresetBuilder {
        let mut builder = Preset::builder(self.id, self.revision());
        for id in self.effects.ids() {
            builder.add_effect(id);
        }
        builder
    }
}

impl fmt::Debug for GameDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("metadata", &self.metadata)
            .field("executables", &self.executables)
            .field("matcher", &self.matcher)
            .field("effects", &self.effects.len())
            .finish_non_exhaustive()
    }
}

pub struct GameDefinitionBuilder {
    id: GameId,
    name: String,
    metadata: Metadata,
    executables: Vec<String>,
    matcher: Option<MatcherChain>,
    effects: Vec<EffectDescriptor>,
    state_mapper: Option<StateMapperFactory>,
}

impl GameDefinitionBuilder {
    fn new(id: GameId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            metadata: Metadata::default(),
            executables: Vec::new(),
            matcher: None,
            effects: Vec::new(),
            state_mapper: None,
        }
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn executable(mut self, name: impl Into<String>) -> Self {
        self.executables.push(name.into());
        self
    }

    /// Detection chain. Defaults to matching any of the executable names.
    pub fn matcher(mut self, chain: MatcherChain) -> Self {
        self.matcher = Some(chain);
        self
    }

    pub fn effect(mut self, descriptor: EffectDescriptor) -> Self {
        self.effects.push(descriptor);
        self
    }

    pub fn effects(mut self, descriptors: impl IntoIterator<Item = EffectDescriptor>) -> Self {
        self.effects.extend(descriptors);
        self
    }

    pub fn state_mapper<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Process) -> Result<Box<dyn GameStateMapper>> + Send + Sync + 'static,
    {
        self.state_mapper = Some(Arc::new(factory));
        self
    }

    pub fn build(self) -> Result<GameDefinition> {
        if self.executables.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "game {} names no executables",
                self.name
            )));
        }

        let matcher = match self.matcher {
            Some(chain) => chain,
            None => MatcherChain::or(
                self.executables
                    .iter()
                    .map(|name| executable().name(name.as_str()).and())
                    .collect::<Result<Vec<_>>>()?,
            ),
        };

        let state_mapper: StateMapperFactory = match self.state_mapper {
            Some(factory) => factory,
            None => Arc::new(|_: &Process| -> Result<Box<dyn GameStateMapper>> {
                Ok(Box::new(DefaultStateMapper))
            }),
        };

        Ok(GameDefinition {
            id: self.id,
            name: self.name,
            metadata: self.metadata,
            executables: self.executables,
            matcher,
            effects: Arc::new(EffectRegistry::try_from(self.effects)?),
            state_mapper,
        })
    }
}
