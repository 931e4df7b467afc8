use std::collections::BTreeMap;
use std::sync::Arc;

use super::{EffectDescriptor, EffectId};
use crate::error::{Error, Result};

/// Effect descriptors of one game, ordered by id.
#[derive(Debug, Clone, Default)]
pub struct EffectRegistry {
    effects: BTreeMap<EffectId, Arc<EffectDescriptor>>,
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor. Ids must be unique.
    pub fn register(&mut self, descriptor: EffectDescriptor) -> Result<()> {
        let id = descriptor.id();
        if self.effects.contains_key(&id) {
            return Err(Error::DuplicateEffect(id));
        }
        self.effects.insert(id, Arc::new(descriptor));
        Ok(())
    }

    pub fn get(&self, id: EffectId) -> Option<&Arc<EffectDescriptor>> {
        self.effects.get(&id)
    }

    pub fn contains(&self, id: EffectId) -> bool {
        self.effects.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = EffectId> + '_ {
        self.effects.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EffectDescriptor>> {
        self.effects.values()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

impl TryFrom<Vec<EffectDescriptor>> for EffectRegistry {
    type Error = Error;

    fn try_from(descriptors: Vec<EffectDescriptor>) -> Result<Self> {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }
}
