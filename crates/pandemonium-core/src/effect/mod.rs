//! Effect definitions and their scheduled instances.
//!
//! An [`EffectDescriptor`] is plain data plus closures: how to build a fresh
//! [`Effect`] for a process and the rules deciding when it may be scheduled.
//! Descriptors are collected in an [`EffectRegistry`] keyed by [`EffectId`].
//! The engine wraps each spawned instance in a [`ScheduledEffect`] that owns
//! its delay/duration timer.

mod event;
mod patch;
mod registry;
mod scheduled;

pub use event::{EffectEvent, EffectObserver};
pub use patch::{Patch, PatchEffect};
pub use registry::EffectRegistry;
pub use scheduled::{EffectInstanceId, EffectState, ScheduledEffect};

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::matcher::MatcherChain;
use crate::process::{Platform, PointerPath, Process};

/// Stable effect identifier. Ids are never reused, so presets from older
/// catalogs stay partially valid.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EffectId(pub u32);

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A live effect bound to one process.
pub trait Effect: Send {
    fn apply(&mut self, process: &Process) -> Result<()>;

    fn revert(&mut self, _process: &Process) -> Result<()> {
        Ok(())
    }
}

pub type EffectFactory = Arc<dyn Fn(&Process) -> Result<Box<dyn Effect>> + Send + Sync>;
pub type ProcessPredicate = Arc<dyn Fn(&Process) -> bool + Send + Sync>;
pub type PairPredicate = Arc<dyn Fn(&EffectDescriptor) -> bool + Send + Sync>;

/// Definition of one possible effect.
#[derive(Clone)]
pub struct EffectDescriptor {
    id: EffectId,
    name: String,
    group: Option<String>,
    persistent: bool,
    stackable: bool,
    /// Empty means every platform
    platforms: Vec<Platform>,
    process_check: Option<ProcessPredicate>,
    pair_check: Option<PairPredicate>,
    factory: EffectFactory,
}

impl EffectDescriptor {
    pub fn builder(id: EffectId, name: impl Into<String>) -> EffectDescriptorBuilder {
        EffectDescriptorBuilder::new(id, name)
    }

    pub fn id(&self) -> EffectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Persistent effects are never reverted.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Stackable effects may be active more than once at a time.
    pub fn is_stackable(&self) -> bool {
        self.stackable
    }

    pub fn platforms(&self) -> &[Platform] {
        &self.platforms
    }

    pub fn supports_platform(&self, platform: Platform) -> bool {
        self.platforms.is_empty() || self.platforms.contains(&platform)
    }

    /// Whether the process is currently in a state this effect can work with.
    pub fn is_compatible_with_process(&self, process: &Process) -> bool {
        self.process_check
            .as_ref()
            .is_none_or(|check| check(process))
    }

    /// Whether this effect may be active alongside `other`.
    ///
    /// Instances of the same effect are governed by
    /// [`is_stackable`](Self::is_stackable) instead.
    pub fn is_compatible_with(&self, other: &EffectDescriptor) -> bool {
        if other.id == self.id {
            return true;
        }
        if self.group.is_some() && self.group == other.group {
            return false;
        }
        self.pair_check.as_ref().is_none_or(|check| check(other))
    }

    /// Create a fresh effect instance for `process`.
    pub fn instantiate(&self, process: &Process) -> Result<Box<dyn Effect>> {
        (self.factory)(process)
    }
}

impl fmt::Debug for EffectDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("group", &self.group)
            .field("persistent", &self.persistent)
            .field("stackable", &self.stackable)
            .field("platforms", &self.platforms)
            .finish_non_exhaustive()
    }
}

/// Builder for [`EffectDescriptor`].
///
/// ```ignore
/// let descriptor = EffectDescriptor::builder(EffectId(1), "Bullets empty")
///     .group("bullets")
///     .requires_readable("dxhr.exe+0x1858238, 0x70".parse()?, 4)
///     .patches(vec![Patch::SetI32 { path, value: 0 }])
///     .build()?;
/// ```
pub struct EffectDescriptorBuilder {
    id: EffectId,
    name: String,
    group: Option<String>,
    persistent: bool,
    stackable: bool,
    platforms: Vec<Platform>,
    process_checks: Vec<ProcessPredicate>,
    pair_check: Option<PairPredicate>,
    factory: Option<EffectFactory>,
}

impl EffectDescriptorBuilder {
    fn new(id: EffectId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            group: None,
            persistent: false,
            stackable: false,
            platforms: Vec::new(),
            process_checks: Vec::new(),
            pair_check: None,
            factory: None,
        }
    }

    /// Effects sharing a group never run at the same time.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn stackable(mut self) -> Self {
        self.stackable = true;
        self
    }

    pub fn platforms(mut self, platforms: impl IntoIterator<Item = Platform>) -> Self {
        self.platforms = platforms.into_iter().collect();
        self
    }

    /// Require the process to satisfy `chain` (phase 2) at spawn time.
    pub fn requires(self, chain: MatcherChain) -> Self {
        self.requires_with(move |process| chain.is_compatible(process))
    }

    /// Require `length` bytes at `path` to be readable at spawn time.
    pub fn requires_readable(self, path: PointerPath, length: usize) -> Self {
        self.requires_with(move |process| {
            process
                .pointer_path(&path)
                .is_ok_and(|pointer| pointer.is_readable(process, length))
        })
    }

    pub fn requires_with<F>(mut self, check: F) -> Self
    where
        F: Fn(&Process) -> bool + Send + Sync + 'static,
    {
        self.process_checks.push(Arc::new(check));
        self
    }

    /// Pairwise rule, consulted against every active effect in both directions.
    pub fn compatible_with<F>(mut self, check: F) -> Self
    where
        F: Fn(&EffectDescriptor) -> bool + Send + Sync + 'static,
    {
        self.pair_check = Some(Arc::new(check));
        self
    }

    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Process) -> Result<Box<dyn Effect>> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Use a [`PatchEffect`] built from `patches` as the factory.
    pub fn patches(self, patches: Vec<Patch>) -> Self {
        self.factory(move |_| Ok(Box::new(PatchEffect::new(patches.clone())) as Box<dyn Effect>))
    }

    pub fn build(self) -> Result<EffectDescriptor> {
        let factory = self.factory.ok_or_else(|| {
            Error::InvalidConfig(format!("effect {} ({}) has no factory", self.id, self.name))
        })?;

        let process_check: Option<ProcessPredicate> = match self.process_checks.len() {
            0 => None,
            1 => self.process_checks.into_iter().next(),
            _ => {
                let checks = self.process_checks;
                Some(Arc::new(move |process: &Process| {
                    checks.iter().all(|check| check(process))
                }))
            }
        };

        Ok(EffectDescriptor {
            id: self.id,
            name: self.name,
            group: self.group,
            persistent: self.persistent,
            stackable: self.stackable,
            platforms: self.platforms,
            process_check,
            pair_check: self.pair_check,
            factory,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording effects shared by effect and engine tests.

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    pub struct Counters {
        pub applied: AtomicUsize,
        pub reverted: AtomicUsize,
    }

    impl Counters {
        pub fn applied(&self) -> usize {
            self.applied.load(Ordering::SeqCst)
        }

        pub fn reverted(&self) -> usize {
            self.reverted.load(Ordering::SeqCst)
        }
    }

    pub struct Recording(pub Arc<Counters>);

    impl Effect for Recording {
        fn apply(&mut self, _process: &Process) -> Result<()> {
            self.0.applied.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn revert(&mut self, _process: &Process) -> Result<()> {
            self.0.reverted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// A descriptor whose instances count their calls into `counters`.
    pub fn recording(id: u32, counters: &Arc<Counters>) -> EffectDescriptorBuilder {
        let counters = Arc::clone(counters);
        EffectDescriptor::builder(EffectId(id), format!("effect {}", id)).factory(move |_| {
            Ok(Box::new(Recording(Arc::clone(&counters))) as Box<dyn Effect>)
        })
    }
}
