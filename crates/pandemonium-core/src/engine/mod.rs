//! Effect scheduling engine.
//!
//! The engine owns the race's random generator and the set of active
//! effects. The caller drives it with elapsed time ([`EffectEngine::advance`])
//! and game-state snapshots ([`EffectEngine::update_status`]); every spawn
//! decision, chance roll and delay/duration sample comes from a single
//! generator seeded from the preset, so identical presets fed identical
//! ticks schedule identical effects.

mod rng;

pub use rng::{seed_hash, seeded_rng};

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::effect::{
    EffectDescriptor, EffectEvent, EffectInstanceId, EffectObserver, EffectRegistry, EffectState,
    ScheduledEffect,
};
use crate::error::{Error, Result};
use crate::preset::Preset;
use crate::process::{Platform, Process};

/// What the game reports about itself on a state poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GameStatus {
    /// Outside the title screen and main menu
    pub in_game: bool,
    /// In a pause menu or loading screen
    pub paused: bool,
    /// The run was restarted since the previous poll
    pub reset: bool,
}

impl Default for GameStatus {
    fn default() -> Self {
        Self {
            in_game: true,
            paused: false,
            reset: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    /// Not spawning; no active effects
    Idle,
    Running,
    /// Spawn timer and effect timers are held
    Paused,
}

pub struct EffectEngine {
    preset: Preset,
    /// Enabled descriptors, ordered by id
    enabled: Vec<Arc<EffectDescriptor>>,
    platform: Platform,
    spawn_interval: Duration,
    max_spawn_attempts: u32,
    rng: ChaCha8Rng,
    active: Vec<ScheduledEffect>,
    next_instance: u64,
    observers: Vec<Box<dyn EffectObserver>>,
    state: EngineState,
    spawn_elapsed: Duration,
}

impl EffectEngine {
    /// Create an engine for `preset`. Effect ids the registry does not know
    /// are skipped.
    pub fn new(preset: Preset, registry: &EffectRegistry, config: &SessionConfig) -> Self {
        let enabled = preset
            .effects()
            .iter()
            .filter_map(|id| {
                let descriptor = registry.get(*id);
                if descriptor.is_none() {
                    warn!("Preset enables unknown effect {}, ignoring", id);
                }
                descriptor.cloned()
            })
            .collect();

        Self {
            rng: seeded_rng(preset.seed()),
            preset,
            enabled,
            platform: Platform::current(),
            spawn_interval: config.spawn_interval,
            max_spawn_attempts: config.max_spawn_attempts,
            active: Vec::new(),
            next_instance: 1,
            observers: Vec::new(),
            state: EngineState::Idle,
            spawn_elapsed: Duration::ZERO,
        }
    }

    /// Gate effects against `platform` instead of the host platform.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn preset(&self) -> &Preset {
        &self.preset
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Arc<EffectDescriptor>> {
        self.enabled.iter()
    }

    pub fn active(&self) -> &[ScheduledEffect] {
        &self.active
    }

    pub fn add_observer(&mut self, observer: Box<dyn EffectObserver>) {
        self.observers.push(observer);
    }

    /// Stream of lifecycle events from now on.
    pub fn subscribe(&mut self) -> Receiver<EffectEvent> {
        let (tx, rx) = mpsc::channel();
        self.add_observer(Box::new(tx));
        rx
    }

    /// Reset the generator to its initial state for the preset's seed.
    pub fn reseed(&mut self) {
        self.rng = seeded_rng(self.preset.seed());
    }

    /// Begin spawning with a fresh spawn timer.
    pub fn start(&mut self) {
        if self.state == EngineState::Idle {
            info!("Starting effect spawn cycle");
            self.spawn_elapsed = Duration::ZERO;
            self.state = EngineState::Running;
        }
    }

    pub fn pause(&mut self) {
        if self.state == EngineState::Running {
            info!("Pausing effect spawn cycle and active effects");
            self.active.iter_mut().for_each(ScheduledEffect::pause);
            self.state = EngineState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == EngineState::Paused {
            info!("Resuming effect spawn cycle and active effects");
            self.active.iter_mut().for_each(ScheduledEffect::play);
            self.state = EngineState::Running;
        }
    }

    /// Abort every active effect and stop spawning.
    pub fn stop(&mut self, process: &Process) -> Result<()> {
        let result = self.abort_all(process);
        self.state = EngineState::Idle;
        result
    }

    /// React to a game-state poll.
    pub fn update_status(&mut self, status: GameStatus, process: &Process) -> Result<()> {
        if status.reset {
            info!("Game reset detected, re-initializing spawner seed");
            self.reseed();
            self.spawn_elapsed = Duration::ZERO;
        }

        if !status.in_game {
            if self.state != EngineState::Idle {
                info!("Game is on its title screen or main menu, removing all active effects");
                self.stop(process)?;
            }
        } else if status.paused {
            self.pause();
        } else {
            match self.state {
                EngineState::Paused => self.resume(),
                EngineState::Idle => self.start(),
                EngineState::Running => {}
            }
        }
        Ok(())
    }

    /// Move effect timers and the spawn timer forward by `dt`.
    ///
    /// Does nothing unless running. Apply and revert failures are fatal and
    /// returned as-is.
    pub fn advance(&mut self, dt: Duration, process: &Process) -> Result<()> {
        if self.state != EngineState::Running {
            return Ok(());
        }

        for effect in self.active.iter_mut() {
            for entered in effect.advance(dt, process)? {
                let event = match entered {
                    EffectState::Applied => EffectEvent::Applied {
                        instance: effect.id(),
                        effect: effect.effect_id(),
                    },
                    _ => EffectEvent::Reverted {
                        instance: effect.id(),
                        effect: effect.effect_id(),
                        persistent: effect.descriptor().is_persistent(),
                    },
                };
                notify(&mut self.observers, &event);
            }
            notify(
                &mut self.observers,
                &EffectEvent::Progress {
                    instance: effect.id(),
                    effect: effect.effect_id(),
                    fraction: effect.progress(),
                    state: effect.state(),
                },
            );
        }
        self.remove_finished();

        self.spawn_elapsed = self.spawn_elapsed.saturating_add(dt);
        while !self.spawn_interval.is_zero() && self.spawn_elapsed >= self.spawn_interval {
            self.spawn_elapsed -= self.spawn_interval;
            self.spawn(process)?;
        }
        Ok(())
    }

    /// Run one spawn decision. Returns the new instance, if any.
    pub fn spawn(&mut self, process: &Process) -> Result<Option<EffectInstanceId>> {
        self.remove_finished();

        if self.enabled.is_empty() {
            debug!("Skipping spawn - No effects enabled");
            return Ok(None);
        }
        if !self.roll(self.preset.effect_chance()) {
            debug!("Skipping spawn - Chance condition not met");
            return Ok(None);
        }
        if !self.active.is_empty() && !self.roll(self.preset.combination_chance()) {
            debug!("Skipping spawn - Combination chance condition not met");
            return Ok(None);
        }

        for attempt in 1..=self.max_spawn_attempts {
            let index = self.rng.gen_range(0..self.enabled.len());
            let candidate = Arc::clone(&self.enabled[index]);
            if let Some(reason) = self.rejection(&candidate, process) {
                debug!(
                    "Spawn attempt #{:02} - Effect {} ({}) {}",
                    attempt,
                    candidate.name(),
                    candidate.id(),
                    reason
                );
                continue;
            }

            let delay = self.sample(self.preset.delay_range());
            let duration = self.sample(self.preset.duration_range());
            let effect = candidate
                .instantiate(process)
                .map_err(|e| Error::EffectFailed {
                    effect: candidate.id(),
                    phase: "create",
                    source: Box::new(e),
                })?;
            let id = EffectInstanceId(self.next_instance);
            self.next_instance += 1;

            info!(
                "Spawn attempt #{:02} - Scheduling effect {} ({}) with delay {}s and duration {}s",
                attempt,
                candidate.name(),
                candidate.id(),
                delay.as_secs(),
                duration.as_secs()
            );
            let mut scheduled =
                ScheduledEffect::new(id, Arc::clone(&candidate), effect, delay, duration);
            if self.state == EngineState::Paused {
                scheduled.pause();
            }
            self.active.push(scheduled);
            notify(
                &mut self.observers,
                &EffectEvent::Scheduled {
                    instance: id,
                    effect: candidate.id(),
                    name: candidate.name().to_string(),
                    delay: delay.as_secs_f64(),
                    duration: duration.as_secs_f64(),
                },
            );
            return Ok(Some(id));
        }

        debug!(
            "Failed to spawn after {:02} attempts - Giving up until the next tick",
            self.max_spawn_attempts
        );
        Ok(None)
    }

    /// Abort and remove every active effect.
    ///
    /// Every effect is aborted even if one fails; the first failure is
    /// returned.
    pub fn abort_all(&mut self, process: &Process) -> Result<()> {
        let mut first_error = None;
        for mut effect in std::mem::take(&mut self.active) {
            match effect.abort(process) {
                Ok(true) => notify(
                    &mut self.observers,
                    &EffectEvent::Reverted {
                        instance: effect.id(),
                        effect: effect.effect_id(),
                        persistent: false,
                    },
                ),
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to abort effect {}: {}", effect.effect_id(), e);
                    first_error.get_or_insert(e);
                }
            }
            notify(
                &mut self.observers,
                &EffectEvent::Removed {
                    instance: effect.id(),
                    effect: effect.effect_id(),
                },
            );
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Why `candidate` cannot be scheduled right now.
    fn rejection(&self, candidate: &EffectDescriptor, process: &Process) -> Option<&'static str> {
        if !candidate.supports_platform(self.platform) {
            return Some("is not compatible with the current platform");
        }
        if !candidate.is_compatible_with_process(process) {
            return Some("is not compatible with the process at this time");
        }
        if !candidate.is_stackable() && self.active.iter().any(|a| a.effect_id() == candidate.id())
        {
            return Some("does not stack");
        }
        if self.active.iter().any(|a| {
            !a.descriptor().is_compatible_with(candidate)
                || !candidate.is_compatible_with(a.descriptor())
        }) {
            return Some("is incompatible with one or more active effects");
        }
        None
    }

    /// Roll against a percentage.
    fn roll(&mut self, chance: f64) -> bool {
        (self.rng.gen_range(0..100u32) as f64) < chance
    }

    /// Uniform sample between `low` and `high` seconds.
    fn sample(&mut self, (low, high): (f64, f64)) -> Duration {
        let seconds = low + self.rng.r#gen::<f64>() * (high - low);
        Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::MAX)
    }

    fn remove_finished(&mut self) {
        let observers = &mut self.observers;
        self.active.retain(|effect| {
            if !effect.is_finished() {
                return true;
            }
            notify(
                observers,
                &EffectEvent::Removed {
                    instance: effect.id(),
                    effect: effect.effect_id(),
                },
            );
            false
        });
    }
}

fn notify(observers: &mut [Box<dyn EffectObserver>], event: &EffectEvent) {
    for observer in observers.iter_mut() {
        observer.notify(event);
    }
}
