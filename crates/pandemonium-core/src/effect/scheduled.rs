use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use super::{Effect, EffectDescriptor, EffectId};
use crate::error::{Error, Result};
use crate::process::Process;

/// Identifies one scheduling of an effect for the lifetime of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EffectInstanceId(pub u64);

impl fmt::Display for EffectInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::IntoStaticStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EffectState {
    Stopped,
    Waiting,
    Applied,
    Reverted,
}

/// An effect instance with its two-phase timer: `delay`, then `duration`.
///
/// Time only moves through [`advance`](Self::advance). Apply fires once the
/// accumulated time reaches `delay`, revert once it reaches
/// `delay + duration`. Both may fire within one call.
pub struct ScheduledEffect {
    id: EffectInstanceId,
    descriptor: Arc<EffectDescriptor>,
    effect: Box<dyn Effect>,
    delay: Duration,
    duration: Duration,
    elapsed: Duration,
    state: EffectState,
    paused: bool,
}

impl ScheduledEffect {
    pub fn new(
        id: EffectInstanceId,
        descriptor: Arc<EffectDescriptor>,
        effect: Box<dyn Effect>,
        delay: Duration,
        duration: Duration,
    ) -> Self {
        Self {
            id,
            descriptor,
            effect,
            delay,
            duration,
            elapsed: Duration::ZERO,
            state: EffectState::Waiting,
            paused: false,
        }
    }

    pub fn id(&self) -> EffectInstanceId {
        self.id
    }

    pub fn descriptor(&self) -> &Arc<EffectDescriptor> {
        &self.descriptor
    }

    pub fn effect_id(&self) -> EffectId {
        self.descriptor.id()
    }

    pub fn state(&self) -> EffectState {
        self.state
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Reverted or stopped; the timer will not fire again.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, EffectState::Reverted | EffectState::Stopped)
    }

    /// Fraction of the current phase that has elapsed, in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        match self.state {
            EffectState::Waiting => fraction(self.elapsed, self.delay),
            EffectState::Applied => {
                fraction(self.elapsed.saturating_sub(self.delay), self.duration)
            }
            EffectState::Reverted => 1.0,
            EffectState::Stopped => 0.0,
        }
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume a paused timer where it left off. A stopped effect restarts
    /// from the beginning of its delay.
    pub fn play(&mut self) {
        if self.state == EffectState::Stopped {
            self.elapsed = Duration::ZERO;
            self.state = EffectState::Waiting;
        }
        self.paused = false;
    }

    /// Move the timer forward and return the states entered, in order.
    ///
    /// A failing apply or revert leaves the state unchanged and is returned
    /// as [`Error::EffectFailed`].
    pub fn advance(&mut self, dt: Duration, process: &Process) -> Result<Vec<EffectState>> {
        if self.paused || self.is_finished() {
            return Ok(Vec::new());
        }
        self.elapsed = self.elapsed.saturating_add(dt);

        let mut entered = Vec::new();
        if self.state == EffectState::Waiting && self.elapsed >= self.delay {
            self.effect
                .apply(process)
                .map_err(|e| self.failed("apply", e))?;
            self.state = EffectState::Applied;
            info!("Applied effect {} ({})", self.descriptor.name(), self.id);
            entered.push(EffectState::Applied);
        }
        if self.state == EffectState::Applied
            && self.elapsed >= self.delay.saturating_add(self.duration)
        {
            if !self.descriptor.is_persistent() {
                self.effect
                    .revert(process)
                    .map_err(|e| self.failed("revert", e))?;
            }
            self.state = EffectState::Reverted;
            info!("Reverted effect {} ({})", self.descriptor.name(), self.id);
            entered.push(EffectState::Reverted);
        }
        Ok(entered)
    }

    /// Stop the timer, reverting immediately if the effect is applied.
    ///
    /// Returns whether a revert ran. The effect ends up stopped even when the
    /// revert fails. A revert against a terminated process is logged and
    /// tolerated.
    pub fn abort(&mut self, process: &Process) -> Result<bool> {
        let needs_revert = self.state == EffectState::Applied && !self.descriptor.is_persistent();
        self.state = EffectState::Stopped;
        self.paused = false;
        if !needs_revert {
            return Ok(false);
        }

        match self.effect.revert(process) {
            Ok(()) => {
                info!("Aborted effect {} ({})", self.descriptor.name(), self.id);
                Ok(true)
            }
            Err(e) if e.is_terminated() => {
                warn!(
                    "Could not revert effect {} ({}): process has terminated",
                    self.descriptor.name(),
                    self.id
                );
                Ok(false)
            }
            Err(e) => Err(self.failed("revert", e)),
        }
    }

    fn failed(&self, phase: &'static str, source: Error) -> Error {
        Error::EffectFailed {
            effect: self.descriptor.id(),
            phase,
            source: Box::new(source),
        }
    }
}

impl fmt::Debug for ScheduledEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledEffect")
            .field("id", &self.id)
            .field("effect", &self.descriptor.id())
            .field("state", &self.state)
            .field("delay", &self.delay)
            .field("duration", &self.duration)
            .field("elapsed", &self.elapsed)
            .field("paused", &self.paused)
            .finish()
    }
}

fn fraction(part: Duration, whole: Duration) -> f64 {
    if whole.is_zero() {
        return 1.0;
    }
    (part.as_secs_f64() / whole.as_secs_f64()).clamp(0.0, 1.0)
}
