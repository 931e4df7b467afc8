//! A race against one game.
//!
//! [`RaceSession`] ties a game definition and a preset to the process
//! watcher and, once a compatible process is found, to an effect engine and
//! the game's state mapper. The caller owns the clock and drives the three
//! ticks:
//!
//! ```ignore
//! session.start();
//! loop {
//!     session.scan(&provider, Instant::now())?;   // every scan_interval
//!     session.poll_state()?;                      // every state_poll_interval
//!     session.advance(elapsed)?;                  // as often as convenient
//! }
//! ```

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::effect::EffectEvent;
use crate::engine::{EffectEngine, EngineState, GameStatus};
use crate::error::{Error, Result};
use crate::game::{GameDefinition, GameStateMapper};
use crate::preset::Preset;
use crate::process::{Process, ProcessProvider};
use crate::watcher::ProcessWatcher;

struct Attachment {
    process: Process,
    engine: EffectEngine,
    mapper: Box<dyn GameStateMapper>,
}

pub struct RaceSession {
    game: Arc<GameDefinition>,
    preset: Preset,
    config: SessionConfig,
    watcher: ProcessWatcher,
    attachment: Option<Attachment>,
    subscribers: Vec<Sender<EffectEvent>>,
    running: bool,
}

impl RaceSession {
    /// Fails if `preset` was made for another game.
    pub fn new(game: Arc<GameDefinition>, preset: Preset, config: SessionConfig) -> Result<Self> {
        if preset.game_id() != game.id() {
            return Err(Error::PresetGameMismatch {
                expected: game.id().to_string(),
                actual: preset.game_id().to_string(),
            });
        }

        Ok(Self {
            watcher: ProcessWatcher::new(config.retry.strategy()),
            game,
            preset,
            config,
            attachment: None,
            subscribers: Vec::new(),
            running: false,
        })
    }

    pub fn game(&self) -> &Arc<GameDefinition> {
        &self.game
    }

    pub fn preset(&self) -> &Preset {
        &self.preset
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The attached process, if any.
    pub fn attached(&self) -> Option<&Process> {
        self.attachment.as_ref().map(|a| &a.process)
    }

    pub fn engine(&self) -> Option<&EffectEngine> {
        self.attachment.as_ref().map(|a| &a.engine)
    }

    pub fn engine_state(&self) -> EngineState {
        self.engine().map_or(EngineState::Idle, EffectEngine::state)
    }

    /// Effect events from now on, across re-attachments.
    pub fn subscribe(&mut self) -> Receiver<EffectEvent> {
        let (tx, rx) = mpsc::channel();
        if let Some(attachment) = self.attachment.as_mut() {
            attachment.engine.add_observer(Box::new(tx.clone()));
        }
        self.subscribers.push(tx);
        rx
    }

    /// Begin looking for the game.
    pub fn start(&mut self) {
        if !self.running {
            info!("Starting race for {} with seed {:?}", self.game.name(), self.preset.seed());
            self.running = true;
        }
    }

    /// End the race: revert every active effect and release the process.
    pub fn stop(&mut self) -> Result<()> {
        if self.running {
            info!("Stopping race for {}", self.game.name());
        }
        self.running = false;
        self.watcher.reset();
        self.detach()
    }

    /// Scan tick. Returns whether a process was attached.
    pub fn scan<P>(&mut self, provider: &P, now: Instant) -> Result<bool>
    where
        P: ProcessProvider + ?Sized,
    {
        if !self.running || self.attachment.is_some() {
            return Ok(false);
        }

        match self.watcher.scan(provider, &self.game, now)? {
            Some(process) => {
                self.attach(process)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Attach to `process`, opening it if necessary, and replace any
    /// previous attachment.
    pub fn attach(&mut self, process: Process) -> Result<()> {
        self.detach()?;
        if !process.is_open() {
            process.open()?;
        }

        let mapper = self.game.state_mapper(&process)?;
        let mut engine = EffectEngine::new(self.preset.clone(), self.game.effects(), &self.config);
        for subscriber in &self.subscribers {
            engine.add_observer(Box::new(subscriber.clone()));
        }

        info!(
            "Attached to {} (pid {}), {} effects enabled",
            process.name(),
            process.pid(),
            engine.enabled().count()
        );
        self.attachment = Some(Attachment {
            process,
            engine,
            mapper,
        });
        Ok(())
    }

    /// Revert every active effect and release the process.
    ///
    /// The process is released even if reverting fails; the first revert
    /// failure is returned.
    pub fn detach(&mut self) -> Result<()> {
        let Some(mut attachment) = self.attachment.take() else {
            return Ok(());
        };

        let result = attachment.engine.stop(&attachment.process);
        if let Err(e) = attachment.process.close() {
            debug!("Closing {} on detach: {}", attachment.process.pid(), e);
        }
        info!(
            "Detached from {} (pid {})",
            attachment.process.name(),
            attachment.process.pid()
        );
        result
    }

    /// State tick. Reads the game's state and forwards it to the engine.
    ///
    /// Returns `None` when nothing is attached, or when the process exited
    /// (the session detaches and goes back to scanning).
    pub fn poll_state(&mut self) -> Result<Option<GameStatus>> {
        let Some(attachment) = self.attachment.as_mut() else {
            return Ok(None);
        };

        let result = attachment
            .mapper
            .poll(&attachment.process)
            .and_then(|status| {
                attachment
                    .engine
                    .update_status(status, &attachment.process)
                    .map(|()| status)
            });

        match result {
            Ok(status) => Ok(Some(status)),
            Err(e) if e.is_terminated() => {
                self.lost_process();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Move effect timers and the spawn timer forward by `dt`.
    pub fn advance(&mut self, dt: Duration) -> Result<()> {
        let Some(attachment) = self.attachment.as_mut() else {
            return Ok(());
        };

        match attachment.engine.advance(dt, &attachment.process) {
            Err(e) if e.is_terminated() => {
                self.lost_process();
                Ok(())
            }
            result => result,
        }
    }

    fn lost_process(&mut self) {
        if let Some(attachment) = self.attachment.as_ref() {
            warn!(
                "{} (pid {}) exited, scanning again",
                attachment.process.name(),
                attachment.process.pid()
            );
        }
        if let Err(e) = self.detach() {
            debug!("Ignoring revert failure after process exit: {}", e);
        }
    }
}

impl Drop for RaceSession {
    fn drop(&mut self) {
        if let Err(e) = self.detach() {
            warn!("Failed to revert effects on shutdown: {}", e);
        }
    }
}
