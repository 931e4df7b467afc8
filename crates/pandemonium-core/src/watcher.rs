//! Process detection.
//!
//! The watcher is driven by the scan tick. Each scan lists processes whose
//! executable name belongs to the game and checks them in two phases:
//! metadata after attaching, then memory after opening. A candidate that
//! matches by name but fails the memory check is closed and retried per the
//! configured [`RetryStrategy`]; once retries run out, its pid is ignored
//! until it leaves the process list.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::game::GameDefinition;
use crate::process::{Process, ProcessEntry, ProcessProvider};
use crate::retry::RetryStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    /// Failed `attempts` checks, next check at or after `retry_at`
    Retrying { attempts: u32, retry_at: Instant },
    Ignored,
}

#[derive(Debug)]
pub struct ProcessWatcher {
    retry: Box<dyn RetryStrategy>,
    rejected: HashMap<u32, Rejection>,
}

impl ProcessWatcher {
    pub fn new(retry: Box<dyn RetryStrategy>) -> Self {
        Self {
            retry,
            rejected: HashMap::new(),
        }
    }

    /// Candidate processes for `game`, without attaching.
    pub fn detect<P>(&self, provider: &P, game: &GameDefinition) -> Result<Vec<ProcessEntry>>
    where
        P: ProcessProvider + ?Sized,
    {
        provider.find(game.executables())
    }

    /// Whether `pid` was given up on.
    pub fn is_ignored(&self, pid: u32) -> bool {
        matches!(self.rejected.get(&pid), Some(Rejection::Ignored))
    }

    /// Forget every rejection, e.g. after the user changed games.
    pub fn reset(&mut self) {
        self.rejected.clear();
    }

    /// Look for a compatible process.
    ///
    /// Returns the first candidate that passes both phases, attached and
    /// open. Enumeration and attachment errors propagate.
    pub fn scan<P>(
        &mut self,
        provider: &P,
        game: &GameDefinition,
        now: Instant,
    ) -> Result<Option<Process>>
    where
        P: ProcessProvider + ?Sized,
    {
        let candidates = self.detect(provider, game)?;
        self.rejected
            .retain(|pid, _| candidates.iter().any(|entry| entry.pid == *pid));

        for entry in &candidates {
            match self.rejected.get(&entry.pid) {
                Some(Rejection::Ignored) => continue,
                Some(Rejection::Retrying { retry_at, .. }) if now < *retry_at => continue,
                _ => {}
            }

            let process = provider.attach(entry)?;
            if !game.matcher().matches(process.info()) {
                debug!(
                    "{} (pid {}) does not match {}, ignoring",
                    entry.name,
                    entry.pid,
                    game.name()
                );
                self.rejected.insert(entry.pid, Rejection::Ignored);
                continue;
            }

            process.open()?;
            if game.matcher().is_compatible(&process) {
                info!(
                    "Found compatible process {} (pid {}) for {}",
                    process.name(),
                    process.pid(),
                    game.name()
                );
                self.rejected.remove(&entry.pid);
                return Ok(Some(process));
            }

            if let Err(e) = process.close() {
                debug!("Failed to close rejected process {}: {}", entry.pid, e);
            }
            self.reject(entry, now);
        }

        Ok(None)
    }

    fn reject(&mut self, entry: &ProcessEntry, now: Instant) {
        let attempts = match self.rejected.get(&entry.pid) {
            Some(Rejection::Retrying { attempts, .. }) => attempts + 1,
            _ => 1,
        };

        let delay = self.retry.delay_for(attempts);
        let rejection = match delay.and_then(|delay| now.checked_add(delay)) {
            Some(retry_at) => {
                warn!(
                    "{} (pid {}) is not compatible yet, retrying in {}s (attempt {}/{})",
                    entry.name,
                    entry.pid,
                    delay.unwrap_or_default().as_secs(),
                    attempts,
                    self.retry.max_retries()
                );
                Rejection::Retrying { attempts, retry_at }
            }
            None => {
                warn!(
                    "{} (pid {}) is not compatible, ignoring it until it exits",
                    entry.name, entry.pid
                );
                Rejection::Ignored
            }
        };
        self.rejected.insert(entry.pid, rejection);
    }
}
