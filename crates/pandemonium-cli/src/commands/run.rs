//! Race mode.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;
use pandemonium_core::{
    EffectEvent, ErrorKind, GameCatalog, GameConfiguration, GameDefinition, Preset, RaceSession,
    native_provider,
};
use tracing::{debug, info, warn};

use crate::cli::RunArgs;
use crate::settings::Settings;
use crate::shutdown::ShutdownSignal;

/// Resolution of the effect timers.
const TICK: Duration = Duration::from_millis(100);

pub fn run(args: &RunArgs) -> Result<()> {
    let mut settings = Settings::load(&args.config)?;
    if let Some(seconds) = args.spawn_interval {
        settings.session.spawn_interval = Duration::from_secs(seconds);
    }

    let Some(query) = args.game.as_deref().or(settings.game.as_deref()) else {
        bail!("No game selected; pass --game or set `game` in {}", args.config.display());
    };
    let catalog = GameCatalog::builtin()?;
    let game = Arc::clone(catalog.find(query)?);

    let token = args.preset.as_deref().or(settings.preset.as_deref());
    let preset = race_preset(&game, token)?;
    println!("{} {}", "Racing".bold(), game.name());
    println!("Preset: {}", preset);

    let shutdown = ShutdownSignal::install()?;
    let provider = native_provider();
    let mut session = RaceSession::new(Arc::clone(&game), preset, settings.session.clone())?;
    let events = session.subscribe();
    session.start();

    let config = session.config().clone();
    let mut next_scan = Instant::now();
    let mut next_poll = Instant::now();
    let mut last_tick = Instant::now();

    println!("Waiting for {}... (Press Ctrl+C to stop)", game.name());
    while !shutdown.is_shutdown() {
        let now = Instant::now();

        if now >= next_scan {
            next_scan = now + config.scan_interval;
            if session.attached().is_none() {
                match session.scan(&provider, now) {
                    Ok(true) => next_poll = now,
                    Ok(false) => {}
                    Err(e) if e.kind() == ErrorKind::Attachment => {
                        return Err(e).context("Failed to attach to the game");
                    }
                    Err(e) => warn!("Scan failed: {}", e),
                }
            }
        }

        if now >= next_poll {
            next_poll = now + config.state_poll_interval;
            match session.poll_state() {
                Ok(Some(status)) => debug!("Game status: {:?}", status),
                Ok(None) => {}
                Err(e) if e.kind() == ErrorKind::Transfer || e.kind() == ErrorKind::Address => {
                    debug!("Game state unreadable: {}", e);
                }
                Err(e) => return Err(e).context("Failed to read game state"),
            }
        }

        session
            .advance(now - last_tick)
            .context("Effect failed; the game may be left modified")?;
        last_tick = now;

        for event in events.try_iter() {
            print_event(&event);
        }

        shutdown.wait_until(now + TICK);
    }

    info!("Stopping race");
    session.stop().context("Failed to revert active effects")?;
    for event in events.try_iter() {
        print_event(&event);
    }
    Ok(())
}

/// The preset from `token`, or a fresh one with a random seed.
fn race_preset(game: &Arc<GameDefinition>, token: Option<&str>) -> Result<Preset> {
    let mut config = GameConfiguration::new(Arc::clone(game));
    if let Some(token) = token {
        let preset: Preset = token.trim().parse().context("Failed to decode preset")?;
        config.apply_preset(&preset)?;
    }
    Ok(config.preset())
}

fn print_event(event: &EffectEvent) {
    match event {
        EffectEvent::Scheduled {
            instance,
            name,
            delay,
            duration,
            ..
        } => println!(
            "{} {} {} in {:.0}s for {:.0}s",
            format!("[{}]", instance).dimmed(),
            "scheduled".cyan(),
            name,
            delay,
            duration
        ),
        EffectEvent::Applied { instance, effect } => println!(
            "{} {} effect {}",
            format!("[{}]", instance).dimmed(),
            "applied".green(),
            effect
        ),
        EffectEvent::Reverted {
            instance,
            effect,
            persistent,
        } => {
            let verb = if *persistent { "finished" } else { "reverted" };
            println!(
                "{} {} effect {}",
                format!("[{}]", instance).dimmed(),
                verb.yellow(),
                effect
            );
        }
        EffectEvent::Progress { .. } | EffectEvent::Removed { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_race_preset_keeps_shared_seed() {
        let catalog = GameCatalog::builtin().unwrap();
        let game = Arc::clone(catalog.iter().next().unwrap());

        let mut shared = game.preset_builder();
        shared.seed("race-night");
        let token = shared.build().to_string();

        let preset = race_preset(&game, Some(&token)).unwrap();
        assert_eq!(preset.seed(), "race-night");
        assert_eq!(preset.effects().len(), game.effects().len());
    }

    #[test]
    fn test_race_preset_without_token_is_random() {
        let catalog = GameCatalog::builtin().unwrap();
        let game = Arc::clone(catalog.iter().next().unwrap());

        let preset = race_preset(&game, None).unwrap();
        assert!(!preset.seed().is_empty());
        assert!(race_preset(&game, Some("not a token")).is_err());
    }
}
