//! Create and inspect preset tokens.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;
use pandemonium_core::{EffectId, GameCatalog, GameConfiguration, Preset};

use crate::cli::NewPresetArgs;

pub fn new(args: &NewPresetArgs) -> Result<()> {
    let catalog = GameCatalog::builtin()?;
    let game = Arc::clone(catalog.find(&args.game)?);
    let mut config = GameConfiguration::new(game);

    if !args.only.is_empty() {
        if let Some(id) = args
            .only
            .iter()
            .find(|&&id| !config.game().effects().contains(EffectId(id)))
        {
            bail!("{} has no effect {}", config.game().name(), id);
        }
        let ids: Vec<EffectId> = config.game().effects().ids().collect();
        for id in ids {
            config.set_effect_enabled(id, args.only.contains(&id.0))?;
        }
    }
    for &id in &args.disabled {
        config.set_effect_enabled(EffectId(id), false)?;
    }

    let builder = config.builder_mut();
    if let Some(seed) = &args.seed {
        builder.seed(seed.as_str());
    }
    if let Some(chance) = args.effect_chance {
        builder.effect_chance(chance);
    }
    if let Some(chance) = args.combination_chance {
        builder.combination_chance(chance);
    }
    if let Some(range) = &args.delay {
        let (low, high) = range_of(range, "delay")?;
        builder.delay(low, high);
    }
    if let Some(range) = &args.duration {
        let (low, high) = range_of(range, "duration")?;
        builder.duration(low, high);
    }

    let preset = config.preset();
    eprintln!(
        "{} preset for {}, seed {}, {} effects",
        "Created".green(),
        config.game().name(),
        preset.seed(),
        preset.effects().len()
    );
    println!("{}", preset);
    Ok(())
}

fn range_of(values: &[f64], name: &str) -> Result<(f64, f64)> {
    match values {
        [low, high] if low <= high && *low >= 0.0 => Ok((*low, *high)),
        [low, high] => bail!("Invalid {} range {}..{}", name, low, high),
        _ => bail!("Expected two values for {}", name),
    }
}

pub fn inspect(token: &str, json: bool) -> Result<()> {
    let preset: Preset = token.trim().parse().context("Failed to decode preset")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&preset)?);
        return Ok(());
    }

    let catalog = GameCatalog::builtin()?;
    let game = catalog.get(preset.game_id());
    let game_name = game.map_or("unknown game", |g| g.name());

    let (delay_low, delay_high) = preset.delay_range();
    let (duration_low, duration_high) = preset.duration_range();
    println!("Game:         {} {}", game_name.bold(), preset.game_id().dimmed());
    println!("Revision:     {}", preset.revision());
    println!("Seed:         {}", preset.seed());
    println!("Effect:       {}%", preset.effect_chance());
    println!("Combination:  {}%", preset.combination_chance());
    println!("Delay:        {}s - {}s", delay_low, delay_high);
    println!("Duration:     {}s - {}s", duration_low, duration_high);
    println!("Effects:");
    for &id in preset.effects() {
        match game.and_then(|g| g.effects().get(id)) {
            Some(effect) => println!("  {:>4}  {}", id.0, effect.name()),
            None => println!("  {:>4}  {}", id.0, "unknown".yellow()),
        }
    }

    if let Some(game) = game.filter(|g| g.revision() != preset.revision()) {
        println!(
            "{}",
            format!(
                "Preset was made for revision {}, this build has revision {}",
                preset.revision(),
                game.revision()
            )
            .yellow()
        );
    }
    Ok(())
}
