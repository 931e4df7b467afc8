//! List supported games.

use anyhow::Result;
use owo_colors::OwoColorize;
use pandemonium_core::GameCatalog;

pub fn run(effects: bool) -> Result<()> {
    let catalog = GameCatalog::builtin()?;

    for game in catalog.iter() {
        let metadata = game.metadata();
        println!("{} {}", game.name().bold(), game.id().dimmed());
        println!(
            "  version {} (revision {}), executables: {}",
            metadata.version,
            metadata.revision,
            game.executables().join(", ")
        );
        if !metadata.authors.is_empty() {
            println!("  by {}", metadata.authors.join(", "));
        }
        if let Some(url) = &metadata.project_url {
            println!("  {}", url);
        }

        if !effects {
            println!("  {} effects", game.effects().len());
            continue;
        }

        for effect in game.effects().iter() {
            let mut flags = Vec::new();
            if let Some(group) = effect.group() {
                flags.push(format!("group {}", group));
            }
            if effect.is_persistent() {
                flags.push("persistent".to_string());
            }
            if effect.is_stackable() {
                flags.push("stackable".to_string());
            }

            if flags.is_empty() {
                println!("  {:>4}  {}", effect.id().0, effect.name());
            } else {
                println!(
                    "  {:>4}  {} {}",
                    effect.id().0,
                    effect.name(),
                    format!("({})", flags.join(", ")).dimmed()
                );
            }
        }
    }

    Ok(())
}
