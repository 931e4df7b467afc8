//! Detect running games.

use std::sync::Arc;

use anyhow::Result;
use owo_colors::OwoColorize;
use pandemonium_core::retry::NoRetry;
use pandemonium_core::{GameCatalog, GameDefinition, ProcessEntry, ProcessProvider, ProcessWatcher};

pub fn run(game: Option<&str>) -> Result<()> {
    let catalog = GameCatalog::builtin()?;
    let games: Vec<&Arc<GameDefinition>> = match game {
        Some(query) => vec![catalog.find(query)?],
        None => catalog.iter().collect(),
    };

    let provider = pandemonium_core::native_provider();
    let watcher = ProcessWatcher::new(Box::new(NoRetry));

    let mut found = 0;
    for game in games {
        for entry in watcher.detect(&provider, game)? {
            found += 1;
            let status = check(&provider, game, &entry);
            println!(
                "{:>7}  {:<20} {}  {}",
                entry.pid,
                entry.name,
                game.name(),
                status
            );
        }
    }

    if found == 0 {
        println!("No supported game is running");
    }
    Ok(())
}

/// Run both matcher phases against one candidate and describe the outcome.
fn check<P>(provider: &P, game: &GameDefinition, entry: &ProcessEntry) -> String
where
    P: ProcessProvider + ?Sized,
{
    let process = match provider.attach(entry) {
        Ok(process) => process,
        Err(e) => return format!("{}", e.red()),
    };

    if !game.matcher().matches(process.info()) {
        return "different executable".yellow().to_string();
    }
    if let Err(e) = process.open() {
        return format!("{}", e.red());
    }

    let compatible = game.matcher().is_compatible(&process);
    let _ = process.close();
    if compatible {
        "compatible".green().to_string()
    } else {
        "not compatible (yet)".yellow().to_string()
    }
}
