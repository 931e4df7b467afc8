mod cli;
mod commands;
mod settings;
mod shutdown;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, PresetCommand};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pandemonium=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Games { effects } => commands::games::run(effects),
        Command::Processes { game } => commands::processes::run(game.as_deref()),
        Command::Preset { command } => match command {
            PresetCommand::New(args) => commands::preset::new(&args),
            PresetCommand::Inspect { token, json } => commands::preset::inspect(&token, json),
        },
        Command::Run(args) => commands::run::run(&args),
    }
}
