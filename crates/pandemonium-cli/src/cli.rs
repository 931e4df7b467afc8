//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pandemonium")]
#[command(about = "Randomized, reproducible effects for speedrun races", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List supported games
    Games {
        /// Also list every effect
        #[arg(short, long)]
        effects: bool,
    },
    /// Show running processes that look like a supported game
    Processes {
        /// Only check this game (id or name)
        #[arg(short, long)]
        game: Option<String>,
    },
    /// Create or inspect preset tokens
    Preset {
        #[command(subcommand)]
        command: PresetCommand,
    },
    /// Attach to the game and run a race
    Run(RunArgs),
}

#[derive(Subcommand)]
pub enum PresetCommand {
    /// Build a new preset token
    New(NewPresetArgs),
    /// Decode a preset token
    Inspect {
        token: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
pub struct NewPresetArgs {
    /// Game id or name
    #[arg(short, long)]
    pub game: String,

    /// Seed; random when omitted
    #[arg(short, long)]
    pub seed: Option<String>,

    /// Percent chance that a spawn tick schedules an effect
    #[arg(long)]
    pub effect_chance: Option<f64>,

    /// Percent chance to schedule while other effects are active
    #[arg(long)]
    pub combination_chance: Option<f64>,

    /// Delay range in seconds
    #[arg(long, num_args = 2, value_names = ["LOW", "HIGH"])]
    pub delay: Option<Vec<f64>>,

    /// Duration range in seconds
    #[arg(long, num_args = 2, value_names = ["LOW", "HIGH"])]
    pub duration: Option<Vec<f64>>,

    /// Disable an effect by id (repeatable)
    #[arg(long = "disable", value_name = "ID")]
    pub disabled: Vec<u32>,

    /// Enable only these effect ids (repeatable)
    #[arg(long = "only", value_name = "ID", conflicts_with = "disabled")]
    pub only: Vec<u32>,
}

#[derive(Args)]
pub struct RunArgs {
    /// Game id or name
    #[arg(short, long, env = "PANDEMONIUM_GAME")]
    pub game: Option<String>,

    /// Preset token to race with; a fresh random preset when omitted
    #[arg(short, long, env = "PANDEMONIUM_PRESET")]
    pub preset: Option<String>,

    /// Settings file
    #[arg(short, long, env = "PANDEMONIUM_CONFIG", default_value = "pandemonium.toml")]
    pub config: PathBuf,

    /// Override the spawn interval, in seconds
    #[arg(long)]
    pub spawn_interval: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preset_new() {
        let cli = Cli::try_parse_from([
            "pandemonium",
            "preset",
            "new",
            "--game",
            "dxhr",
            "--delay",
            "10",
            "20",
            "--disable",
            "3",
            "--disable",
            "4",
        ])
        .unwrap();

        let Command::Preset {
            command: PresetCommand::New(args),
        } = cli.command
        else {
            panic!("expected preset new");
        };
        assert_eq!(args.game, "dxhr");
        assert_eq!(args.delay, Some(vec![10.0, 20.0]));
        assert_eq!(args.disabled, vec![3, 4]);
        assert!(args.seed.is_none());
    }

    #[test]
    fn test_only_conflicts_with_disable() {
        let result = Cli::try_parse_from([
            "pandemonium",
            "preset",
            "new",
            "-g",
            "dxhr",
            "--only",
            "1",
            "--disable",
            "2",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_run_defaults() {
        let cli = Cli::try_parse_from(["pandemonium", "run", "--game", "dxhr"]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.game.as_deref(), Some("dxhr"));
        assert_eq!(args.config, PathBuf::from("pandemonium.toml"));
    }
}
