//! watch_ctl - send a command to a running weapon_watch

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use weapon_watch::control::DEFAULT_COMMAND_FILE;
use weapon_watch::Command;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Action {
    /// Stop the monitor.
    Quit,
    /// Train a new face (not supported yet).
    Train,
    /// Save the alert image (acknowledged only).
    Save,
}

impl From<Action> for Command {
    fn from(action: Action) -> Self {
        match action {
            Action::Quit => Command::Quit,
            Action::Train => Command::TrainFace,
            Action::Save => Command::SaveAlert,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    action: Action,
    /// Command file polled by weapon_watch.
    #[arg(long, default_value = DEFAULT_COMMAND_FILE)]
    command_file: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let command = Command::from(args.action);
    let Some(ch) = command.as_char() else {
        anyhow::bail!("{:?} has no wire form", command);
    };
    std::fs::write(&args.command_file, ch.to_string())
        .with_context(|| format!("write command file {}", args.command_file.display()))?;
    log::info!("sent '{}' to {}", ch, args.command_file.display());
    Ok(())
}
