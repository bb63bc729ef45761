#[cfg(target_os = "windows")]
mod commands;
mod tracing_helper;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gametrainer_lib::ValueKind;

#[derive(Parser)]
#[command(name = "gametrainer", version, about = "Reads and patches a running game")]
struct Cli {
    /// Directory of gametrainer.log
    #[arg(long, default_value = ".")]
    log_dir: PathBuf,

    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Process to attach to.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct Target {
    /// Executable name, e.g. StardewValley.exe
    #[arg(long)]
    process: Option<String>,

    #[arg(long)]
    pid: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Prints the id of the first process with this executable name
    Find { name: String },
    /// Reads a named value of a trainer profile
    Read { profile: PathBuf, value: String },
    /// Writes a named value of a trainer profile
    Write {
        profile: PathBuf,
        value: String,
        text: String,
    },
    /// Reads a value at an absolute address
    Peek {
        #[command(flatten)]
        target: Target,
        #[arg(value_parser = parse_address)]
        address: usize,
        kind: ValueKind,
    },
    /// Writes a value at an absolute address
    Poke {
        #[command(flatten)]
        target: Target,
        #[arg(value_parser = parse_address)]
        address: usize,
        kind: ValueKind,
        text: String,
    },
    /// Creates a probe swap chain and prints its Present entry
    Probe,
    /// Hooks Present of this process's own probe and counts frames
    HookSelftest {
        #[arg(long, default_value_t = 60)]
        frames: u32,
    },
}

fn parse_address(text: &str) -> Result<usize, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse(),
    };
    parsed.map_err(|err| format!("invalid address {}: {}", text, err))
}

#[cfg(target_os = "windows")]
fn run(command: Command) -> Result<()> {
    match command {
        Command::Find { name } => commands::find(&name),
        Command::Read { profile, value } => commands::read(&profile, &value),
        Command::Write {
            profile,
            value,
            text,
        } => commands::write(&profile, &value, &text),
        Command::Peek {
            target,
            address,
            kind,
        } => commands::peek(&target, address, kind),
        Command::Poke {
            target,
            address,
            kind,
            text,
        } => commands::poke(&target, address, kind, &text),
        Command::Probe => commands::probe(),
        Command::HookSelftest { frames } => commands::hook_selftest(frames),
    }
}

#[cfg(not(target_os = "windows"))]
fn run(_command: Command) -> Result<()> {
    anyhow::bail!("gametrainer only works on Windows")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_helper::init_tracing(&cli.log_dir, "gametrainer.log", cli.verbose)
        .context("Failed to initialize logging")?;
    run(cli.command)
}
