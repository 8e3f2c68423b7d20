//! mcstrings is a tool for extracting, patching, and housekeeping the
//! strings embedded in a Minecraft world's region files.

use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "mcstrings",
    about = "Extract and patch the strings of a Minecraft world",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract strings from a Minecraft world to CSV
    Extract(commands::extract::ExtractArgs),
    /// Patch strings from a CSV file back into a Minecraft world
    Patch(commands::patch::PatchArgs),
    /// Remove unused sectors from a Minecraft world's region files
    Compact(commands::compact::CompactArgs),
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Extract(args) => commands::extract::run(&args),
        Command::Patch(args) => commands::patch::run(&args),
        Command::Compact(args) => commands::compact::run(&args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
