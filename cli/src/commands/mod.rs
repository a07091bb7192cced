//! CLI command definitions and dispatch.

mod update;
mod watch;

use clap::{Parser, Subcommand};

/// imgstream - simplestreams image catalog server.
#[derive(Parser)]
#[command(name = "imgstream", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Rebuild the catalog from a full scan of the image tree
    Update(update::UpdateArgs),
    /// Watch the image tree and keep the catalog consistent
    Watch(watch::WatchArgs),
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Update(args) => update::execute(args).await,
        Command::Watch(args) => watch::execute(args).await,
    }
}
