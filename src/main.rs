use anyhow::Result;
use clap::Parser;

use cachet::cli::{Cli, Command};
use cachet::commands;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Tracing goes to stderr so stdout stays clean for command output.
    // Default is warnings only; RUST_LOG=debug shows cache hit/miss detail.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    match cli.command {
        Command::Store { data, kind } => commands::cmd_store(&cli.db, &data, kind, cli.json),
        Command::Get { key, kind } => commands::cmd_get(&cli.db, &key, kind, cli.json),
        Command::Calls { method } => commands::cmd_calls(&cli.db, &method, cli.json),
        Command::Replay { method } => commands::cmd_replay(&cli.db, &method, cli.json),
        Command::Fetch { path, ttl_secs } => {
            commands::cmd_fetch(&cli.db, &path, ttl_secs, cli.json)
        }
        Command::Stats => commands::cmd_stats(&cli.db, cli.json),
        Command::Flush => commands::cmd_flush(&cli.db, cli.json),
    }
}
