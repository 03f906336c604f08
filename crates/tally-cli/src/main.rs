//! Tally CLI - a conversational expense-splitting ledger for two people
//!
//! This is the command-line interface for Tally. It drives the core
//! dispatcher directly with structured intents; the chat front end
//! (classifier, renderer, transport) lives behind traits in the core.

mod app;
mod cli;
mod commands;
mod config;
mod output;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use tally_core::VERSION;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Init(args)) => commands::handle_init(&cli, args)?,
        Some(Commands::Log(args)) => commands::handle_log(&cli, args)?,
        Some(Commands::List(args)) => commands::handle_list(&cli, args)?,
        Some(Commands::Stats(args)) => commands::handle_stats(&cli, args)?,
        Some(Commands::Balance(args)) => commands::handle_balance(&cli, args)?,
        Some(Commands::Settle(args)) => commands::handle_settle(&cli, args)?,
        Some(Commands::Delete(args)) => commands::handle_delete(&cli, args)?,
        Some(Commands::Edit(args)) => commands::handle_edit(&cli, args)?,
        Some(Commands::Confirm(args)) => commands::handle_confirm(&cli, args)?,
        Some(Commands::Completions(args)) => {
            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "tally", &mut std::io::stdout());
        }
        None => {
            println!("Tally v{}", VERSION);
            println!("\nRun `tally --help` for usage information.");
        }
    }

    Ok(())
}
