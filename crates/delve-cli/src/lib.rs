//! delve CLI - command-line interface over the delve tool runtime.

mod cli_args;
mod commands;
mod utils;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

pub use cli_args::{Cli, Command, ProfileArgs};

use utils::{initialize_logging, load_config};

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    initialize_logging(&cli);
    run_with(cli).await
}

/// Execute an already-parsed command line.
pub async fn run_with(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    debug!(command = ?cli.command, "Running command");

    match cli.command {
        Command::Tools { profile, json } => commands::list_tools(config, &profile, json).await,
        Command::Search {
            query,
            engines,
            max_results,
        } => commands::search(config, query, engines, max_results).await,
        Command::Browse {
            url,
            follow,
            links,
            max_chars,
        } => commands::browse(config, url, follow, links, max_chars).await,
        Command::Sandbox {
            url,
            screenshot,
            max_chars,
        } => commands::sandbox(config, url, screenshot.as_deref(), max_chars).await,
        Command::Config { init: Some(path), force } => commands::init_config(&path, force),
        Command::Config { init: None, .. } => commands::show_config(&config),
    }
}
