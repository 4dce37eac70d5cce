//! CLI argument parsing for delve.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "delve")]
#[command(about = "Tool runtime for a conversational research assistant")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List the tools a capability profile exposes
    Tools {
        #[command(flatten)]
        profile: ProfileArgs,

        /// Print full definitions as JSON instead of names
        #[arg(long)]
        json: bool,
    },

    /// Run a web search through the engine fallback chain
    Search {
        query: String,

        /// Engines to try, in order (repeatable). Defaults to the configured order.
        #[arg(short, long = "engine", value_name = "ENGINE")]
        engines: Vec<String>,

        #[arg(short = 'n', long)]
        max_results: Option<u64>,
    },

    /// Fetch a page with the lightweight browser
    Browse {
        url: String,

        /// Follow the link at this index after loading the page
        #[arg(long, value_name = "INDEX")]
        follow: Option<u64>,

        /// Print the page's links
        #[arg(long)]
        links: bool,

        /// Maximum characters of page text to print
        #[arg(long, default_value = "2000")]
        max_chars: u64,
    },

    /// Open a page in a sandboxed browser
    Sandbox {
        url: String,

        /// Write a PNG screenshot of the loaded page to this path
        #[arg(long, value_name = "PATH")]
        screenshot: Option<PathBuf>,

        #[arg(long, default_value = "2000")]
        max_chars: u64,
    },

    /// Show the effective configuration or write a default one
    Config {
        /// Write the default configuration to this path instead of printing
        #[arg(long, value_name = "PATH")]
        init: Option<PathBuf>,

        /// Overwrite an existing file with --init
        #[arg(long, requires = "init")]
        force: bool,
    },
}

/// Capability overrides layered over the configured profile
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ProfileArgs {
    /// Enable a tool group (repeatable)
    #[arg(long = "enable", value_name = "GROUP")]
    pub enable: Vec<String>,

    /// Disable a tool group (repeatable)
    #[arg(long = "disable", value_name = "GROUP")]
    pub disable: Vec<String>,
}

impl ProfileArgs {
    /// Flag pairs in command-line order; a later `--disable` beats an
    /// earlier `--enable` of the same group.
    pub fn flags(&self) -> Vec<(String, bool)> {
        self.enable
            .iter()
            .map(|g| (g.clone(), true))
            .chain(self.disable.iter().map(|g| (g.clone(), false)))
            .collect()
    }
}
