//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod enrich;
mod helpers;
mod inspect;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "locality")]
#[command(about = "Crime, school and walkability enrichment for property addresses")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Address parts shared by the commands that take a location.
#[derive(Args, Debug, Clone)]
pub struct AddressArgs {
    /// Street line, e.g. "2778 2nd St NE"
    #[arg(long, default_value = "")]
    pub street: String,

    #[arg(long)]
    pub city: Option<String>,

    /// Two-letter state code
    #[arg(long)]
    pub state: String,

    /// 5-digit zip, optionally with +4
    #[arg(long)]
    pub zip: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape all three sites for one address and print the combined record
    Enrich {
        #[command(flatten)]
        address: AddressArgs,

        /// Start the browser visibly instead of headless
        #[arg(long)]
        headed: bool,

        /// TOML config file
        #[arg(short, long, env = "LOCALITY_CONFIG")]
        config: Option<PathBuf>,

        /// Write the JSON result to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the site URLs an address resolves to (no browser)
    Urls {
        #[command(flatten)]
        address: AddressArgs,

        /// TOML config file (for site base URLs)
        #[arg(short, long, env = "LOCALITY_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Print the anti-detection script injected into every page
    StealthScript {
        #[arg(short, long, env = "LOCALITY_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    Config {
        #[arg(short, long, env = "LOCALITY_CONFIG")]
        config: Option<PathBuf>,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Enrich {
            address,
            headed,
            config,
            output,
        } => enrich::cmd_enrich(&address, headed, config.as_deref(), output.as_deref()).await,
        Commands::Urls { address, config } => inspect::cmd_urls(&address, config.as_deref()).await,
        Commands::StealthScript { config } => inspect::cmd_stealth_script(config.as_deref()).await,
        Commands::Config { config } => inspect::cmd_config(config.as_deref()).await,
    }
}
