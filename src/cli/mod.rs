pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "almanac")]
#[command(about = "A calendar feed sync engine", long_about = None)]
pub struct Cli {
    /// Settings file path (default: ~/.config/almanac/settings.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for the feed cache (default: platform data dir)
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a calendar source
    Add {
        /// Feed URL (https:// or webcal://)
        url: String,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,

        /// Stable source id (derived from the URL if omitted)
        #[arg(long)]
        id: Option<String>,

        /// Auto-refresh interval in minutes; 0 disables auto-refresh
        #[arg(short, long, default_value_t = 60)]
        interval: i64,

        /// Display color as a hex string
        #[arg(long)]
        color: Option<String>,
    },
    /// Remove a source (its on-disk cache is kept)
    Remove {
        id: String,
    },
    /// Re-enable a source and refresh it
    Enable {
        id: String,
    },
    /// Disable a source and drop its events
    Disable {
        id: String,
    },
    /// List configured sources
    List,
    /// Refresh all enabled sources once
    Sync,
    /// Run the sync engine with per-source timers until interrupted
    Run,
}
